use crate::processor::udf::{
    EPOCH_MILLIS_TO_TIMESTAMP, TS_DAY, TS_HOUR, TS_MONTH, TS_WEEK, TS_WEEKDAY, TS_YEAR,
};
use common::Result;
use datafusion::logical_expr::registry::FunctionRegistry;
use datafusion::prelude::*;
use std::sync::Arc;

const NEXT_SONG_PAGE: &str = "NextSong";

/// Tables derived from the activity log.
pub struct ActivityTables {
    /// NextSong events with their `start_time` attached; input of the fact join.
    pub plays: DataFrame,
    pub users: DataFrame,
    pub time: DataFrame,
}

pub struct ActivityTransformer {
    ctx: Arc<SessionContext>,
}

impl ActivityTransformer {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    pub fn derive_tables(&self, raw: DataFrame) -> Result<ActivityTables> {
        let plays = self.play_events(raw)?;
        let users = self.users(plays.clone())?;
        let time = self.time(plays.clone())?;
        Ok(ActivityTables { plays, users, time })
    }

    /// Keeps song plays only and converts `ts` once into `start_time`.
    pub fn play_events(&self, raw: DataFrame) -> Result<DataFrame> {
        let to_timestamp = self.ctx.udf(EPOCH_MILLIS_TO_TIMESTAMP)?;
        let plays = raw
            .filter(col("page").eq(lit(NEXT_SONG_PAGE)))?
            .with_column("start_time", to_timestamp.call(vec![col("ts")]))?;
        Ok(plays)
    }

    fn users(&self, plays: DataFrame) -> Result<DataFrame> {
        let users = plays
            .select(vec![
                ident("userId").alias("user_id"),
                ident("firstName").alias("first_name"),
                ident("lastName").alias("last_name"),
                col("gender"),
                col("level"),
            ])?
            .distinct()?;
        Ok(users)
    }

    fn time(&self, plays: DataFrame) -> Result<DataFrame> {
        let mut columns = vec![col("start_time")];
        for (name, alias) in [
            (TS_HOUR, "hour"),
            (TS_DAY, "day"),
            (TS_WEEK, "week"),
            (TS_MONTH, "month"),
            (TS_YEAR, "year"),
            (TS_WEEKDAY, "weekday"),
        ] {
            let part = self.ctx.udf(name)?;
            columns.push(part.call(vec![col("start_time")]).alias(alias));
        }

        let time = plays
            .filter(col("start_time").is_not_null())?
            .select(vec![col("start_time")])?
            .distinct()?
            .select(columns)?;
        Ok(time)
    }
}
