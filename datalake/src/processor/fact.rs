use crate::processor::udf::{TS_MONTH, TS_YEAR};
use common::Result;
use datafusion::common::JoinType;
use datafusion::functions_window::expr_fn::row_number;
use datafusion::logical_expr::registry::FunctionRegistry;
use datafusion::prelude::*;
use std::sync::Arc;
use tracing::debug;

pub struct FactOutput {
    pub songplays: DataFrame,
    /// Timed play events whose song title matched no catalog song.
    pub unmatched_plays: usize,
    /// Play events left out because their `ts` was missing.
    pub untimed_plays: usize,
}

pub struct FactAssembler {
    ctx: Arc<SessionContext>,
}

impl FactAssembler {
    pub fn new(ctx: Arc<SessionContext>) -> Self {
        Self { ctx }
    }

    /// Joins play events to the song dimension on exact title equality.
    ///
    /// A title shared by several songs yields one fact row per song. Plays
    /// without a match or without a timestamp are left out and only counted,
    /// so every play event is either in the fact table or in one of the two
    /// counters.
    pub async fn assemble(&self, plays: DataFrame, songs: DataFrame) -> Result<FactOutput> {
        let untimed_plays = plays
            .clone()
            .filter(col("start_time").is_null())?
            .count()
            .await?;
        let plays = plays.filter(col("start_time").is_not_null())?;
        let month = self.ctx.udf(TS_MONTH)?;
        let year = self.ctx.udf(TS_YEAR)?;

        let songplays = plays
            .clone()
            .join(songs.clone(), JoinType::Inner, &["song"], &["title"], None)?
            .with_column("songplay_id", row_number())?
            .select(vec![
                col("songplay_id"),
                col("start_time"),
                month.call(vec![col("start_time")]).alias("month"),
                year.call(vec![col("start_time")]).alias("year"),
                ident("userId").alias("user_id"),
                col("level"),
                col("song_id"),
                col("artist_id"),
                ident("sessionId").alias("session_id"),
                col("location"),
                ident("userAgent").alias("user_agent"),
            ])?;

        let unmatched_plays = plays
            .join(
                songs.select(vec![col("title")])?,
                JoinType::LeftAnti,
                &["song"],
                &["title"],
                None,
            )?
            .count()
            .await?;
        debug!(unmatched_plays, untimed_plays, "Counted plays left out of the fact table");

        Ok(FactOutput {
            songplays,
            unmatched_plays,
            untimed_plays,
        })
    }
}
