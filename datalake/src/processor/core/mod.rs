use crate::processor::activity::ActivityTransformer;
use crate::processor::catalog::CatalogTransformer;
use crate::processor::fact::FactAssembler;
use crate::processor::reader::JsonDatasetReader;
use crate::processor::table::{ParquetTableStore, TableStore};
use crate::processor::types::{JobReport, StarTable};
use crate::schema::{RawSchema, get_raw_schema};
use crate::utils::paths::PathBuilder;
use common::Result;
use common::config::Settings;
use datafusion::execution::context::SessionContext;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DataLakeProcessor {
    reader: JsonDatasetReader,
    catalog: CatalogTransformer,
    activity: ActivityTransformer,
    fact: FactAssembler,
    table_store: Arc<dyn TableStore>,
    paths: PathBuilder,
    song_data_path: String,
    log_data_path: String,
}

impl DataLakeProcessor {
    pub fn new(ctx: Arc<SessionContext>, settings: &Settings) -> Self {
        let table_store = Arc::new(ParquetTableStore::new(ctx.clone(), settings.write_mode));
        Self::with_table_store(ctx, settings, table_store)
    }

    pub fn with_table_store(
        ctx: Arc<SessionContext>,
        settings: &Settings,
        table_store: Arc<dyn TableStore>,
    ) -> Self {
        Self {
            reader: JsonDatasetReader::new(ctx.clone()),
            catalog: CatalogTransformer::new(),
            activity: ActivityTransformer::new(ctx.clone()),
            fact: FactAssembler::new(ctx),
            table_store,
            paths: PathBuilder::new(&settings.output_data),
            song_data_path: settings.song_data_path(),
            log_data_path: settings.log_data_path(),
        }
    }

    /// Song catalog to the songs and artists tables.
    pub async fn process_song_data(&self, report: &mut JobReport) -> Result<()> {
        info!(source = %self.song_data_path, "Processing song data");

        let loaded = self
            .reader
            .load_data(&self.song_data_path, get_raw_schema(RawSchema::Song))
            .await?;
        report.song_files = loaded.files;
        report.song_records = loaded.records;
        report.skipped_song_lines = loaded.skipped_lines;

        let tables = self.catalog.derive_tables(loaded.df)?;
        self.write(tables.songs, StarTable::Songs, report).await?;
        self.write(tables.artists, StarTable::Artists, report).await?;

        Ok(())
    }

    /// Activity log to the users, time and songplays tables. Reads the songs
    /// table back from storage, so it must run after [`Self::process_song_data`].
    pub async fn process_log_data(&self, report: &mut JobReport) -> Result<()> {
        info!(source = %self.log_data_path, "Processing log data");

        let loaded = self
            .reader
            .load_data(&self.log_data_path, get_raw_schema(RawSchema::Log))
            .await?;
        report.log_files = loaded.files;
        report.log_records = loaded.records;
        report.skipped_log_lines = loaded.skipped_lines;

        let tables = self.activity.derive_tables(loaded.df)?;
        report.play_events = tables.plays.clone().count().await?;

        self.write(tables.users, StarTable::Users, report).await?;
        self.write(tables.time, StarTable::Time, report).await?;

        let songs = self
            .table_store
            .read_table(StarTable::Songs, &self.paths.build_table_path(StarTable::Songs))
            .await?;
        let fact = self.fact.assemble(tables.plays, songs).await?;
        report.unmatched_plays = fact.unmatched_plays;
        if fact.unmatched_plays > 0 {
            warn!(
                unmatched_plays = fact.unmatched_plays,
                play_events = report.play_events,
                "Plays without a matching song title were left out of songplays"
            );
        }
        report.untimed_plays = fact.untimed_plays;
        if fact.untimed_plays > 0 {
            warn!(
                untimed_plays = fact.untimed_plays,
                play_events = report.play_events,
                "Plays without a timestamp were left out of songplays"
            );
        }

        self.write(fact.songplays, StarTable::Songplays, report).await?;

        Ok(())
    }

    async fn write(
        &self,
        df: datafusion::prelude::DataFrame,
        table: StarTable,
        report: &mut JobReport,
    ) -> Result<()> {
        let path = self.paths.build_table_path(table);
        let summary = self.table_store.write_table(df, table, &path).await?;
        report.record_write(summary);
        Ok(())
    }

    /// Runs both phases in order.
    pub async fn run(&self) -> Result<JobReport> {
        let mut report = JobReport::default();
        self.process_song_data(&mut report).await?;
        self.process_log_data(&mut report).await?;
        Ok(report)
    }
}
