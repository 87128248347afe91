use crate::processor::{DataLakeProcessor, JobReport, create_session};
use common::Result;
use common::config::Settings;
use std::time::Instant;
use tracing::info;

pub struct DataLakeService {
    processor: DataLakeProcessor,
    settings: Settings,
}

impl DataLakeService {
    /// Connects to storage and prepares the processor. Credential or bucket
    /// problems surface here, before any data is read.
    pub async fn new(settings: Settings) -> Result<Self> {
        let ctx = create_session(&settings).await?;
        let processor = DataLakeProcessor::new(ctx, &settings);
        Ok(Self {
            processor,
            settings,
        })
    }

    pub async fn run(&self) -> Result<JobReport> {
        let started = Instant::now();
        info!(
            input_data = %self.settings.input_data,
            output_data = %self.settings.output_data,
            write_mode = ?self.settings.write_mode,
            "Starting data lake job"
        );

        let report = self.processor.run().await?;

        for summary in report.tables.values() {
            info!(
                table = %summary.table,
                rows = summary.rows_written,
                path = %summary.path,
                "Table summary"
            );
        }
        info!(
            song_files = report.song_files,
            log_files = report.log_files,
            skipped_lines = report.skipped_song_lines + report.skipped_log_lines,
            play_events = report.play_events,
            unmatched_plays = report.unmatched_plays,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Data lake job finished"
        );

        Ok(report)
    }
}
