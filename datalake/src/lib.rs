pub mod processor;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;

use common::Result;
use common::config::Settings;
use processor::JobReport;
use services::DataLakeService;

/// Runs the complete data lake job with the settings found at `config_path`.
pub async fn run_datalake_pipeline(config_path: &str) -> Result<JobReport> {
    let settings = Settings::new(config_path)?;
    let service = DataLakeService::new(settings).await?;
    service.run().await
}
