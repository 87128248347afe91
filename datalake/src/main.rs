use clap::{Arg, ArgAction, Command};
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/datalake.toml";

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let matches = Command::new("datalake-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Builds the song play star schema from JSON logs and writes it as partitioned Parquet")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .default_value(DEFAULT_CONFIG)
                .help("Sets a custom config file"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .get_matches();

    init_logging(matches.get_flag("json-logs"));

    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG);
    info!(config_path, "Starting data lake pipeline");

    match datalake::run_datalake_pipeline(config_path).await {
        Ok(report) => {
            let summary = serde_json::to_string(&report).unwrap_or_default();
            info!(tables = report.tables.len(), report = %summary, "Data lake pipeline completed");
        }
        Err(e) => {
            error!("Data lake pipeline error: {}", e);
            process::exit(1);
        }
    }
}
