use std::process::ExitCode;

use clap::Parser;
use log::{error, info};
use sensu_clickhouse_handler::db::ClickHouseConnector;
use sensu_clickhouse_handler::logging::logger;
use sensu_clickhouse_handler::{process_event, CliArgs, Event, HandlerConfig, HandlerError};
use tokio::io::AsyncReadExt;

async fn run(args: &CliArgs) -> Result<usize, HandlerError> {
    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    let event = Event::from_json(&input)?;

    let config = HandlerConfig::from(args);
    process_event(&ClickHouseConnector, config, &event, |key| {
        std::env::var(key).ok()
    })
    .await
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    logger::setup_logging(args.log_level)?;

    match run(&args).await {
        Ok(rows) => {
            info!("Handled event, {} rows written", rows);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!("{}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}
