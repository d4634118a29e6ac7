use clap::Parser as _;
use dotenvy::dotenv;
use karmabot_provisioner::cli::Cli;
use karmabot_provisioner::logging::init_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> color_eyre::Result<ExitCode> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_format)?;

    let config = match cli.to_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::FAILURE);
        }
    };
    info!(
        database = %config.database_name,
        collection = %config.collection_name,
        verify_only = cli.verify_only,
        "Starting karmabot index provisioner"
    );

    match karmabot_provisioner::run(&config, cli.verify_only).await {
        Ok(report) if report.is_complete() => {
            info!(present = report.present.len(), extra = report.extra.len(), "All indexes present");
            Ok(ExitCode::SUCCESS)
        }
        Ok(report) => {
            error!(
                missing = ?report.missing,
                mismatched = report.mismatched.len(),
                "Collection indexes do not match the declared set"
            );
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!(error = %e, error_chain = ?e, "Index provisioning failed");
            Ok(ExitCode::FAILURE)
        }
    }
}
