// src/main.rs

use std::process;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use vcert_gitlab::cli::args::{Cli, Commands};
use vcert_gitlab::cli::command::{download_prev_cert, request_certificate, version};
use vcert_gitlab::config::{DownloadPrevCertConfig, EnvSource, RequestCertificateConfig};
use vcert_gitlab::error::AppError;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> vcert_gitlab::Result<()> {
    match command {
        Commands::RequestCertificate => {
            let config = RequestCertificateConfig::from_env(&EnvSource::from_process()?)?;
            request_certificate(&config).await
        }
        Commands::DownloadPrevCert => {
            let config = DownloadPrevCertConfig::from_env(&EnvSource::from_process()?)?;
            download_prev_cert(&config).await
        }
        Commands::Version => {
            println!("{}", version());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(e) = run(cli.command).await {
        match &e {
            AppError::ConfigError(msg) => eprintln!("{}", msg),
            // already reported
            AppError::ArtifactNotFound => {}
            _ => error!("{}", e),
        }
        process::exit(e.exit_code());
    }
}
