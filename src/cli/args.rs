// src/cli/args.rs
use clap::{Parser, Subcommand};

/// All settings are read from environment variables, the way GitLab CI
/// passes job variables.
#[derive(Parser)]
#[command(name = "vcert-gitlab")]
#[command(about = "Venafi certificate tools for GitLab CI", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// request a certificate when the previous one is within its expiration window
    RequestCertificate,
    /// download the certificate artifact of a previous pipeline
    DownloadPrevCert,
    /// Show tool version
    Version,
}
