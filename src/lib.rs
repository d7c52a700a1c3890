pub mod authority;
pub mod cli;
pub mod config;
pub mod error;
pub mod gitlab;
pub mod output;
pub mod poller;
pub mod renewal;

pub type Result<T> = std::result::Result<T, error::AppError>;

use tracing::info;

use crate::authority::{CertificateAuthority, CloudAuthority, DEFAULT_CLOUD_URL, TppAuthority};
use crate::config::Credentials;

/// Builds the authority client matching the configured credentials.
/// TPP authenticates immediately, so a bad login fails here.
pub async fn authority_client(credentials: &Credentials) -> Result<Box<dyn CertificateAuthority>> {
    match credentials {
        Credentials::Tpp {
            base_url,
            username,
            password,
        } => {
            info!("Logging into TPP at {}", base_url);
            let client = TppAuthority::connect(base_url, username, password).await?;
            Ok(Box::new(client))
        }
        Credentials::Cloud { api_key } => {
            let client = CloudAuthority::new(DEFAULT_CLOUD_URL, api_key)?;
            Ok(Box::new(client))
        }
    }
}
