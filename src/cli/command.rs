use chrono::Utc;
use tracing::info;

use crate::authority::{CertificateAuthority, CertificateRequest};
use crate::config::{DownloadPrevCertConfig, RequestCertificateConfig};
use crate::error::AppError;
use crate::gitlab::{ArtifactLocator, GitlabArtifacts};
use crate::output::{OutputPaths, write_output};
use crate::poller::RetrievalPoller;
use crate::renewal;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub async fn request_certificate(config: &RequestCertificateConfig) -> crate::Result<()> {
    let previous_expiry = renewal::previous_certificate_expiry(&config.cert_output)?;
    let decision = renewal::decide(config.expiration_window, previous_expiry, Utc::now());
    renewal::log_decision(&decision, config.expiration_window, &config.cert_output);
    if !decision.should_renew() {
        return Ok(());
    }

    let authority = crate::authority_client(&config.credentials).await?;
    issue_certificate(authority.as_ref(), config, &RetrievalPoller::default()).await
}

/// Request, retrieve and store a certificate through `authority`.
pub async fn issue_certificate(
    authority: &dyn CertificateAuthority,
    config: &RequestCertificateConfig,
    poller: &RetrievalPoller,
) -> crate::Result<()> {
    let mut request = CertificateRequest::from_config(config);

    let zone_config = authority.read_zone_config(&config.zone_config_name).await?;
    request.update_from_zone_config(&zone_config);
    request.generate_csr()?;

    info!("Requesting certificate");
    let pickup_id = authority
        .request_certificate(&request, &config.zone_config_name)
        .await?;

    info!("Retrieving certificate");
    let cert = poller.retrieve(authority, &pickup_id).await?;

    info!("Writing output");
    write_output(&OutputPaths::from(config), request.private_key_pem()?, &cert).await
}

pub async fn download_prev_cert(config: &DownloadPrevCertConfig) -> crate::Result<()> {
    let gitlab = GitlabArtifacts::new(config)?;
    let content = match gitlab.fetch(&ArtifactLocator::from(config)).await? {
        Some(content) => content,
        None => {
            info!("Artifact not found.");
            return Err(AppError::ArtifactNotFound);
        }
    };

    info!("Storing artifact into {}", config.cert_filename);
    tokio::fs::write(&config.cert_filename, content).await?;
    Ok(())
}
