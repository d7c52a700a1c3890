use std::path::{Path, PathBuf};

use tracing::info;

use crate::Result;
use crate::authority::IssuedCertificate;
use crate::config::RequestCertificateConfig;

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub priv_key: PathBuf,
    pub cert: PathBuf,
    pub chain: PathBuf,
}

impl From<&RequestCertificateConfig> for OutputPaths {
    fn from(config: &RequestCertificateConfig) -> Self {
        OutputPaths {
            priv_key: config.priv_key_output.clone(),
            cert: config.cert_output.clone(),
            chain: config.cert_chain_output.clone(),
        }
    }
}

/// Writes key, certificate and chain in that order. A failed write leaves
/// the files written before it in place.
pub async fn write_output(
    paths: &OutputPaths,
    private_key_pem: &str,
    cert: &IssuedCertificate,
) -> Result<()> {
    write_file(&paths.priv_key, private_key_pem).await?;
    write_file(&paths.cert, &cert.cert).await?;
    write_file(&paths.chain, &cert.chain.join("\n")).await?;
    Ok(())
}

async fn write_file(path: &Path, content: &str) -> Result<()> {
    tokio::fs::write(path, content).await?;
    info!("Wrote {}", path.display());
    Ok(())
}
