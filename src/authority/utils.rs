use base64::prelude::*;
use pem::{EncodeConfig, LineEnding};

use super::IssuedCertificate;
use crate::Result;
use crate::error::AppError;

/// Splits a PEM bundle, leaf certificate first, into leaf and chain.
/// Blocks that are not certificates are ignored.
pub fn parse_pem_bundle(content: &str) -> Result<IssuedCertificate> {
    let mut certs = pem::parse_many(content)?
        .into_iter()
        .filter(|block| block.tag() == "CERTIFICATE")
        .map(|block| pem::encode_config(&block, lf_config()));

    let cert = certs
        .next()
        .ok_or_else(|| AppError::AuthorityError("certificate bundle is empty".to_string()))?;

    Ok(IssuedCertificate {
        cert,
        chain: certs.collect(),
    })
}

fn lf_config() -> EncodeConfig {
    EncodeConfig::new().set_line_ending(LineEnding::LF)
}

pub fn parse_pem_bundle_from_base64(content: &str) -> Result<IssuedCertificate> {
    let data = BASE64_STANDARD.decode(content.trim())?;
    let text = String::from_utf8(data).map_err(|_| {
        AppError::AuthorityError("certificate bundle is not valid UTF-8".to_string())
    })?;
    parse_pem_bundle(&text)
}
