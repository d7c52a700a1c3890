mod cloud;
mod request;
mod tpp;
mod utils;

pub use cloud::{CloudAuthority, DEFAULT_CLOUD_URL};
pub use request::{CertificateRequest, KeySpec, ORIGIN};
pub use tpp::TppAuthority;
pub use utils::{parse_pem_bundle, parse_pem_bundle_from_base64};

use crate::Result;

/// A zone policy value and whether the zone forbids overriding it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneValue<T> {
    pub value: T,
    pub locked: bool,
}

impl<T> ZoneValue<T> {
    pub fn new(value: T, locked: bool) -> Self {
        ZoneValue { value, locked }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZoneConfig {
    pub organization: Option<ZoneValue<String>>,
    pub organizational_units: Option<ZoneValue<Vec<String>>>,
    pub locality: Option<ZoneValue<String>>,
    pub province: Option<ZoneValue<String>>,
    pub country: Option<ZoneValue<String>>,
    pub key: Option<ZoneValue<KeySpec>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub cert: String,
    pub chain: Vec<String>,
}

#[async_trait::async_trait]
pub trait CertificateAuthority: Send + Sync {
    async fn read_zone_config(&self, zone: &str) -> Result<ZoneConfig>;
    /// Submits the request and returns the id used to pick up the result.
    async fn request_certificate(&self, request: &CertificateRequest, zone: &str)
    -> Result<String>;
    /// `Ok(None)` while the certificate is still being issued.
    async fn retrieve_certificate(&self, pickup_id: &str) -> Result<Option<IssuedCertificate>>;
}
