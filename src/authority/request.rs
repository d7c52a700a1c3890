use std::net::IpAddr;

use rand::rngs::OsRng;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use tracing::debug;

use super::{ZoneConfig, ZoneValue};
use crate::Result;
use crate::config::{KeyType, RequestCertificateConfig};
use crate::error::AppError;

pub const ORIGIN: &str = "Fullstaq Gitlab integration";

const DEFAULT_RSA_BITS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Rsa { bits: usize },
    /// NIST P-384
    Ecdsa,
}

impl From<KeyType> for KeySpec {
    fn from(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Rsa => KeySpec::Rsa {
                bits: DEFAULT_RSA_BITS,
            },
            KeyType::Ecdsa => KeySpec::Ecdsa,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_units: Vec<String>,
    pub locality: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub email_addresses: Vec<String>,
    pub key: KeySpec,
    pub origin: String,
    private_key_pem: Option<String>,
    csr_pem: Option<String>,
}

impl CertificateRequest {
    pub fn new(common_name: &str, key: KeySpec) -> Self {
        CertificateRequest {
            common_name: common_name.to_string(),
            organization: None,
            organizational_units: Vec::new(),
            locality: None,
            province: None,
            country: None,
            dns_names: Vec::new(),
            ip_addresses: Vec::new(),
            email_addresses: Vec::new(),
            key,
            origin: ORIGIN.to_string(),
            private_key_pem: None,
            csr_pem: None,
        }
    }

    pub fn from_config(config: &RequestCertificateConfig) -> Self {
        let mut request = CertificateRequest::new(&config.common_name, config.key_type.into());
        request.organization = config.organization.clone();
        request.organizational_units = config.organizational_unit.iter().cloned().collect();
        request.locality = config.locality.clone();
        request.province = config.province.clone();
        request.country = config.country.clone();
        request.dns_names = config.dns_names.clone();
        request.ip_addresses = config.ip_addresses.clone();
        request.email_addresses = config.email_addresses.clone();
        request
    }

    /// Merges the zone policy into the request. Locked zone values win;
    /// unlocked ones only fill fields the request left empty.
    pub fn update_from_zone_config(&mut self, zone: &ZoneConfig) {
        merge(&mut self.organization, &zone.organization);
        merge(&mut self.locality, &zone.locality);
        merge(&mut self.province, &zone.province);
        merge(&mut self.country, &zone.country);

        if let Some(units) = &zone.organizational_units
            && (units.locked || self.organizational_units.is_empty())
        {
            self.organizational_units = units.value.clone();
        }

        if let Some(key) = &zone.key
            && key.locked
        {
            self.key = key.value;
        }
    }

    /// Generates the private key and the PKCS#10 request.
    pub fn generate_csr(&mut self) -> Result<()> {
        let key_pair = generate_key_pair(self.key)?;

        let mut params = CertificateParams::new(self.dns_names.clone())?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, &self.common_name);
        if let Some(organization) = &self.organization {
            dn.push(DnType::OrganizationName, organization);
        }
        for unit in &self.organizational_units {
            dn.push(DnType::OrganizationalUnitName, unit);
        }
        if let Some(locality) = &self.locality {
            dn.push(DnType::LocalityName, locality);
        }
        if let Some(province) = &self.province {
            dn.push(DnType::StateOrProvinceName, province);
        }
        if let Some(country) = &self.country {
            dn.push(DnType::CountryName, country);
        }
        params.distinguished_name = dn;

        for ip in &self.ip_addresses {
            let ip: IpAddr = ip
                .parse()
                .map_err(|e| AppError::CertificateError(format!("invalid IP address {}: {}", ip, e)))?;
            params.subject_alt_names.push(SanType::IpAddress(ip));
        }
        for email in &self.email_addresses {
            params
                .subject_alt_names
                .push(SanType::Rfc822Name(email.clone().try_into().map_err(|e| {
                    AppError::CertificateError(format!("invalid email address {}: {}", email, e))
                })?));
        }

        let csr = params.serialize_request(&key_pair)?;
        self.csr_pem = Some(csr.pem()?);
        self.private_key_pem = Some(key_pair.serialize_pem());
        debug!("Generated CSR for {}", self.common_name);
        Ok(())
    }

    pub fn csr_pem(&self) -> Result<&str> {
        self.csr_pem
            .as_deref()
            .ok_or_else(|| AppError::CertificateError("CSR has not been generated".to_string()))
    }

    pub fn private_key_pem(&self) -> Result<&str> {
        self.private_key_pem.as_deref().ok_or_else(|| {
            AppError::CertificateError("private key has not been generated".to_string())
        })
    }
}

fn merge(field: &mut Option<String>, zone_value: &Option<ZoneValue<String>>) {
    if let Some(zone_value) = zone_value
        && (zone_value.locked || field.is_none())
    {
        *field = Some(zone_value.value.clone());
    }
}

fn generate_key_pair(key: KeySpec) -> Result<KeyPair> {
    match key {
        KeySpec::Rsa { bits } => {
            let private_key = RsaPrivateKey::new(&mut OsRng, bits).map_err(|e| {
                AppError::CertificateError(format!("RSA key generation failed: {}", e))
            })?;
            let pem = private_key.to_pkcs8_pem(LineEnding::LF).map_err(|e| {
                AppError::CertificateError(format!("RSA key encoding failed: {}", e))
            })?;
            Ok(KeyPair::from_pem(&pem)?)
        }
        KeySpec::Ecdsa => Ok(KeyPair::generate_for(&rcgen::PKCS_ECDSA_P384_SHA384)?),
    }
}
