use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{
    CertificateAuthority, CertificateRequest, IssuedCertificate, KeySpec, ZoneConfig, ZoneValue,
    parse_pem_bundle_from_base64,
};
use crate::Result;
use crate::error::AppError;

const API_KEY_HEADER: &str = "X-Venafi-Api-Key";
const POLICY_ROOT: &str = "\\VED\\Policy";

/// Trust Protection Platform, authenticated with a username and password.
pub struct TppAuthority {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct AuthorizeResponse {
    #[serde(rename = "APIKey")]
    api_key: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct CheckPolicyResponse {
    policy: Option<Policy>,
    error: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct Policy {
    subject: PolicySubject,
    key_pair: PolicyKeyPair,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct PolicySubject {
    organization: Option<LockedValue<String>>,
    organizational_unit: Option<LockedValues>,
    city: Option<LockedValue<String>>,
    state: Option<LockedValue<String>>,
    country: Option<LockedValue<String>>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct PolicyKeyPair {
    key_algorithm: Option<LockedValue<String>>,
    key_size: Option<LockedValue<usize>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LockedValue<T> {
    value: Option<T>,
    #[serde(default)]
    locked: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LockedValues {
    #[serde(default)]
    values: Vec<String>,
    #[serde(default)]
    locked: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct RequestBody<'a> {
    #[serde(rename = "PolicyDN")]
    policy_dn: String,
    #[serde(rename = "PKCS10")]
    pkcs10: &'a str,
    object_name: &'a str,
    disable_automatic_renewal: bool,
    #[serde(rename = "CASpecificAttributes")]
    ca_specific_attributes: Vec<NameValue<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct NameValue<'a> {
    name: &'a str,
    value: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequestResponse {
    #[serde(rename = "CertificateDN")]
    certificate_dn: Option<String>,
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RetrieveResponse {
    certificate_data: Option<String>,
    stage: Option<i64>,
    status: Option<String>,
}

impl TppAuthority {
    pub async fn connect(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        let base_url = normalize_base_url(base_url);

        let response = client
            .post(format!("{}/vedsdk/authorize/", base_url))
            .json(&json!({ "Username": username, "Password": password }))
            .send()
            .await?;
        let auth: AuthorizeResponse = parse_json(response, "authorize").await?;
        debug!("Authenticated to TPP at {}", base_url);

        Ok(TppAuthority {
            client,
            base_url,
            api_key: auth.api_key,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let response = self
            .client
            .post(format!("{}/vedsdk/{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }
}

#[async_trait::async_trait]
impl CertificateAuthority for TppAuthority {
    async fn read_zone_config(&self, zone: &str) -> Result<ZoneConfig> {
        let response = self
            .post(
                "certificates/checkpolicy",
                &json!({ "PolicyDN": policy_dn(zone) }),
            )
            .await?;
        let body: CheckPolicyResponse = parse_json(response, "checkpolicy").await?;
        if let Some(error) = body.error {
            return Err(AppError::AuthorityError(format!(
                "reading zone {} failed: {}",
                zone, error
            )));
        }
        Ok(body.policy.map(zone_config_from_policy).unwrap_or_default())
    }

    async fn request_certificate(&self, request: &CertificateRequest, zone: &str) -> Result<String> {
        let body = RequestBody {
            policy_dn: policy_dn(zone),
            pkcs10: request.csr_pem()?,
            object_name: &request.common_name,
            disable_automatic_renewal: true,
            ca_specific_attributes: vec![NameValue {
                name: "Origin",
                value: &request.origin,
            }],
        };
        let response = self.post("certificates/request", &body).await?;
        let body: RequestResponse = parse_json(response, "certificate request").await?;
        match (body.certificate_dn, body.error) {
            (Some(dn), _) => Ok(dn),
            (None, error) => Err(AppError::AuthorityError(format!(
                "certificate request failed: {}",
                error.unwrap_or_else(|| "no CertificateDN returned".to_string())
            ))),
        }
    }

    async fn retrieve_certificate(&self, pickup_id: &str) -> Result<Option<IssuedCertificate>> {
        let response = self
            .post(
                "certificates/retrieve",
                &json!({
                    "CertificateDN": pickup_id,
                    "Format": "base64",
                    "IncludeChain": true,
                    "RootFirstOrder": false,
                }),
            )
            .await?;

        if response.status() == StatusCode::ACCEPTED {
            debug!("Certificate {} is not issued yet", pickup_id);
            return Ok(None);
        }
        let body: RetrieveResponse = parse_json(response, "retrieve").await?;
        match body.certificate_data {
            Some(data) if !data.is_empty() => Ok(Some(parse_pem_bundle_from_base64(&data)?)),
            _ => {
                debug!(
                    "Certificate {} is not issued yet (stage {:?}, status {:?})",
                    pickup_id, body.stage, body.status
                );
                Ok(None)
            }
        }
    }
}

fn normalize_base_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    let url = url.strip_suffix("/vedsdk").unwrap_or(url);
    if url.contains("://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    }
}

fn policy_dn(zone: &str) -> String {
    if zone.starts_with(POLICY_ROOT) {
        zone.to_string()
    } else {
        format!("{}\\{}", POLICY_ROOT, zone.trim_start_matches('\\'))
    }
}

fn zone_config_from_policy(policy: Policy) -> ZoneConfig {
    fn single(value: Option<LockedValue<String>>) -> Option<ZoneValue<String>> {
        value.and_then(|v| match v.value {
            Some(s) if !s.is_empty() => Some(ZoneValue::new(s, v.locked)),
            _ => None,
        })
    }

    let key = policy.key_pair.key_algorithm.and_then(|algorithm| {
        let locked = algorithm.locked;
        match algorithm.value.as_deref() {
            Some("RSA") => {
                let bits = policy
                    .key_pair
                    .key_size
                    .and_then(|size| size.value)
                    .unwrap_or(2048);
                Some(ZoneValue::new(KeySpec::Rsa { bits }, locked))
            }
            Some("EC") | Some("ECDSA") => Some(ZoneValue::new(KeySpec::Ecdsa, locked)),
            _ => None,
        }
    });

    ZoneConfig {
        organization: single(policy.subject.organization),
        organizational_units: policy
            .subject
            .organizational_unit
            .filter(|units| !units.values.is_empty())
            .map(|units| ZoneValue::new(units.values, units.locked)),
        locality: single(policy.subject.city),
        province: single(policy.subject.state),
        country: single(policy.subject.country),
        key,
    }
}

async fn parse_json<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(AppError::AuthorityError(format!(
            "TPP {} returned HTTP {}: {}",
            operation, status, text
        )));
    }
    Ok(serde_json::from_str(&text)?)
}
