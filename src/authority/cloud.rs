use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{
    CertificateAuthority, CertificateRequest, IssuedCertificate, ZoneConfig, ZoneValue,
    parse_pem_bundle,
};
use crate::Result;
use crate::error::AppError;

pub const DEFAULT_CLOUD_URL: &str = "https://api.venafi.cloud";
const API_KEY_HEADER: &str = "tppl-api-key";

/// Venafi as a Service, authenticated with an API key.
pub struct CloudAuthority {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct Application {
    id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuingTemplate {
    id: String,
    #[serde(default)]
    recommended_settings: Option<RecommendedSettings>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct RecommendedSettings {
    subject_o_value: Option<String>,
    #[serde(rename = "subjectOUValue")]
    subject_ou_value: Option<String>,
    subject_l_value: Option<String>,
    #[serde(rename = "subjectSTValue")]
    subject_st_value: Option<String>,
    subject_c_value: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateRequestsResponse {
    certificate_requests: Vec<CertificateRequestStatus>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CertificateRequestStatus {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    certificate_ids: Vec<String>,
}

struct ZoneIds {
    application_id: String,
    template_id: String,
    recommended: RecommendedSettings,
}

impl CloudAuthority {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(CloudAuthority {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}/outagedetection/v1/{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn resolve_zone(&self, zone: &str) -> Result<ZoneIds> {
        let (application, alias) = zone.split_once('\\').ok_or_else(|| {
            AppError::AuthorityError(format!(
                "zone '{}' must have the form 'Application\\Issuing Template Alias'",
                zone
            ))
        })?;

        let response = self
            .get(&format!(
                "applications/name/{}",
                urlencoding::encode(application)
            ))
            .send()
            .await?;
        let app: Application = parse_json(response, "application lookup").await?;

        let response = self
            .get(&format!(
                "applications/{}/certificateissuingtemplates/{}",
                app.id,
                urlencoding::encode(alias)
            ))
            .send()
            .await?;
        let template: IssuingTemplate = parse_json(response, "issuing template lookup").await?;

        Ok(ZoneIds {
            application_id: app.id,
            template_id: template.id,
            recommended: template.recommended_settings.unwrap_or_default(),
        })
    }
}

#[async_trait::async_trait]
impl CertificateAuthority for CloudAuthority {
    async fn read_zone_config(&self, zone: &str) -> Result<ZoneConfig> {
        let recommended = self.resolve_zone(zone).await?.recommended;
        let unlocked = |value: Option<String>| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| ZoneValue::new(v, false))
        };
        Ok(ZoneConfig {
            organization: unlocked(recommended.subject_o_value),
            organizational_units: unlocked(recommended.subject_ou_value)
                .map(|ou| ZoneValue::new(vec![ou.value], false)),
            locality: unlocked(recommended.subject_l_value),
            province: unlocked(recommended.subject_st_value),
            country: unlocked(recommended.subject_c_value),
            key: None,
        })
    }

    async fn request_certificate(&self, request: &CertificateRequest, zone: &str) -> Result<String> {
        let ids = self.resolve_zone(zone).await?;
        let response = self
            .client
            .post(format!(
                "{}/outagedetection/v1/certificaterequests",
                self.base_url
            ))
            .header(API_KEY_HEADER, &self.api_key)
            .json(&json!({
                "certificateSigningRequest": request.csr_pem()?,
                "applicationId": ids.application_id,
                "certificateIssuingTemplateId": ids.template_id,
                "apiClientInformation": {
                    "type": request.origin,
                    "identifier": env!("CARGO_PKG_VERSION"),
                },
            }))
            .send()
            .await?;
        let body: CertificateRequestsResponse = parse_json(response, "certificate request").await?;
        body.certificate_requests
            .into_iter()
            .next()
            .map(|r| r.id)
            .ok_or_else(|| {
                AppError::AuthorityError("certificate request returned no request id".to_string())
            })
    }

    async fn retrieve_certificate(&self, pickup_id: &str) -> Result<Option<IssuedCertificate>> {
        let response = self
            .get(&format!("certificaterequests/{}", pickup_id))
            .send()
            .await?;
        let status: CertificateRequestStatus = parse_json(response, "request status").await?;

        match status.status.as_str() {
            "ISSUED" => {}
            "REQUESTED" | "PENDING" => {
                debug!("Certificate request {} is {}", pickup_id, status.status);
                return Ok(None);
            }
            other => {
                return Err(AppError::AuthorityError(format!(
                    "certificate request {} has status {}",
                    status.id, other
                )));
            }
        }

        let certificate_id = status.certificate_ids.first().ok_or_else(|| {
            AppError::AuthorityError(format!(
                "certificate request {} is issued but has no certificate id",
                pickup_id
            ))
        })?;
        let response = self
            .get(&format!("certificates/{}/contents", certificate_id))
            .query(&[("format", "PEM"), ("chainOrder", "EE_FIRST")])
            .send()
            .await?;
        let text = success_text(response, "certificate download").await?;
        Ok(Some(parse_pem_bundle(&text)?))
    }
}

async fn success_text(response: Response, operation: &str) -> Result<String> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(AppError::AuthorityError(format!(
            "Cloud {} returned HTTP {}: {}",
            operation, status, text
        )));
    }
    Ok(text)
}

async fn parse_json<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T> {
    let text = success_text(response, operation).await?;
    Ok(serde_json::from_str(&text)?)
}
