use reqwest::{Client, StatusCode};
use tracing::{error, info};

use crate::Result;
use crate::config::{DownloadPrevCertConfig, GitlabAuth};
use crate::error::AppError;

/// Job artifact lookup against the GitLab v4 REST API.
pub struct GitlabArtifacts {
    client: Client,
    base_url: String,
    auth: GitlabAuth,
}

/// Where a job artifact lives.
#[derive(Debug, Clone)]
pub struct ArtifactLocator<'a> {
    pub project_path: &'a str,
    pub branch_name: &'a str,
    pub filename: &'a str,
    pub job_name: &'a str,
}

impl<'a> From<&'a DownloadPrevCertConfig> for ArtifactLocator<'a> {
    fn from(config: &'a DownloadPrevCertConfig) -> Self {
        ArtifactLocator {
            project_path: &config.project_path,
            branch_name: &config.branch_name,
            filename: &config.cert_filename,
            job_name: &config.requester_job_name,
        }
    }
}

impl GitlabArtifacts {
    pub fn new(config: &DownloadPrevCertConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(GitlabArtifacts {
            client,
            base_url: config.gitlab_api_v4_url.trim_end_matches('/').to_string(),
            auth: config.auth.clone(),
        })
    }

    pub fn artifact_url(&self, locator: &ArtifactLocator<'_>) -> String {
        artifact_url(&self.base_url, locator)
    }

    /// Fetches the raw artifact file. `Ok(None)` when GitLab answers 404.
    pub async fn fetch(&self, locator: &ArtifactLocator<'_>) -> Result<Option<Vec<u8>>> {
        let url = self.artifact_url(locator);
        info!("Downloading Gitlab API artifact: {}", url);

        let request = match &self.auth {
            GitlabAuth::JobToken(token) => self.client.get(&url).header("JOB-TOKEN", token),
            GitlabAuth::Bearer(token) => self.client.get(&url).bearer_auth(token),
        };
        let response = request.send().await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => Ok(Some(response.bytes().await?.to_vec())),
            status => {
                let body = response.text().await.unwrap_or_default();
                error!("Gitlab API returned error: HTTP code {}", status.as_u16());
                error!("API response body: {}", body);
                Err(AppError::Abort(format!(
                    "Gitlab API returned HTTP {}",
                    status.as_u16()
                )))
            }
        }
    }
}

pub fn artifact_url(base_url: &str, locator: &ArtifactLocator<'_>) -> String {
    format!(
        "{}/projects/{}/jobs/artifacts/{}/raw/{}?job={}",
        base_url.trim_end_matches('/'),
        escape(locator.project_path),
        escape(locator.branch_name),
        escape(locator.filename),
        escape(locator.job_name)
    )
}

// values may themselves contain '/', which must not split the path
fn escape(value: &str) -> String {
    urlencoding::encode(value).replace('/', "%2F")
}
