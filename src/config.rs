use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use base64::prelude::*;
use config::{Config, Environment};

use crate::Result;
use crate::error::AppError;

/// Snapshot of the environment variables a command reads.
pub struct EnvSource {
    inner: Config,
}

impl EnvSource {
    pub fn from_process() -> Result<Self> {
        let inner = Config::builder()
            .add_source(Environment::default())
            .build()?;
        Ok(EnvSource { inner })
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<config::Map<String, String>>();
        let inner = Config::builder()
            .add_source(Environment::default().source(Some(vars)))
            .build()?;
        Ok(EnvSource { inner })
    }

    // keys are stored lowercased by the environment source
    pub fn get(&self, name: &str) -> Option<String> {
        self.inner.get_string(&name.to_lowercase()).ok()
    }

    /// Returns the value of the first variable in `names` that is set.
    pub fn required(&self, names: &[&str]) -> Result<String> {
        names
            .iter()
            .find_map(|name| self.get(name))
            .ok_or_else(|| {
                AppError::ConfigError(format!(
                    "Please set the environment variable '{}'",
                    names.first().copied().unwrap_or_default()
                ))
            })
    }

    pub fn integer(&self, name: &str, default: i64) -> Result<i64> {
        match self.get(name) {
            Some(value) => value.trim().parse::<i64>().map_err(|_| {
                AppError::ConfigError(format!("'{}' must be an integer.", name))
            }),
            None => Ok(default),
        }
    }

    pub fn boolean(&self, name: &str) -> bool {
        self.get(name).map(|v| cast_bool(&v)).unwrap_or(false)
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        self.get(name).map(|v| cast_list(&v)).unwrap_or_default()
    }
}

pub fn cast_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "t" | "true" | "yes" | "y" | "1" | "on"
    )
}

pub fn cast_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Which of two mutually exclusive options was chosen.
#[derive(Debug, PartialEq, Eq)]
pub enum OneOf<A, B> {
    First(A),
    Second(B),
}

pub fn exactly_one_of<A, B>(
    name1: &str,
    value1: Option<A>,
    name2: &str,
    value2: Option<B>,
) -> Result<OneOf<A, B>> {
    match (value1, value2) {
        (Some(_), Some(_)) => Err(AppError::ConfigError(format!(
            "Only one of '{}' or '{}' may be set, but not both.",
            name1, name2
        ))),
        (None, None) => Err(AppError::ConfigError(format!(
            "One of '{}' or '{}' must be set.",
            name1, name2
        ))),
        (Some(a), None) => Ok(OneOf::First(a)),
        (None, Some(b)) => Ok(OneOf::Second(b)),
    }
}

pub fn require_set<T>(name: &str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| AppError::ConfigError(format!("'{}' must be set.", name)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Rsa,
    Ecdsa,
}

impl std::str::FromStr for KeyType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "RSA" => Ok(KeyType::Rsa),
            "ECDSA" => Ok(KeyType::Ecdsa),
            _ => Err(AppError::ConfigError(
                "'KEY_TYPE' may only be 'RSA' or 'ECDSA'.".to_string(),
            )),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Tpp {
        base_url: String,
        username: String,
        password: String,
    },
    Cloud {
        api_key: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Tpp {
                base_url, username, ..
            } => f
                .debug_struct("Tpp")
                .field("base_url", base_url)
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Cloud { .. } => f
                .debug_struct("Cloud")
                .field("api_key", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestCertificateConfig {
    pub credentials: Credentials,
    pub zone_config_name: String,
    pub key_type: KeyType,
    pub expiration_window: u32,

    pub common_name: String,
    pub organization: Option<String>,
    pub organizational_unit: Option<String>,
    pub locality: Option<String>,
    pub province: Option<String>,
    pub country: Option<String>,

    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<String>,
    pub email_addresses: Vec<String>,

    pub priv_key_output: PathBuf,
    pub cert_output: PathBuf,
    pub cert_chain_output: PathBuf,
}

impl RequestCertificateConfig {
    pub fn from_env(env: &EnvSource) -> Result<Self> {
        // individual variables first, cross-field checks after
        let tpp_base_url = env.get("TPP_BASE_URL");
        let tpp_username = env.get("TPP_USERNAME");
        let tpp_password = env.get("TPP_PASSWORD");
        let tpp_password_base64 = env.get("TPP_PASSWORD_BASE64");
        let cloud_api_key = env.get("CLOUD_API_KEY");

        let zone_config_name = env.required(&["ZONE_CONFIG_NAME"])?;
        let key_type = env.get("KEY_TYPE").unwrap_or_else(|| "RSA".to_string());
        let expiration_window = env.integer("EXPIRATION_WINDOW", 0)?;
        let dns_names = env.list("DNS_NAMES");
        let ip_addresses = env.list("IP_ADDRESSES");
        let email_addresses = env.list("EMAIL_ADDRESSES");

        let common_name = env.required(&["COMMON_NAME"])?;
        let priv_key_output = env.required(&["PRIV_KEY_OUTPUT"])?;
        let cert_output = env.required(&["CERT_OUTPUT"])?;
        let cert_chain_output = env.required(&["CERT_CHAIN_OUTPUT"])?;

        let credentials = match exactly_one_of(
            "TPP_BASE_URL",
            tpp_base_url,
            "CLOUD_API_KEY",
            cloud_api_key,
        )? {
            OneOf::First(base_url) => {
                let username = require_set("TPP_USERNAME", tpp_username)?;
                let password = match exactly_one_of(
                    "TPP_PASSWORD",
                    tpp_password,
                    "TPP_PASSWORD_BASE64",
                    tpp_password_base64,
                )? {
                    OneOf::First(password) => password,
                    OneOf::Second(encoded) => decode_password(&encoded)?,
                };
                Credentials::Tpp {
                    base_url,
                    username,
                    password,
                }
            }
            OneOf::Second(api_key) => Credentials::Cloud { api_key },
        };

        let key_type = key_type.parse::<KeyType>()?;
        if expiration_window < 0 {
            return Err(AppError::ConfigError(
                "'EXPIRATION_WINDOW' may not be negative.".to_string(),
            ));
        }
        let expiration_window = u32::try_from(expiration_window).map_err(|_| {
            AppError::ConfigError("'EXPIRATION_WINDOW' is too large.".to_string())
        })?;

        Ok(RequestCertificateConfig {
            credentials,
            zone_config_name,
            key_type,
            expiration_window,
            common_name,
            organization: env.get("ORGANIZATION"),
            organizational_unit: env.get("ORGANIZATIONAL_UNIT"),
            locality: env.get("LOCALITY"),
            province: env.get("PROVINCE"),
            country: env.get("COUNTRY"),
            dns_names,
            ip_addresses,
            email_addresses,
            priv_key_output: PathBuf::from(priv_key_output),
            cert_output: PathBuf::from(cert_output),
            cert_chain_output: PathBuf::from(cert_chain_output),
        })
    }
}

fn decode_password(encoded: &str) -> Result<String> {
    let bytes = BASE64_STANDARD.decode(encoded.trim()).map_err(|e| {
        AppError::ConfigError(format!("'TPP_PASSWORD_BASE64' is not valid base64: {}", e))
    })?;
    String::from_utf8(bytes).map_err(|_| {
        AppError::ConfigError("'TPP_PASSWORD_BASE64' does not decode to UTF-8 text.".to_string())
    })
}

#[derive(Clone, PartialEq, Eq)]
pub enum GitlabAuth {
    JobToken(String),
    Bearer(String),
}

impl fmt::Debug for GitlabAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitlabAuth::JobToken(_) => f.write_str("JobToken(<redacted>)"),
            GitlabAuth::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct DownloadPrevCertConfig {
    pub gitlab_api_v4_url: String,
    pub project_path: String,
    pub branch_name: String,
    pub requester_job_name: String,
    pub cert_filename: String,
    pub auth: GitlabAuth,
    pub timeout: Duration,
}

impl DownloadPrevCertConfig {
    pub fn from_env(env: &EnvSource) -> Result<Self> {
        let gitlab_api_v4_url = env.required(&["GITLAB_API_V4_URL", "CI_API_V4_URL"])?;
        let project_path = env.required(&["PROJECT_PATH", "CI_PROJECT_PATH"])?;
        let branch_name = env.required(&["BRANCH_NAME", "CI_COMMIT_REF_NAME"])?;
        let requester_job_name = env.required(&["REQUESTER_JOB_NAME"])?;
        let cert_filename = env.required(&["CERT_FILENAME"])?;
        let use_ci_job_token = env.boolean("USE_CI_JOB_TOKEN");
        let gitlab_bearer_token = env.get("GITLAB_BEARER_TOKEN");
        let timeout_secs = env.integer("DOWNLOAD_TIMEOUT", DEFAULT_DOWNLOAD_TIMEOUT_SECS)?;

        // a disabled flag counts as unset
        let auth = match exactly_one_of(
            "USE_CI_JOB_TOKEN",
            use_ci_job_token.then_some(()),
            "GITLAB_BEARER_TOKEN",
            gitlab_bearer_token,
        )? {
            OneOf::First(()) => GitlabAuth::JobToken(env.get("CI_JOB_TOKEN").ok_or_else(|| {
                AppError::ConfigError(
                    "When USE_CI_JOB_TOKEN is enabled, the environment variable CI_JOB_TOKEN must be set."
                        .to_string(),
                )
            })?),
            OneOf::Second(token) => GitlabAuth::Bearer(token),
        };

        if timeout_secs <= 0 {
            return Err(AppError::ConfigError(
                "'DOWNLOAD_TIMEOUT' must be a positive number of seconds.".to_string(),
            ));
        }

        Ok(DownloadPrevCertConfig {
            gitlab_api_v4_url,
            project_path,
            branch_name,
            requester_job_name,
            cert_filename,
            auth,
            timeout: Duration::from_secs(timeout_secs as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_env(extra: &[(&str, &str)]) -> EnvSource {
        let mut pairs = vec![
            ("ZONE_CONFIG_NAME", "Certificates\\Gitlab"),
            ("COMMON_NAME", "app.example.com"),
            ("PRIV_KEY_OUTPUT", "key.pem"),
            ("CERT_OUTPUT", "cert.pem"),
            ("CERT_CHAIN_OUTPUT", "chain.pem"),
        ];
        pairs.extend_from_slice(extra);
        EnvSource::from_pairs(pairs).unwrap()
    }

    fn download_env(extra: &[(&str, &str)]) -> EnvSource {
        let mut pairs = vec![
            ("CI_API_V4_URL", "https://gitlab.example.com/api/v4"),
            ("CI_PROJECT_PATH", "group/project"),
            ("CI_COMMIT_REF_NAME", "main"),
            ("REQUESTER_JOB_NAME", "request_cert"),
            ("CERT_FILENAME", "cert.pem"),
        ];
        pairs.extend_from_slice(extra);
        EnvSource::from_pairs(pairs).unwrap()
    }

    fn config_error(result: Result<impl fmt::Debug>) -> String {
        match result {
            Err(AppError::ConfigError(msg)) => msg,
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn test_cast_bool() {
        for truthy in ["t", "TRUE", "Yes", "y", "1", "on"] {
            assert!(cast_bool(truthy), "{truthy}");
        }
        for falsy in ["", "0", "false", "off", "no", "enabled"] {
            assert!(!cast_bool(falsy), "{falsy}");
        }
    }

    #[test]
    fn test_cast_list_keeps_order_and_duplicates() {
        assert_eq!(
            cast_list("b.example.com, a.example.com  b.example.com,,"),
            vec!["b.example.com", "a.example.com", "b.example.com"]
        );
        assert!(cast_list("").is_empty());
    }

    #[test]
    fn test_exactly_one_of() {
        assert_eq!(
            exactly_one_of("A", Some(1), "B", None::<&str>).unwrap(),
            OneOf::First(1)
        );
        assert_eq!(
            exactly_one_of("A", None::<i32>, "B", Some("b")).unwrap(),
            OneOf::Second("b")
        );
        assert_eq!(
            config_error(exactly_one_of("A", Some(1), "B", Some(2))),
            "Only one of 'A' or 'B' may be set, but not both."
        );
        assert_eq!(
            config_error(exactly_one_of::<i32, i32>("A", None, "B", None)),
            "One of 'A' or 'B' must be set."
        );
    }

    #[test]
    fn test_required_uses_fallback_chain() {
        let env = EnvSource::from_pairs([("CI_PROJECT_PATH", "fallback")]).unwrap();
        assert_eq!(
            env.required(&["PROJECT_PATH", "CI_PROJECT_PATH"]).unwrap(),
            "fallback"
        );
        let env =
            EnvSource::from_pairs([("PROJECT_PATH", "primary"), ("CI_PROJECT_PATH", "fallback")])
                .unwrap();
        assert_eq!(
            env.required(&["PROJECT_PATH", "CI_PROJECT_PATH"]).unwrap(),
            "primary"
        );
        let env = EnvSource::from_pairs(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(
            config_error(env.required(&["PROJECT_PATH", "CI_PROJECT_PATH"])),
            "Please set the environment variable 'PROJECT_PATH'"
        );
    }

    #[test]
    fn test_request_config_cloud_defaults() {
        let config =
            RequestCertificateConfig::from_env(&request_env(&[("CLOUD_API_KEY", "key")])).unwrap();
        assert_eq!(
            config.credentials,
            Credentials::Cloud {
                api_key: "key".to_string()
            }
        );
        assert_eq!(config.key_type, KeyType::Rsa);
        assert_eq!(config.expiration_window, 0);
        assert!(config.dns_names.is_empty());
        assert_eq!(config.cert_output, PathBuf::from("cert.pem"));
    }

    #[test]
    fn test_request_config_tpp() {
        let config = RequestCertificateConfig::from_env(&request_env(&[
            ("TPP_BASE_URL", "https://tpp.example.com"),
            ("TPP_USERNAME", "admin"),
            ("TPP_PASSWORD_BASE64", "c2VjcmV0"),
            ("KEY_TYPE", "ECDSA"),
            ("EXPIRATION_WINDOW", "72"),
            ("DNS_NAMES", "a.example.com,b.example.com"),
            ("IP_ADDRESSES", "10.0.0.1 10.0.0.2"),
            ("ORGANIZATION", "Fullstaq"),
        ]))
        .unwrap();
        assert_eq!(
            config.credentials,
            Credentials::Tpp {
                base_url: "https://tpp.example.com".to_string(),
                username: "admin".to_string(),
                password: "secret".to_string(),
            }
        );
        assert_eq!(config.key_type, KeyType::Ecdsa);
        assert_eq!(config.expiration_window, 72);
        assert_eq!(config.dns_names, vec!["a.example.com", "b.example.com"]);
        assert_eq!(config.ip_addresses, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(config.organization.as_deref(), Some("Fullstaq"));
        assert!(!format!("{:?}", config).contains("secret"));
    }

    #[test]
    fn test_request_config_rejects_both_endpoints() {
        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[
            ("TPP_BASE_URL", "https://tpp.example.com"),
            ("CLOUD_API_KEY", "key"),
        ])));
        assert!(err.contains("'TPP_BASE_URL'"));
        assert!(err.contains("'CLOUD_API_KEY'"));
        assert!(err.contains("not both"));
    }

    #[test]
    fn test_request_config_rejects_no_endpoint() {
        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[])));
        assert_eq!(err, "One of 'TPP_BASE_URL' or 'CLOUD_API_KEY' must be set.");
    }

    #[test]
    fn test_request_config_tpp_requires_username_and_one_password() {
        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[
            ("TPP_BASE_URL", "https://tpp.example.com"),
            ("TPP_PASSWORD", "secret"),
        ])));
        assert_eq!(err, "'TPP_USERNAME' must be set.");

        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[
            ("TPP_BASE_URL", "https://tpp.example.com"),
            ("TPP_USERNAME", "admin"),
            ("TPP_PASSWORD", "secret"),
            ("TPP_PASSWORD_BASE64", "c2VjcmV0"),
        ])));
        assert!(err.contains("not both"));

        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[
            ("TPP_BASE_URL", "https://tpp.example.com"),
            ("TPP_USERNAME", "admin"),
            ("TPP_PASSWORD_BASE64", "!!not base64!!"),
        ])));
        assert!(err.contains("TPP_PASSWORD_BASE64"));
    }

    #[test]
    fn test_request_config_rejects_bad_key_type() {
        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[
            ("CLOUD_API_KEY", "key"),
            ("KEY_TYPE", "DSA"),
        ])));
        assert_eq!(err, "'KEY_TYPE' may only be 'RSA' or 'ECDSA'.");
    }

    #[test]
    fn test_request_config_rejects_negative_window() {
        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[
            ("CLOUD_API_KEY", "key"),
            ("EXPIRATION_WINDOW", "-1"),
        ])));
        assert_eq!(err, "'EXPIRATION_WINDOW' may not be negative.");

        let err = config_error(RequestCertificateConfig::from_env(&request_env(&[
            ("CLOUD_API_KEY", "key"),
            ("EXPIRATION_WINDOW", "soon"),
        ])));
        assert_eq!(err, "'EXPIRATION_WINDOW' must be an integer.");
    }

    #[test]
    fn test_request_config_missing_required() {
        let env = EnvSource::from_pairs([("CLOUD_API_KEY", "key")]).unwrap();
        let err = config_error(RequestCertificateConfig::from_env(&env));
        assert_eq!(err, "Please set the environment variable 'ZONE_CONFIG_NAME'");
    }

    #[test]
    fn test_download_config_bearer_token() {
        let config =
            DownloadPrevCertConfig::from_env(&download_env(&[("GITLAB_BEARER_TOKEN", "glpat")]))
                .unwrap();
        assert_eq!(config.gitlab_api_v4_url, "https://gitlab.example.com/api/v4");
        assert_eq!(config.project_path, "group/project");
        assert_eq!(config.branch_name, "main");
        assert_eq!(config.auth, GitlabAuth::Bearer("glpat".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_download_config_job_token() {
        let config = DownloadPrevCertConfig::from_env(&download_env(&[
            ("USE_CI_JOB_TOKEN", "true"),
            ("CI_JOB_TOKEN", "job-token"),
            ("DOWNLOAD_TIMEOUT", "5"),
        ]))
        .unwrap();
        assert_eq!(config.auth, GitlabAuth::JobToken("job-token".to_string()));
        assert_eq!(config.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_download_config_job_token_requires_ambient_token() {
        let err = config_error(DownloadPrevCertConfig::from_env(&download_env(&[(
            "USE_CI_JOB_TOKEN",
            "yes",
        )])));
        assert!(err.contains("CI_JOB_TOKEN must be set"));
    }

    #[test]
    fn test_download_config_auth_is_exclusive() {
        let err = config_error(DownloadPrevCertConfig::from_env(&download_env(&[
            ("USE_CI_JOB_TOKEN", "1"),
            ("CI_JOB_TOKEN", "job-token"),
            ("GITLAB_BEARER_TOKEN", "glpat"),
        ])));
        assert!(err.contains("not both"));

        // a disabled flag does not count as a choice
        let err = config_error(DownloadPrevCertConfig::from_env(&download_env(&[(
            "USE_CI_JOB_TOKEN",
            "false",
        )])));
        assert_eq!(
            err,
            "One of 'USE_CI_JOB_TOKEN' or 'GITLAB_BEARER_TOKEN' must be set."
        );
    }
}
