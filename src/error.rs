use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    ConfigError(String),

    #[error("Certificate Authority Error: {0}")]
    AuthorityError(String),

    #[error("HTTP Error: {0}")]
    HttpError(String),

    #[error("Certificate Error: {0}")]
    CertificateError(String),

    #[error("JSON Error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Timeout retrieving certificate")]
    RetrievalTimeout,

    #[error("Artifact not found")]
    ArtifactNotFound,

    #[error("Aborted: {0}")]
    Abort(String),
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::ArtifactNotFound => 30,
            _ => 1,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::HttpError(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<rcgen::Error> for AppError {
    fn from(err: rcgen::Error) -> Self {
        AppError::CertificateError(err.to_string())
    }
}

impl From<pem::PemError> for AppError {
    fn from(err: pem::PemError) -> Self {
        AppError::CertificateError(err.to_string())
    }
}

impl From<base64::DecodeError> for AppError {
    fn from(err: base64::DecodeError) -> Self {
        AppError::AuthorityError(err.to_string())
    }
}
