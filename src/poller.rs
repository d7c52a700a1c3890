use std::future::Future;

use tokio::time::{Duration, Instant, sleep};
use tracing::debug;

use crate::Result;
use crate::authority::{CertificateAuthority, IssuedCertificate};
use crate::error::AppError;

pub const RETRIEVAL_INTERVAL: Duration = Duration::from_secs(1);
pub const RETRIEVAL_TIMEOUT: Duration = Duration::from_secs(300);

/// Fixed-interval poll with a deadline on the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalPoller {
    interval: Duration,
    timeout: Duration,
}

impl Default for RetrievalPoller {
    fn default() -> Self {
        RetrievalPoller::new(RETRIEVAL_INTERVAL, RETRIEVAL_TIMEOUT)
    }
}

impl RetrievalPoller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        RetrievalPoller { interval, timeout }
    }

    pub async fn retrieve(
        &self,
        authority: &dyn CertificateAuthority,
        pickup_id: &str,
    ) -> Result<IssuedCertificate> {
        self.poll(move || async move {
            let cert = authority.retrieve_certificate(pickup_id).await?;
            Ok(cert.filter(|c| !c.cert.is_empty()))
        })
        .await
    }

    /// Runs `attempt` until it yields a value or the timeout elapses.
    /// Errors from `attempt` end the poll immediately.
    pub async fn poll<T, F, Fut>(&self, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut attempts = 0u32;
        while Instant::now() < deadline {
            attempts += 1;
            if let Some(value) = attempt().await? {
                return Ok(value);
            }
            debug!("Certificate not ready after attempt {}", attempts);
            sleep(self.interval).await;
        }

        Err(AppError::RetrievalTimeout)
    }
}
