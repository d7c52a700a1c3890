use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::Result;
use crate::error::AppError;

/// Outcome of checking a previously issued certificate against the
/// configured expiration window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// Window is 0; every run requests a certificate.
    WindowDisabled,
    /// Window is configured but there is no previous certificate.
    NoPreviousCertificate,
    WithinWindow { expires_at: DateTime<Utc> },
    NotWithinWindow { expires_at: DateTime<Utc> },
}

impl RenewalDecision {
    pub fn should_renew(&self) -> bool {
        !matches!(self, RenewalDecision::NotWithinWindow { .. })
    }
}

pub fn decide(
    window_hours: u32,
    previous_expiry: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> RenewalDecision {
    if window_hours == 0 {
        return RenewalDecision::WindowDisabled;
    }
    match previous_expiry {
        None => RenewalDecision::NoPreviousCertificate,
        Some(expires_at) => {
            // a threshold before the earliest representable time is always passed
            let threshold =
                expires_at.checked_sub_signed(Duration::hours(i64::from(window_hours)));
            if threshold.is_none_or(|threshold| now > threshold) {
                RenewalDecision::WithinWindow { expires_at }
            } else {
                RenewalDecision::NotWithinWindow { expires_at }
            }
        }
    }
}

/// Logs the decision the way the request command reports it.
pub fn log_decision(decision: &RenewalDecision, window_hours: u32, cert_path: &Path) {
    match decision {
        RenewalDecision::WindowDisabled => {}
        RenewalDecision::NoPreviousCertificate => warn!(
            "An expiration window is configured, but the previous certificate ({}) does not exist. Will proceed with requesting a new certificate.",
            cert_path.display()
        ),
        RenewalDecision::WithinWindow { expires_at } => info!(
            "Previous certificate's expiry time ({}) is within the expiration window of {} hours. Will proceed with requesting a certificate.",
            expires_at, window_hours
        ),
        RenewalDecision::NotWithinWindow { expires_at } => warn!(
            "Previous certificate's expiry time ({}) is not within the expiration window of {} hours. Not requesting a certificate.",
            expires_at, window_hours
        ),
    }
}

/// Reads the not-valid-after time of the certificate at `path`.
///
/// Returns `Ok(None)` when the file does not exist. A file that exists but
/// does not hold a PEM X.509 certificate is an error.
pub fn previous_certificate_expiry(path: &Path) -> Result<Option<DateTime<Utc>>> {
    if !path.exists() {
        return Ok(None);
    }

    let data = std::fs::read(path)?;
    let expires_at = parse_not_after(&data).map_err(|e| {
        AppError::CertificateError(format!(
            "Error loading previous certificate ({}): {}",
            path.display(),
            e
        ))
    })?;
    Ok(Some(expires_at))
}

fn parse_not_after(data: &[u8]) -> std::result::Result<DateTime<Utc>, String> {
    let pem = pem::parse(data).map_err(|e| e.to_string())?;
    let (_, cert) = x509_parser::parse_x509_certificate(pem.contents())
        .map_err(|e| format!("invalid X509 certificate: {}", e))?;
    let not_after = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(not_after, 0)
        .ok_or_else(|| format!("expiry time out of range: {}", not_after))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rcgen::{CertificateParams, KeyPair};
    use tempfile::tempdir;

    fn self_signed_pem(year: i32, month: u8, day: u8) -> String {
        let key_pair = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["prev.example.com".to_string()]).unwrap();
        params.not_before = rcgen::date_time_ymd(2020, 1, 1);
        params.not_after = rcgen::date_time_ymd(year, month, day);
        params.self_signed(&key_pair).unwrap().pem()
    }

    #[test]
    fn test_window_disabled_always_renews() {
        let now = Utc::now();
        for expiry in [None, Some(now + Duration::days(3650)), Some(now - Duration::days(1))] {
            let decision = decide(0, expiry, now);
            assert_eq!(decision, RenewalDecision::WindowDisabled);
            assert!(decision.should_renew());
        }
    }

    #[test]
    fn test_no_previous_certificate_renews() {
        let decision = decide(72, None, Utc::now());
        assert_eq!(decision, RenewalDecision::NoPreviousCertificate);
        assert!(decision.should_renew());
    }

    #[test]
    fn test_expiry_inside_window_renews() {
        let now = Utc::now();
        let expires_at = now + Duration::hours(48);
        assert_eq!(
            decide(72, Some(expires_at), now),
            RenewalDecision::WithinWindow { expires_at }
        );
    }

    #[test]
    fn test_expiry_outside_window_skips() {
        let now = Utc::now();
        let expires_at = now + Duration::hours(100);
        let decision = decide(72, Some(expires_at), now);
        assert_eq!(decision, RenewalDecision::NotWithinWindow { expires_at });
        assert!(!decision.should_renew());
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let expires_at = now + Duration::hours(24);
        assert!(!decide(24, Some(expires_at), now).should_renew());
        assert!(decide(24, Some(expires_at), now + Duration::seconds(1)).should_renew());
        assert!(decide(25, Some(expires_at), now).should_renew());
    }

    #[test]
    fn test_huge_window_renews_without_overflow() {
        let now = Utc::now();
        let expires_at = now + Duration::hours(100);
        assert_eq!(
            decide(u32::MAX, Some(expires_at), now),
            RenewalDecision::WithinWindow { expires_at }
        );
        assert!(decide(3_000_000_000, Some(expires_at), now).should_renew());
    }

    #[test]
    fn test_expired_certificate_renews() {
        let now = Utc::now();
        assert!(decide(1, Some(now - Duration::hours(5)), now).should_renew());
    }

    #[test]
    fn test_previous_certificate_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        assert_eq!(previous_certificate_expiry(&path).unwrap(), None);
    }

    #[test]
    fn test_previous_certificate_expiry_is_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        std::fs::write(&path, self_signed_pem(2031, 6, 15)).unwrap();

        let expires_at = previous_certificate_expiry(&path).unwrap().unwrap();
        assert_eq!(
            expires_at,
            Utc.with_ymd_and_hms(2031, 6, 15, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_previous_certificate_malformed_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cert.pem");
        std::fs::write(&path, "not a certificate").unwrap();
        assert!(matches!(
            previous_certificate_expiry(&path),
            Err(AppError::CertificateError(_))
        ));

        std::fs::write(
            &path,
            "-----BEGIN CERTIFICATE-----\naGVsbG8gd29ybGQ=\n-----END CERTIFICATE-----\n",
        )
        .unwrap();
        assert!(matches!(
            previous_certificate_expiry(&path),
            Err(AppError::CertificateError(_))
        ));
    }
}
