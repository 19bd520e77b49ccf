//! Certificate health check for monitoring schedulers.
//!
//! One run connects to a TLS endpoint, extracts the peer certificate and
//! turns its validity window and identity into a [`Severity`] with a status
//! line and an exit code.
//!
//! ```no_run
//! use chrono::Utc;
//! use tlsprobe::config::Config;
//! use tlsprobe::{check, TlsProber};
//!
//! let config = Config {
//!     server: Some("example.com".to_string()),
//!     ..Config::defaults()
//! }
//! .validate()?;
//! let prober = TlsProber::from_config(&config);
//! let report = check(&prober, &config, Utc::now())?;
//! println!("{}", report.message);
//! # Ok::<(), tlsprobe::ProbeError>(())
//! ```

use chrono::{DateTime, Utc};

pub mod certificate;
pub mod config;
pub mod error;
pub mod expiry;
pub mod identity;
pub mod probe;
pub mod report;

#[cfg(test)]
mod test_util;

pub use certificate::CertificateInfo;
pub use config::CheckConfig;
pub use error::{ErrorKind, ProbeError};
pub use expiry::{ExpiryState, ExpiryStatus, ThresholdPolicy};
pub use identity::NameCheck;
pub use probe::{CertificateSource, ConnectionTarget, TlsProber};
pub use report::{
    render_failure, EvaluationResult, OutputFormat, Report, Severity, UNKNOWN_EXIT_CODE,
};

/// Runs the whole pipeline: fetch, extract, evaluate.
///
/// Any failure before evaluation is returned as is; nothing is evaluated
/// on a partial certificate.
pub fn check<S>(source: &S, config: &CheckConfig, now: DateTime<Utc>) -> Result<Report, ProbeError>
where
    S: CertificateSource + ?Sized,
{
    let certificate = source.peer_certificate(&config.target)?;
    let info = CertificateInfo::from_x509(&certificate)?;
    let evaluation = evaluate(
        &info,
        &config.policy,
        &config.expected_name,
        &config.target.host,
        now,
    );
    Ok(Report::new(&config.target, info, evaluation))
}

/// Pure evaluation of an extracted certificate.
pub fn evaluate(
    info: &CertificateInfo,
    policy: &ThresholdPolicy,
    expected_name: &str,
    host: &str,
    now: DateTime<Utc>,
) -> EvaluationResult {
    let expiry = policy.evaluate(info, now);
    let names = NameCheck::validate(expected_name, &info.candidate_names(), host);
    EvaluationResult::new(&expiry, &names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{build_certificate, ts};
    use openssl::x509::X509;

    const DAY: i64 = 86_400;
    const NOW: i64 = 1_750_000_000;

    struct StaticSource(X509);

    impl CertificateSource for StaticSource {
        fn peer_certificate(&self, _target: &ConnectionTarget) -> Result<X509, ProbeError> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl CertificateSource for FailingSource {
        fn peer_certificate(&self, target: &ConnectionTarget) -> Result<X509, ProbeError> {
            Err(ProbeError::Timeout {
                operation: format!("connect to {}", target.address()),
            })
        }
    }

    fn check_config(expected: &str) -> CheckConfig {
        config::Config {
            server: Some("example.com".to_string()),
            canonical: Some(expected.to_string()),
            ..config::Config::defaults()
        }
        .validate()
        .unwrap()
    }

    #[test]
    fn test_check_runs_full_pipeline() {
        let cert = build_certificate(
            Some("other.com"),
            &["example.com"],
            NOW - 30 * DAY,
            NOW + 3 * DAY,
        );
        let report = check(&StaticSource(cert), &check_config("example.com"), ts(NOW)).unwrap();

        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.exit_code, 2);
        assert_eq!(
            report.message,
            "expire critical 3d - CN OK in Host example.com(example.com)"
        );
    }

    #[test]
    fn test_check_propagates_source_errors() {
        let err = check(&FailingSource, &check_config("example.com"), ts(NOW)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert_eq!(err.exit_code(), UNKNOWN_EXIT_CODE);
    }

    #[test]
    fn test_check_rejects_corrupt_window() {
        let cert = build_certificate(Some("example.com"), &[], NOW + DAY, NOW - DAY);
        let err = check(&StaticSource(cert), &check_config("example.com"), ts(NOW)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CertificateParse);
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let info = CertificateInfo::new(
            ts(NOW - DAY),
            ts(NOW + 10 * DAY),
            Some("Example.com".to_string()),
            vec!["www.example.com".to_string()],
        )
        .unwrap();
        let policy = ThresholdPolicy::default();

        let first = evaluate(&info, &policy, "example.com", "example.com", ts(NOW));
        let second = evaluate(&info, &policy, "example.com", "example.com", ts(NOW));
        assert_eq!(first, second);
        assert_eq!(first.status_line(), second.status_line());
        assert_eq!(first.severity, Severity::Warning);
    }
}
