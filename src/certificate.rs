use chrono::{DateTime, TimeZone, Utc};
use log::debug;
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::nid::Nid;
use openssl::x509::{X509NameRef, X509Ref};
use serde::Serialize;

use crate::error::ProbeError;

const SECONDS_PER_DAY: i64 = 86_400;

/// Fields of the peer certificate that the checks look at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CertificateInfo {
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub common_name: Option<String>,
    /// DNS entries of the subjectAltName extension, in certificate order
    pub subject_alt_names: Vec<String>,
    pub issuer: Option<String>,
}

impl CertificateInfo {
    /// Builds a record, rejecting a validity window that ends before it starts.
    pub fn new(
        not_before: DateTime<Utc>,
        not_after: DateTime<Utc>,
        common_name: Option<String>,
        subject_alt_names: Vec<String>,
    ) -> Result<Self, ProbeError> {
        if not_before > not_after {
            return Err(ProbeError::parse(format!(
                "notBefore {} is after notAfter {}",
                not_before.to_rfc3339(),
                not_after.to_rfc3339()
            )));
        }
        Ok(CertificateInfo {
            not_before,
            not_after,
            common_name,
            subject_alt_names,
            issuer: None,
        })
    }

    pub fn from_x509(cert: &X509Ref) -> Result<Self, ProbeError> {
        let not_before = asn1_to_utc(cert.not_before())
            .map_err(|e| ProbeError::parse(format!("invalid notBefore: {}", e)))?;
        let not_after = asn1_to_utc(cert.not_after())
            .map_err(|e| ProbeError::parse(format!("invalid notAfter: {}", e)))?;

        let subject_alt_names = cert
            .subject_alt_names()
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| name.dnsname())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let mut info = CertificateInfo::new(
            not_before,
            not_after,
            common_name(cert.subject_name()),
            subject_alt_names,
        )?;
        info.issuer = common_name(cert.issuer_name());
        debug!(
            "certificate valid {} .. {}, names {:?}",
            info.not_before,
            info.not_after,
            info.candidate_names()
        );
        Ok(info)
    }

    /// Common name first, then every SAN not seen yet.
    pub fn candidate_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.common_name.iter().cloned().collect();
        for san in &self.subject_alt_names {
            if !names.contains(san) {
                names.push(san.clone());
            }
        }
        names
    }

    /// Whole days until `not_after`, rounded down. Negative once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY)
    }
}

fn common_name(name: &X509NameRef) -> Option<String> {
    name.entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| entry.data().as_utf8().ok())
        .map(|cn| cn.to_string())
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, String> {
    let epoch = Asn1Time::from_unix(0).map_err(|e| e.to_string())?;
    let diff = epoch.diff(time).map_err(|e| e.to_string())?;
    let secs = i64::from(diff.days) * SECONDS_PER_DAY + i64::from(diff.secs);
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| format!("{} is out of range", time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{build_certificate, ts};

    #[test]
    fn test_from_x509_reads_window_and_names() {
        let cert = build_certificate(
            Some("example.com"),
            &["www.example.com", "example.com", "api.example.com"],
            1_700_000_000,
            1_700_000_000 + 90 * SECONDS_PER_DAY,
        );

        let info = CertificateInfo::from_x509(&cert).unwrap();
        assert_eq!(info.not_before, ts(1_700_000_000));
        assert_eq!(info.not_after, ts(1_700_000_000 + 90 * SECONDS_PER_DAY));
        assert_eq!(info.common_name.as_deref(), Some("example.com"));
        assert_eq!(info.issuer.as_deref(), Some("example.com"));
        assert_eq!(
            info.candidate_names(),
            vec!["example.com", "www.example.com", "api.example.com"]
        );
    }

    #[test]
    fn test_from_x509_without_common_name() {
        let cert = build_certificate(None, &["b.example", "a.example", "b.example"], 0, 86_400);

        let info = CertificateInfo::from_x509(&cert).unwrap();
        assert_eq!(info.common_name, None);
        assert_eq!(info.candidate_names(), vec!["b.example", "a.example"]);
    }

    #[test]
    fn test_from_x509_without_names() {
        let cert = build_certificate(None, &[], 0, 86_400);

        let info = CertificateInfo::from_x509(&cert).unwrap();
        assert!(info.candidate_names().is_empty());
    }

    #[test]
    fn test_inverted_window_is_a_parse_error() {
        let cert = build_certificate(Some("example.com"), &[], 1_700_000_000, 1_600_000_000);

        let err = CertificateInfo::from_x509(&cert).unwrap_err();
        assert!(matches!(err, ProbeError::CertificateParse { .. }));
    }

    #[test]
    fn test_days_remaining_rounds_down() {
        let info = CertificateInfo::new(ts(0), ts(10 * SECONDS_PER_DAY), None, vec![]).unwrap();

        assert_eq!(info.days_remaining(ts(0)), 10);
        assert_eq!(info.days_remaining(ts(1)), 9);
        assert_eq!(info.days_remaining(ts(10 * SECONDS_PER_DAY)), 0);
        assert_eq!(info.days_remaining(ts(10 * SECONDS_PER_DAY + 1)), -1);
        assert_eq!(info.days_remaining(ts(12 * SECONDS_PER_DAY)), -2);
    }
}
