//! Day-threshold policy for the certificate validity window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

use crate::certificate::CertificateInfo;
use crate::report::Severity;

pub const DEFAULT_CRIT_DAYS: i64 = 5;
pub const DEFAULT_WARN_DAYS: i64 = 15;

/// Day thresholds. Each is compared with a strict `<`, so a certificate
/// with exactly `crit_days` left is not critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub warn_days: i64,
    pub crit_days: i64,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy {
            warn_days: DEFAULT_WARN_DAYS,
            crit_days: DEFAULT_CRIT_DAYS,
        }
    }
}

/// Which rule matched, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryState {
    #[strum(to_string = "cert is not valid yet")]
    NotYetValid,
    #[strum(to_string = "expired")]
    Expired,
    #[strum(to_string = "expire critical")]
    Critical,
    #[strum(to_string = "expire warning")]
    Warning,
    #[strum(to_string = "expire OK")]
    Ok,
}

impl ExpiryState {
    pub fn severity(self) -> Severity {
        match self {
            ExpiryState::NotYetValid | ExpiryState::Expired | ExpiryState::Critical => {
                Severity::Critical
            }
            ExpiryState::Warning => Severity::Warning,
            ExpiryState::Ok => Severity::Ok,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryStatus {
    pub state: ExpiryState,
    pub days_remaining: i64,
}

impl ExpiryStatus {
    pub fn severity(&self) -> Severity {
        self.state.severity()
    }

    /// Status fragment followed by the remaining-days annotation.
    pub fn fragments(&self) -> Vec<String> {
        vec![self.state.to_string(), format!(" {}d", self.days_remaining)]
    }
}

impl ThresholdPolicy {
    pub fn new(warn_days: i64, crit_days: i64) -> Self {
        ThresholdPolicy {
            warn_days,
            crit_days,
        }
    }

    pub fn evaluate(&self, cert: &CertificateInfo, now: DateTime<Utc>) -> ExpiryStatus {
        let days_remaining = cert.days_remaining(now);
        let state = if now < cert.not_before {
            ExpiryState::NotYetValid
        } else if days_remaining < 0 {
            ExpiryState::Expired
        } else if days_remaining < self.crit_days {
            ExpiryState::Critical
        } else if days_remaining < self.warn_days {
            ExpiryState::Warning
        } else {
            ExpiryState::Ok
        };
        ExpiryStatus {
            state,
            days_remaining,
        }
    }
}
