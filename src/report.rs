//! Aggregation of check outcomes into one status line and exit code.

use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::certificate::CertificateInfo;
use crate::error::{ErrorKind, ProbeError};
use crate::expiry::ExpiryStatus;
use crate::identity::NameCheck;
use crate::probe::ConnectionTarget;

/// Exit code for runs that never reached an evaluation.
pub const UNKNOWN_EXIT_CODE: i32 = 3;

/// Health classification. Ordered so that aggregation is a plain `max`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize,
)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Ok = 0,
    Warning = 1,
    Critical = 2,
}

impl Severity {
    pub fn exit_code(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Aggregate outcome of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    pub severity: Severity,
    pub days_remaining: i64,
    /// Expiry status, days annotation, then the name check fragment
    pub fragments: Vec<String>,
}

impl EvaluationResult {
    pub fn new(expiry: &ExpiryStatus, names: &NameCheck) -> Self {
        let mut fragments = expiry.fragments();
        fragments.extend(names.fragment());
        EvaluationResult {
            severity: expiry.severity().max(names.severity()),
            days_remaining: expiry.days_remaining,
            fragments,
        }
    }

    pub fn status_line(&self) -> String {
        self.fragments.concat()
    }

    pub fn exit_code(&self) -> i32 {
        self.severity.exit_code()
    }
}

/// Everything known about one run, as printed in JSON mode.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub host: String,
    pub port: u16,
    pub severity: Severity,
    pub exit_code: i32,
    pub message: String,
    pub days_remaining: i64,
    pub fragments: Vec<String>,
    pub certificate: CertificateInfo,
}

impl Report {
    pub fn new(
        target: &ConnectionTarget,
        certificate: CertificateInfo,
        evaluation: EvaluationResult,
    ) -> Self {
        Report {
            host: target.host.clone(),
            port: target.port,
            severity: evaluation.severity,
            exit_code: evaluation.exit_code(),
            message: evaluation.status_line(),
            days_remaining: evaluation.days_remaining,
            fragments: evaluation.fragments,
            certificate,
        }
    }

    pub fn render(&self, format: OutputFormat) -> String {
        match format {
            OutputFormat::Text => self.message.clone(),
            OutputFormat::Json => serde_json::to_string(self).unwrap_or_else(|e| {
                format!(
                    "{} (JSON serialization failed: {})",
                    self.message, e
                )
            }),
        }
    }
}

/// Status line for a run that ended before evaluation.
pub fn render_failure(error: &ProbeError, format: OutputFormat) -> String {
    #[derive(Serialize)]
    struct Failure<'a> {
        severity: &'a str,
        exit_code: i32,
        kind: ErrorKind,
        message: String,
    }

    let message = error.to_string();
    match format {
        OutputFormat::Text => format!("UNKNOWN - {}", message),
        OutputFormat::Json => {
            let failure = Failure {
                severity: "UNKNOWN",
                exit_code: error.exit_code(),
                kind: error.kind(),
                message,
            };
            serde_json::to_string(&failure)
                .unwrap_or_else(|e| format!("UNKNOWN - {} (JSON serialization failed: {})", error, e))
        }
    }
}
