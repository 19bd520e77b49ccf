//! Error types for the certificate checker.
//!
//! Every failure that happens before a certificate can be evaluated ends the
//! run. The variants are grouped into four kinds (see [`ErrorKind`]) and all
//! of them are reported to the monitoring scheduler as UNKNOWN.

use std::fmt;
use std::io;

use serde::Serialize;

use crate::config::ConfigError;
use crate::report::UNKNOWN_EXIT_CODE;

/// Coarse classification of a [`ProbeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Supplied configuration was rejected before touching the network
    Config,
    /// TCP connection could not be established
    Connectivity,
    /// TLS handshake failed or no peer certificate was presented
    Tls,
    /// Certificate fields were malformed or missing
    CertificateParse,
}

/// Error returned when a run cannot produce an evaluation.
#[derive(Debug)]
pub enum ProbeError {
    /// Configuration could not be loaded or validated
    Config(ConfigError),

    /// DNS resolution failed for the given hostname
    DnsResolution {
        /// The hostname that failed to resolve
        hostname: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The address (host:port) that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// Connect or handshake did not finish within the configured timeout
    Timeout {
        /// Description of which operation timed out
        operation: String,
    },

    /// TLS handshake failed
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// Handshake succeeded but the peer sent no certificate
    CertificateMissing,

    /// Certificate fields could not be parsed
    CertificateParse {
        /// Description of what went wrong
        reason: String,
    },

    /// OpenSSL error while setting up the TLS context
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },
}

impl ProbeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::DnsResolution { .. } | Self::ConnectionFailed { .. } | Self::Timeout { .. } => {
                ErrorKind::Connectivity
            }
            Self::HandshakeFailed { .. } | Self::CertificateMissing | Self::OpenSSLError { .. } => {
                ErrorKind::Tls
            }
            Self::CertificateParse { .. } => ErrorKind::CertificateParse,
        }
    }

    /// Exit code reported to the scheduler. Operational failures are never
    /// folded into WARNING or CRITICAL.
    pub fn exit_code(&self) -> i32 {
        UNKNOWN_EXIT_CODE
    }

    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::CertificateParse {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e),
            Self::DnsResolution { hostname, source } => {
                write!(f, "Failed to resolve hostname {}: {}", hostname, source)
            }
            Self::ConnectionFailed { address, source } => {
                write!(f, "Connection failed to {}: {}", address, source)
            }
            Self::Timeout { operation } => write!(f, "Operation timed out: {}", operation),
            Self::HandshakeFailed { details } => write!(f, "TLS handshake failed: {}", details),
            Self::CertificateMissing => write!(f, "Peer presented no certificate"),
            Self::CertificateParse { reason } => write!(f, "Certificate error: {}", reason),
            Self::OpenSSLError { details } => write!(f, "OpenSSL error: {}", details),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for ProbeError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<openssl::error::ErrorStack> for ProbeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

impl<S> From<openssl::ssl::HandshakeError<S>> for ProbeError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        use openssl::ssl::HandshakeError;

        match e {
            // A blocking socket with a read timeout surfaces as WANT_READ.
            HandshakeError::WouldBlock(_) => Self::Timeout {
                operation: "TLS handshake".to_string(),
            },
            HandshakeError::Failure(mid) => {
                let timed_out = mid.error().io_error().is_some_and(|io| {
                    matches!(io.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
                });
                if timed_out {
                    return Self::Timeout {
                        operation: "TLS handshake".to_string(),
                    };
                }
                let mut details = mid.error().to_string();
                let verify = mid.ssl().verify_result();
                if verify.as_raw() != 0 {
                    details = format!("{} ({})", details, verify.error_string());
                }
                Self::HandshakeFailed { details }
            }
            HandshakeError::SetupFailure(stack) => stack.into(),
        }
    }
}
