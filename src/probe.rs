//! TCP connect and TLS handshake against the monitored endpoint.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::debug;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::{X509StoreContextRef, X509};
use serde::Serialize;

use crate::config::CheckConfig;
use crate::error::ProbeError;

/// Default bound on connect and handshake, in seconds.
pub const DEFAULT_TIMEOUT: u64 = 10;

const X509_V_ERR_CERT_NOT_YET_VALID: i32 = 9;
const X509_V_ERR_CERT_HAS_EXPIRED: i32 = 10;

/// Endpoint to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionTarget {
    pub host: String,
    pub port: u16,
    /// Server name sent in the handshake, usually the host itself
    pub sni_name: String,
}

impl ConnectionTarget {
    pub fn new(host: &str, port: u16) -> Self {
        ConnectionTarget {
            host: host.to_string(),
            port,
            sni_name: host.to_string(),
        }
    }

    pub fn with_sni(mut self, sni_name: &str) -> Self {
        self.sni_name = sni_name.to_string();
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Something that can establish a TLS session and hand back the peer's
/// leaf certificate.
pub trait CertificateSource {
    fn peer_certificate(&self, target: &ConnectionTarget) -> Result<X509, ProbeError>;
}

/// [`CertificateSource`] backed by a blocking OpenSSL client.
///
/// `timeout` bounds the whole run, connect and handshake together, however
/// many addresses the host resolves to and however slowly the peer talks.
#[derive(Debug, Clone)]
pub struct TlsProber {
    timeout: Duration,
    verify: bool,
    ca_file: Option<PathBuf>,
}

impl Default for TlsProber {
    fn default() -> Self {
        TlsProber::new(Duration::from_secs(DEFAULT_TIMEOUT), true)
    }
}

impl TlsProber {
    /// `verify` enables chain validation against the system trust store.
    /// An expired or not-yet-valid leaf is still accepted so that its
    /// validity window can be evaluated and reported; the rest of the chain
    /// must be valid.
    pub fn new(timeout: Duration, verify: bool) -> Self {
        TlsProber {
            timeout,
            verify,
            ca_file: None,
        }
    }

    pub fn from_config(config: &CheckConfig) -> Self {
        let prober = TlsProber::new(config.timeout, config.verify);
        match &config.ca_file {
            Some(path) => prober.with_ca_file(path),
            None => prober,
        }
    }

    /// Trusts the PEM certificates in `path` in addition to the system store.
    pub fn with_ca_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.ca_file = Some(path.as_ref().to_path_buf());
        self
    }

    fn connector(&self) -> Result<SslConnector, ProbeError> {
        let mut builder = SslConnector::builder(SslMethod::tls())?;
        if self.verify {
            if let Some(path) = &self.ca_file {
                builder.set_ca_file(path)?;
            }
            builder.set_verify_callback(SslVerifyMode::PEER, tolerate_leaf_validity_window);
        } else {
            builder.set_verify(SslVerifyMode::NONE);
        }
        Ok(builder.build())
    }

    fn connect(&self, target: &ConnectionTarget, deadline: Instant) -> Result<TcpStream, ProbeError> {
        let address = target.address();
        let addrs: Vec<SocketAddr> = (target.host.as_str(), target.port)
            .to_socket_addrs()
            .map_err(|source| ProbeError::DnsResolution {
                hostname: target.host.clone(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ProbeError::DnsResolution {
                hostname: target.host.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            });
        }
        debug!("{} resolved to {:?}", target.host, addrs);

        let mut last_error = None;
        for addr in addrs {
            let remaining = match remaining(deadline) {
                Some(remaining) => remaining,
                None => {
                    last_error = Some(deadline_exceeded());
                    break;
                }
            };
            debug!("connecting to {} (timeout {:?})", addr, remaining);
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        let source = last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no address tried"));
        if matches!(source.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) {
            Err(ProbeError::Timeout {
                operation: format!("connect to {}", address),
            })
        } else {
            Err(ProbeError::ConnectionFailed { address, source })
        }
    }
}

impl CertificateSource for TlsProber {
    fn peer_certificate(&self, target: &ConnectionTarget) -> Result<X509, ProbeError> {
        let deadline = Instant::now() + self.timeout;
        let connector = self.connector()?;
        let tcp_stream = self.connect(target, deadline)?;

        let mut config = connector.configure()?;
        // Identity is checked against the expected name after the handshake.
        config.set_verify_hostname(false);
        let mut stream = config.connect(
            &target.sni_name,
            DeadlineStream {
                inner: tcp_stream,
                deadline,
            },
        )?;
        debug!(
            "handshake with {} done using {} (sni {})",
            target.address(),
            stream.ssl().version_str(),
            target.sni_name
        );

        let certificate = stream
            .ssl()
            .peer_certificate()
            .ok_or(ProbeError::CertificateMissing)?;
        if let Err(e) = stream.shutdown() {
            debug!("TLS shutdown with {} failed: {}", target.address(), e);
        }
        Ok(certificate)
    }
}

/// TCP stream whose every read and write is cut off at a fixed deadline.
#[derive(Debug)]
struct DeadlineStream {
    inner: TcpStream,
    deadline: Instant,
}

impl DeadlineStream {
    fn remaining(&self) -> io::Result<Duration> {
        remaining(self.deadline).ok_or_else(deadline_exceeded)
    }
}

impl Read for DeadlineStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.set_read_timeout(Some(self.remaining()?))?;
        self.inner.read(buf).map_err(as_timeout)
    }
}

impl Write for DeadlineStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.set_write_timeout(Some(self.remaining()?))?;
        self.inner.write(buf).map_err(as_timeout)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn remaining(deadline: Instant) -> Option<Duration> {
    deadline
        .checked_duration_since(Instant::now())
        .filter(|left| !left.is_zero())
}

fn deadline_exceeded() -> io::Error {
    io::Error::new(io::ErrorKind::TimedOut, "deadline exceeded")
}

// A socket timeout reports WouldBlock, which OpenSSL would treat as retryable.
fn as_timeout(e: io::Error) -> io::Error {
    if e.kind() == io::ErrorKind::WouldBlock {
        deadline_exceeded()
    } else {
        e
    }
}

fn tolerate_leaf_validity_window(preverified: bool, ctx: &mut X509StoreContextRef) -> bool {
    preverified
        || (ctx.error_depth() == 0
            && matches!(
                ctx.error().as_raw(),
                X509_V_ERR_CERT_NOT_YET_VALID | X509_V_ERR_CERT_HAS_EXPIRED
            ))
}
