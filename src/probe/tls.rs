//! TLS certificate inspection.
//!
//! Chain-of-trust verification is off unless `verify_chain_of_trust` is
//! set: the checker looks at expiry and hostname on its own, so a site
//! with a private CA is still checked for liveness.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use url::Url;
use x509_parser::parse_x509_certificate;
use x509_parser::prelude::*;

use super::error_chain;
use crate::config::MonitorConfig;
use crate::registry::Target;

const DEFAULT_TLS_PORT: u16 = 443;

/// Certificate check failures.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CertError {
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("no certificate found")]
    NoCertificate,
    #[error("certificate has expired (not after {not_after})")]
    Expired { not_after: DateTime<Utc> },
    #[error("certificate is not valid for the domain {host} (names: {names:?})")]
    HostnameMismatch { host: String, names: Vec<String> },
    #[error("failed to parse certificate: {0}")]
    Parse(String),
}

/// Facts about a leaf certificate that passed the checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReport {
    pub not_after: DateTime<Utc>,
    pub names: Vec<String>,
    /// Set when the certificate expires within the warning window
    pub warning: Option<String>,
}

/// Flattened result of one certificate check.
#[derive(Debug, Clone)]
pub struct CertStatus {
    pub valid: bool,
    pub message: String,
    pub warning: Option<String>,
    pub not_after: Option<DateTime<Utc>>,
    pub error: Option<CertError>,
}

impl From<Result<CertReport, CertError>> for CertStatus {
    fn from(result: Result<CertReport, CertError>) -> Self {
        match result {
            Ok(report) => Self {
                valid: true,
                message: "certificate is valid".to_string(),
                warning: report.warning,
                not_after: Some(report.not_after),
                error: None,
            },
            Err(err) => Self {
                valid: false,
                message: err.to_string(),
                warning: None,
                not_after: match &err {
                    CertError::Expired { not_after } => Some(*not_after),
                    _ => None,
                },
                error: Some(err),
            },
        }
    }
}

/// Opens a TLS connection to a target and evaluates its leaf certificate.
pub struct CertChecker {
    connector: TokioTlsConnector,
    timeout: Duration,
    expiry_warning: Duration,
}

impl CertChecker {
    pub fn new(config: &MonitorConfig) -> Result<Self, native_tls::Error> {
        let mut builder = native_tls::TlsConnector::builder();
        if !config.verify_chain_of_trust {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        let connector = builder.build()?;

        Ok(Self {
            connector: TokioTlsConnector::from(connector),
            timeout: config.client_timeout,
            expiry_warning: config.expiry_warning,
        })
    }

    /// Check the target's certificate. Never fails; problems land in the status.
    pub async fn check(&self, target: &Target) -> CertStatus {
        let result = self.inspect(target).await;

        match &result {
            Ok(report) => {
                if let Some(warning) = &report.warning {
                    tracing::warn!("Warning: {} {}", target.url, warning);
                }
            }
            Err(e) => tracing::debug!("Certificate check failed for {}: {}", target.url, e),
        }

        result.into()
    }

    /// Connect, fetch the leaf certificate and evaluate it.
    pub async fn inspect(&self, target: &Target) -> Result<CertReport, CertError> {
        let url = Url::parse(&target.url).map_err(|e| CertError::HandshakeFailed(e.to_string()))?;
        let host = target
            .host()
            .ok_or_else(|| CertError::HandshakeFailed("url has no host".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(DEFAULT_TLS_PORT);

        let der = timeout(self.timeout, self.fetch_leaf(&host, port))
            .await
            .map_err(|_| {
                CertError::HandshakeFailed(format!("timed out after {:?}", self.timeout))
            })??;

        evaluate_certificate(&der, &host, Utc::now(), self.expiry_warning)
    }

    async fn fetch_leaf(&self, host: &str, port: u16) -> Result<Vec<u8>, CertError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| CertError::HandshakeFailed(error_chain(&e)))?;

        let tls_stream = self
            .connector
            .connect(host, stream)
            .await
            .map_err(|e| CertError::HandshakeFailed(error_chain(&e)))?;

        let cert = tls_stream
            .get_ref()
            .peer_certificate()
            .map_err(|e| CertError::HandshakeFailed(error_chain(&e)))?
            .ok_or(CertError::NoCertificate)?;

        cert.to_der().map_err(|e| CertError::Parse(e.to_string()))
    }
}

/// Evaluate a DER-encoded leaf certificate for `host` at time `now`.
///
/// Checks, in order: expiry, the expiry warning window, then hostname.
pub fn evaluate_certificate(
    der: &[u8],
    host: &str,
    now: DateTime<Utc>,
    warn_within: Duration,
) -> Result<CertReport, CertError> {
    let (_, cert) = parse_x509_certificate(der).map_err(|e| CertError::Parse(format!("{:?}", e)))?;

    let not_after = DateTime::from_timestamp(cert.validity().not_after.timestamp(), 0)
        .ok_or_else(|| CertError::Parse("notAfter out of range".to_string()))?;

    if now > not_after {
        return Err(CertError::Expired { not_after });
    }

    let remaining = not_after - now;
    let warning = match remaining.to_std() {
        Ok(left) if left > warn_within => None,
        _ => Some(format!(
            "cert will expire in {} days ({})",
            remaining.num_days(),
            not_after.to_rfc3339()
        )),
    };

    let names = certificate_names(&cert);
    if !hostname_matches(host, &names) {
        return Err(CertError::HostnameMismatch {
            host: host.to_string(),
            names,
        });
    }

    Ok(CertReport {
        not_after,
        names,
        warning,
    })
}

/// SAN DNS names and IPs; the subject CN only when there is no SAN extension.
fn certificate_names(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut names = Vec::new();

    if let Ok(Some(san)) = cert.subject_alternative_name() {
        for name in &san.value.general_names {
            match name {
                GeneralName::DNSName(dns) => names.push(dns.to_string()),
                GeneralName::IPAddress(bytes) => {
                    if let Some(ip) = ip_from_bytes(bytes) {
                        names.push(ip.to_string());
                    }
                }
                _ => {}
            }
        }
        return names;
    }

    for cn in cert.subject().iter_common_name() {
        if let Ok(cn) = cn.as_str() {
            names.push(cn.to_string());
        }
    }
    names
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(|b| IpAddr::V4(Ipv4Addr::from(b))),
        16 => <[u8; 16]>::try_from(bytes).ok().map(|b| IpAddr::V6(Ipv6Addr::from(b))),
        _ => None,
    }
}

/// Match a host against certificate names, allowing single-label wildcards.
pub fn hostname_matches(host: &str, names: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();

    if let Ok(ip) = host.parse::<IpAddr>() {
        return names
            .iter()
            .any(|name| name.parse::<IpAddr>().is_ok_and(|n| n == ip));
    }

    names.iter().any(|name| {
        let name = name.trim_end_matches('.').to_ascii_lowercase();
        match name.strip_prefix("*.") {
            Some(suffix) => host
                .split_once('.')
                .is_some_and(|(label, rest)| !label.is_empty() && rest == suffix),
            None => name == host,
        }
    })
}
