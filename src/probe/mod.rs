//! Probe module for website monitoring.
//!
//! One probe is an HTTP GET followed by a TLS certificate inspection.
//! Every failure is captured in the returned [`ProbeResult`]; nothing in
//! here aborts the monitor.

mod http;
mod tls;

pub use http::*;
pub use tls::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::time::{Duration, Instant};

use crate::config::MonitorConfig;
use crate::registry::{Target, TargetId};

/// Status code reported when the HTTP request never produced a response.
pub const INTERNAL_ERROR_STATUS: u16 = 500;

const UP_MESSAGE: &str = "website is up!";

/// What went wrong during a probe, if anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeOutcome {
    Ok,
    TransportError(String),
    CertError(CertError),
}

/// The outcome of one probe against one target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target_id: TargetId,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Time until response headers arrived, or until the request failed
    pub response_time: Duration,
    /// Only meaningful when the outcome is not a transport error
    pub status_code: u16,
    pub message: String,
    pub tls_valid: bool,
    pub outcome: ProbeOutcome,
    /// Advisory note, e.g. a certificate close to expiry
    pub cert_warning: Option<String>,
}

impl ProbeResult {
    /// A successful 200 with a valid certificate.
    pub fn is_up(&self) -> bool {
        self.status_code == 200 && self.tls_valid
    }
}

/// Probe engine seam. The scheduler only knows about this trait.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &Target) -> ProbeResult;
}

/// Production prober: shared HTTP client plus certificate checker.
pub struct HttpsProber {
    client: reqwest::Client,
    certs: CertChecker,
    timeout: Duration,
}

impl HttpsProber {
    pub fn new(config: &MonitorConfig) -> Result<Self, crate::MonitorError> {
        Ok(Self {
            client: build_client(config)?,
            certs: CertChecker::new(config)?,
            timeout: config.client_timeout,
        })
    }
}

#[async_trait]
impl Prober for HttpsProber {
    async fn probe(&self, target: &Target) -> ProbeResult {
        let started_at = Utc::now();
        let start = Instant::now();
        let http = run_http_probe(&self.client, &target.url, self.timeout).await;
        let response_time = start.elapsed();

        let (mut status_code, mut message, mut outcome) = match http {
            Ok(status) => (status, UP_MESSAGE.to_string(), ProbeOutcome::Ok),
            Err(e) => {
                tracing::debug!("HTTP probe failed for {}: {}", target.url, e);
                let text = e.to_string();
                (INTERNAL_ERROR_STATUS, text.clone(), ProbeOutcome::TransportError(text))
            }
        };

        let mut tls_valid = false;
        let mut cert_warning = None;

        if is_https(&target.url) {
            let cert = self.certs.check(target).await;
            cert_warning = cert.warning;

            let http_ok = matches!(outcome, ProbeOutcome::Ok);
            match (cert.error, http_ok) {
                (None, true) => tls_valid = true,
                (None, false) => {}
                (Some(err), true) => {
                    status_code = INTERNAL_ERROR_STATUS;
                    message = err.to_string();
                    outcome = ProbeOutcome::CertError(err);
                }
                (Some(err), false) => {
                    let _ = write!(message, "; TLS: {}", err);
                }
            }
        } else {
            message.push_str(" (TLS not checked)");
        }

        ProbeResult {
            target_id: target.id,
            url: target.url.clone(),
            started_at,
            finished_at: Utc::now(),
            response_time,
            status_code,
            message,
            tls_valid,
            outcome,
            cert_warning,
        }
    }
}

fn is_https(url: &str) -> bool {
    url::Url::parse(url).is_ok_and(|u| u.scheme() == "https")
}

/// Flatten an error and its sources into one line.
pub(crate) fn error_chain(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = err.to_string();
    while let Some(src) = err.source() {
        let text = src.to_string();
        if !s.contains(&text) {
            let _ = write!(s, ": {}", text);
        }
        err = src;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_https_server, test_config};

    fn target(id: TargetId, url: &str) -> Target {
        Target {
            id,
            url: url.to_string(),
            interval: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_probe_healthy_server() {
        let server = spawn_https_server(Duration::ZERO).await;
        let prober = HttpsProber::new(&test_config()).unwrap();

        let result = prober.probe(&target(1, &server.url())).await;

        assert_eq!(result.status_code, 200);
        assert!(result.tls_valid, "unexpected failure: {}", result.message);
        assert_eq!(result.outcome, ProbeOutcome::Ok);
        assert_eq!(result.message, "website is up!");
        assert!(result.cert_warning.is_none());
        assert!(result.finished_at >= result.started_at);
        assert!(result.is_up());
    }

    #[tokio::test]
    async fn test_probe_unreachable_host_is_reported() {
        let prober = HttpsProber::new(&test_config()).unwrap();

        let result = prober.probe(&target(7, "https://127.0.0.1:1")).await;

        assert_eq!(result.target_id, 7);
        assert_eq!(result.status_code, INTERNAL_ERROR_STATUS);
        assert!(!result.tls_valid);
        assert!(!result.message.is_empty());
        assert!(matches!(result.outcome, ProbeOutcome::TransportError(_)));
        assert!(result.message.contains("TLS"));
        assert!(!result.is_up());
    }

    #[tokio::test]
    async fn test_probe_hostname_mismatch_downgrades_status() {
        let server = spawn_https_server(Duration::ZERO).await;
        let prober = HttpsProber::new(&test_config()).unwrap();

        // Certificate is issued for "localhost" only.
        let url = format!("https://127.0.0.1:{}", server.port);
        let result = prober.probe(&target(2, &url)).await;

        assert!(!result.tls_valid);
        assert_eq!(result.status_code, INTERNAL_ERROR_STATUS);
        assert!(matches!(
            result.outcome,
            ProbeOutcome::CertError(CertError::HostnameMismatch { .. })
        ));
    }

    #[test]
    fn test_error_chain_skips_repeated_text() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "connection refused");
        assert_eq!(error_chain(&io), "connection refused");
    }
}
