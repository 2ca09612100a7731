//! HTTP probe implementation.

use std::time::Duration;
use thiserror::Error;

use super::error_chain;
use crate::config::MonitorConfig;

/// HTTP probe error types.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Network(String),
}

/// Build the shared client used by every probe.
///
/// The idle pool is bounded and every request carries the configured
/// timeout, so many concurrent probes cannot grow resources unbounded.
pub fn build_client(config: &MonitorConfig) -> Result<reqwest::Client, reqwest::Error> {
    let trust_skip = !config.verify_chain_of_trust;

    reqwest::Client::builder()
        .timeout(config.client_timeout)
        .connect_timeout(config.client_timeout)
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(90))
        .danger_accept_invalid_certs(trust_skip)
        .danger_accept_invalid_hostnames(trust_skip)
        .user_agent(concat!("sitewatch/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Run an HTTP GET against the given URL.
///
/// Returns the response status code. The body is not read; dropping the
/// response hands the connection back to the pool.
pub async fn run_http_probe(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<u16, HttpError> {
    let response = client.get(url).timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            HttpError::Timeout(timeout)
        } else {
            HttpError::Network(error_chain(&e))
        }
    })?;

    let status = response.status().as_u16();
    drop(response);

    Ok(status)
}
