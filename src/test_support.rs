//! Shared helpers for unit tests: certificates and a local HTTPS server.

use chrono::{DateTime, Datelike, Utc};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        client_timeout: Duration::from_secs(2),
        send_timeout: Duration::from_millis(200),
        ..Default::default()
    }
}

/// Self-signed certificate for `names`, valid until midnight of `not_after`'s day.
pub fn self_signed_der(names: &[&str], not_after: DateTime<Utc>) -> Vec<u8> {
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let mut params = rcgen::CertificateParams::new(names);
    params.not_after =
        rcgen::date_time_ymd(not_after.year(), not_after.month() as u8, not_after.day() as u8);

    let cert = rcgen::Certificate::from_params(params).unwrap();
    cert.serialize_der().unwrap()
}

/// HTTPS server on 127.0.0.1 answering every request with `200 OK`.
///
/// The certificate is self-signed for `localhost`. Aborted on drop.
pub struct MockServer {
    pub port: u16,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub fn url(&self) -> String {
        format!("https://localhost:{}", self.port)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub async fn spawn_https_server(response_delay: Duration) -> MockServer {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let identity = native_tls::Identity::from_pkcs8(
        cert.serialize_pem().unwrap().as_bytes(),
        cert.serialize_private_key_pem().as_bytes(),
    )
    .unwrap();
    let acceptor =
        tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(stream).await else {
                    return;
                };

                // Certificate checks close right after the handshake.
                let mut buf = [0u8; 4096];
                match tls.read(&mut buf).await {
                    Ok(n) if n > 0 => {}
                    _ => return,
                }

                tokio::time::sleep(response_delay).await;
                let _ = tls
                    .write_all(
                        b"HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
                    )
                    .await;
                let _ = tls.shutdown().await;
            });
        }
    });

    MockServer { port, handle }
}
