//! Reporters: consume the result stream and render each probe result.

use std::io::Write;

use crate::probe::ProbeResult;
use crate::sink::ResultStream;

/// Receives every result drained from the sink.
pub trait Reporter: Send {
    fn report(&mut self, result: &ProbeResult);
}

/// Renders results as log lines; failures get a separate alert line.
#[derive(Debug, Default)]
pub struct LogReporter {
    alerts: u64,
}

impl LogReporter {
    /// Number of alert lines emitted so far.
    pub fn alerts(&self) -> u64 {
        self.alerts
    }
}

impl Reporter for LogReporter {
    fn report(&mut self, result: &ProbeResult) {
        tracing::info!(
            target_id = result.target_id,
            "Website {}: Message {} Status {}, Response Time {:.2}s",
            result.url,
            result.message,
            result.status_code,
            result.response_time.as_secs_f64()
        );

        if let Some(warning) = &result.cert_warning {
            tracing::warn!("Certificate for {}: {}", result.url, warning);
        }

        if !result.is_up() {
            self.alerts += 1;
            tracing::warn!(
                target_id = result.target_id,
                tls_valid = result.tls_valid,
                "Alert: website {} is down. Status: {}",
                result.url,
                result.status_code
            );
        }
    }
}

/// Writes one JSON object per line.
pub struct JsonReporter<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Reporter for JsonReporter<W> {
    fn report(&mut self, result: &ProbeResult) {
        let written = serde_json::to_writer(&mut self.out, result)
            .map_err(std::io::Error::from)
            .and_then(|_| writeln!(self.out))
            .and_then(|_| self.out.flush());

        if let Err(e) = written {
            tracing::error!("Failed to write result for {}: {}", result.url, e);
        }
    }
}

/// Forward every result to `reporter` until the stream closes.
///
/// Returns the reporter and the number of results it saw.
pub async fn run_reporter<R: Reporter>(mut stream: ResultStream, mut reporter: R) -> (R, u64) {
    let mut count = 0;
    while let Some(result) = stream.next().await {
        reporter.report(&result);
        count += 1;
    }
    tracing::debug!("Result stream closed after {} results", count);
    (reporter, count)
}
