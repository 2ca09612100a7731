//! Result sink: a bounded channel from every probe task to one consumer.
//!
//! Senders wait at most `send_timeout` on a full sink. After that the
//! result is dropped, logged, and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};

use crate::probe::ProbeResult;
use crate::registry::TargetId;

/// Sink error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SinkError {
    #[error("result sink full, dropped result for target {0}")]
    Full(TargetId),
    #[error("result sink closed")]
    Closed,
}

/// Create a sink with room for `capacity` pending results.
pub fn channel(capacity: usize, send_timeout: Duration) -> (SinkSender, ResultStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = SinkSender {
        tx,
        send_timeout,
        dropped: Arc::new(AtomicU64::new(0)),
    };
    (sender, ResultStream { rx })
}

/// Cloneable writing half, shared by all probe tasks.
#[derive(Clone)]
pub struct SinkSender {
    tx: mpsc::Sender<ProbeResult>,
    send_timeout: Duration,
    dropped: Arc<AtomicU64>,
}

impl SinkSender {
    /// Push a result, waiting briefly if the consumer is behind.
    pub async fn send(&self, result: ProbeResult) -> Result<(), SinkError> {
        match self.tx.send_timeout(result, self.send_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(result)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    target_id = result.target_id,
                    dropped_total = total,
                    "Result sink full for {:?}, dropping result for {}",
                    self.send_timeout,
                    result.url
                );
                Err(SinkError::Full(result.target_id))
            }
            Err(SendTimeoutError::Closed(_)) => Err(SinkError::Closed),
        }
    }

    /// Number of results dropped because the sink stayed full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn drop_counter(&self) -> Arc<AtomicU64> {
        self.dropped.clone()
    }
}

/// Reading half. There is exactly one.
pub struct ResultStream {
    rx: mpsc::Receiver<ProbeResult>,
}

impl ResultStream {
    /// Next result, or `None` once every sender is gone and the buffer is empty.
    pub async fn next(&mut self) -> Option<ProbeResult> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<ProbeResult> {
        self.rx.try_recv().ok()
    }
}
