//! Monitor handle: the public entry point tying registry, scheduler and sink together.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigError, MonitorConfig};
use crate::probe::{HttpsProber, Prober};
use crate::registry::{Registry, RegistryError, Target, TargetId};
use crate::scheduler::Scheduler;
use crate::sink::{self, ResultStream};

/// Errors raised while building a monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to build TLS connector: {0}")]
    Tls(#[from] native_tls::Error),
}

/// A running (or ready to run) website monitor.
pub struct Monitor {
    registry: Arc<Registry>,
    scheduler: Scheduler,
    stream: Option<ResultStream>,
    dropped: Arc<AtomicU64>,
    started: AtomicBool,
}

impl Monitor {
    /// Create a monitor probing with the HTTPS prober.
    pub fn new(config: MonitorConfig) -> Result<Self, MonitorError> {
        config.validate()?;
        let prober = Arc::new(HttpsProber::new(&config)?);
        Self::with_prober(config, prober)
    }

    /// Create a monitor with a custom probe engine.
    pub fn with_prober(config: MonitorConfig, prober: Arc<dyn Prober>) -> Result<Self, MonitorError> {
        config.validate()?;

        let (tx, stream) = sink::channel(config.sink_capacity, config.send_timeout);
        let dropped = tx.drop_counter();

        Ok(Self {
            registry: Arc::new(Registry::new()),
            scheduler: Scheduler::new(prober, tx),
            stream: Some(stream),
            dropped,
            started: AtomicBool::new(false),
        })
    }

    /// Register a website checked every `interval_secs` seconds.
    ///
    /// After [`start`](Self::start) the website is scheduled right away.
    pub fn add_website(&self, url: &str, interval_secs: u64) -> Result<TargetId, RegistryError> {
        let id = self
            .registry
            .register(url, Duration::from_secs(interval_secs))?;

        if self.started.load(Ordering::SeqCst) {
            if let Some(target) = self.registry.get(id) {
                self.scheduler.add_target(target);
            }
        }
        Ok(id)
    }

    /// Begin probing every registered website. Returns immediately.
    ///
    /// Must be called from within a tokio runtime. Repeated calls are no-ops.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("running");
        self.scheduler.start(&self.registry);
    }

    /// Take the result stream. Only the first call returns it.
    pub fn drain(&mut self) -> Option<ResultStream> {
        self.stream.take()
    }

    /// Snapshot of the registered websites.
    pub fn targets(&self) -> Vec<Target> {
        self.registry.list()
    }

    /// Results dropped because the consumer fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Cancel all probes and close the result stream.
    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }
}
