//! sitewatch - periodic website availability and TLS certificate monitor.
//!
//! Register websites on a [`Monitor`], call [`Monitor::start`], and read
//! [`ProbeResult`]s from the stream returned by [`Monitor::drain`].

pub mod config;
pub mod monitor;
pub mod probe;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod sink;

#[cfg(test)]
mod test_support;

pub use config::MonitorConfig;
pub use monitor::{Monitor, MonitorError};
pub use probe::{CertError, ProbeOutcome, ProbeResult, Prober};
pub use registry::{RegistryError, Target, TargetId};
pub use sink::ResultStream;
