//! In-memory target store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use super::models::*;

/// Registry error types.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid target {url:?}: {reason}")]
    InvalidTarget { url: String, reason: String },
}

impl RegistryError {
    fn invalid(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}

/// Thread-safe registry of monitored targets.
///
/// Identifiers come from a monotonic counter, so two registrations can
/// never share one.
pub struct Registry {
    targets: RwLock<BTreeMap<TargetId, Target>>,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            targets: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a website and return its identifier.
    pub fn register(&self, url: &str, interval: Duration) -> Result<TargetId, RegistryError> {
        let url = normalize_url(url)?;
        if interval.is_zero() {
            return Err(RegistryError::invalid(&url, "interval must be greater than zero"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let target = Target { id, url, interval };

        tracing::debug!("Registry: registered target {} ({})", id, target.url);

        let mut targets = self.targets.write().unwrap_or_else(|e| e.into_inner());
        targets.insert(id, target);
        Ok(id)
    }

    /// Snapshot of all registered targets, ordered by id.
    pub fn list(&self) -> Vec<Target> {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        targets.values().cloned().collect()
    }

    pub fn get(&self, id: TargetId) -> Option<Target> {
        let targets = self.targets.read().unwrap_or_else(|e| e.into_inner());
        targets.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.targets.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize user input into an absolute `https://` URL.
///
/// Input without a scheme gets `https://` prepended; any other explicit
/// scheme is rejected.
pub fn normalize_url(raw: &str) -> Result<String, RegistryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::invalid(raw, "url is empty"));
    }

    let has_https = trimmed
        .get(..8)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("https://"));

    let candidate = if has_https {
        format!("https://{}", &trimmed[8..])
    } else if let Some(scheme) = explicit_scheme(trimmed) {
        return Err(RegistryError::invalid(
            raw,
            format!("unsupported scheme {:?}, only https is monitored", scheme),
        ));
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate).map_err(|e| RegistryError::invalid(raw, e.to_string()))?;
    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(candidate),
        _ => Err(RegistryError::invalid(raw, "url has no host")),
    }
}

/// The leading `scheme://` of `s`, if it has one.
///
/// `://` later in a path or query is not a scheme.
fn explicit_scheme(s: &str) -> Option<&str> {
    let (scheme, _) = s.split_once("://")?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    let valid = first.is_ascii_alphabetic()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}
