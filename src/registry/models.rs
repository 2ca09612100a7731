//! Registry model types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier assigned to a target at registration.
pub type TargetId = u64;

/// A monitored website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    /// Absolute `https://` URL
    pub url: String,
    /// Time between probe starts, always non-zero
    pub interval: Duration,
}

impl Target {
    /// Host portion of the URL, if it parses.
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_matches(['[', ']']).to_string()))
    }
}
