//! Target registry for sitewatch.
//!
//! Holds the monitored websites and hands out unique identifiers.

mod models;
mod store;

pub use models::*;
pub use store::*;
