//! Continuous matching.
//!
//! A single periodic driver clears crossing orders per market and per
//! outcome token with price-time priority. Trade-type classification
//! (NORMAL / MINT / MERGE) is a tag on already-matched pairs.

pub mod engine;

pub use engine::MatchingEngine;

use std::time::Duration;

/// Matching tick period.
pub const MATCH_INTERVAL: Duration = Duration::from_millis(100);
