//! Foreign-exchange adapter types.
//!
//! Fetched only when a non-USD price enters the plan; fixture pricing is
//! USD throughout, so offline runs skip this tool entirely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonicalized FX lookup input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxInput {
    pub base: String,
    pub quote: String,
}

/// A spot rate snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    pub base: String,
    pub quote: String,
    pub rate: f64,
    pub as_of: DateTime<Utc>,
}
