//! Core types and constants

use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Trading session date
pub type SessionDate = NaiveDate;

/// Symbol identifier for assets
pub type Symbol = String;

/// Unique identifier for assets
pub type AssetId = u64;

/// Trading sessions per year, used to annualize daily statistics
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Categorical label produced by classifiers and categorical columns
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(v) => write!(f, "{}", v),
            Label::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Label {
    fn from(value: i64) -> Self {
        Label::Int(value)
    }
}

impl From<&str> for Label {
    fn from(value: &str) -> Self {
        Label::Text(value.to_string())
    }
}

impl From<String> for Label {
    fn from(value: String) -> Self {
        Label::Text(value)
    }
}

/// Parse an ISO 8601 calendar date (`YYYY-MM-DD`)
pub fn parse_iso_date(s: &str) -> Result<SessionDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| PipelineError::ParseError(format!("invalid date '{}': {}", s, e)))
}
