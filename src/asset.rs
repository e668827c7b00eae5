//! Asset representations

use crate::types::{AssetId, SessionDate, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetType {
    /// Common stock
    Equity,
    /// Exchange traded fund
    Fund,
}

/// Asset representation with its listing lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Asset {
    /// Unique asset identifier
    pub id: AssetId,
    /// Trading symbol
    pub symbol: Symbol,
    /// Exchange where asset is traded
    pub exchange: String,
    /// Type of asset
    pub asset_type: AssetType,
    /// First session the asset trades, if bounded
    pub start_date: Option<SessionDate>,
    /// Last session the asset trades, if delisted
    pub end_date: Option<SessionDate>,
}

impl Asset {
    /// Create a new asset
    pub fn new(id: AssetId, symbol: Symbol, exchange: String, asset_type: AssetType) -> Self {
        Self {
            id,
            symbol,
            exchange,
            asset_type,
            start_date: None,
            end_date: None,
        }
    }

    /// Create an equity asset
    pub fn equity(id: AssetId, symbol: impl Into<Symbol>, exchange: impl Into<String>) -> Self {
        Self::new(id, symbol.into(), exchange.into(), AssetType::Equity)
    }

    /// Set the listing date
    pub fn listed_from(mut self, start: SessionDate) -> Self {
        self.start_date = Some(start);
        self
    }

    /// Set the delisting date
    pub fn delisted_after(mut self, end: SessionDate) -> Self {
        self.end_date = Some(end);
        self
    }

    /// Whether the asset is listed on `date`
    pub fn is_listed_on(&self, date: SessionDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }

    /// Whether the asset is listed on any day of `[start, end]`
    pub fn is_listed_between(&self, start: SessionDate, end: SessionDate) -> bool {
        self.start_date.map_or(true, |s| s <= end) && self.end_date.map_or(true, |e| e >= start)
    }

    /// Get the full identifier (symbol@exchange)
    pub fn full_id(&self) -> String {
        format!("{}@{}", self.symbol, self.exchange)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Asset({}, {}, {:?})",
            self.symbol, self.exchange, self.asset_type
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn d(day: u32) -> SessionDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_asset_creation() {
        let asset = Asset::equity(1, "AAPL", "NASDAQ");
        assert_eq!(asset.symbol, "AAPL");
        assert_eq!(asset.asset_type, AssetType::Equity);
        assert_eq!(asset.full_id(), "AAPL@NASDAQ");
        assert!(asset.is_listed_on(d(1)));
    }

    #[test]
    fn test_listing_lifetime() {
        let asset = Asset::equity(7, "NEW", "NYSE")
            .listed_from(d(10))
            .delisted_after(d(20));

        assert!(!asset.is_listed_on(d(9)));
        assert!(asset.is_listed_on(d(10)));
        assert!(asset.is_listed_on(d(20)));
        assert!(!asset.is_listed_on(d(21)));

        assert!(asset.is_listed_between(d(1), d(10)));
        assert!(!asset.is_listed_between(d(21), d(31)));
    }
}
