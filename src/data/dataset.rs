//! Dataset column declarations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of values a column holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Floating point values, `NaN` when missing
    Numeric,
    /// Categorical labels
    Categorical,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// A column of a named dataset, the raw input of a pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoundColumn {
    pub dataset: String,
    pub name: String,
    pub kind: ColumnKind,
}

impl BoundColumn {
    pub fn new(dataset: impl Into<String>, name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            dataset: dataset.into(),
            name: name.into(),
            kind,
        }
    }

    /// Qualified identifier (`dataset.name`)
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.dataset, self.name)
    }
}

impl fmt::Display for BoundColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.name)
    }
}

/// Daily equity pricing columns
pub struct EquityPricing;

impl EquityPricing {
    pub const DATASET: &'static str = "EquityPricing";

    pub fn open() -> BoundColumn {
        BoundColumn::new(Self::DATASET, "open", ColumnKind::Numeric)
    }

    pub fn high() -> BoundColumn {
        BoundColumn::new(Self::DATASET, "high", ColumnKind::Numeric)
    }

    pub fn low() -> BoundColumn {
        BoundColumn::new(Self::DATASET, "low", ColumnKind::Numeric)
    }

    pub fn close() -> BoundColumn {
        BoundColumn::new(Self::DATASET, "close", ColumnKind::Numeric)
    }

    pub fn volume() -> BoundColumn {
        BoundColumn::new(Self::DATASET, "volume", ColumnKind::Numeric)
    }
}

/// Fundamental attributes, numeric or categorical
pub struct Fundamentals;

impl Fundamentals {
    pub const DATASET: &'static str = "Fundamentals";

    pub fn numeric(name: impl Into<String>) -> BoundColumn {
        BoundColumn::new(Self::DATASET, name, ColumnKind::Numeric)
    }

    pub fn categorical(name: impl Into<String>) -> BoundColumn {
        BoundColumn::new(Self::DATASET, name, ColumnKind::Categorical)
    }
}
