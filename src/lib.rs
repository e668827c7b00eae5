//! # Rusty-Pipeline
//!
//! A Rust implementation of a Zipline-style pipeline engine for
//! cross-sectional quantitative finance.
//!
//! A pipeline declares per-asset computations (numeric factors, three-valued
//! filters and categorical classifiers) over historical data, evaluates them for
//! every session of a date range and returns a table indexed by (date, asset),
//! optionally narrowed by a screen.
//!
//! ## Example
//!
//! ```rust,no_run
//! use rusty_pipeline::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let close = Factor::latest(&EquityPricing::close());
//! let sma = close.sma(30);
//!
//! let mut pipeline = Pipeline::new();
//! pipeline
//!     .add_output("sma_30", &sma)
//!     .add_output("pct", close.percent_difference(&sma))
//!     .set_screen(close.percent_difference(&sma).gt(0.0).and(&close.lt(5.0)));
//!
//! let loader = InMemoryLoader::new();
//! let universe = AssetUniverse::new("us_equities", vec![Asset::equity(1, "AAPL", "NASDAQ")]);
//! let engine = PipelineEngine::new(
//!     Arc::new(loader),
//!     Arc::new(WeekdayCalendar::new()),
//!     Arc::new(universe),
//! );
//! let table = engine.run_pipeline_iso(&pipeline, "2024-01-02", "2024-03-28")?;
//! println!("{}", table.to_csv_string()?);
//! # Ok(())
//! # }
//! ```

pub mod asset;
pub mod calendar;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::asset::{Asset, AssetType};
    pub use crate::calendar::{SessionCalendar, TradingCalendar, WeekdayCalendar};
    pub use crate::config::EngineConfig;
    pub use crate::data::{
        BoundColumn, ColumnKind, CsvLoader, DataLoader, EquityPricing, Fundamentals,
        InMemoryLoader,
    };
    pub use crate::error::{PipelineError, Result};
    pub use crate::pipeline::{
        AssetUniverse, Classifier, ExecutionPlan, Factor, Filter, Pipeline, PipelineEngine,
        ResultTable, Term, TermKind, Tri, Universe, Value,
    };
    pub use crate::types::*;
}

// Re-export commonly used items at crate root
pub use error::{PipelineError, Result};
