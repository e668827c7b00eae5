//! Market data handling
//!
//! Columns are declared through datasets and sourced through an injected
//! [`DataLoader`]. There is no global registry of columns.

pub mod csv_loader;
pub mod dataset;
pub mod in_memory;
pub mod loader;

pub use csv_loader::CsvLoader;
pub use dataset::{BoundColumn, ColumnKind, EquityPricing, Fundamentals};
pub use in_memory::InMemoryLoader;
pub use loader::{ColumnSeries, DataLoader, SeriesValues};
