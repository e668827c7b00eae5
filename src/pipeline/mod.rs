//! Pipeline system for cross-sectional factor computation
//!
//! Terms are declared through the typed [`Factor`], [`Filter`] and
//! [`Classifier`] builders, collected into a [`Pipeline`] and executed by a
//! [`PipelineEngine`].

pub mod classifiers;
pub mod cross_sectional;
pub mod domain;
pub mod engine;
pub mod factors;
pub mod filters;
pub mod graph;
pub mod mask;
pub mod result;
pub mod term;
pub mod value;
pub mod window;

pub use classifiers::Classifier;
pub use cross_sectional::CrossSectionalOp;
pub use domain::{AssetUniverse, FilteredUniverse, Universe};
pub use engine::{Pipeline, PipelineEngine, RunState};
pub use factors::{CustomWindowFn, Factor, WindowTransform};
pub use filters::Filter;
pub use graph::{compile, ExecutionPlan, PlanNode};
pub use mask::{apply_mask, apply_screen};
pub use result::{ResultRow, ResultTable};
pub use term::{BinaryOp, CompareOp, Expr, Leaf, Term, TermId, TermKind, UnaryOp};
pub use value::{Tri, Value};
pub use window::{Buffer, Frame, WindowEvaluator};
