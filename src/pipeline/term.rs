//! Pipeline Term - Core computational expression system
//!
//! Terms represent computational nodes in the pipeline dependency graph.
//! A term is an immutable handle over a tagged expression; composing terms
//! builds new terms and never mutates existing ones. Two terms built from the
//! same expression are the same term and are computed once per run.

use crate::data::dataset::{BoundColumn, ColumnKind};
use crate::error::{PipelineError, Result};
use crate::pipeline::cross_sectional::CrossSectionalOp;
use crate::pipeline::factors::WindowTransform;
use crate::types::{AssetId, Label};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Index of a term inside a compiled execution plan
pub type TermId = usize;

/// Kind of output a term produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TermKind {
    /// Numeric per-asset values
    Factor,
    /// Three-valued boolean per-asset values
    Filter,
    /// Categorical per-asset labels
    Classifier,
}

impl fmt::Display for TermKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TermKind::Factor => write!(f, "Factor"),
            TermKind::Filter => write!(f, "Filter"),
            TermKind::Classifier => write!(f, "Classifier"),
        }
    }
}

/// Unary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    Abs,
    Log,
    Exp,
    Sqrt,
    Not,
    IsMissing,
    NotMissing,
}

impl UnaryOp {
    /// Kind of the operand, `None` when any kind is accepted
    pub fn operand_kind(&self) -> Option<TermKind> {
        match self {
            UnaryOp::Negate | UnaryOp::Abs | UnaryOp::Log | UnaryOp::Exp | UnaryOp::Sqrt => {
                Some(TermKind::Factor)
            }
            UnaryOp::Not => Some(TermKind::Filter),
            UnaryOp::IsMissing | UnaryOp::NotMissing => None,
        }
    }

    pub fn output_kind(&self) -> TermKind {
        match self {
            UnaryOp::Negate | UnaryOp::Abs | UnaryOp::Log | UnaryOp::Exp | UnaryOp::Sqrt => {
                TermKind::Factor
            }
            UnaryOp::Not | UnaryOp::IsMissing | UnaryOp::NotMissing => TermKind::Filter,
        }
    }

    pub fn apply(&self, value: f64) -> f64 {
        match self {
            UnaryOp::Negate => -value,
            UnaryOp::Abs => value.abs(),
            UnaryOp::Log => value.ln(),
            UnaryOp::Exp => value.exp(),
            UnaryOp::Sqrt => value.sqrt(),
            UnaryOp::Not | UnaryOp::IsMissing | UnaryOp::NotMissing => f64::NAN,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "neg",
            UnaryOp::Abs => "abs",
            UnaryOp::Log => "log",
            UnaryOp::Exp => "exp",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Not => "not",
            UnaryOp::IsMissing => "is_missing",
            UnaryOp::NotMissing => "not_missing",
        }
    }
}

/// Binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Min,
    Max,
    And,
    Or,
}

impl BinaryOp {
    pub fn operand_kind(&self) -> TermKind {
        match self {
            BinaryOp::And | BinaryOp::Or => TermKind::Filter,
            _ => TermKind::Factor,
        }
    }

    pub fn output_kind(&self) -> TermKind {
        self.operand_kind()
    }

    /// Apply a numeric operation. Non-finite results are the caller's to discard.
    pub fn apply(&self, left: f64, right: f64) -> f64 {
        match self {
            BinaryOp::Add => left + right,
            BinaryOp::Subtract => left - right,
            BinaryOp::Multiply => left * right,
            BinaryOp::Divide => left / right,
            BinaryOp::Power => left.powf(right),
            BinaryOp::Min => left.min(right),
            BinaryOp::Max => left.max(right),
            BinaryOp::And | BinaryOp::Or => f64::NAN,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Power => "**",
            BinaryOp::Min => "min",
            BinaryOp::Max => "max",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
        }
    }

    fn is_commutative(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add
                | BinaryOp::Multiply
                | BinaryOp::Min
                | BinaryOp::Max
                | BinaryOp::And
                | BinaryOp::Or
        )
    }
}

/// Numeric comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

impl CompareOp {
    pub fn apply(&self, left: f64, right: f64) -> bool {
        match self {
            CompareOp::Less => left < right,
            CompareOp::LessEqual => left <= right,
            CompareOp::Greater => left > right,
            CompareOp::GreaterEqual => left >= right,
            CompareOp::Equal => left == right,
            CompareOp::NotEqual => left != right,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Less => "<",
            CompareOp::LessEqual => "<=",
            CompareOp::Greater => ">",
            CompareOp::GreaterEqual => ">=",
            CompareOp::Equal => "==",
            CompareOp::NotEqual => "!=",
        }
    }
}

/// Terms without term inputs
#[derive(Debug, Clone)]
pub enum Leaf {
    /// Raw dataset column
    Column(BoundColumn),
    /// Same value for every listed asset
    Constant(f64),
    /// True for a fixed set of assets
    StaticAssets(Vec<AssetId>),
}

/// Tagged expression tree
#[derive(Debug, Clone)]
pub enum Expr {
    Leaf(Leaf),
    /// Another pipeline output, resolved by name at compile time
    Reference { name: String },
    UnaryOp {
        op: UnaryOp,
        input: Term,
    },
    BinaryOp {
        op: BinaryOp,
        left: Term,
        right: Term,
    },
    Comparison {
        op: CompareOp,
        left: Term,
        right: Term,
    },
    /// Classifier comparison: label equal to any of `labels`
    LabelMatch {
        input: Term,
        labels: Vec<Label>,
    },
    WindowedTransform {
        transform: WindowTransform,
        inputs: Vec<Term>,
        window_length: usize,
    },
    CrossSectional {
        op: CrossSectionalOp,
        input: Term,
        groupby: Option<Term>,
    },
}

#[derive(Debug)]
struct TermNode {
    expr: Expr,
    kind: TermKind,
    mask: Option<Term>,
    name: String,
    key: String,
}

/// Immutable, cheaply clonable handle to a computation node
#[derive(Clone)]
pub struct Term {
    node: Arc<TermNode>,
}

impl Term {
    fn build(expr: Expr, kind: TermKind, mask: Option<Term>) -> Self {
        let mut name = render(&expr, kind, Render::Name);
        let mut key = render(&expr, kind, Render::Key);
        if let Some(mask) = &mask {
            name = format!("{} [mask={}]", name, mask.name());
            key = format!("{} [mask={}]", key, mask.key());
        }
        Self {
            node: Arc::new(TermNode {
                expr,
                kind,
                mask,
                name,
                key,
            }),
        }
    }

    /// Create a term from an expression with an explicit output kind
    pub fn new(expr: Expr, kind: TermKind) -> Self {
        Self::build(expr, kind, None)
    }

    /// Latest value of a raw column
    pub fn column(column: &BoundColumn) -> Self {
        let kind = match column.kind {
            ColumnKind::Numeric => TermKind::Factor,
            ColumnKind::Categorical => TermKind::Classifier,
        };
        Self::new(Expr::Leaf(Leaf::Column(column.clone())), kind)
    }

    pub fn constant(value: f64) -> Self {
        Self::new(Expr::Leaf(Leaf::Constant(value)), TermKind::Factor)
    }

    pub fn static_assets(assets: impl IntoIterator<Item = AssetId>) -> Self {
        let mut ids: Vec<AssetId> = assets.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self::new(Expr::Leaf(Leaf::StaticAssets(ids)), TermKind::Filter)
    }

    /// Reference to the pipeline output called `name`, expected to be of `kind`
    pub fn reference(name: impl Into<String>, kind: TermKind) -> Self {
        Self::new(Expr::Reference { name: name.into() }, kind)
    }

    pub fn unary(op: UnaryOp, input: &Term) -> Self {
        Self::new(
            Expr::UnaryOp {
                op,
                input: input.clone(),
            },
            op.output_kind(),
        )
    }

    pub fn binary(op: BinaryOp, left: &Term, right: &Term) -> Self {
        Self::new(
            Expr::BinaryOp {
                op,
                left: left.clone(),
                right: right.clone(),
            },
            op.output_kind(),
        )
    }

    pub fn compare(op: CompareOp, left: &Term, right: &Term) -> Self {
        Self::new(
            Expr::Comparison {
                op,
                left: left.clone(),
                right: right.clone(),
            },
            TermKind::Filter,
        )
    }

    pub fn label_match(input: &Term, labels: Vec<Label>) -> Self {
        let mut labels = labels;
        labels.sort();
        labels.dedup();
        Self::new(
            Expr::LabelMatch {
                input: input.clone(),
                labels,
            },
            TermKind::Filter,
        )
    }

    pub fn windowed(transform: WindowTransform, inputs: Vec<Term>, window_length: usize) -> Self {
        let kind = transform.output_kind();
        Self::new(
            Expr::WindowedTransform {
                transform,
                inputs,
                window_length,
            },
            kind,
        )
    }

    pub fn cross_sectional(op: CrossSectionalOp, input: &Term, groupby: Option<&Term>) -> Self {
        let kind = op.output_kind();
        Self::new(
            Expr::CrossSectional {
                op,
                input: input.clone(),
                groupby: groupby.cloned(),
            },
            kind,
        )
    }

    /// Restrict evaluation to assets where `mask` is true.
    ///
    /// An existing mask is intersected with the new one.
    pub fn with_mask(&self, mask: &Term) -> Self {
        let mask = match &self.node.mask {
            Some(existing) => Term::binary(BinaryOp::And, existing, mask),
            None => mask.clone(),
        };
        Self::build(self.node.expr.clone(), self.node.kind, Some(mask))
    }

    pub fn kind(&self) -> TermKind {
        self.node.kind
    }

    pub fn expr(&self) -> &Expr {
        &self.node.expr
    }

    pub fn mask(&self) -> Option<&Term> {
        self.node.mask.as_ref()
    }

    /// Readable name used in plans and error messages
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Unambiguous structural encoding; terms with equal keys are the same term
    pub fn key(&self) -> &str {
        &self.node.key
    }

    /// Trailing observations needed per output value
    pub fn window_length(&self) -> usize {
        match &self.node.expr {
            Expr::WindowedTransform { window_length, .. } => *window_length,
            _ => 1,
        }
    }

    /// Value inputs, excluding the mask and the groupby classifier
    pub fn inputs(&self) -> Vec<&Term> {
        match &self.node.expr {
            Expr::Leaf(_) | Expr::Reference { .. } => Vec::new(),
            Expr::UnaryOp { input, .. }
            | Expr::LabelMatch { input, .. }
            | Expr::CrossSectional { input, .. } => vec![input],
            Expr::BinaryOp { left, right, .. } | Expr::Comparison { left, right, .. } => {
                vec![left, right]
            }
            Expr::WindowedTransform { inputs, .. } => inputs.iter().collect(),
        }
    }

    pub fn groupby(&self) -> Option<&Term> {
        match &self.node.expr {
            Expr::CrossSectional { groupby, .. } => groupby.as_ref(),
            _ => None,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.node.expr, Expr::Leaf(_))
    }

    /// Kind the expression evaluates to; `None` for references, which take
    /// the kind of their target
    fn produced_kind(&self) -> Option<TermKind> {
        let kind = match &self.node.expr {
            Expr::Leaf(Leaf::Column(column)) => match column.kind {
                ColumnKind::Numeric => TermKind::Factor,
                ColumnKind::Categorical => TermKind::Classifier,
            },
            Expr::Leaf(Leaf::Constant(_)) => TermKind::Factor,
            Expr::Leaf(Leaf::StaticAssets(_)) => TermKind::Filter,
            Expr::Reference { .. } => return None,
            Expr::UnaryOp { op, .. } => op.output_kind(),
            Expr::BinaryOp { op, .. } => op.output_kind(),
            Expr::Comparison { .. } | Expr::LabelMatch { .. } => TermKind::Filter,
            Expr::WindowedTransform { transform, .. } => transform.output_kind(),
            Expr::CrossSectional { op, .. } => op.output_kind(),
        };
        Some(kind)
    }

    /// Check input kinds and parameters against the resolved kinds of the
    /// inputs, the groupby classifier and the mask.
    pub(crate) fn validate(
        &self,
        inputs: &[TermKind],
        groupby: Option<TermKind>,
        mask: Option<TermKind>,
    ) -> Result<()> {
        if let Some(found) = mask {
            expect_kind(self, "mask", TermKind::Filter, found)?;
        }

        match &self.node.expr {
            Expr::Leaf(Leaf::Column(column)) => {
                let expected = match column.kind {
                    ColumnKind::Numeric => TermKind::Factor,
                    ColumnKind::Categorical => TermKind::Classifier,
                };
                if self.kind() != expected {
                    return Err(PipelineError::TypeMismatchError {
                        term: self.name().to_string(),
                        expected: self.kind().to_string(),
                        found: format!("{} column", column.kind),
                    });
                }
            }
            Expr::Leaf(_) | Expr::Reference { .. } => {}
            Expr::UnaryOp { op, .. } => {
                if let Some(expected) = op.operand_kind() {
                    expect_kind(self, "operand", expected, inputs[0])?;
                }
            }
            Expr::BinaryOp { op, .. } => {
                expect_kind(self, "left operand", op.operand_kind(), inputs[0])?;
                expect_kind(self, "right operand", op.operand_kind(), inputs[1])?;
            }
            Expr::Comparison { .. } => {
                expect_kind(self, "left operand", TermKind::Factor, inputs[0])?;
                expect_kind(self, "right operand", TermKind::Factor, inputs[1])?;
            }
            Expr::LabelMatch { .. } => {
                expect_kind(self, "operand", TermKind::Classifier, inputs[0])?;
            }
            Expr::WindowedTransform {
                transform,
                window_length,
                ..
            } => {
                if *window_length == 0 {
                    return Err(PipelineError::InvalidTerm(format!(
                        "{}: window length must be at least 1",
                        self.name()
                    )));
                }
                transform
                    .validate()
                    .map_err(|reason| PipelineError::InvalidTerm(format!("{}: {}", self.name(), reason)))?;
                if inputs.is_empty() {
                    return Err(PipelineError::InvalidTerm(format!(
                        "{}: windowed transform needs at least one input",
                        self.name()
                    )));
                }
                if let Some(arity) = transform.arity() {
                    if inputs.len() != arity {
                        return Err(PipelineError::InvalidTerm(format!(
                            "{}: expected {} inputs, got {}",
                            self.name(),
                            arity,
                            inputs.len()
                        )));
                    }
                }
                if !transform.accepts_any_kind() {
                    for found in inputs {
                        expect_kind(self, "window input", TermKind::Factor, *found)?;
                    }
                }
            }
            Expr::CrossSectional { op, .. } => {
                op.validate()
                    .map_err(|reason| PipelineError::InvalidTerm(format!("{}: {}", self.name(), reason)))?;
                expect_kind(self, "input", TermKind::Factor, inputs[0])?;
                if let Some(found) = groupby {
                    expect_kind(self, "groupby", TermKind::Classifier, found)?;
                }
            }
        }

        if let Some(produced) = self.produced_kind() {
            expect_kind(self, "output", self.kind(), produced)?;
        }
        Ok(())
    }
}

fn expect_kind(term: &Term, role: &str, expected: TermKind, found: TermKind) -> Result<()> {
    if expected == found {
        return Ok(());
    }
    Err(PipelineError::TypeMismatchError {
        term: format!("{} ({})", term.name(), role),
        expected: expected.to_string(),
        found: found.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Render {
    Name,
    Key,
}

fn part(term: &Term, mode: Render) -> &str {
    match mode {
        Render::Name => term.name(),
        Render::Key => term.key(),
    }
}

fn render_label(label: &Label, mode: Render) -> String {
    match (mode, label) {
        (Render::Name, label) => label.to_string(),
        (Render::Key, Label::Int(v)) => format!("i:{}", v),
        (Render::Key, Label::Text(s)) => format!("s:{:?}", s),
    }
}

fn render(expr: &Expr, kind: TermKind, mode: Render) -> String {
    match expr {
        Expr::Leaf(Leaf::Column(column)) => match mode {
            Render::Name => column.qualified_name(),
            Render::Key => format!("col:{:?}.{:?}:{}", column.dataset, column.name, column.kind),
        },
        Expr::Leaf(Leaf::Constant(value)) => format!("{}", value),
        Expr::Leaf(Leaf::StaticAssets(ids)) => {
            let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            format!("static_assets[{}]", ids.join(","))
        }
        Expr::Reference { name } => match mode {
            Render::Name => format!("{}<{}>", name, kind),
            Render::Key => format!("ref:{:?}<{}>", name, kind),
        },
        Expr::UnaryOp { op, input } => format!("{}({})", op.name(), part(input, mode)),
        Expr::BinaryOp { op, left, right } => {
            let (a, b) = if op.is_commutative() && right.key() < left.key() {
                (right, left)
            } else {
                (left, right)
            };
            let (a, b) = (part(a, mode), part(b, mode));
            match op {
                BinaryOp::Min | BinaryOp::Max => format!("{}({}, {})", op.symbol(), a, b),
                _ => format!("({} {} {})", a, op.symbol(), b),
            }
        }
        Expr::Comparison { op, left, right } => {
            format!("({} {} {})", part(left, mode), op.symbol(), part(right, mode))
        }
        Expr::LabelMatch { input, labels } => {
            let labels: Vec<String> = labels.iter().map(|l| render_label(l, mode)).collect();
            format!("{}.isin([{}])", part(input, mode), labels.join(", "))
        }
        Expr::WindowedTransform {
            transform,
            inputs,
            window_length,
        } => {
            let inputs: Vec<&str> = inputs.iter().map(|t| part(t, mode)).collect();
            format!(
                "{}({}, window={})",
                transform.name(),
                inputs.join(", "),
                window_length
            )
        }
        Expr::CrossSectional { op, input, groupby } => match groupby {
            Some(group) => format!(
                "{}({} by {})",
                op.name(),
                part(input, mode),
                part(group, mode)
            ),
            None => format!("{}({})", op.name(), part(input, mode)),
        },
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node) || self.node.key == other.node.key
    }
}

impl Eq for Term {}

impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.node.key.hash(state);
    }
}

impl fmt::Debug for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Term<{}>({})", self.node.kind, self.node.name)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.node.name)
    }
}
