//! Window evaluator
//!
//! Computes one plan node over the whole run frame. Buffers are laid out
//! asset-major (`asset * sessions + session`) so that a trailing window of one
//! asset is a contiguous slice.

use crate::error::{PipelineError, Result};
use crate::pipeline::cross_sectional::{self, CrossSectionalOp, SectionOutput};
use crate::pipeline::factors::WindowTransform;
use crate::pipeline::graph::PlanNode;
use crate::pipeline::mask::apply_mask;
use crate::pipeline::term::{BinaryOp, Expr, Leaf, TermKind, UnaryOp};
use crate::pipeline::value::{Tri, Value};
use crate::types::{AssetId, Label, SessionDate};

/// Sessions and assets of one run, with the listing grid
#[derive(Debug, Clone)]
pub struct Frame {
    sessions: Vec<SessionDate>,
    assets: Vec<AssetId>,
    listed: Vec<bool>,
}

impl Frame {
    /// `listed` is asset-major and must hold `assets.len() * sessions.len()` cells
    pub fn new(sessions: Vec<SessionDate>, assets: Vec<AssetId>, listed: Vec<bool>) -> Result<Self> {
        if listed.len() != sessions.len() * assets.len() {
            return Err(PipelineError::InvalidTerm(format!(
                "listing grid has {} cells, expected {}",
                listed.len(),
                sessions.len() * assets.len()
            )));
        }
        Ok(Self {
            sessions,
            assets,
            listed,
        })
    }

    pub fn sessions(&self) -> &[SessionDate] {
        &self.sessions
    }

    pub fn assets(&self) -> &[AssetId] {
        &self.assets
    }

    pub fn n_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn cells(&self) -> usize {
        self.listed.len()
    }

    pub fn index(&self, asset: usize, session: usize) -> usize {
        asset * self.sessions.len() + session
    }

    pub fn is_listed(&self, asset: usize, session: usize) -> bool {
        self.listed[self.index(asset, session)]
    }
}

/// Values of one term over the frame
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Numeric(Vec<f64>),
    Boolean(Vec<Tri>),
    Categorical(Vec<Option<Label>>),
}

impl Buffer {
    pub fn missing(kind: TermKind, len: usize) -> Self {
        match kind {
            TermKind::Factor => Buffer::Numeric(vec![f64::NAN; len]),
            TermKind::Filter => Buffer::Boolean(vec![Tri::Missing; len]),
            TermKind::Classifier => Buffer::Categorical(vec![None; len]),
        }
    }

    pub fn kind(&self) -> TermKind {
        match self {
            Buffer::Numeric(_) => TermKind::Factor,
            Buffer::Boolean(_) => TermKind::Filter,
            Buffer::Categorical(_) => TermKind::Classifier,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Buffer::Numeric(v) => v.len(),
            Buffer::Boolean(v) => v.len(),
            Buffer::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_present(&self, index: usize) -> bool {
        match self {
            Buffer::Numeric(v) => !v[index].is_nan(),
            Buffer::Boolean(v) => !v[index].is_missing(),
            Buffer::Categorical(v) => v[index].is_some(),
        }
    }

    pub fn set_missing(&mut self, index: usize) {
        match self {
            Buffer::Numeric(v) => v[index] = f64::NAN,
            Buffer::Boolean(v) => v[index] = Tri::Missing,
            Buffer::Categorical(v) => v[index] = None,
        }
    }

    pub fn value_at(&self, index: usize) -> Value {
        match self {
            Buffer::Numeric(v) => Value::number(v[index]),
            Buffer::Boolean(v) => Value::from(v[index]),
            Buffer::Categorical(v) => Value::from(v[index].clone()),
        }
    }

    pub fn as_numeric(&self) -> Result<&[f64]> {
        match self {
            Buffer::Numeric(v) => Ok(v),
            other => Err(buffer_mismatch(TermKind::Factor, other.kind())),
        }
    }

    pub fn as_boolean(&self) -> Result<&[Tri]> {
        match self {
            Buffer::Boolean(v) => Ok(v),
            other => Err(buffer_mismatch(TermKind::Filter, other.kind())),
        }
    }

    pub fn as_categorical(&self) -> Result<&[Option<Label>]> {
        match self {
            Buffer::Categorical(v) => Ok(v),
            other => Err(buffer_mismatch(TermKind::Classifier, other.kind())),
        }
    }
}

fn buffer_mismatch(expected: TermKind, found: TermKind) -> PipelineError {
    PipelineError::TypeMismatchError {
        term: "buffer".to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

fn finite_or_nan(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        f64::NAN
    }
}

/// Resolved dependencies of one node
pub struct NodeInputs<'b> {
    pub inputs: Vec<&'b Buffer>,
    pub groupby: Option<&'b Buffer>,
    pub mask: Option<&'b Buffer>,
    /// Loaded data, for column leaves
    pub raw: Option<&'b Buffer>,
}

/// Evaluates plan nodes over a frame
pub struct WindowEvaluator<'a> {
    frame: &'a Frame,
}

impl<'a> WindowEvaluator<'a> {
    pub fn new(frame: &'a Frame) -> Self {
        Self { frame }
    }

    /// Compute a node, then restrict it to its mask and to listed cells
    pub fn evaluate(&self, node: &PlanNode, deps: &NodeInputs<'_>) -> Result<Buffer> {
        let mut buffer = self.compute(node, deps)?;

        if let Some(mask) = deps.mask {
            apply_mask(&mut buffer, mask)?;
        }
        for (index, listed) in self.frame.listed.iter().enumerate() {
            if !listed {
                buffer.set_missing(index);
            }
        }
        Ok(buffer)
    }

    fn compute(&self, node: &PlanNode, deps: &NodeInputs<'_>) -> Result<Buffer> {
        let cells = self.frame.cells();

        match node.term.expr() {
            Expr::Leaf(Leaf::Column(column)) => {
                deps.raw
                    .cloned()
                    .ok_or_else(|| PipelineError::DataUnavailableError {
                        column: column.qualified_name(),
                        reason: "column was not loaded".to_string(),
                    })
            }
            Expr::Leaf(Leaf::Constant(value)) => Ok(Buffer::Numeric(vec![*value; cells])),
            Expr::Leaf(Leaf::StaticAssets(ids)) => {
                let mut flags = Vec::with_capacity(cells);
                for asset in self.frame.assets() {
                    let member = Tri::from(ids.binary_search(asset).is_ok());
                    flags.extend(std::iter::repeat(member).take(self.frame.n_sessions()));
                }
                Ok(Buffer::Boolean(flags))
            }
            Expr::Reference { .. } => Ok(deps.inputs[0].clone()),
            Expr::UnaryOp { op, .. } => unary(*op, deps.inputs[0]),
            Expr::BinaryOp { op, .. } => binary(*op, deps.inputs[0], deps.inputs[1]),
            Expr::Comparison { op, .. } => {
                let left = deps.inputs[0].as_numeric()?;
                let right = deps.inputs[1].as_numeric()?;
                Ok(Buffer::Boolean(
                    left.iter()
                        .zip(right)
                        .map(|(l, r)| {
                            if l.is_nan() || r.is_nan() {
                                Tri::Missing
                            } else {
                                Tri::from(op.apply(*l, *r))
                            }
                        })
                        .collect(),
                ))
            }
            Expr::LabelMatch { labels, .. } => {
                let input = deps.inputs[0].as_categorical()?;
                Ok(Buffer::Boolean(
                    input
                        .iter()
                        .map(|label| match label {
                            Some(label) => Tri::from(labels.binary_search(label).is_ok()),
                            None => Tri::Missing,
                        })
                        .collect(),
                ))
            }
            Expr::WindowedTransform {
                transform,
                window_length,
                ..
            } => match transform {
                WindowTransform::AllPresent => self.all_present(deps.inputs[0], *window_length),
                _ => self.windowed(transform, &deps.inputs, *window_length),
            },
            Expr::CrossSectional { op, .. } => {
                let input = deps.inputs[0].as_numeric()?;
                let groups = deps.groupby.map(|g| g.as_categorical()).transpose()?;
                let mask = deps.mask.map(|m| m.as_boolean()).transpose()?;
                self.cross_sectional(node.kind, op, input, groups, mask)
            }
        }
    }

    fn windowed(
        &self,
        transform: &WindowTransform,
        inputs: &[&Buffer],
        window_length: usize,
    ) -> Result<Buffer> {
        let columns: Vec<&[f64]> = inputs
            .iter()
            .map(|b| b.as_numeric())
            .collect::<Result<_>>()?;
        let n = self.frame.n_sessions();
        let mut out = vec![f64::NAN; self.frame.cells()];

        for asset in 0..self.frame.n_assets() {
            let base = asset * n;
            let listed = &self.frame.listed[base..base + n];
            for end in window_length.saturating_sub(1)..n {
                let start = end + 1 - window_length;
                if !listed[start..=end].iter().all(|l| *l) {
                    continue;
                }
                let windows: Vec<&[f64]> = columns
                    .iter()
                    .map(|c| &c[base + start..=base + end])
                    .collect();
                if windows.iter().any(|w| w.iter().any(|v| v.is_nan())) {
                    continue;
                }
                out[base + end] = finite_or_nan(transform.reduce(&windows));
            }
        }
        Ok(Buffer::Numeric(out))
    }

    /// Missing while the window lacks history (before the frame or the
    /// listing); False when the history exists but has a gap.
    fn all_present(&self, input: &Buffer, window_length: usize) -> Result<Buffer> {
        let n = self.frame.n_sessions();
        let mut out = vec![Tri::Missing; self.frame.cells()];

        for asset in 0..self.frame.n_assets() {
            let base = asset * n;
            let listed = &self.frame.listed[base..base + n];
            for end in window_length.saturating_sub(1)..n {
                let start = end + 1 - window_length;
                if !listed[start..=end].iter().all(|l| *l) {
                    continue;
                }
                let complete = (start..=end).all(|s| input.is_present(base + s));
                out[base + end] = Tri::from(complete);
            }
        }
        Ok(Buffer::Boolean(out))
    }

    fn cross_sectional(
        &self,
        kind: TermKind,
        op: &CrossSectionalOp,
        input: &[f64],
        groups: Option<&[Option<Label>]>,
        mask: Option<&[Tri]>,
    ) -> Result<Buffer> {
        let n_assets = self.frame.n_assets();
        let mut out = Buffer::missing(kind, self.frame.cells());
        let mut row = vec![f64::NAN; n_assets];
        let mut row_groups: Vec<Option<Label>> = vec![None; n_assets];

        for session in 0..self.frame.n_sessions() {
            for (asset, slot) in row.iter_mut().enumerate() {
                let index = self.frame.index(asset, session);
                let in_scope = self.frame.listed[index]
                    && mask.map_or(true, |m| m[index].is_true());
                *slot = if in_scope { input[index] } else { f64::NAN };
                if let Some(groups) = groups {
                    row_groups[asset] = groups[index].clone();
                }
            }

            let section = cross_sectional::compute(
                op,
                &row,
                groups.map(|_| row_groups.as_slice()),
            );

            match (section, &mut out) {
                (SectionOutput::Numbers(values), Buffer::Numeric(dst)) => {
                    for (asset, value) in values.into_iter().enumerate() {
                        dst[self.frame.index(asset, session)] = value;
                    }
                }
                (SectionOutput::Flags(values), Buffer::Boolean(dst)) => {
                    for (asset, value) in values.into_iter().enumerate() {
                        dst[self.frame.index(asset, session)] = value;
                    }
                }
                (SectionOutput::Labels(values), Buffer::Categorical(dst)) => {
                    for (asset, value) in values.into_iter().enumerate() {
                        dst[self.frame.index(asset, session)] = value;
                    }
                }
                (_, other) => return Err(buffer_mismatch(kind, other.kind())),
            }
        }
        Ok(out)
    }
}

fn unary(op: UnaryOp, input: &Buffer) -> Result<Buffer> {
    match op {
        UnaryOp::Not => Ok(Buffer::Boolean(
            input.as_boolean()?.iter().map(|t| t.not()).collect(),
        )),
        UnaryOp::IsMissing | UnaryOp::NotMissing => {
            let want_missing = op == UnaryOp::IsMissing;
            Ok(Buffer::Boolean(
                (0..input.len())
                    .map(|i| Tri::from(input.is_present(i) != want_missing))
                    .collect(),
            ))
        }
        _ => Ok(Buffer::Numeric(
            input
                .as_numeric()?
                .iter()
                .map(|v| finite_or_nan(op.apply(*v)))
                .collect(),
        )),
    }
}

fn binary(op: BinaryOp, left: &Buffer, right: &Buffer) -> Result<Buffer> {
    match op {
        BinaryOp::And | BinaryOp::Or => {
            let l = left.as_boolean()?;
            let r = right.as_boolean()?;
            Ok(Buffer::Boolean(
                l.iter()
                    .zip(r)
                    .map(|(a, b)| {
                        if op == BinaryOp::And {
                            a.and(*b)
                        } else {
                            a.or(*b)
                        }
                    })
                    .collect(),
            ))
        }
        _ => {
            let l = left.as_numeric()?;
            let r = right.as_numeric()?;
            Ok(Buffer::Numeric(
                l.iter()
                    .zip(r)
                    .map(|(a, b)| {
                        if a.is_nan() || b.is_nan() {
                            f64::NAN
                        } else {
                            finite_or_nan(op.apply(*a, *b))
                        }
                    })
                    .collect(),
            ))
        }
    }
}
