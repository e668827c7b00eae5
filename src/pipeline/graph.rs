//! Pipeline Graph - Computational dependency graph
//!
//! Compiles the terms reachable from a pipeline's outputs and screen into an
//! [`ExecutionPlan`]: a topologically ordered list of nodes grouped into
//! layers, with the lookback each node needs.

use crate::data::dataset::BoundColumn;
use crate::error::{PipelineError, Result};
use crate::pipeline::term::{Expr, Leaf, Term, TermId, TermKind};
use hashbrown::HashMap;
use std::collections::BTreeSet;

/// One resolved term in an execution plan
#[derive(Debug, Clone)]
pub struct PlanNode {
    pub id: TermId,
    pub term: Term,
    pub kind: TermKind,
    /// Value inputs, in the order the term declares them
    pub inputs: Vec<TermId>,
    pub groupby: Option<TermId>,
    pub mask: Option<TermId>,
    /// Longest path from a leaf (leaves are 0)
    pub depth: usize,
    /// Sessions of history needed before the first output date
    pub lookback: usize,
}

impl PlanNode {
    /// Every node this one reads from
    pub fn dependencies(&self) -> impl Iterator<Item = TermId> + '_ {
        self.inputs
            .iter()
            .copied()
            .chain(self.groupby)
            .chain(self.mask)
    }
}

/// Compiled, immutable evaluation plan
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    nodes: Vec<PlanNode>,
    layers: Vec<Vec<TermId>>,
    outputs: Vec<(String, TermId)>,
    screen: Option<TermId>,
}

impl ExecutionPlan {
    pub fn nodes(&self) -> &[PlanNode] {
        &self.nodes
    }

    pub fn node(&self, id: TermId) -> Option<&PlanNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Declared outputs and the nodes computing them
    pub fn outputs(&self) -> &[(String, TermId)] {
        &self.outputs
    }

    pub fn screen(&self) -> Option<TermId> {
        self.screen
    }

    /// Nodes in dependency order
    pub fn execution_order(&self) -> Vec<TermId> {
        (0..self.nodes.len()).collect()
    }

    /// Nodes grouped by depth; nodes in one layer never depend on each other
    pub fn layers(&self) -> &[Vec<TermId>] {
        &self.layers
    }

    /// History the whole plan needs before the first output date
    pub fn max_lookback(&self) -> usize {
        self.nodes.iter().map(|n| n.lookback).max().unwrap_or(0)
    }

    /// Distinct raw columns the plan reads
    pub fn leaf_columns(&self) -> Vec<BoundColumn> {
        let columns: BTreeSet<BoundColumn> = self
            .nodes
            .iter()
            .filter_map(|n| match n.term.expr() {
                Expr::Leaf(Leaf::Column(column)) => Some(column.clone()),
                _ => None,
            })
            .collect();
        columns.into_iter().collect()
    }

    pub fn dependencies_of(&self, id: TermId) -> Vec<TermId> {
        self.nodes
            .get(id)
            .map(|n| n.dependencies().collect())
            .unwrap_or_default()
    }

    pub fn dependents_of(&self, id: TermId) -> Vec<TermId> {
        self.nodes
            .iter()
            .filter(|n| n.dependencies().any(|dep| dep == id))
            .map(|n| n.id)
            .collect()
    }
}

/// Depth-first plan builder
struct GraphBuilder<'a> {
    outputs: &'a [(String, Term)],
    nodes: Vec<PlanNode>,
    resolved: HashMap<Term, TermId>,
    /// Terms currently being resolved, root first
    stack: Vec<Term>,
}

impl<'a> GraphBuilder<'a> {
    fn new(outputs: &'a [(String, Term)]) -> Self {
        Self {
            outputs,
            nodes: Vec::new(),
            resolved: HashMap::new(),
            stack: Vec::new(),
        }
    }

    fn resolve(&mut self, term: &Term) -> Result<TermId> {
        if let Some(id) = self.resolved.get(term) {
            return Ok(*id);
        }

        if let Some(start) = self.stack.iter().position(|t| t == term) {
            let mut path: Vec<String> = self.stack[start..]
                .iter()
                .map(|t| t.name().to_string())
                .collect();
            path.push(term.name().to_string());
            return Err(PipelineError::CycleError { path });
        }

        self.stack.push(term.clone());
        let id = self.build_node(term);
        self.stack.pop();

        let id = id?;
        self.resolved.insert(term.clone(), id);
        Ok(id)
    }

    fn build_node(&mut self, term: &Term) -> Result<TermId> {
        let inputs: Vec<TermId> = match term.expr() {
            Expr::Reference { name } => {
                let target = self
                    .outputs
                    .iter()
                    .find(|(output, _)| output == name)
                    .map(|(_, t)| t.clone())
                    .ok_or_else(|| PipelineError::UnknownTerm(name.clone()))?;
                vec![self.resolve(&target)?]
            }
            _ => term
                .inputs()
                .into_iter()
                .map(|input| self.resolve(input))
                .collect::<Result<_>>()?,
        };
        let groupby = term.groupby().map(|g| self.resolve(g)).transpose()?;
        let mask = term.mask().map(|m| self.resolve(m)).transpose()?;

        let kind_of = |id: TermId| self.nodes[id].kind;
        let input_kinds: Vec<TermKind> = inputs.iter().map(|&id| kind_of(id)).collect();

        if let Expr::Reference { name } = term.expr() {
            if input_kinds[0] != term.kind() {
                return Err(PipelineError::TypeMismatchError {
                    term: name.clone(),
                    expected: term.kind().to_string(),
                    found: input_kinds[0].to_string(),
                });
            }
        }
        term.validate(&input_kinds, groupby.map(kind_of), mask.map(kind_of))?;

        let mut depth = 0;
        let mut lookback = 0;
        for dep in inputs.iter().chain(groupby.iter()).chain(mask.iter()) {
            let node = &self.nodes[*dep];
            depth = depth.max(node.depth + 1);
            lookback = lookback.max(node.lookback);
        }
        // Only value inputs are read over the window
        let input_lookback = inputs
            .iter()
            .map(|&id| self.nodes[id].lookback)
            .max()
            .unwrap_or(0);
        lookback = lookback.max(input_lookback + term.window_length() - 1);

        let id = self.nodes.len();
        self.nodes.push(PlanNode {
            id,
            term: term.clone(),
            kind: term.kind(),
            inputs,
            groupby,
            mask,
            depth,
            lookback,
        });
        Ok(id)
    }
}

/// Compile outputs and an optional screen into an execution plan
pub fn compile(
    outputs: &[(String, Term)],
    screen: Option<&Term>,
    max_lookback: usize,
) -> Result<ExecutionPlan> {
    let mut builder = GraphBuilder::new(outputs);

    let mut output_ids = Vec::with_capacity(outputs.len());
    for (name, term) in outputs {
        output_ids.push((name.clone(), builder.resolve(term)?));
    }

    let screen = match screen {
        Some(term) => {
            let id = builder.resolve(term)?;
            let kind = builder.nodes[id].kind;
            if kind != TermKind::Filter {
                return Err(PipelineError::TypeMismatchError {
                    term: format!("{} (screen)", term.name()),
                    expected: TermKind::Filter.to_string(),
                    found: kind.to_string(),
                });
            }
            Some(id)
        }
        None => None,
    };

    let nodes = builder.nodes;
    let depth = nodes.iter().map(|n| n.depth).max().map_or(0, |d| d + 1);
    let mut layers = vec![Vec::new(); depth];
    for node in &nodes {
        layers[node.depth].push(node.id);
    }

    let plan = ExecutionPlan {
        nodes,
        layers,
        outputs: output_ids,
        screen,
    };

    if plan.max_lookback() > max_lookback {
        return Err(PipelineError::InvalidTerm(format!(
            "plan needs {} sessions of history, more than the configured maximum of {}",
            plan.max_lookback(),
            max_lookback
        )));
    }

    log::debug!(
        "Compiled plan with {} terms in {} layers (lookback {})",
        plan.len(),
        plan.layers.len(),
        plan.max_lookback()
    );

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::dataset::{EquityPricing, Fundamentals};
    use crate::pipeline::classifiers::Classifier;
    use crate::pipeline::factors::Factor;

    fn outputs(items: Vec<(&str, Term)>) -> Vec<(String, Term)> {
        items
            .into_iter()
            .map(|(name, term)| (name.to_string(), term))
            .collect()
    }

    #[test]
    fn test_shared_terms_computed_once() {
        let close = Factor::latest(&EquityPricing::close());
        let sma = close.sma(10);
        let outs = outputs(vec![
            ("sma", sma.clone().into_term()),
            ("ratio", close.div(&sma).into_term()),
            ("again", close.sma(10).into_term()),
        ]);

        let plan = compile(&outs, None, 100).unwrap();
        // close, sma, ratio
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.outputs()[0].1, plan.outputs()[2].1);
        assert_eq!(plan.leaf_columns(), vec![EquityPricing::close()]);
    }

    #[test]
    fn test_lookback_accumulates() {
        let close = Factor::latest(&EquityPricing::close());
        let nested = close.sma(5).sma(3);
        let plan = compile(&outputs(vec![("x", nested.into_term())]), None, 100).unwrap();
        assert_eq!(plan.max_lookback(), 6);
        assert_eq!(plan.layers().len(), 3);
    }

    #[test]
    fn test_layers_follow_dependencies() {
        let close = Factor::latest(&EquityPricing::close());
        let volume = Factor::latest(&EquityPricing::volume());
        let adv = Factor::average_dollar_volume(&close, &volume, 20);
        let screen = adv.top(2).and(&close.gt(5.0));
        let plan = compile(
            &outputs(vec![("adv", adv.into_term())]),
            Some(screen.term()),
            100,
        )
        .unwrap();

        for node in plan.nodes() {
            for dep in plan.dependencies_of(node.id) {
                assert!(plan.node(dep).unwrap().depth < node.depth);
                assert!(plan.dependents_of(dep).contains(&node.id));
            }
        }
        assert_eq!(plan.execution_order().len(), plan.len());
        assert!(plan.screen().is_some());
    }

    #[test]
    fn test_reference_cycle() {
        let a = Factor::reference("b").add(1.0);
        let b = Factor::reference("a").mul(2.0);
        let err = compile(
            &outputs(vec![("a", a.into_term()), ("b", b.into_term())]),
            None,
            100,
        )
        .unwrap_err();
        match err {
            PipelineError::CycleError { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_reference() {
        let x = Factor::reference("missing").add(1.0);
        let err = compile(&outputs(vec![("x", x.into_term())]), None, 100).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTerm(name) if name == "missing"));
    }

    #[test]
    fn test_reference_kind_mismatch() {
        let sector = Classifier::latest(&Fundamentals::categorical("sector"));
        let cmp = Factor::reference("sector").gt(5.0);
        let err = compile(
            &outputs(vec![
                ("sector", sector.into_term()),
                ("cmp", cmp.into_term()),
            ]),
            None,
            100,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatchError { .. }));
    }

    #[test]
    fn test_max_lookback_enforced() {
        let sma = Factor::latest(&EquityPricing::close()).sma(300);
        let err = compile(&outputs(vec![("x", sma.into_term())]), None, 252).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidTerm(_)));
    }

    #[test]
    fn test_screen_must_be_filter() {
        let close = Factor::latest(&EquityPricing::close());
        let err = compile(&[], Some(close.term()), 100).unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatchError { .. }));
    }
}
