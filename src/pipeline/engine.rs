//! Pipeline execution engine
//!
//! A [`Pipeline`] declares named outputs and an optional screen. The
//! [`PipelineEngine`] compiles it, loads every raw column once for the full
//! range plus lookback, evaluates the plan layer by layer and assembles a
//! [`ResultTable`] sorted by date then asset id.

use crate::calendar::TradingCalendar;
use crate::config::EngineConfig;
use crate::data::dataset::{BoundColumn, ColumnKind};
use crate::data::loader::{DataLoader, SeriesValues};
use crate::error::{PipelineError, Result};
use crate::pipeline::domain::Universe;
use crate::pipeline::filters::Filter;
use crate::pipeline::graph::{self, ExecutionPlan, PlanNode};
use crate::pipeline::mask::apply_screen;
use crate::pipeline::result::{ResultRow, ResultTable};
use crate::pipeline::term::{Expr, Leaf, Term, TermId, TermKind};
use crate::pipeline::window::{Buffer, Frame, NodeInputs, WindowEvaluator};
use crate::types::{parse_iso_date, AssetId, SessionDate};
use hashbrown::HashMap;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Declarative set of named outputs plus an optional screen
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    outputs: Vec<(String, Term)>,
    screen: Option<Filter>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an output column; a column with the same name is replaced
    pub fn add_output(&mut self, name: impl Into<String>, term: impl Into<Term>) -> &mut Self {
        let name = name.into();
        let term = term.into();
        match self.outputs.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = term,
            None => self.outputs.push((name, term)),
        }
        self
    }

    /// Restrict output rows to assets passing `screen`
    pub fn set_screen(&mut self, screen: Filter) -> &mut Self {
        self.screen = Some(screen);
        self
    }

    pub fn screen(&self) -> Option<&Filter> {
        self.screen.as_ref()
    }

    pub fn outputs(&self) -> &[(String, Term)] {
        &self.outputs
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    /// Compile with the default configuration
    pub fn compile(&self) -> Result<ExecutionPlan> {
        self.compile_with(&EngineConfig::default())
    }

    pub fn compile_with(&self, config: &EngineConfig) -> Result<ExecutionPlan> {
        graph::compile(
            &self.outputs,
            self.screen.as_ref().map(|s| s.term()),
            config.max_lookback,
        )
    }
}

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunState {
    Planned,
    Loading,
    Evaluating,
    Assembled,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Planned => write!(f, "PLANNED"),
            RunState::Loading => write!(f, "LOADING"),
            RunState::Evaluating => write!(f, "EVALUATING"),
            RunState::Assembled => write!(f, "ASSEMBLED"),
        }
    }
}

/// Executes pipelines against an injected loader, calendar and universe
#[derive(Clone)]
pub struct PipelineEngine {
    loader: Arc<dyn DataLoader>,
    calendar: Arc<dyn TradingCalendar>,
    universe: Arc<dyn Universe>,
    config: EngineConfig,
}

impl PipelineEngine {
    pub fn new(
        loader: Arc<dyn DataLoader>,
        calendar: Arc<dyn TradingCalendar>,
        universe: Arc<dyn Universe>,
    ) -> Self {
        Self {
            loader,
            calendar,
            universe,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run over the inclusive range `[start, end]`
    pub fn run_pipeline(
        &self,
        pipeline: &Pipeline,
        start: SessionDate,
        end: SessionDate,
    ) -> Result<ResultTable> {
        self.config.validate()?;
        match self.config.chunk_size {
            Some(chunk_size) => self.run_chunked_pipeline(pipeline, start, end, chunk_size),
            None => {
                let plan = pipeline.compile_with(&self.config)?;
                self.run_plan(&plan, start, end)
            }
        }
    }

    /// Run with ISO 8601 (`YYYY-MM-DD`) dates
    pub fn run_pipeline_iso(&self, pipeline: &Pipeline, start: &str, end: &str) -> Result<ResultTable> {
        self.run_pipeline(pipeline, parse_iso_date(start)?, parse_iso_date(end)?)
    }

    /// Run in chunks of at most `chunk_size` sessions and concatenate the results
    pub fn run_chunked_pipeline(
        &self,
        pipeline: &Pipeline,
        start: SessionDate,
        end: SessionDate,
        chunk_size: usize,
    ) -> Result<ResultTable> {
        if chunk_size == 0 {
            return Err(PipelineError::ConfigError(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if start > end {
            return Err(PipelineError::InvalidDateRange { start, end });
        }

        let plan = pipeline.compile_with(&self.config)?;
        let sessions = self.calendar.sessions_in_range(start, end);
        if sessions.is_empty() {
            return self.run_plan(&plan, start, end);
        }

        let chunks = sessions.chunks(chunk_size);
        log::info!(
            "Running pipeline from {} to {} in {} chunks",
            start,
            end,
            chunks.len()
        );

        let mut tables = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            tables.push(self.run_plan(&plan, chunk[0], chunk[chunk.len() - 1])?);
        }
        ResultTable::concat(tables)
    }

    /// Execute a compiled plan
    pub fn run_plan(
        &self,
        plan: &ExecutionPlan,
        start: SessionDate,
        end: SessionDate,
    ) -> Result<ResultTable> {
        if start > end {
            return Err(PipelineError::InvalidDateRange { start, end });
        }
        PipelineRun::new(self, plan, start, end).execute()
    }
}

/// Evaluation state of one run; single use
struct PipelineRun<'a> {
    engine: &'a PipelineEngine,
    plan: &'a ExecutionPlan,
    start: SessionDate,
    end: SessionDate,
    state: RunState,
}

impl<'a> PipelineRun<'a> {
    fn new(
        engine: &'a PipelineEngine,
        plan: &'a ExecutionPlan,
        start: SessionDate,
        end: SessionDate,
    ) -> Self {
        Self {
            engine,
            plan,
            start,
            end,
            state: RunState::Planned,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(next > self.state);
        log::debug!("Pipeline run {} -> {}", self.state, next);
        self.state = next;
    }

    fn execute(mut self) -> Result<ResultTable> {
        let columns: Vec<String> = self
            .plan
            .outputs()
            .iter()
            .map(|(name, _)| name.clone())
            .collect();

        let output_sessions = self.engine.calendar.sessions_in_range(self.start, self.end);
        log::info!(
            "Running pipeline from {} to {}: {} sessions, {} outputs, {} terms",
            self.start,
            self.end,
            output_sessions.len(),
            columns.len(),
            self.plan.len()
        );
        if output_sessions.is_empty() {
            log::warn!("No sessions between {} and {}", self.start, self.end);
            return Ok(ResultTable::new(columns, Vec::new()));
        }

        let frame = self.build_frame(&output_sessions)?;
        let first_output = frame.n_sessions() - output_sessions.len();

        self.advance(RunState::Loading);
        let raw = self.load(&frame)?;

        self.advance(RunState::Evaluating);
        let buffers = self.evaluate(&frame, &raw)?;

        self.advance(RunState::Assembled);
        let table = self.assemble(&frame, &buffers, first_output, columns)?;
        log::info!("Pipeline run produced {} rows", table.len());
        Ok(table)
    }

    /// Output sessions extended backwards by the plan's lookback
    fn build_frame(&self, output_sessions: &[SessionDate]) -> Result<Frame> {
        let calendar = &self.engine.calendar;
        let mut sessions = calendar.sessions_before(output_sessions[0], self.plan.max_lookback());
        if sessions.len() < self.plan.max_lookback() {
            log::debug!(
                "Calendar has {} of {} lookback sessions before {}",
                sessions.len(),
                self.plan.max_lookback(),
                output_sessions[0]
            );
        }
        sessions.extend_from_slice(output_sessions);

        let mut assets = self
            .engine
            .universe
            .assets_between(sessions[0], sessions[sessions.len() - 1]);
        // rows are ordered by asset id within a session
        assets.sort_by_key(|a| a.id);
        assets.dedup_by_key(|a| a.id);
        let asset_ids: Vec<AssetId> = assets.iter().map(|a| a.id).collect();

        let mut listed = Vec::with_capacity(asset_ids.len() * sessions.len());
        for asset in &assets {
            for session in &sessions {
                listed.push(asset.is_listed_on(*session));
            }
        }

        Frame::new(sessions, asset_ids, listed)
    }

    /// One loader request per distinct column over the whole frame
    fn load(&self, frame: &Frame) -> Result<HashMap<BoundColumn, Buffer>> {
        let session_index: HashMap<SessionDate, usize> = frame
            .sessions()
            .iter()
            .enumerate()
            .map(|(i, d)| (*d, i))
            .collect();
        let asset_index: HashMap<AssetId, usize> = frame
            .assets()
            .iter()
            .enumerate()
            .map(|(i, a)| (*a, i))
            .collect();
        let first = frame.sessions()[0];
        let last = frame.sessions()[frame.n_sessions() - 1];

        let mut raw = HashMap::new();
        for column in self.plan.leaf_columns() {
            let series = self
                .engine
                .loader
                .get_column(&column, first, last, frame.assets())
                .map_err(|e| match e {
                    PipelineError::DataUnavailableError { .. } => e,
                    other => PipelineError::DataUnavailableError {
                        column: column.qualified_name(),
                        reason: other.to_string(),
                    },
                })?;

            let unknown_dates = series
                .dates
                .iter()
                .filter(|d| !session_index.contains_key(*d))
                .count();
            if unknown_dates > 0 {
                log::warn!(
                    "Ignoring {} non-session dates returned for {}",
                    unknown_dates,
                    column
                );
            }

            let kind = match column.kind {
                ColumnKind::Numeric => TermKind::Factor,
                ColumnKind::Categorical => TermKind::Classifier,
            };
            let mut buffer = Buffer::missing(kind, frame.cells());

            let mut unknown_assets = 0;
            for (asset_id, values) in &series.values {
                let Some(&asset) = asset_index.get(asset_id) else {
                    unknown_assets += 1;
                    continue;
                };
                if values.kind() != column.kind {
                    return Err(PipelineError::DataUnavailableError {
                        column: column.qualified_name(),
                        reason: format!("loader returned {} values", values.kind()),
                    });
                }
                if values.len() != series.dates.len() {
                    return Err(PipelineError::DataUnavailableError {
                        column: column.qualified_name(),
                        reason: format!(
                            "asset {} has {} values for {} dates",
                            asset_id,
                            values.len(),
                            series.dates.len()
                        ),
                    });
                }

                for (i, date) in series.dates.iter().enumerate() {
                    let Some(&session) = session_index.get(date) else {
                        continue;
                    };
                    let index = frame.index(asset, session);
                    match (values, &mut buffer) {
                        (SeriesValues::Numeric(v), Buffer::Numeric(dst)) => dst[index] = v[i],
                        (SeriesValues::Categorical(v), Buffer::Categorical(dst)) => {
                            dst[index] = v[i].clone()
                        }
                        _ => {}
                    }
                }
            }
            if unknown_assets > 0 {
                log::warn!(
                    "Ignoring {} assets outside the universe returned for {}",
                    unknown_assets,
                    column
                );
            }

            log::debug!(
                "Loaded {} ({} dates, {} assets)",
                column,
                series.dates.len(),
                series.values.len()
            );
            raw.insert(column, buffer);
        }
        Ok(raw)
    }

    /// Evaluate layer by layer; a layer only reads buffers of earlier layers
    fn evaluate(&self, frame: &Frame, raw: &HashMap<BoundColumn, Buffer>) -> Result<Vec<Option<Buffer>>> {
        let evaluator = WindowEvaluator::new(frame);
        let mut buffers: Vec<Option<Buffer>> = vec![None; self.plan.len()];

        for (depth, layer) in self.plan.layers().iter().enumerate() {
            let computed: Vec<(TermId, Buffer)> = {
                let buffers = &buffers;
                let run_node = |id: &TermId| -> Result<(TermId, Buffer)> {
                    let node = self.node(*id)?;
                    let deps = node_inputs(node, buffers, raw)?;
                    Ok((*id, evaluator.evaluate(node, &deps)?))
                };
                if self.engine.config.parallel {
                    layer.par_iter().map(run_node).collect::<Result<_>>()?
                } else {
                    layer.iter().map(run_node).collect::<Result<_>>()?
                }
            };
            log::debug!("Evaluated layer {} ({} terms)", depth, computed.len());

            for (id, buffer) in computed {
                buffers[id] = Some(buffer);
            }
        }
        Ok(buffers)
    }

    fn node(&self, id: TermId) -> Result<&'a PlanNode> {
        self.plan
            .node(id)
            .ok_or_else(|| PipelineError::UnknownTerm(format!("plan node {}", id)))
    }

    fn assemble(
        &self,
        frame: &Frame,
        buffers: &[Option<Buffer>],
        first_output: usize,
        columns: Vec<String>,
    ) -> Result<ResultTable> {
        let outputs: Vec<&Buffer> = self
            .plan
            .outputs()
            .iter()
            .map(|(_, id)| lookup(buffers, *id))
            .collect::<Result<_>>()?;

        let mut candidates = Vec::new();
        for session in first_output..frame.n_sessions() {
            for asset in 0..frame.n_assets() {
                if frame.is_listed(asset, session) {
                    candidates.push(frame.index(asset, session));
                }
            }
        }

        let rows = match self.plan.screen() {
            Some(id) => apply_screen(candidates, lookup(buffers, id)?.as_boolean()?),
            None => candidates,
        };

        let drop_empty = self.engine.config.drop_all_missing_rows && !outputs.is_empty();
        let n_sessions = frame.n_sessions();
        let mut table_rows = Vec::with_capacity(rows.len());
        for index in rows {
            let values: Vec<_> = outputs.iter().map(|b| b.value_at(index)).collect();
            if drop_empty && values.iter().all(|v| v.is_missing()) {
                continue;
            }
            table_rows.push(ResultRow {
                date: frame.sessions()[index % n_sessions],
                asset: frame.assets()[index / n_sessions],
                values,
            });
        }

        Ok(ResultTable::new(columns, table_rows))
    }
}

fn lookup(buffers: &[Option<Buffer>], id: TermId) -> Result<&Buffer> {
    buffers
        .get(id)
        .and_then(|b| b.as_ref())
        .ok_or_else(|| PipelineError::UnknownTerm(format!("plan node {} was not evaluated", id)))
}

fn node_inputs<'b>(
    node: &PlanNode,
    buffers: &'b [Option<Buffer>],
    raw: &'b HashMap<BoundColumn, Buffer>,
) -> Result<NodeInputs<'b>> {
    let inputs = node
        .inputs
        .iter()
        .map(|id| lookup(buffers, *id))
        .collect::<Result<_>>()?;
    let raw = match node.term.expr() {
        Expr::Leaf(Leaf::Column(column)) => raw.get(column),
        _ => None,
    };
    Ok(NodeInputs {
        inputs,
        groupby: node.groupby.map(|id| lookup(buffers, id)).transpose()?,
        mask: node.mask.map(|id| lookup(buffers, id)).transpose()?,
        raw,
    })
}
