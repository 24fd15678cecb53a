//! Background pass state machine
//!
//! Entry points record what changed and return at once. The work happens in
//! passes: tokio tasks that walk the phases in order, offloading the heavy
//! parts to blocking threads. At most one pass is current; starting a new
//! one cancels the previous, which is joined before the new one touches the
//! graph or subgraph.

use crate::error::OrchestratorError;
use crate::events::OrchestratorEvent;
use crate::idle::IdleTimer;
use crate::phase::Phase;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use trellis_core::operations::{
    ClearSelected, SetCategoryMembers, SetSelected, TogglePinned, UpdateImportantTypes,
};
use trellis_core::ranking::{annotate_scores, rank_types};
use trellis_core::vcs::annotate_vcs_status;
use trellis_core::{
    Category, Graph, GraphStatistics, MaterializedGraph, NodeKey, Operation, OperationBatch,
    PassToken, PinState, ProjectId, SerialCancellation, SharedGraph, SourceResolver, Subgraph,
    TrellisConfig, TypeFilter, Universe, VcsStatusProvider,
};

const EVENT_CAPACITY: usize = 64;
/// Failed passes in a row that still retry leftover work on their own.
const FAILURE_RETRIES: u32 = 2;

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub document_idle: Duration,
    pub graph_idle: Duration,
    /// Size of the importance ranking; 0 skips the ranking phase.
    pub important_types: usize,
    pub universe: Universe,
    pub filter: TypeFilter,
}

impl OrchestratorOptions {
    pub fn from_config(config: &TrellisConfig) -> Self {
        OrchestratorOptions {
            document_idle: config.orchestrator.document_idle(),
            graph_idle: config.orchestrator.graph_idle(),
            important_types: config.subgraph.important_types,
            universe: config.universe(),
            filter: config.node_filter(),
        }
    }
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_config(&TrellisConfig::default())
    }
}

type StatisticsReply = oneshot::Sender<Option<GraphStatistics>>;

#[derive(Default)]
struct State {
    phase: Phase,
    /// Identifies the current pass; bumped whenever one starts.
    epoch: u64,
    running: Option<JoinHandle<()>>,
    universe: Universe,
    has_graph: bool,
    graph_invalid: bool,
    clear_requested: bool,
    documents: BTreeSet<PathBuf>,
    /// `None` means nothing is selected.
    selection: Option<BTreeSet<NodeKey>>,
    selection_dirty: bool,
    pending: Vec<Box<dyn Operation>>,
    rerun: bool,
    statistics: Option<StatisticsReply>,
    /// The graph changed since VCS status and ranking were last computed.
    annotations_stale: bool,
    materialize_requested: bool,
    sequence: u64,
    /// Passes failed since the last entry point asked for work.
    failures: u32,
}

struct Inner {
    state: Mutex<State>,
    resolver: Arc<dyn SourceResolver>,
    vcs: Option<Arc<dyn VcsStatusProvider>>,
    graph: SharedGraph,
    subgraph: Arc<Mutex<Subgraph>>,
    cancellation: SerialCancellation,
    document_idle: IdleTimer,
    graph_idle: IdleTimer,
    important_types: usize,
    events: broadcast::Sender<OrchestratorEvent>,
    runtime: Handle,
}

/// Keeps a graph and its subgraph current in the background.
///
/// Cloning yields another handle to the same orchestrator.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        resolver: Arc<dyn SourceResolver>,
        vcs: Option<Arc<dyn VcsStatusProvider>>,
        options: OrchestratorOptions,
    ) -> Result<Self, OrchestratorError> {
        let runtime = Handle::try_current().map_err(|_| OrchestratorError::NoRuntime)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let state = State {
            universe: options.universe,
            ..State::default()
        };
        Ok(Orchestrator {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                resolver,
                vcs,
                graph: SharedGraph::default(),
                subgraph: Arc::new(Mutex::new(Subgraph::with_filter(Arc::new(options.filter)))),
                cancellation: SerialCancellation::new(),
                document_idle: IdleTimer::new(options.document_idle),
                graph_idle: IdleTimer::new(options.graph_idle),
                important_types: options.important_types,
                events,
                runtime,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.events.subscribe()
    }

    pub fn phase(&self) -> Phase {
        self.inner.state.lock().phase
    }

    /// The graph; empty until the first rebuild.
    pub fn graph(&self) -> SharedGraph {
        self.inner.graph.clone()
    }

    /// A copy of the current subgraph.
    pub fn subgraph(&self) -> Subgraph {
        self.inner.subgraph.lock().clone()
    }

    /// Rebuild the whole graph once the rebuild idle period has passed.
    pub fn invalidate_graph(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            return;
        }
        state.graph_invalid = true;
        self.inner.graph_idle.touch();
        self.inner.supersede(&mut state);
    }

    /// Re-resolve the types declared in `path`.
    pub fn invalidate_document(&self, path: impl Into<PathBuf>) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            return;
        }
        state.documents.insert(path.into());
        self.inner.document_idle.touch();
        if state.phase >= Phase::IncrementalUpdate {
            state.rerun = true;
        }
        self.inner.ensure_pass(&mut state);
    }

    /// Replace the active selection; `None` clears it.
    pub fn invalidate_active_selection(&self, selection: Option<Vec<NodeKey>>) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            return;
        }
        state.selection = selection.map(|keys| keys.into_iter().collect());
        state.selection_dirty = true;
        if state.phase >= Phase::ActiveSelection {
            state.rerun = true;
        }
        self.inner.ensure_pass(&mut state);
    }

    pub fn submit_operation(&self, operation: impl Operation + 'static) {
        self.submit_boxed(Box::new(operation));
    }

    pub fn submit_boxed(&self, operation: Box<dyn Operation>) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            return;
        }
        debug!(operation = operation.name(), "operation queued");
        state.pending.push(operation);
        if state.phase >= Phase::SubgraphOperations {
            state.rerun = true;
        }
        self.inner.ensure_pass(&mut state);
    }

    /// Limit the graph to `projects` (all projects when `None`) and rebuild
    /// right away.
    pub fn set_included_projects(&self, projects: Option<Vec<ProjectId>>) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            return;
        }
        let exclude_generated = state.universe.exclude_generated;
        state.universe = match projects {
            Some(projects) => Universe::with_projects(projects),
            None => Universe::all(),
        };
        state.universe.exclude_generated = exclude_generated;
        state.graph_invalid = true;
        self.inner.graph_idle.fast_track();
        self.inner.supersede(&mut state);
    }

    /// Empty the subgraph and rebuild the graph.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            return;
        }
        state.clear_requested = true;
        state.graph_invalid = true;
        state.materialize_requested = true;
        self.inner.graph_idle.fast_track();
        self.inner.supersede(&mut state);
    }

    /// Flip a node between pinned and unpinned.
    ///
    /// Applied on the spot when no pass is running, in which case the new
    /// state is returned; otherwise queued for the next batch.
    pub fn toggle_pinned(&self, key: impl Into<NodeKey>) -> Option<PinState> {
        let key = key.into();
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            return None;
        }
        // between passes nothing else holds the graph or subgraph
        let idle = state.phase == Phase::Idle;
        let graph = idle.then(|| self.inner.graph.try_read()).flatten();
        let subgraph = idle.then(|| self.inner.subgraph.try_lock()).flatten();
        let toggled = match (graph, subgraph) {
            (Some(graph), Some(mut subgraph)) => match graph.node(&key) {
                Some(node) => Some(subgraph.toggle_pinned(node)),
                None => return None,
            },
            _ => {
                state.pending.push(Box::new(TogglePinned::new(key)));
                None
            }
        };
        state.materialize_requested = true;
        if state.phase >= Phase::SubgraphOperations {
            state.rerun = true;
        }
        self.inner.ensure_pass(&mut state);
        toggled
    }

    /// Ask for graph statistics from the next pass.
    ///
    /// Only one request is outstanding at a time; an earlier one resolves to
    /// `None`.
    pub fn request_statistics(&self) -> oneshot::Receiver<Option<GraphStatistics>> {
        let (reply, receiver) = oneshot::channel();
        let mut state = self.inner.state.lock();
        if state.phase == Phase::Inactive {
            let _ = reply.send(None);
            return receiver;
        }
        if let Some(previous) = state.statistics.replace(reply) {
            let _ = previous.send(None);
        }
        if state.phase >= Phase::Statistics {
            state.rerun = true;
        }
        self.inner.ensure_pass(&mut state);
        receiver
    }

    /// Stop the current pass and ignore further entry points.
    pub fn shutdown(&self) {
        let mut state = self.inner.state.lock();
        state.phase = Phase::Inactive;
        state.running = None;
        if let Some(reply) = state.statistics.take() {
            let _ = reply.send(None);
        }
        self.inner.cancellation.cancel();
        info!("orchestrator shut down");
    }
}

async fn blocking<T, F>(what: &'static str, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .with_context(|| format!("{what} failed"))
}

/// Wait for a spawned pass body, turning a panic into an error.
pub(crate) async fn contained<T>(work: JoinHandle<Result<T>>) -> Result<T> {
    work.await.context("pass panicked")?
}

impl Inner {
    /// Start a pass now, superseding the running one.
    fn start_pass(self: &Arc<Self>, state: &mut State) {
        let token = self.cancellation.next();
        state.epoch += 1;
        state.rerun = false;
        state.phase = Phase::GraphRebuild;
        let epoch = state.epoch;
        let previous = state.running.take();
        let inner = Arc::clone(self);
        state.running = Some(
            self.runtime
                .spawn(async move { inner.run_pass(epoch, token, previous).await }),
        );
    }

    /// Start a pass on behalf of an entry point, superseding the running one.
    fn supersede(self: &Arc<Self>, state: &mut State) {
        state.failures = 0;
        self.start_pass(state);
    }

    /// Start a pass on behalf of an entry point unless one is running.
    fn ensure_pass(self: &Arc<Self>, state: &mut State) {
        state.failures = 0;
        if state.phase == Phase::Idle {
            self.start_pass(state);
        }
    }

    async fn run_pass(
        self: Arc<Self>,
        epoch: u64,
        token: PassToken,
        previous: Option<JoinHandle<()>>,
    ) {
        if let Some(previous) = previous {
            // a superseded pass stops at its next checkpoint
            let _ = previous.await;
        }
        if token.is_cancelled() {
            return;
        }
        let _ = self.events.send(OrchestratorEvent::PassStarted { pass: epoch });
        debug!(pass = epoch, "pass started");
        let body = {
            let inner = Arc::clone(&self);
            let token = token.clone();
            self.runtime
                .spawn(async move { inner.execute(epoch, &token).await })
        };
        let result = contained(body).await;
        self.finish(epoch, &token, result);
    }

    /// Move to `phase` unless the pass was superseded.
    fn enter(&self, epoch: u64, token: &PassToken, phase: Phase) -> bool {
        let mut state = self.state.lock();
        if token.is_cancelled() || state.epoch != epoch || state.phase == Phase::Inactive {
            return false;
        }
        debug_assert!(state.phase <= phase, "phases only move forward");
        state.phase = phase;
        debug!(pass = epoch, %phase, "phase");
        true
    }

    async fn execute(self: &Arc<Self>, epoch: u64, token: &PassToken) -> Result<()> {
        // ── graph rebuild ──────────────────────────────────────────────
        let rebuild = {
            let state = self.state.lock();
            state.graph_invalid || !state.has_graph
        };
        if rebuild {
            if !self.graph_idle.wait(token).await
                || !self.enter(epoch, token, Phase::GraphRebuild)
            {
                return Ok(());
            }
            let (universe, covered) = {
                let state = self.state.lock();
                (state.universe.clone(), state.documents.clone())
            };
            let resolver = Arc::clone(&self.resolver);
            let graph = self.graph.clone();
            let build_token = token.clone();
            let built = blocking("graph build", move || -> Result<_> {
                let Some(built) = Graph::build(resolver.as_ref(), &universe, &build_token) else {
                    return Ok(None);
                };
                if build_token.is_cancelled() {
                    return Ok(None);
                }
                let counts = (built.node_count(), built.link_count());
                *graph.write()? = built;
                Ok(Some(counts))
            })
            .await??;
            let Some((nodes, links)) = built else {
                return Ok(());
            };
            info!(pass = epoch, nodes, links, "graph rebuilt");

            let clear = {
                let mut state = self.state.lock();
                state.graph_invalid = false;
                state.has_graph = true;
                state.documents.retain(|path| !covered.contains(path));
                state.annotations_stale = true;
                state.materialize_requested = true;
                std::mem::take(&mut state.clear_requested)
            };
            if clear {
                self.subgraph.lock().clear();
            }
            self.document_idle.fast_track();
        }

        // ── incremental update ─────────────────────────────────────────
        let has_documents = !self.state.lock().documents.is_empty();
        if has_documents {
            if !self.document_idle.wait(token).await
                || !self.enter(epoch, token, Phase::IncrementalUpdate)
            {
                return Ok(());
            }
            let (universe, documents) = {
                let mut state = self.state.lock();
                let documents: Vec<PathBuf> = std::mem::take(&mut state.documents).into_iter().collect();
                (state.universe.clone(), documents)
            };
            let resolver = Arc::clone(&self.resolver);
            let graph = self.graph.clone();
            let update_token = token.clone();
            let changed = documents.clone();
            let result = blocking("graph update", move || -> Result<_> {
                let mut graph = graph.write()?;
                Ok(graph.update(resolver.as_ref(), &universe, &changed, &update_token))
            })
            .await
            .and_then(|summary| summary);

            let mut state = self.state.lock();
            let summary = match result {
                Ok(summary) => summary,
                Err(err) => {
                    // the graph may be half updated; resolve these again
                    state.documents.extend(documents);
                    state.annotations_stale = true;
                    state.materialize_requested = true;
                    return Err(err);
                }
            };
            if summary.has_changes() {
                state.annotations_stale = true;
                state.materialize_requested = true;
            }
            if summary.cancelled {
                state.documents.extend(documents);
                return Ok(());
            }
            info!(
                pass = epoch,
                documents = documents.len(),
                touched = summary.touched.len(),
                created = summary.created.len(),
                removed = summary.removed.len(),
                "graph updated"
            );
        }

        // ── annotations ────────────────────────────────────────────────
        let annotate = self.state.lock().annotations_stale;
        if annotate {
            if let Some(vcs) = &self.vcs {
                if !self.enter(epoch, token, Phase::VcsStatus) {
                    return Ok(());
                }
                let vcs = Arc::clone(vcs);
                let graph = self.graph.clone();
                let vcs_token = token.clone();
                let changed = blocking("vcs status", move || -> Result<_> {
                    let mut graph = graph.write()?;
                    Ok(annotate_vcs_status(&mut graph, vcs.as_ref(), &vcs_token))
                })
                .await??;
                let Some(changed) = changed else {
                    return Ok(());
                };
                debug!(pass = epoch, changed = changed.len(), "vcs status refreshed");
                self.state
                    .lock()
                    .pending
                    .push(Box::new(SetCategoryMembers::new(Category::Changed, changed)));
            }
            if self.important_types > 0 {
                if !self.enter(epoch, token, Phase::ImportanceRanking) {
                    return Ok(());
                }
                let graph = self.graph.clone();
                let top_n = self.important_types;
                let ranking = blocking("importance ranking", move || -> Result<_> {
                    let mut graph = graph.write()?;
                    annotate_scores(&mut graph);
                    Ok(rank_types(&graph, top_n))
                })
                .await??;
                self.state
                    .lock()
                    .pending
                    .push(Box::new(UpdateImportantTypes::from_ranking(&ranking)));
            }
            self.state.lock().annotations_stale = false;
        }

        // ── statistics ─────────────────────────────────────────────────
        let reply = self.state.lock().statistics.take();
        if let Some(reply) = reply {
            if !self.enter(epoch, token, Phase::Statistics) {
                self.restore_statistics(reply);
                return Ok(());
            }
            let graph = self.graph.clone();
            let statistics =
                blocking("statistics", move || GraphStatistics::compute(&graph.read())).await?;
            let _ = reply.send(Some(statistics));
        }

        // ── active selection ───────────────────────────────────────────
        let selection_dirty = self.state.lock().selection_dirty;
        if selection_dirty {
            if !self.enter(epoch, token, Phase::ActiveSelection) {
                return Ok(());
            }
            let mut state = self.state.lock();
            state.selection_dirty = false;
            let operation: Box<dyn Operation> = match &state.selection {
                Some(keys) => Box::new(SetSelected::new(keys.iter().cloned())),
                None => Box::new(ClearSelected),
            };
            state.pending.push(operation);
        }

        // ── subgraph operations ────────────────────────────────────────
        let run_batch = {
            let state = self.state.lock();
            !state.pending.is_empty() || state.materialize_requested
        };
        if run_batch {
            if !self.enter(epoch, token, Phase::SubgraphOperations) {
                return Ok(());
            }
            let batch: OperationBatch = std::mem::take(&mut self.state.lock().pending)
                .into_iter()
                .collect();
            let graph = self.graph.clone();
            let subgraph = Arc::clone(&self.subgraph);
            let batch_token = token.clone();
            let (batch, outcome) = blocking("subgraph operations", move || {
                let graph = graph.read();
                let mut subgraph = subgraph.lock();
                let outcome = batch.apply(&graph, &mut subgraph, &batch_token);
                (batch, outcome)
            })
            .await?;
            debug!(
                pass = epoch,
                applied = outcome.applied,
                changed = outcome.changed,
                "subgraph batch applied"
            );

            let mut state = self.state.lock();
            if outcome.changed {
                state.materialize_requested = true;
            }
            if outcome.cancelled {
                let mut remaining = batch.into_remaining(outcome.applied);
                remaining.append(&mut state.pending);
                state.pending = remaining;
                return Ok(());
            }
        }

        // ── materialize ────────────────────────────────────────────────
        let sequence = {
            let state = self.state.lock();
            state.materialize_requested.then_some(state.sequence + 1)
        };
        let Some(sequence) = sequence else {
            let _ = self
                .events
                .send(OrchestratorEvent::PassCompletedUnchanged { pass: epoch });
            return Ok(());
        };
        if !self.enter(epoch, token, Phase::Materialize) {
            return Ok(());
        }
        let graph = self.graph.clone();
        let subgraph = Arc::clone(&self.subgraph);
        let snapshot = blocking("materialize", move || {
            MaterializedGraph::build(sequence, &graph.read(), &subgraph.lock())
        })
        .await?;
        {
            let mut state = self.state.lock();
            if token.is_cancelled() || state.epoch != epoch {
                return Ok(());
            }
            state.sequence = sequence;
            state.materialize_requested = false;
        }
        info!(
            pass = epoch,
            sequence,
            nodes = snapshot.nodes.len(),
            edges = snapshot.edges.len(),
            "subgraph changed"
        );
        let _ = self
            .events
            .send(OrchestratorEvent::SubgraphChanged(Arc::new(snapshot)));
        Ok(())
    }

    /// Put a statistics reply back unless a newer request took its place.
    fn restore_statistics(&self, reply: StatisticsReply) {
        let mut state = self.state.lock();
        if state.statistics.is_none() && state.phase != Phase::Inactive {
            state.statistics = Some(reply);
        } else {
            let _ = reply.send(None);
        }
    }

    fn finish(self: &Arc<Self>, epoch: u64, token: &PassToken, result: Result<()>) {
        let mut state = self.state.lock();
        let current = state.epoch == epoch && state.phase != Phase::Inactive;

        let failed = match result {
            Ok(()) => false,
            Err(err) => {
                if token.is_cancelled() {
                    debug!(pass = epoch, error = %err, "cancelled pass failed");
                } else {
                    error!(pass = epoch, error = ?err, "pass failed");
                    let _ = self.events.send(OrchestratorEvent::PassFailed {
                        pass: epoch,
                        error: Arc::new(err),
                    });
                }
                true
            }
        };
        if !current {
            return;
        }

        state.phase = Phase::Idle;
        state.running = None;
        let immediate = !state.pending.is_empty()
            || state.rerun
            || state.statistics.is_some()
            || state.selection_dirty
            || state.materialize_requested;
        // idle-gated: the rebuild and update phases wait on their timers
        let deferred = state.graph_invalid || !state.documents.is_empty();
        if failed {
            state.rerun = false;
            state.failures += 1;
            if !(immediate || deferred) || state.failures > FAILURE_RETRIES {
                debug!(pass = epoch, failures = state.failures, "giving up until new work");
                if let Some(reply) = state.statistics.take() {
                    let _ = reply.send(None);
                }
                return;
            }
            // wait for a quiet workspace before trying again
            self.graph_idle.touch();
            self.document_idle.touch();
        } else {
            state.failures = 0;
        }
        if immediate || deferred {
            debug!(pass = epoch, immediate, deferred, "rerunning");
            self.start_pass(&mut state);
        } else {
            debug!(pass = epoch, "pass finished");
        }
    }
}
