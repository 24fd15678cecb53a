use std::sync::Arc;
use trellis_core::MaterializedGraph;

/// Notifications published by the orchestrator.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    PassStarted { pass: u64 },
    /// A new snapshot of the subgraph.
    SubgraphChanged(Arc<MaterializedGraph>),
    PassFailed { pass: u64, error: Arc<anyhow::Error> },
    PassCompletedUnchanged { pass: u64 },
}

impl OrchestratorEvent {
    pub fn is_subgraph_changed(&self) -> bool {
        matches!(self, OrchestratorEvent::SubgraphChanged(_))
    }
}
