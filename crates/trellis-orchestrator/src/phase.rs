use std::fmt;

/// Where a pass is. Passes only move forward through this order, skipping
/// phases with nothing to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Phase {
    /// Shut down; entry points are ignored.
    Inactive,
    #[default]
    Idle,
    GraphRebuild,
    IncrementalUpdate,
    VcsStatus,
    ImportanceRanking,
    Statistics,
    ActiveSelection,
    SubgraphOperations,
    Materialize,
}

impl Phase {
    pub fn is_running(self) -> bool {
        self > Phase::Idle
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Inactive => "inactive",
            Phase::Idle => "idle",
            Phase::GraphRebuild => "graph-rebuild",
            Phase::IncrementalUpdate => "incremental-update",
            Phase::VcsStatus => "vcs-status",
            Phase::ImportanceRanking => "importance-ranking",
            Phase::Statistics => "statistics",
            Phase::ActiveSelection => "active-selection",
            Phase::SubgraphOperations => "subgraph-operations",
            Phase::Materialize => "materialize",
        };
        f.write_str(name)
    }
}
