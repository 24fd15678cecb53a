//! Trellis core: type dependency graph, subgraph model and operations

pub mod cancel;
pub mod config;
pub mod error;
pub mod graph;
pub mod materialize;
pub mod model;
pub mod operations;
pub mod ranking;
pub mod resolver;
pub mod stats;
pub mod subgraph;
pub mod symbols;
pub mod update;
pub mod vcs;
pub mod workspace;


#[cfg(test)]
pub mod test_utils;

pub use cancel::{PassToken, SerialCancellation};
pub use config::{CONFIG_FILE, TrellisConfig};
pub use error::{ConfigError, GraphError, WorkspaceError};
pub use graph::{Graph, GraphWriteGuard, SharedGraph};
pub use materialize::{MaterializedGraph, MaterializedNode};
pub use model::{Link, Node, NodeKey, NodeVariant, ProjectId, Relationship, TypeKind, TypeNode, VcsStatus};
pub use operations::{Operation, OperationBatch};
pub use ranking::{RankedType, rank_types};
pub use resolver::{SourceResolver, TypeSymbol, Universe};
pub use stats::{GraphStatistics, SubgraphStatistics};
pub use subgraph::{Category, Importance, Inclusion, Membership, NodeFilter, PinState, Subgraph, TypeFilter};
pub use symbols::FileIndex;
pub use update::UpdateSummary;
pub use vcs::{StaticVcsStatus, VcsStatusProvider};
pub use workspace::{
    DocumentModel, MemoryWorkspace, ProjectModel, TypeDecl, WorkspaceChange, WorkspaceModel,
};
