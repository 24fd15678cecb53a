//! Queued subgraph mutations and their batch application

mod category;
mod hierarchy;
mod importance;
mod selection;

pub use category::{
    AddPinned, AddToCategory, ClearCategory, ClearCategoryLeaveUnpinned, RemoveFromCategory,
    Sanitize, SetCategoryMembers, TogglePinned,
};
pub use hierarchy::{AllNodes, DirectHierarchy, Direction, SameProject, TransitiveHierarchy};
pub use importance::UpdateImportantTypes;
pub use selection::{ClearSelected, PinWithNeighbours, SetSelected};

use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::subgraph::Subgraph;
use std::fmt;
use tracing::debug;

/// A stateless command describing one subgraph mutation.
pub trait Operation: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Apply against `graph`; returns whether the subgraph changed.
    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, token: &PassToken) -> bool;
}

/// Outcome of [`OperationBatch::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub changed: bool,
    pub applied: usize,
    pub cancelled: bool,
}

/// Pending operations applied to one subgraph as a single unit of work.
///
/// A [`Sanitize`] always runs first so later operations never see members
/// the graph has dropped.
#[derive(Debug, Default)]
pub struct OperationBatch {
    operations: Vec<Box<dyn Operation>>,
}

impl OperationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: Box<dyn Operation>) {
        self.operations.push(operation);
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The operations after the first `applied`, for requeueing.
    pub fn into_remaining(self, applied: usize) -> Vec<Box<dyn Operation>> {
        self.operations.into_iter().skip(applied).collect()
    }

    pub fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, token: &PassToken) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            changed: Sanitize.apply(graph, subgraph, token),
            ..BatchOutcome::default()
        };
        for operation in &self.operations {
            if token.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let changed = operation.apply(graph, subgraph, token);
            debug!(operation = operation.name(), changed, "applied subgraph operation");
            outcome.changed |= changed;
            // an interrupted operation may be incomplete; it is not counted
            if token.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            outcome.applied += 1;
        }
        outcome
    }
}

impl FromIterator<Box<dyn Operation>> for OperationBatch {
    fn from_iter<I: IntoIterator<Item = Box<dyn Operation>>>(iter: I) -> Self {
        OperationBatch {
            operations: iter.into_iter().collect(),
        }
    }
}
