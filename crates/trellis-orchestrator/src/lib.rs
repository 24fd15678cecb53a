//! Trellis orchestrator - keeps a dependency graph and its subgraph
//! current while the workspace changes underneath it.

pub mod error;
pub mod events;
pub mod idle;
pub mod orchestrator;
pub mod phase;
pub mod watcher;

pub use error::OrchestratorError;
pub use events::OrchestratorEvent;
pub use idle::IdleTimer;
pub use orchestrator::{Orchestrator, OrchestratorOptions};
pub use phase::Phase;
pub use watcher::WorkspaceWatcher;
