use std::path::PathBuf;
use thiserror::Error;
use trellis_core::WorkspaceError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("the orchestrator must be created inside a tokio runtime")]
    NoRuntime,
    #[error("failed to watch {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}
