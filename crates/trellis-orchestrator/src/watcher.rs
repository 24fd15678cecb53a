//! Workspace model file watcher

use crate::error::OrchestratorError;
use crate::orchestrator::Orchestrator;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use trellis_core::{MemoryWorkspace, WorkspaceChange, WorkspaceModel};

/// Events arriving this close together are handled as one reload.
const SETTLE: Duration = Duration::from_millis(50);

/// Reloads a workspace model file when it changes on disk and tells the
/// orchestrator what moved.
pub struct WorkspaceWatcher {
    // dropping the watcher stops the notifications
    _watcher: RecommendedWatcher,
    event_rx: mpsc::UnboundedReceiver<()>,
    model_path: PathBuf,
    workspace: Arc<MemoryWorkspace>,
    orchestrator: Orchestrator,
}

impl fmt::Debug for WorkspaceWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceWatcher")
            .field("model_path", &self.model_path)
            .finish_non_exhaustive()
    }
}

impl WorkspaceWatcher {
    /// Watch `model_path`. Its directory is watched rather than the file so
    /// that editors replacing the file by rename are still seen.
    pub fn new(
        model_path: impl AsRef<Path>,
        workspace: Arc<MemoryWorkspace>,
        orchestrator: Orchestrator,
    ) -> Result<Self, OrchestratorError> {
        let model_path = model_path.as_ref().to_path_buf();
        let directory = match model_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = model_path.file_name().map(|name| name.to_os_string());

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if concerns_model(&event, file_name.as_ref()) {
                        debug!(kind = ?event.kind, "workspace model touched");
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => error!("workspace watch error: {}", e),
            },
        )
        .map_err(|source| OrchestratorError::Watch {
            path: directory.clone(),
            source,
        })?;
        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|source| OrchestratorError::Watch {
                path: directory.clone(),
                source,
            })?;
        info!("Watching workspace model: {:?}", model_path);

        Ok(WorkspaceWatcher {
            _watcher: watcher,
            event_rx,
            model_path,
            workspace,
            orchestrator,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// Load the model file and forward the differences to the orchestrator.
    pub fn reload(&self) -> Result<WorkspaceChange, OrchestratorError> {
        let model = WorkspaceModel::load(&self.model_path)?;
        let change = self.workspace.apply(model)?;
        dispatch(&self.orchestrator, &change);
        Ok(change)
    }

    /// Handle changes until the watcher's event source closes.
    ///
    /// A model that fails to load (typically half-written) is skipped; the
    /// next write triggers another attempt.
    pub async fn run(mut self) {
        while self.event_rx.recv().await.is_some() {
            tokio::time::sleep(SETTLE).await;
            while self.event_rx.try_recv().is_ok() {}

            match self.reload() {
                Ok(change) if change.is_empty() => debug!("workspace model unchanged"),
                Ok(change) => info!(
                    documents = change.documents.len(),
                    projects_changed = change.projects_changed,
                    "workspace model reloaded"
                ),
                Err(e) => warn!("Failed to reload {}: {}", self.model_path.display(), e),
            }
        }
    }
}

/// Project set changes rebuild the graph; anything else is per document.
pub fn dispatch(orchestrator: &Orchestrator, change: &WorkspaceChange) {
    if change.projects_changed {
        orchestrator.invalidate_graph();
        return;
    }
    for path in &change.documents {
        orchestrator.invalidate_document(path.clone());
    }
}

fn concerns_model(event: &notify::Event, file_name: Option<&OsString>) -> bool {
    let relevant = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_) | notify::EventKind::Remove(_)
    );
    relevant
        && event
            .paths
            .iter()
            .any(|path| path.file_name().map(|name| name.to_os_string()).as_ref() == file_name)
}
