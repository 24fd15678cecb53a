//! Version-control status lookup

use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::model::{NodeKey, VcsStatus};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Reports the version-control status of source files.
pub trait VcsStatusProvider: Send + Sync {
    /// Status of each path; paths without an entry are unmodified.
    fn status(&self, paths: &[PathBuf]) -> HashMap<PathBuf, VcsStatus>;
}

/// A fixed path → status table.
#[derive(Debug, Clone, Default)]
pub struct StaticVcsStatus {
    entries: HashMap<PathBuf, VcsStatus>,
}

impl StaticVcsStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<PathBuf>, status: VcsStatus) -> Self {
        self.set(path, status);
        self
    }

    pub fn set(&mut self, path: impl Into<PathBuf>, status: VcsStatus) {
        self.entries.insert(path.into(), status);
    }

    pub fn get(&self, path: &Path) -> VcsStatus {
        self.entries.get(path).copied().unwrap_or_default()
    }
}

impl VcsStatusProvider for StaticVcsStatus {
    fn status(&self, paths: &[PathBuf]) -> HashMap<PathBuf, VcsStatus> {
        paths
            .iter()
            .filter_map(|path| self.entries.get(path).map(|s| (path.clone(), *s)))
            .collect()
    }
}

/// Combine the statuses of a node's files; any change wins over unmodified,
/// and an added file wins over the rest.
pub fn combined_status<'a>(statuses: impl IntoIterator<Item = &'a VcsStatus>) -> VcsStatus {
    statuses
        .into_iter()
        .copied()
        .fold(VcsStatus::Unmodified, |acc, status| match (acc, status) {
            (VcsStatus::Added, _) | (_, VcsStatus::Added) => VcsStatus::Added,
            (VcsStatus::Unmodified, other) => other,
            (current, _) => current,
        })
}

/// Fetch the status of every indexed file and write it onto the nodes.
///
/// Returns the keys of nodes with a changed status, or `None` when the
/// token was cancelled before anything was written.
pub fn annotate_vcs_status(
    graph: &mut Graph,
    provider: &dyn VcsStatusProvider,
    token: &PassToken,
) -> Option<BTreeSet<NodeKey>> {
    let paths: Vec<PathBuf> = graph.files().cloned().collect();
    let statuses = provider.status(&paths);
    if token.is_cancelled() {
        return None;
    }

    let keys: Vec<NodeKey> = graph.keys().cloned().collect();
    let mut changed = BTreeSet::new();
    for key in keys {
        let status = graph
            .node(&key)
            .map(|node| combined_status(node.files.iter().filter_map(|p| statuses.get(p))))
            .unwrap_or_default();
        graph.set_vcs_status(&key, status);
        if status.is_changed() {
            changed.insert(key);
        }
    }
    Some(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fixture_graph, keys};

    #[test]
    fn test_static_status_omits_unknown_paths() {
        let provider = StaticVcsStatus::new().with("src/A.cs", VcsStatus::Modified);
        let status = provider.status(&[PathBuf::from("src/A.cs"), PathBuf::from("src/B.cs")]);
        assert_eq!(status.len(), 1);
        assert_eq!(status[Path::new("src/A.cs")], VcsStatus::Modified);
        assert_eq!(provider.get(Path::new("src/B.cs")), VcsStatus::Unmodified);
    }

    #[test]
    fn test_combined_status() {
        use VcsStatus::*;
        assert_eq!(combined_status(std::iter::empty()), Unmodified);
        assert_eq!(combined_status(&[Unmodified, Modified]), Modified);
        assert_eq!(combined_status(&[Modified, Added, Untracked]), Added);
        assert_eq!(combined_status(&[Untracked, Modified]), Untracked);
    }

    #[test]
    fn test_annotate_vcs_status() {
        let mut graph = fixture_graph();
        let provider = StaticVcsStatus::new()
            .with("src/AB.cs", VcsStatus::Modified)
            .with("src/AG.cs", VcsStatus::Added);
        let changed = annotate_vcs_status(&mut graph, &provider, &PassToken::detached()).unwrap();
        // AGInner is declared in AG's file
        assert_eq!(changed.into_iter().collect::<Vec<_>>(), keys(["AB", "AG", "AGInner"]));
        assert_eq!(graph.node(&NodeKey::from("AG")).unwrap().vcs_status, VcsStatus::Added);

        let provider = StaticVcsStatus::new();
        let changed = annotate_vcs_status(&mut graph, &provider, &PassToken::detached()).unwrap();
        assert!(changed.is_empty());
        assert_eq!(graph.node(&NodeKey::from("AB")).unwrap().vcs_status, VcsStatus::Unmodified);
    }
}
