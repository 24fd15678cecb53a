//! File path → declared node index for incremental updates

use crate::model::NodeKey;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

/// Secondary index from a source file to the nodes it declares.
#[derive(Debug, Default, Clone)]
pub struct FileIndex {
    files: HashMap<PathBuf, BTreeSet<NodeKey>>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` declares `key`.
    pub fn insert(&mut self, path: PathBuf, key: NodeKey) {
        self.files.entry(path).or_default().insert(key);
    }

    /// Forget one declaration; drops the file entry once it is empty.
    pub fn remove(&mut self, path: &Path, key: &NodeKey) {
        if let Some(keys) = self.files.get_mut(path) {
            keys.remove(key);
            if keys.is_empty() {
                self.files.remove(path);
            }
        }
    }

    /// Nodes declared in a file, in key order.
    pub fn nodes_in_file(&self, path: &Path) -> Vec<NodeKey> {
        self.files
            .get(path)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, path: &Path, key: &NodeKey) -> bool {
        self.files.get(path).is_some_and(|keys| keys.contains(key))
    }

    /// Every indexed file.
    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    /// Every (file, node) pair.
    pub fn entries(&self) -> impl Iterator<Item = (&PathBuf, &NodeKey)> {
        self.files
            .iter()
            .flat_map(|(path, keys)| keys.iter().map(move |k| (path, k)))
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let mut index = FileIndex::new();
        let path = PathBuf::from("src/A.cs");
        index.insert(path.clone(), NodeKey::from("A"));
        index.insert(path.clone(), NodeKey::from("AInner"));
        assert_eq!(
            index.nodes_in_file(&path),
            vec![NodeKey::from("A"), NodeKey::from("AInner")]
        );

        index.remove(&path, &NodeKey::from("A"));
        assert!(!index.contains(&path, &NodeKey::from("A")));
        assert_eq!(index.file_count(), 1);

        index.remove(&path, &NodeKey::from("AInner"));
        assert_eq!(index.file_count(), 0);
        assert!(index.nodes_in_file(&path).is_empty());
    }
}
