//! Graph wrapper using petgraph::StableDiGraph keyed by NodeKey
//!
//! Arena edges point from a dependent to its dependency. A node's forward
//! links are its outgoing edges and its back links the incoming ones, so
//! every link is visible from both ends by construction.

use crate::error::GraphError;
use crate::model::*;
use crate::resolver::TypeSymbol;
use crate::symbols::FileIndex;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// The type dependency graph.
#[derive(Default)]
pub struct Graph {
    inner: StableDiGraph<Node, Relationship>,
    index: HashMap<NodeKey, NodeIndex>,
    files: FileIndex,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("node_count", &self.inner.node_count())
            .field("link_count", &self.inner.edge_count())
            .field("file_count", &self.files.file_count())
            .finish()
    }
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes.
    pub fn node_count(&self) -> usize {
        self.inner.node_count()
    }

    /// Total number of links.
    pub fn link_count(&self) -> usize {
        self.inner.edge_count()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.index.contains_key(key)
    }

    /// Get a node by key.
    pub fn node(&self, key: &NodeKey) -> Option<&Node> {
        let idx = *self.index.get(key)?;
        self.inner.node_weight(idx)
    }

    /// Iterate over all nodes.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner
            .node_indices()
            .filter_map(move |idx| self.inner.node_weight(idx))
    }

    /// Iterate over all node keys.
    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.index.keys()
    }

    /// Iterate over every link once.
    pub fn links(&self) -> impl Iterator<Item = Link> + '_ {
        self.inner
            .edge_references()
            .map(move |e| self.link_of(e.source(), e.target(), *e.weight()))
    }

    /// Links to the node's dependencies.
    pub fn forward_links(&self, key: &NodeKey) -> Vec<Link> {
        self.links_directed(key, Direction::Outgoing)
    }

    /// Links from the node's dependents.
    pub fn back_links(&self, key: &NodeKey) -> Vec<Link> {
        self.links_directed(key, Direction::Incoming)
    }

    /// Dependencies of a node with the relationship to each.
    pub fn dependencies(&self, key: &NodeKey) -> impl Iterator<Item = (&NodeKey, Relationship)> {
        self.neighbours(key, Direction::Outgoing)
    }

    /// Dependents of a node with their relationship to it.
    pub fn dependents(&self, key: &NodeKey) -> impl Iterator<Item = (&NodeKey, Relationship)> {
        self.neighbours(key, Direction::Incoming)
    }

    pub fn dependency_count(&self, key: &NodeKey) -> usize {
        self.degree(key, Direction::Outgoing)
    }

    pub fn dependent_count(&self, key: &NodeKey) -> usize {
        self.degree(key, Direction::Incoming)
    }

    /// Relationship of `dependent` to `dependency`, if they are linked.
    pub fn relationship(&self, dependent: &NodeKey, dependency: &NodeKey) -> Option<Relationship> {
        let from = *self.index.get(dependent)?;
        let to = *self.index.get(dependency)?;
        let edge = self.inner.find_edge(from, to)?;
        self.inner.edge_weight(edge).copied()
    }

    /// Nodes declared in a file.
    pub fn nodes_in_file(&self, path: &Path) -> Vec<&Node> {
        self.files
            .nodes_in_file(path)
            .iter()
            .filter_map(|key| self.node(key))
            .collect()
    }

    /// Keys of the nodes declared in a file.
    pub fn keys_in_file(&self, path: &Path) -> Vec<NodeKey> {
        self.files.nodes_in_file(path)
    }

    /// Every file that declares at least one node.
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.paths()
    }

    pub fn set_vcs_status(&mut self, key: &NodeKey, status: VcsStatus) -> bool {
        match self.node_mut(key) {
            Some(node) if node.vcs_status != status => {
                node.vcs_status = status;
                true
            }
            _ => false,
        }
    }

    /// Store a display value on a node.
    pub fn annotate(&mut self, key: &NodeKey, name: &str, value: impl Into<String>) {
        if let Some(node) = self.node_mut(key) {
            node.annotations.insert(name.to_string(), value.into());
        }
    }

    /// Check the structural invariants; used by tests and debug tooling.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (key, &idx) in &self.index {
            match self.inner.node_weight(idx) {
                Some(node) if &node.key == key => {}
                _ => return Err(GraphError::Corrupt(format!("index entry {key} is dangling"))),
            }
        }
        if self.index.len() != self.inner.node_count() {
            return Err(GraphError::Corrupt("node without index entry".to_string()));
        }
        for edge in self.inner.edge_references() {
            if edge.source() == edge.target() {
                let key = &self.inner[edge.source()].key;
                return Err(GraphError::Corrupt(format!("self link on {key}")));
            }
        }
        for (path, key) in self.files.entries() {
            match self.node(key) {
                Some(node) if node.files.contains(path) => {}
                _ => {
                    return Err(GraphError::Corrupt(format!(
                        "file index entry {} -> {key} has no matching node",
                        path.display()
                    )));
                }
            }
        }
        for node in self.nodes() {
            for path in &node.files {
                if !self.files.contains(path, &node.key) {
                    return Err(GraphError::Corrupt(format!(
                        "{} is not indexed under {}",
                        node.key,
                        path.display()
                    )));
                }
            }
        }
        Ok(())
    }

    // ── Mutation (crate-internal; driven by build and update) ──────────

    pub(crate) fn node_mut(&mut self, key: &NodeKey) -> Option<&mut Node> {
        let idx = *self.index.get(key)?;
        self.inner.node_weight_mut(idx)
    }

    /// Fetch the node for a symbol, creating it on first encounter.
    /// Returns `true` when the node was created.
    pub(crate) fn get_or_insert(&mut self, symbol: &TypeSymbol) -> bool {
        if self.index.contains_key(&symbol.key) {
            return false;
        }
        let node = Node::from_symbol(symbol);
        for path in &node.files {
            self.files.insert(path.clone(), node.key.clone());
        }
        let key = node.key.clone();
        let idx = self.inner.add_node(node);
        self.index.insert(key, idx);
        true
    }

    /// Refresh the descriptive fields of a node from its symbol.
    pub(crate) fn refresh(&mut self, symbol: &TypeSymbol) {
        if let Some(node) = self.node_mut(&symbol.key) {
            node.variant = Node::from_symbol(symbol).variant;
        }
    }

    /// Add or re-weight the link `dependent -> dependency`.
    ///
    /// Returns `false` for self links, unknown endpoints, or when the same
    /// link already exists.
    pub(crate) fn link(
        &mut self,
        dependent: &NodeKey,
        dependency: &NodeKey,
        relationship: Relationship,
    ) -> bool {
        if dependent == dependency {
            return false;
        }
        let (Some(&from), Some(&to)) = (self.index.get(dependent), self.index.get(dependency))
        else {
            return false;
        };
        match self.inner.find_edge(from, to) {
            Some(edge) if self.inner[edge] == relationship => false,
            Some(edge) => {
                self.inner[edge] = relationship;
                true
            }
            None => {
                self.inner.add_edge(from, to, relationship);
                true
            }
        }
    }

    /// Remove the link `dependent -> dependency`, returning its relationship.
    pub(crate) fn unlink(&mut self, dependent: &NodeKey, dependency: &NodeKey) -> Option<Relationship> {
        let from = *self.index.get(dependent)?;
        let to = *self.index.get(dependency)?;
        let edge = self.inner.find_edge(from, to)?;
        self.inner.remove_edge(edge)
    }

    /// Replace a node's associated files, keeping the file index in step.
    /// Returns the (added, removed) files.
    pub(crate) fn set_files(
        &mut self,
        key: &NodeKey,
        fresh: &[PathBuf],
    ) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let Some(node) = self.node_mut(key) else {
            return (Vec::new(), Vec::new());
        };
        let old: BTreeSet<PathBuf> = node.files.iter().cloned().collect();
        let new: BTreeSet<PathBuf> = fresh.iter().cloned().collect();
        if old == new {
            return (Vec::new(), Vec::new());
        }
        node.files = new.iter().cloned().collect();

        let added: Vec<PathBuf> = new.difference(&old).cloned().collect();
        let removed: Vec<PathBuf> = old.difference(&new).cloned().collect();
        for path in &added {
            self.files.insert(path.clone(), key.clone());
        }
        for path in &removed {
            self.files.remove(path, key);
        }
        (added, removed)
    }

    /// Unlink and remove a node. Returns its former dependencies and
    /// dependents.
    pub(crate) fn remove_node(&mut self, key: &NodeKey) -> Option<(Vec<NodeKey>, Vec<NodeKey>)> {
        let idx = self.index.remove(key)?;
        let dependencies = self
            .inner
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.inner[n].key.clone())
            .collect();
        let dependents = self
            .inner
            .neighbors_directed(idx, Direction::Incoming)
            .map(|n| self.inner[n].key.clone())
            .collect();
        // StableDiGraph drops both edge directions with the node.
        let node = self.inner.remove_node(idx)?;
        for path in &node.files {
            self.files.remove(path, key);
        }
        Some((dependencies, dependents))
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn link_of(&self, dependent: NodeIndex, dependency: NodeIndex, relationship: Relationship) -> Link {
        Link::new(
            self.inner[dependency].key.clone(),
            self.inner[dependent].key.clone(),
            relationship,
        )
    }

    fn links_directed(&self, key: &NodeKey, direction: Direction) -> Vec<Link> {
        let Some(&idx) = self.index.get(key) else {
            return Vec::new();
        };
        let mut links: Vec<Link> = self
            .inner
            .edges_directed(idx, direction)
            .map(|e| self.link_of(e.source(), e.target(), *e.weight()))
            .collect();
        links.sort();
        links
    }

    fn neighbours(
        &self,
        key: &NodeKey,
        direction: Direction,
    ) -> impl Iterator<Item = (&NodeKey, Relationship)> {
        self.index.get(key).into_iter().flat_map(move |&idx| {
            self.inner.edges_directed(idx, direction).map(move |e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (&self.inner[other].key, *e.weight())
            })
        })
    }

    fn degree(&self, key: &NodeKey, direction: Direction) -> usize {
        self.index
            .get(key)
            .map_or(0, |&idx| self.inner.edges_directed(idx, direction).count())
    }
}

/// A graph shared between the orchestrator and its background work.
///
/// Only one update may hold the graph at a time: a second call to
/// [`SharedGraph::write`] fails instead of queueing behind the first. Readers
/// never make an update fail, they only delay it.
#[derive(Debug, Clone, Default)]
pub struct SharedGraph {
    graph: Arc<RwLock<Graph>>,
    updating: Arc<AtomicBool>,
}

impl SharedGraph {
    pub fn new(graph: Graph) -> Self {
        SharedGraph {
            graph: Arc::new(RwLock::new(graph)),
            updating: Arc::default(),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Graph> {
        self.graph.read()
    }

    /// Shared access without waiting on a running update.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Graph>> {
        self.graph.try_read()
    }

    /// Exclusive access for an update.
    ///
    /// Blocks until current readers let go, so call it from a blocking
    /// context rather than an async task.
    pub fn write(&self) -> Result<GraphWriteGuard<'_>, GraphError> {
        self.updating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| GraphError::UpdateInProgress)?;
        Ok(GraphWriteGuard {
            graph: self.graph.write(),
            updating: &self.updating,
        })
    }

    /// Whether an update currently holds or waits for the graph.
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    pub fn ptr_eq(&self, other: &SharedGraph) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
    }
}

/// Write access handed out by [`SharedGraph::write`].
pub struct GraphWriteGuard<'a> {
    graph: RwLockWriteGuard<'a, Graph>,
    updating: &'a AtomicBool,
}

impl Deref for GraphWriteGuard<'_> {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        &self.graph
    }
}

impl DerefMut for GraphWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }
}

impl Drop for GraphWriteGuard<'_> {
    fn drop(&mut self) {
        self.updating.store(false, Ordering::Release);
    }
}
