//! Full build and incremental update of the graph from resolver output

use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::model::{NodeKey, Relationship};
use crate::resolver::{SourceResolver, TypeSymbol, Universe};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::PathBuf;
use tracing::{debug, info};

/// What an incremental update did to the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSummary {
    /// Nodes whose links or files changed, including both ends of every
    /// added or removed link.
    pub touched: BTreeSet<NodeKey>,
    pub created: BTreeSet<NodeKey>,
    pub removed: BTreeSet<NodeKey>,
    pub links_added: usize,
    pub links_removed: usize,
    pub files_changed: usize,
    /// The update stopped early; applied mutations were kept.
    pub cancelled: bool,
}

impl UpdateSummary {
    pub fn has_changes(&self) -> bool {
        !self.touched.is_empty()
            || !self.created.is_empty()
            || !self.removed.is_empty()
            || self.files_changed > 0
    }
}

/// FIFO of nodes to re-resolve, each admitted at most once per update.
#[derive(Default)]
struct Invalidation {
    queue: VecDeque<NodeKey>,
    seen: HashSet<NodeKey>,
}

impl Invalidation {
    fn push(&mut self, key: NodeKey) {
        if self.seen.insert(key.clone()) {
            self.queue.push_back(key);
        }
    }

    fn pop(&mut self) -> Option<NodeKey> {
        self.queue.pop_front()
    }
}

impl Graph {
    /// Build a graph over every included project.
    ///
    /// Returns `None` when the token is cancelled part-way.
    pub fn build(
        resolver: &dyn SourceResolver,
        universe: &Universe,
        token: &PassToken,
    ) -> Option<Graph> {
        let mut graph = Graph::new();
        let mut visited: HashSet<NodeKey> = HashSet::new();

        for project in universe.projects(resolver) {
            for path in resolver.documents(&project) {
                if token.is_cancelled() {
                    debug!(project = %project, "graph build cancelled");
                    return None;
                }
                for symbol in resolver.declared_types(&path) {
                    if !universe.contains(&symbol) || !visited.insert(symbol.key.clone()) {
                        continue;
                    }
                    graph.get_or_insert(&symbol);
                    graph.link_dependencies(resolver, universe, &symbol);
                }
            }
        }

        info!(
            nodes = graph.node_count(),
            links = graph.link_count(),
            "graph built"
        );
        Some(graph)
    }

    /// Bring the graph in line with the resolver after `documents` changed.
    ///
    /// Only nodes declared in (or previously declared in) the changed
    /// documents are re-resolved, plus the direct dependents of any node
    /// whose dependency set changed.
    pub fn update(
        &mut self,
        resolver: &dyn SourceResolver,
        universe: &Universe,
        documents: &[PathBuf],
        token: &PassToken,
    ) -> UpdateSummary {
        let mut summary = UpdateSummary::default();
        let mut invalid = Invalidation::default();

        for path in documents {
            if token.is_cancelled() {
                summary.cancelled = true;
                return summary;
            }
            let declared: Vec<TypeSymbol> = resolver
                .declared_types(path)
                .into_iter()
                .filter(|s| universe.contains(s))
                .collect();
            let declared_keys: HashSet<&NodeKey> = declared.iter().map(|s| &s.key).collect();

            for key in self.keys_in_file(path) {
                if !declared_keys.contains(&key) {
                    invalid.push(key);
                }
            }
            for symbol in &declared {
                if self.get_or_insert(symbol) {
                    summary.created.insert(symbol.key.clone());
                }
                invalid.push(symbol.key.clone());
            }
        }

        while let Some(key) = invalid.pop() {
            if token.is_cancelled() {
                debug!(pending = invalid.queue.len(), "graph update cancelled");
                summary.cancelled = true;
                return summary;
            }

            let Some(symbol) = resolver.resolve(&key).filter(|s| universe.contains(s)) else {
                let Some((dependencies, dependents)) = self.remove_node(&key) else {
                    continue;
                };
                debug!(node = %key, "node removed");
                summary.links_removed += dependencies.len() + dependents.len();
                summary.touched.extend(dependencies);
                for dependent in dependents {
                    summary.touched.insert(dependent.clone());
                    invalid.push(dependent);
                }
                summary.created.remove(&key);
                summary.touched.remove(&key);
                summary.removed.insert(key);
                continue;
            };

            self.refresh(&symbol);
            let (added_files, removed_files) = self.set_files(&key, &symbol.files);
            if !added_files.is_empty() || !removed_files.is_empty() {
                summary.files_changed += added_files.len() + removed_files.len();
                summary.touched.insert(key.clone());
            }

            let mut fresh: BTreeMap<NodeKey, Relationship> = BTreeMap::new();
            for dependency in resolver.dependencies(&symbol) {
                if dependency.key == key || !universe.contains(&dependency) {
                    continue;
                }
                if self.get_or_insert(&dependency) {
                    summary.created.insert(dependency.key.clone());
                    invalid.push(dependency.key.clone());
                }
                let relationship = symbol.relationship_to(&dependency.key);
                fresh.insert(dependency.key, relationship);
            }

            let current: BTreeMap<NodeKey, Relationship> = self
                .dependencies(&key)
                .map(|(k, r)| (k.clone(), r))
                .collect();
            if current == fresh {
                continue;
            }

            for dependency in current.keys().filter(|k| !fresh.contains_key(*k)) {
                if self.unlink(&key, dependency).is_some() {
                    summary.links_removed += 1;
                    summary.touched.insert(dependency.clone());
                }
            }
            for (dependency, relationship) in &fresh {
                match current.get(dependency) {
                    Some(existing) if existing == relationship => continue,
                    Some(_) => summary.links_removed += 1,
                    None => {}
                }
                if self.link(&key, dependency, *relationship) {
                    summary.links_added += 1;
                    summary.touched.insert(dependency.clone());
                }
            }
            summary.touched.insert(key.clone());

            let dependents: Vec<NodeKey> = self.dependents(&key).map(|(k, _)| k.clone()).collect();
            for dependent in dependents {
                invalid.push(dependent);
            }
        }

        debug!(
            touched = summary.touched.len(),
            created = summary.created.len(),
            removed = summary.removed.len(),
            links_added = summary.links_added,
            links_removed = summary.links_removed,
            "graph updated"
        );
        summary
    }

    /// Resolve a symbol's dependencies and link them, creating missing
    /// dependency nodes.
    fn link_dependencies(
        &mut self,
        resolver: &dyn SourceResolver,
        universe: &Universe,
        symbol: &TypeSymbol,
    ) {
        for dependency in resolver.dependencies(symbol) {
            if dependency.key == symbol.key || !universe.contains(&dependency) {
                continue;
            }
            self.get_or_insert(&dependency);
            let relationship = symbol.relationship_to(&dependency.key);
            self.link(&symbol.key, &dependency.key, relationship);
        }
    }
}
