//! Traversal operations that pin related nodes

use super::Operation;
use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::model::{NodeKey, Relationship};
use crate::subgraph::{Category, Inclusion, Subgraph};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// Visits between cancellation checks in long traversals.
pub const DEFAULT_CHECK_INTERVAL: usize = 64;

/// Which links a hierarchy operation follows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Forward links, towards what a node uses.
    #[default]
    Dependencies,
    /// Back links, towards what uses a node.
    Dependents,
    Both,
}

impl Direction {
    fn forward(self) -> bool {
        matches!(self, Direction::Dependencies | Direction::Both)
    }

    fn backward(self) -> bool {
        matches!(self, Direction::Dependents | Direction::Both)
    }
}

/// Neighbours of `key` along `direction`, optionally only over links whose
/// relationship intersects `filter`. Sorted for a stable visit order.
fn neighbours(
    graph: &Graph,
    key: &NodeKey,
    direction: Direction,
    filter: Option<Relationship>,
) -> Vec<NodeKey> {
    let keep = |relationship: Relationship| filter.is_none_or(|f| relationship.intersects(f));
    let mut found = Vec::new();
    if direction.forward() {
        found.extend(
            graph
                .dependencies(key)
                .filter(|(_, r)| keep(*r))
                .map(|(k, _)| k.clone()),
        );
    }
    if direction.backward() {
        found.extend(
            graph
                .dependents(key)
                .filter(|(_, r)| keep(*r))
                .map(|(k, _)| k.clone()),
        );
    }
    found.sort();
    found.dedup();
    found
}

fn pin(graph: &Graph, subgraph: &mut Subgraph, key: &NodeKey, inclusion: Inclusion) -> bool {
    graph
        .node(key)
        .is_some_and(|node| subgraph.add_node(node, Category::Pinned, inclusion).1)
}

/// Pin every node reachable from `root`.
#[derive(Debug, Clone)]
pub struct TransitiveHierarchy {
    pub root: NodeKey,
    pub direction: Direction,
    pub relationship: Option<Relationship>,
    pub check_interval: usize,
}

impl TransitiveHierarchy {
    pub fn new(root: impl Into<NodeKey>, direction: Direction) -> Self {
        TransitiveHierarchy {
            root: root.into(),
            direction,
            relationship: None,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    /// Only follow links carrying `relationship`.
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationship = Some(relationship);
        self
    }

    pub fn with_check_interval(mut self, check_interval: usize) -> Self {
        self.check_interval = check_interval;
        self
    }
}

impl Operation for TransitiveHierarchy {
    fn name(&self) -> &'static str {
        "transitive-hierarchy"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, token: &PassToken) -> bool {
        if !graph.contains(&self.root) {
            return false;
        }
        let mut changed = pin(graph, subgraph, &self.root, Inclusion::Always);
        let mut visited: HashSet<NodeKey> = HashSet::from([self.root.clone()]);
        let mut queue: VecDeque<NodeKey> = VecDeque::from([self.root.clone()]);
        let interval = self.check_interval.max(1);
        let mut visits = 0usize;

        while let Some(key) = queue.pop_front() {
            visits += 1;
            debug_assert!(
                visits <= graph.node_count(),
                "hierarchy traversal visited a node twice"
            );
            if visits % interval == 0 && token.is_cancelled() {
                return changed;
            }
            for next in neighbours(graph, &key, self.direction, self.relationship) {
                if visited.insert(next.clone()) {
                    changed |= pin(graph, subgraph, &next, Inclusion::Filtered);
                    queue.push_back(next);
                }
            }
        }
        changed
    }
}

/// Pin `root` and its immediate neighbours.
#[derive(Debug, Clone)]
pub struct DirectHierarchy {
    pub root: NodeKey,
    pub direction: Direction,
    pub relationship: Option<Relationship>,
}

impl DirectHierarchy {
    pub fn new(root: impl Into<NodeKey>, direction: Direction) -> Self {
        DirectHierarchy {
            root: root.into(),
            direction,
            relationship: None,
        }
    }

    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationship = Some(relationship);
        self
    }
}

impl Operation for DirectHierarchy {
    fn name(&self) -> &'static str {
        "direct-hierarchy"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        if !graph.contains(&self.root) {
            return false;
        }
        let mut changed = pin(graph, subgraph, &self.root, Inclusion::Always);
        for key in neighbours(graph, &self.root, self.direction, self.relationship) {
            changed |= pin(graph, subgraph, &key, Inclusion::Filtered);
        }
        changed
    }
}

/// Pin every node from the same project as `anchor`.
#[derive(Debug, Clone)]
pub struct SameProject {
    pub anchor: NodeKey,
    pub check_interval: usize,
}

impl SameProject {
    pub fn new(anchor: impl Into<NodeKey>) -> Self {
        SameProject {
            anchor: anchor.into(),
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    pub fn with_check_interval(mut self, check_interval: usize) -> Self {
        self.check_interval = check_interval;
        self
    }
}

impl Operation for SameProject {
    fn name(&self) -> &'static str {
        "same-project"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, token: &PassToken) -> bool {
        let Some(anchor) = graph.node(&self.anchor) else {
            return false;
        };
        let project = anchor.project();
        let mut changed = subgraph
            .add_node(anchor, Category::Pinned, Inclusion::Always)
            .1;
        let interval = self.check_interval.max(1);
        let mut visits = 0usize;
        for node in graph.nodes().filter(|n| n.project() == project) {
            visits += 1;
            if visits % interval == 0 && token.is_cancelled() {
                return changed;
            }
            changed |= subgraph
                .add_node(node, Category::Pinned, Inclusion::Filtered)
                .1;
        }
        changed
    }
}

/// Pin every node the filter admits.
#[derive(Debug, Clone, Copy)]
pub struct AllNodes {
    pub check_interval: usize,
}

impl AllNodes {
    pub fn new() -> Self {
        AllNodes {
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }

    pub fn with_check_interval(mut self, check_interval: usize) -> Self {
        self.check_interval = check_interval;
        self
    }
}

impl Default for AllNodes {
    fn default() -> Self {
        AllNodes::new()
    }
}

impl Operation for AllNodes {
    fn name(&self) -> &'static str {
        "all-nodes"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, token: &PassToken) -> bool {
        let interval = self.check_interval.max(1);
        let mut changed = false;
        let mut visits = 0usize;
        for node in graph.nodes() {
            visits += 1;
            if visits % interval == 0 && token.is_cancelled() {
                return changed;
            }
            changed |= subgraph
                .add_node(node, Category::Pinned, Inclusion::Filtered)
                .1;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subgraph::TypeFilter;
    use crate::test_utils::{fixture_graph, keys};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_direct_hierarchy_is_idempotent() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();
        let op = DirectHierarchy::new("AA", Direction::Dependencies);

        assert!(op.apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.sorted_keys(), keys(["AA", "AB", "AC", "AE"]));
        assert!(!op.apply(&graph, &mut subgraph, &token));
    }

    #[test]
    fn test_transitive_hierarchy_is_idempotent() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();
        let op = TransitiveHierarchy::new("AA", Direction::Dependencies);

        assert!(op.apply(&graph, &mut subgraph, &token));
        assert_eq!(
            subgraph.sorted_keys(),
            keys(["AA", "AB", "AC", "AD", "AE", "AF", "AG", "AGInner"])
        );
        assert!(!op.apply(&graph, &mut subgraph, &token));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let op = TransitiveHierarchy::new("AD", Direction::Dependents);
        op.apply(&graph, &mut subgraph, &PassToken::detached());
        assert_eq!(subgraph.sorted_keys(), keys(["AA", "AB", "AD", "AH"]));
    }

    #[test]
    fn test_relationship_filter() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let op = TransitiveHierarchy::new("AH", Direction::Dependencies)
            .with_relationship(Relationship::INHERITS);
        op.apply(&graph, &mut subgraph, &PassToken::detached());
        // AH inherits AA; AA only uses its dependencies
        assert_eq!(subgraph.sorted_keys(), keys(["AA", "AH"]));
    }

    #[test]
    fn test_filter_hides_nested_but_traversal_continues() {
        let graph = fixture_graph();
        let filter = TypeFilter {
            exclude_nested_types: true,
            exclude_generated: false,
        };
        let mut subgraph = Subgraph::with_filter(Arc::new(filter));
        TransitiveHierarchy::new("AE", Direction::Dependencies).apply(
            &graph,
            &mut subgraph,
            &PassToken::detached(),
        );
        assert_eq!(subgraph.sorted_keys(), keys(["AE", "AG"]));
    }

    #[test]
    fn test_cancelled_traversal_stops_early() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let slot = crate::cancel::SerialCancellation::new();
        let token = slot.next();
        slot.cancel();
        let op = TransitiveHierarchy::new("AA", Direction::Dependencies).with_check_interval(1);
        assert!(op.apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.sorted_keys(), keys(["AA"]));
    }

    #[test]
    fn test_same_project_and_all_nodes() {
        let graph = fixture_graph();
        let token = PassToken::detached();

        let mut subgraph = Subgraph::new();
        SameProject::new("AH").apply(&graph, &mut subgraph, &token);
        assert_eq!(subgraph.sorted_keys(), keys(["AH", "IShape"]));

        let mut subgraph = Subgraph::new();
        assert!(AllNodes::new().apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.len(), graph.node_count());
        assert!(!AllNodes::new().apply(&graph, &mut subgraph, &token));
    }

    #[test]
    fn test_check_interval_bounds_cancelled_scans() {
        let graph = fixture_graph();
        let slot = crate::cancel::SerialCancellation::new();
        let token = slot.next();
        slot.cancel();

        // Checked on the first visit
        let mut subgraph = Subgraph::new();
        assert!(!AllNodes::new().with_check_interval(1).apply(&graph, &mut subgraph, &token));
        assert!(subgraph.is_empty());

        // Checked on the third visit
        let mut subgraph = Subgraph::new();
        assert!(AllNodes::new().with_check_interval(3).apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.len(), 2);

        // The default interval outlasts the fixture
        let mut subgraph = Subgraph::new();
        AllNodes::new().apply(&graph, &mut subgraph, &token);
        assert_eq!(subgraph.len(), graph.node_count());

        // The anchor is pinned before the scan starts
        let mut subgraph = Subgraph::new();
        SameProject::new("AA")
            .with_check_interval(1)
            .apply(&graph, &mut subgraph, &token);
        assert_eq!(subgraph.sorted_keys(), keys(["AA"]));
    }

    #[test]
    fn test_missing_root_is_a_no_op() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();
        assert!(!TransitiveHierarchy::new("Nope", Direction::Both).apply(&graph, &mut subgraph, &token));
        assert!(!DirectHierarchy::new("Nope", Direction::Both).apply(&graph, &mut subgraph, &token));
        assert!(!SameProject::new("Nope").apply(&graph, &mut subgraph, &token));
    }
}
