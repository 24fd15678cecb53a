//! Operations that add, remove, or replace category members

use super::Operation;
use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::model::NodeKey;
use crate::subgraph::{Category, Inclusion, Subgraph};
use std::collections::BTreeSet;

pub(super) fn collect_keys<K: Into<NodeKey>>(keys: impl IntoIterator<Item = K>) -> Vec<NodeKey> {
    keys.into_iter().map(Into::into).collect()
}

/// Add nodes under `category`; keys missing from the graph are skipped.
fn add_all(
    graph: &Graph,
    subgraph: &mut Subgraph,
    keys: &[NodeKey],
    category: Category,
    inclusion: Inclusion,
) -> bool {
    let mut changed = false;
    for key in keys {
        if let Some(node) = graph.node(key) {
            let (_, added) = subgraph.add_node(node, category, inclusion);
            changed |= added;
        }
    }
    changed
}

/// Pin nodes the user asked for explicitly.
#[derive(Debug, Clone)]
pub struct AddPinned {
    pub keys: Vec<NodeKey>,
}

impl AddPinned {
    pub fn new<K: Into<NodeKey>>(keys: impl IntoIterator<Item = K>) -> Self {
        AddPinned {
            keys: collect_keys(keys),
        }
    }
}

impl Operation for AddPinned {
    fn name(&self) -> &'static str {
        "add-pinned"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        add_all(graph, subgraph, &self.keys, Category::Pinned, Inclusion::Always)
    }
}

#[derive(Debug, Clone)]
pub struct AddToCategory {
    pub keys: Vec<NodeKey>,
    pub category: Category,
    pub inclusion: Inclusion,
}

impl AddToCategory {
    pub fn new<K: Into<NodeKey>>(keys: impl IntoIterator<Item = K>, category: Category) -> Self {
        AddToCategory {
            keys: collect_keys(keys),
            category,
            inclusion: Inclusion::Filtered,
        }
    }

    pub fn always(mut self) -> Self {
        self.inclusion = Inclusion::Always;
        self
    }
}

impl Operation for AddToCategory {
    fn name(&self) -> &'static str {
        "add-to-category"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        add_all(graph, subgraph, &self.keys, self.category, self.inclusion)
    }
}

#[derive(Debug, Clone)]
pub struct RemoveFromCategory {
    pub keys: Vec<NodeKey>,
    pub category: Category,
}

impl RemoveFromCategory {
    pub fn new<K: Into<NodeKey>>(keys: impl IntoIterator<Item = K>, category: Category) -> Self {
        RemoveFromCategory {
            keys: collect_keys(keys),
            category,
        }
    }
}

impl Operation for RemoveFromCategory {
    fn name(&self) -> &'static str {
        "remove-from-category"
    }

    fn apply(&self, _graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let mut changed = false;
        for key in &self.keys {
            let (_, removed) = subgraph.remove_node_from_category(key, self.category);
            changed |= removed;
        }
        changed
    }
}

/// Empty a category; nodes left without categories disappear.
#[derive(Debug, Clone, Copy)]
pub struct ClearCategory(pub Category);

impl Operation for ClearCategory {
    fn name(&self) -> &'static str {
        "clear-category"
    }

    fn apply(&self, _graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let members: Vec<NodeKey> = subgraph.members(self.0).cloned().collect();
        for key in &members {
            subgraph.remove_node_from_category(key, self.0);
        }
        !members.is_empty()
    }
}

/// Empty a category, keeping its former members as unpinned.
#[derive(Debug, Clone, Copy)]
pub struct ClearCategoryLeaveUnpinned(pub Category);

impl Operation for ClearCategoryLeaveUnpinned {
    fn name(&self) -> &'static str {
        "clear-category-leave-unpinned"
    }

    fn apply(&self, _graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let members: Vec<NodeKey> = subgraph.members(self.0).cloned().collect();
        for key in &members {
            subgraph.remove_node_from_category_leave_unpinned(key, self.0);
        }
        !members.is_empty()
    }
}

/// Replace the members of a category with exactly `keys`.
#[derive(Debug, Clone)]
pub struct SetCategoryMembers {
    pub category: Category,
    pub keys: BTreeSet<NodeKey>,
    pub inclusion: Inclusion,
}

impl SetCategoryMembers {
    pub fn new<K: Into<NodeKey>>(category: Category, keys: impl IntoIterator<Item = K>) -> Self {
        SetCategoryMembers {
            category,
            keys: keys.into_iter().map(Into::into).collect(),
            inclusion: Inclusion::Filtered,
        }
    }
}

impl Operation for SetCategoryMembers {
    fn name(&self) -> &'static str {
        "set-category-members"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let stale: Vec<NodeKey> = subgraph
            .members(self.category)
            .filter(|key| !self.keys.contains(*key))
            .cloned()
            .collect();
        let mut changed = false;
        for key in &stale {
            let (_, removed) = subgraph.remove_node_from_category(key, self.category);
            changed |= removed;
        }
        for key in &self.keys {
            if let Some(node) = graph.node(key) {
                let (_, added) = subgraph.add_node(node, self.category, self.inclusion);
                changed |= added;
            }
        }
        changed
    }
}

/// Flip a node between pinned and unpinned; queued form of
/// [`Subgraph::toggle_pinned`].
#[derive(Debug, Clone)]
pub struct TogglePinned {
    pub key: NodeKey,
}

impl TogglePinned {
    pub fn new(key: impl Into<NodeKey>) -> Self {
        TogglePinned { key: key.into() }
    }
}

impl Operation for TogglePinned {
    fn name(&self) -> &'static str {
        "toggle-pinned"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        match graph.node(&self.key) {
            Some(node) => {
                subgraph.toggle_pinned(node);
                true
            }
            None => false,
        }
    }
}

/// Drop subgraph members the graph no longer has.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sanitize;

impl Operation for Sanitize {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let missing: Vec<NodeKey> = subgraph
            .keys()
            .filter(|key| !graph.contains(key))
            .cloned()
            .collect();
        for key in &missing {
            subgraph.remove_node(key);
        }
        !missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fixture_graph, keys};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_category_members_diffs() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();

        let first = SetCategoryMembers::new(Category::Changed, ["AA", "AB"]);
        assert!(first.apply(&graph, &mut subgraph, &token));
        assert!(!first.apply(&graph, &mut subgraph, &token));

        let second = SetCategoryMembers::new(Category::Changed, ["AB", "AC", "Missing"]);
        assert!(second.apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.sorted_keys(), keys(["AB", "AC"]));
    }

    #[test]
    fn test_clear_category_leave_unpinned() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();
        AddToCategory::new(["AA", "AB"], Category::Selected).apply(&graph, &mut subgraph, &token);
        AddPinned::new(["AB"]).apply(&graph, &mut subgraph, &token);

        assert!(ClearCategoryLeaveUnpinned(Category::Selected).apply(&graph, &mut subgraph, &token));
        assert!(subgraph.has_category(&NodeKey::from("AA"), Category::Unpinned));
        assert!(subgraph.is_pinned(&NodeKey::from("AB")));
        assert_eq!(subgraph.category_len(Category::Selected), 0);

        assert!(ClearCategory(Category::Unpinned).apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.sorted_keys(), keys(["AB"]));
        assert!(!ClearCategory(Category::Unpinned).apply(&graph, &mut subgraph, &token));
    }

    #[test]
    fn test_remove_from_category_is_soft() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();
        AddPinned::new(["AA"]).apply(&graph, &mut subgraph, &token);
        let remove = RemoveFromCategory::new(["AA", "Nowhere"], Category::Pinned);
        assert!(remove.apply(&graph, &mut subgraph, &token));
        assert!(subgraph.is_empty());
        assert!(!remove.apply(&graph, &mut subgraph, &token));
    }
}
