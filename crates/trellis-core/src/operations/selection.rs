//! Active selection and its neighbourhood

use super::Operation;
use super::category::collect_keys;
use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::model::NodeKey;
use crate::subgraph::{Category, Inclusion, Subgraph};
use std::collections::BTreeSet;

/// Direct dependencies and dependents of `keys`, excluding `keys` themselves.
fn neighbourhood(graph: &Graph, keys: &BTreeSet<NodeKey>) -> BTreeSet<NodeKey> {
    keys.iter()
        .flat_map(|key| graph.dependencies(key).chain(graph.dependents(key)))
        .map(|(k, _)| k)
        .filter(|k| !keys.contains(*k))
        .cloned()
        .collect()
}

/// Diff one category's members against `wanted`.
fn replace_members(
    graph: &Graph,
    subgraph: &mut Subgraph,
    category: Category,
    wanted: &BTreeSet<NodeKey>,
    inclusion: Inclusion,
) -> bool {
    let stale: Vec<NodeKey> = subgraph
        .members(category)
        .filter(|key| !wanted.contains(*key))
        .cloned()
        .collect();
    let mut changed = false;
    for key in &stale {
        changed |= subgraph.remove_node_from_category(key, category).1;
    }
    for key in wanted {
        if let Some(node) = graph.node(key) {
            changed |= subgraph.add_node(node, category, inclusion).1;
        }
    }
    changed
}

/// Make `keys` the selection, with their neighbours alongside.
#[derive(Debug, Clone)]
pub struct SetSelected {
    pub keys: BTreeSet<NodeKey>,
}

impl SetSelected {
    pub fn new<K: Into<NodeKey>>(keys: impl IntoIterator<Item = K>) -> Self {
        SetSelected {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }
}

impl Operation for SetSelected {
    fn name(&self) -> &'static str {
        "set-selected"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let selected: BTreeSet<NodeKey> = self
            .keys
            .iter()
            .filter(|k| graph.contains(k))
            .cloned()
            .collect();
        let neighbours = neighbourhood(graph, &selected);
        let mut changed = replace_members(
            graph,
            subgraph,
            Category::Selected,
            &selected,
            Inclusion::Always,
        );
        changed |= replace_members(
            graph,
            subgraph,
            Category::SelectionNeighbour,
            &neighbours,
            Inclusion::Filtered,
        );
        changed
    }
}

/// Drop the selection and its neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClearSelected;

impl Operation for ClearSelected {
    fn name(&self) -> &'static str {
        "clear-selected"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let none = BTreeSet::new();
        let mut changed = replace_members(graph, subgraph, Category::Selected, &none, Inclusion::Always);
        changed |= replace_members(
            graph,
            subgraph,
            Category::SelectionNeighbour,
            &none,
            Inclusion::Always,
        );
        changed
    }
}

/// Pin nodes together with their direct neighbours.
#[derive(Debug, Clone)]
pub struct PinWithNeighbours {
    pub keys: Vec<NodeKey>,
}

impl PinWithNeighbours {
    pub fn new<K: Into<NodeKey>>(keys: impl IntoIterator<Item = K>) -> Self {
        PinWithNeighbours {
            keys: collect_keys(keys),
        }
    }
}

impl Operation for PinWithNeighbours {
    fn name(&self) -> &'static str {
        "pin-with-neighbours"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let roots: BTreeSet<NodeKey> = self.keys.iter().filter(|k| graph.contains(k)).cloned().collect();
        let mut changed = false;
        for key in &roots {
            if let Some(node) = graph.node(key) {
                changed |= subgraph.add_node(node, Category::Pinned, Inclusion::Always).1;
            }
        }
        for key in neighbourhood(graph, &roots) {
            if let Some(node) = graph.node(&key) {
                changed |= subgraph.add_node(node, Category::Pinned, Inclusion::Filtered).1;
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{fixture_graph, keys};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_set_selected_tracks_neighbours() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();

        assert!(SetSelected::new(["AB"]).apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.sorted_keys(), keys(["AA", "AB", "AD"]));
        assert!(subgraph.has_category(&NodeKey::from("AD"), Category::SelectionNeighbour));
        assert!(!SetSelected::new(["AB"]).apply(&graph, &mut subgraph, &token));

        assert!(SetSelected::new(["AE"]).apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.sorted_keys(), keys(["AA", "AE", "AG"]));
        assert!(!subgraph.has_category(&NodeKey::from("AA"), Category::Selected));

        assert!(ClearSelected.apply(&graph, &mut subgraph, &token));
        assert!(subgraph.is_empty());
        assert!(!ClearSelected.apply(&graph, &mut subgraph, &token));
    }

    #[test]
    fn test_selected_node_is_not_its_own_neighbour() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        SetSelected::new(["AA", "AB"]).apply(&graph, &mut subgraph, &PassToken::detached());
        let ab = NodeKey::from("AB");
        assert!(subgraph.has_category(&ab, Category::Selected));
        assert!(!subgraph.has_category(&ab, Category::SelectionNeighbour));
    }

    #[test]
    fn test_pin_with_neighbours() {
        let graph = fixture_graph();
        let mut subgraph = Subgraph::new();
        let token = PassToken::detached();
        let op = PinWithNeighbours::new(["AA"]);
        assert!(op.apply(&graph, &mut subgraph, &token));
        assert_eq!(subgraph.sorted_keys(), keys(["AA", "AB", "AC", "AE", "AH"]));
        assert!(!op.apply(&graph, &mut subgraph, &token));
    }
}
