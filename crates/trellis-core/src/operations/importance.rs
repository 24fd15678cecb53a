//! Importance tagging from a fresh ranking

use super::Operation;
use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::model::NodeKey;
use crate::ranking::RankedType;
use crate::subgraph::{Category, Importance, Inclusion, Subgraph};
use std::collections::HashMap;

/// Replace the importance-tagged members with a fresh ranking.
///
/// Members that fell out of the ranking lose their importance, and are
/// dropped if that was their only category.
#[derive(Debug, Clone, Default)]
pub struct UpdateImportantTypes {
    pub ranked: Vec<(NodeKey, Importance)>,
}

impl UpdateImportantTypes {
    pub fn new(ranked: impl IntoIterator<Item = (NodeKey, Importance)>) -> Self {
        UpdateImportantTypes {
            ranked: ranked.into_iter().collect(),
        }
    }

    pub fn from_ranking(ranking: &[RankedType]) -> Self {
        Self::new(ranking.iter().map(|r| (r.key.clone(), r.importance)))
    }
}

impl Operation for UpdateImportantTypes {
    fn name(&self) -> &'static str {
        "update-important-types"
    }

    fn apply(&self, graph: &Graph, subgraph: &mut Subgraph, _token: &PassToken) -> bool {
        let fresh: HashMap<&NodeKey, Importance> = self.ranked.iter().map(|(k, i)| (k, *i)).collect();
        let stale: Vec<NodeKey> = Category::IMPORTANCE
            .iter()
            .flat_map(|category| subgraph.members(*category))
            .filter(|key| !fresh.contains_key(key))
            .cloned()
            .collect();

        let mut changed = false;
        for key in &stale {
            changed |= subgraph.remove_importance(key).1;
        }
        for (key, importance) in &self.ranked {
            if let Some(node) = graph.node(key) {
                changed |= subgraph
                    .add_node(node, Category::Importance(*importance), Inclusion::Filtered)
                    .1;
            }
        }
        changed
    }
}
