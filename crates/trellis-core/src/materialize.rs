//! Snapshot of the subgraph for consumers

use crate::graph::Graph;
use crate::model::{Link, Node, NodeKey};
use crate::stats::SubgraphStatistics;
use crate::subgraph::{Membership, Subgraph};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializedNode {
    pub node: Node,
    pub membership: Membership,
}

/// Immutable view of the subgraph: its members and every link between two
/// of them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterializedGraph {
    /// Increases with every snapshot an orchestrator publishes.
    pub sequence: u64,
    pub nodes: Vec<MaterializedNode>,
    pub edges: Vec<Link>,
    pub statistics: SubgraphStatistics,
}

impl MaterializedGraph {
    pub fn build(sequence: u64, graph: &Graph, subgraph: &Subgraph) -> Self {
        let mut nodes = Vec::with_capacity(subgraph.len());
        let mut edges = Vec::new();
        for key in subgraph.sorted_keys() {
            let (Some(node), Some(membership)) = (graph.node(&key), subgraph.membership(&key)) else {
                continue;
            };
            edges.extend(
                graph
                    .forward_links(&key)
                    .into_iter()
                    .filter(|link| subgraph.contains(&link.dependency)),
            );
            nodes.push(MaterializedNode {
                node: node.clone(),
                membership: *membership,
            });
        }
        edges.sort();
        MaterializedGraph {
            sequence,
            nodes,
            edges,
            statistics: SubgraphStatistics::compute(graph, subgraph),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn node(&self, key: &NodeKey) -> Option<&MaterializedNode> {
        self.nodes.iter().find(|n| &n.node.key == key)
    }

    pub fn keys(&self) -> Vec<NodeKey> {
        self.nodes.iter().map(|n| n.node.key.clone()).collect()
    }
}
