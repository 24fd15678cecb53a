//! Importance ranking of graph nodes

use crate::graph::Graph;
use crate::model::NodeKey;
use crate::subgraph::Importance;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Annotation under which a node's ranking score is stored.
pub const SCORE_ANNOTATION: &str = "importance.score";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedType {
    pub key: NodeKey,
    pub score: usize,
    pub importance: Importance,
}

/// How many types depend on `key`.
pub fn score(graph: &Graph, key: &NodeKey) -> usize {
    graph.dependent_count(key)
}

/// The `top_n` most depended-upon nodes, best first.
///
/// Nodes nobody depends on are never ranked. Ties fall back to the number
/// of dependencies, then the key. The list is split in thirds: high, medium
/// and low importance.
pub fn rank_types(graph: &Graph, top_n: usize) -> Vec<RankedType> {
    if top_n == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(usize, usize, &NodeKey)> = graph
        .keys()
        .map(|key| (score(graph, key), graph.dependency_count(key), key))
        .filter(|(score, _, _)| *score > 0)
        .collect();
    scored.sort_by_key(|&(score, fan_out, key)| (Reverse(score), Reverse(fan_out), key));
    scored.truncate(top_n);

    let total = scored.len();
    scored
        .into_iter()
        .enumerate()
        .map(|(position, (score, _, key))| RankedType {
            key: key.clone(),
            score,
            importance: match position * 3 / total {
                0 => Importance::High,
                1 => Importance::Medium,
                _ => Importance::Low,
            },
        })
        .collect()
}

/// Write every node's score into its annotations.
pub fn annotate_scores(graph: &mut Graph) {
    let scores: Vec<(NodeKey, usize)> = graph
        .keys()
        .map(|key| (key.clone(), score(graph, key)))
        .collect();
    for (key, score) in scores {
        graph.annotate(&key, SCORE_ANNOTATION, score.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixture_graph;

    #[test]
    fn test_rank_types_orders_by_dependents() {
        let graph = fixture_graph();
        let ranked = rank_types(&graph, 3);
        assert_eq!(ranked.len(), 3);
        assert!(ranked.iter().all(|r| r.score >= 1));
        assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        // every node has one dependent; AA wins on fan-out
        assert_eq!(ranked[0].key, NodeKey::from("AA"));
        assert_eq!(ranked[0].importance, Importance::High);
        assert_eq!(ranked[1].importance, Importance::Medium);
        assert_eq!(ranked[2].importance, Importance::Low);
    }

    #[test]
    fn test_rank_types_zero_is_empty() {
        let graph = fixture_graph();
        assert!(rank_types(&graph, 0).is_empty());
        let all = rank_types(&graph, 100);
        assert!(all.iter().all(|r| r.score > 0));
        assert!(all.iter().all(|r| r.key.as_str() != "AH"));
    }

    #[test]
    fn test_annotate_scores() {
        let mut graph = fixture_graph();
        annotate_scores(&mut graph);
        let aa = graph.node(&NodeKey::from("AA")).unwrap();
        assert_eq!(aa.annotations.get(SCORE_ANNOTATION).map(String::as_str), Some("1"));
        let ah = graph.node(&NodeKey::from("AH")).unwrap();
        assert_eq!(ah.annotations.get(SCORE_ANNOTATION).map(String::as_str), Some("0"));
    }
}
