//! Summary statistics over a graph and its subgraph

use crate::graph::Graph;
use crate::model::{NodeKey, TypeKind};
use crate::subgraph::Subgraph;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub link_count: usize,
    pub file_count: usize,
    pub nodes_per_project: BTreeMap<String, usize>,
    pub classes: usize,
    pub interfaces: usize,
    pub enums: usize,
    pub structs: usize,
    pub inherits_links: usize,
    pub implements_links: usize,
    pub changed_nodes: usize,
    /// The node with the most dependents, if any node has one.
    pub most_depended_on: Option<(NodeKey, usize)>,
}

impl GraphStatistics {
    pub fn compute(graph: &Graph) -> Self {
        let mut stats = GraphStatistics {
            node_count: graph.node_count(),
            link_count: graph.link_count(),
            file_count: graph.files().count(),
            ..Self::default()
        };

        for node in graph.nodes() {
            *stats
                .nodes_per_project
                .entry(node.project().to_string())
                .or_insert(0) += 1;
            match node.type_kind() {
                TypeKind::Class => stats.classes += 1,
                TypeKind::Interface => stats.interfaces += 1,
                TypeKind::Enum => stats.enums += 1,
                TypeKind::Struct => stats.structs += 1,
                TypeKind::Delegate | TypeKind::Other => {}
            }
            if node.vcs_status.is_changed() {
                stats.changed_nodes += 1;
            }
            let dependents = graph.dependent_count(&node.key);
            // ties go to the smallest key so the result is stable
            let better = stats.most_depended_on.as_ref().is_none_or(|(key, count)| {
                dependents > *count || (dependents == *count && node.key < *key)
            });
            if dependents > 0 && better {
                stats.most_depended_on = Some((node.key.clone(), dependents));
            }
        }

        for link in graph.links() {
            if link.relationship.inherits {
                stats.inherits_links += 1;
            }
            if link.relationship.implements {
                stats.implements_links += 1;
            }
        }
        stats
    }
}

impl fmt::Display for GraphStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} types, {} links, {} files",
            self.node_count, self.link_count, self.file_count
        )?;
        writeln!(
            f,
            "  classes: {}, interfaces: {}, enums: {}, structs: {}",
            self.classes, self.interfaces, self.enums, self.structs
        )?;
        writeln!(
            f,
            "  inherits: {}, implements: {}",
            self.inherits_links, self.implements_links
        )?;
        for (project, count) in &self.nodes_per_project {
            writeln!(f, "  {project}: {count}")?;
        }
        if let Some((key, count)) = &self.most_depended_on {
            writeln!(f, "  most depended on: {key} ({count})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubgraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    /// Member count per category, keyed by category name.
    pub categories: BTreeMap<String, usize>,
}

impl SubgraphStatistics {
    pub fn compute(graph: &Graph, subgraph: &Subgraph) -> Self {
        let edge_count = subgraph
            .keys()
            .map(|key| {
                graph
                    .dependencies(key)
                    .filter(|(dependency, _)| subgraph.contains(dependency))
                    .count()
            })
            .sum();
        SubgraphStatistics {
            node_count: subgraph.len(),
            edge_count,
            categories: subgraph
                .category_counts()
                .into_iter()
                .map(|(category, count)| (category.to_string(), count))
                .collect(),
        }
    }
}
