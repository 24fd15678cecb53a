//! Shared fixtures for core tests

use crate::cancel::PassToken;
use crate::graph::Graph;
use crate::model::{NodeKey, TypeKind};
use crate::resolver::Universe;
use crate::workspace::{DocumentModel, MemoryWorkspace, ProjectModel, TypeDecl, WorkspaceModel};
use std::path::PathBuf;

fn document(path: &str, types: Vec<TypeDecl>) -> DocumentModel {
    DocumentModel {
        path: PathBuf::from(path),
        types,
    }
}

/// The reference hierarchy.
///
/// Project `Core`: AA uses AB, AC and AE; AB uses AD; AC uses AF; AE uses
/// AG; AG uses AGInner, which is nested in AG and declared in its file.
/// Project `App`: AH inherits AA and implements IShape.
pub fn fixture_model() -> WorkspaceModel {
    WorkspaceModel {
        projects: vec![
            ProjectModel {
                name: "Core".to_string(),
                documents: vec![
                    document("src/AA.cs", vec![TypeDecl::new("AA").using(&["AB", "AC", "AE"])]),
                    document("src/AB.cs", vec![TypeDecl::new("AB").using(&["AD"])]),
                    document("src/AC.cs", vec![TypeDecl::new("AC").using(&["AF"])]),
                    document("src/AD.cs", vec![TypeDecl::new("AD")]),
                    document("src/AE.cs", vec![TypeDecl::new("AE").using(&["AG"])]),
                    document("src/AF.cs", vec![TypeDecl::new("AF").with_kind(TypeKind::Struct)]),
                    document(
                        "src/AG.cs",
                        vec![
                            TypeDecl::new("AG").using(&["AGInner"]),
                            TypeDecl::new("AGInner").nested_in("AG"),
                        ],
                    ),
                ],
            },
            ProjectModel {
                name: "App".to_string(),
                documents: vec![
                    document(
                        "app/AH.cs",
                        vec![TypeDecl::new("AH").with_base("AA").implementing(&["IShape"])],
                    ),
                    document(
                        "app/IShape.cs",
                        vec![TypeDecl::new("IShape").with_kind(TypeKind::Interface)],
                    ),
                ],
            },
        ],
    }
}

pub fn fixture_workspace() -> MemoryWorkspace {
    MemoryWorkspace::from_model(fixture_model()).unwrap()
}

pub fn fixture_graph() -> Graph {
    build(&fixture_workspace())
}

pub fn build(workspace: &MemoryWorkspace) -> Graph {
    Graph::build(workspace, &Universe::all(), &PassToken::detached()).unwrap()
}

/// Sorted node keys.
pub fn keys<'a>(names: impl IntoIterator<Item = &'a str>) -> Vec<NodeKey> {
    let mut keys: Vec<NodeKey> = names.into_iter().map(NodeKey::from).collect();
    keys.sort();
    keys
}

/// Every link as sorted (dependent, dependency, relationship) strings.
pub fn link_set(graph: &Graph) -> Vec<(String, String, String)> {
    let mut links: Vec<(String, String, String)> = graph
        .links()
        .map(|l| {
            (
                l.dependent.to_string(),
                l.dependency.to_string(),
                l.relationship.to_string(),
            )
        })
        .collect();
    links.sort();
    links
}
