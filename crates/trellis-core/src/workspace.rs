//! Declarative workspace model and the in-memory resolver built on it
//!
//! A workspace model is a TOML file listing projects, their documents and the
//! types each document declares:
//!
//! ```toml
//! [[project]]
//! name = "Core"
//!
//! [[project.document]]
//! path = "src/Shape.cs"
//!
//! [[project.document.type]]
//! name = "Circle"
//! base = "Shape"
//! interfaces = ["IDrawable"]
//! uses = ["Point"]
//! ```
//!
//! A type may be declared in several documents of the same project (partial
//! types); its declarations are merged on resolution.

use crate::error::WorkspaceError;
use crate::model::{NodeKey, ProjectId, TypeKind};
use crate::resolver::{SourceResolver, TypeSymbol};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Root of a workspace model file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceModel {
    #[serde(default, rename = "project")]
    pub projects: Vec<ProjectModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectModel {
    pub name: String,
    #[serde(default, rename = "document")]
    pub documents: Vec<DocumentModel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentModel {
    pub path: PathBuf,
    #[serde(default, rename = "type")]
    pub types: Vec<TypeDecl>,
}

/// One declaration of a type inside a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub name: String,
    /// Stable key; defaults to `name`.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub kind: TypeKind,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    /// Any other referenced types.
    #[serde(default)]
    pub uses: Vec<String>,
    #[serde(default)]
    pub nested_in: Option<String>,
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub anonymous: bool,
}

impl TypeDecl {
    pub fn new(name: &str) -> Self {
        TypeDecl {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn node_key(&self) -> NodeKey {
        NodeKey::new(self.key.clone().unwrap_or_else(|| self.name.clone()))
    }

    pub fn with_kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.base = Some(base.to_string());
        self
    }

    pub fn implementing(mut self, interfaces: &[&str]) -> Self {
        self.interfaces = interfaces.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn using(mut self, uses: &[&str]) -> Self {
        self.uses = uses.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn nested_in(mut self, outer: &str) -> Self {
        self.nested_in = Some(outer.to_string());
        self
    }
}

impl WorkspaceModel {
    pub fn from_toml_str(text: &str) -> Result<Self, WorkspaceError> {
        let model: WorkspaceModel = toml::from_str(text)?;
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorkspaceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject duplicate documents and types shared across projects.
    pub fn validate(&self) -> Result<(), WorkspaceError> {
        let mut paths = HashSet::new();
        let mut owners: HashMap<NodeKey, &str> = HashMap::new();
        for project in &self.projects {
            for document in &project.documents {
                if !paths.insert(&document.path) {
                    return Err(WorkspaceError::DuplicateDocument(document.path.clone()));
                }
                for decl in &document.types {
                    let owner = owners.entry(decl.node_key()).or_insert(&project.name);
                    if *owner != project.name {
                        return Err(WorkspaceError::ConflictingProject {
                            key: decl.node_key().0,
                            first: owner.to_string(),
                            second: project.name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Document {
    project: ProjectId,
    types: Vec<TypeDecl>,
}

/// Documents touched by [`MemoryWorkspace::apply`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceChange {
    pub documents: Vec<PathBuf>,
    pub projects_changed: bool,
}

impl WorkspaceChange {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && !self.projects_changed
    }
}

/// A [`SourceResolver`] over an editable in-memory workspace model.
///
/// Safe for concurrent reads and edits; readers may observe an edit that is
/// only partially applied.
#[derive(Debug, Default)]
pub struct MemoryWorkspace {
    projects: RwLock<Vec<ProjectId>>,
    documents: DashMap<PathBuf, Document>,
    /// Type key -> documents declaring it.
    declarations: DashMap<NodeKey, BTreeSet<PathBuf>>,
}

impl MemoryWorkspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_model(model: WorkspaceModel) -> Result<Self, WorkspaceError> {
        let workspace = MemoryWorkspace::new();
        workspace.apply(model)?;
        Ok(workspace)
    }

    pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
        Self::from_model(WorkspaceModel::load(path)?)
    }

    /// Add a project with no documents.
    pub fn add_project(&self, project: &ProjectId) {
        let mut projects = self.projects.write();
        if !projects.contains(project) {
            projects.push(project.clone());
        }
    }

    /// Insert or overwrite a document.
    pub fn replace_document(&self, project: &ProjectId, path: &Path, types: Vec<TypeDecl>) {
        self.add_project(project);
        self.forget_declarations(path);
        for decl in &types {
            self.declarations
                .entry(decl.node_key())
                .or_default()
                .insert(path.to_path_buf());
        }
        self.documents.insert(
            path.to_path_buf(),
            Document {
                project: project.clone(),
                types,
            },
        );
    }

    /// Remove a document; returns whether it existed.
    pub fn remove_document(&self, path: &Path) -> bool {
        self.forget_declarations(path);
        self.documents.remove(path).is_some()
    }

    /// Replace the whole workspace with `model`, reporting what differs.
    pub fn apply(&self, model: WorkspaceModel) -> Result<WorkspaceChange, WorkspaceError> {
        model.validate()?;
        let mut change = WorkspaceChange::default();

        let new_projects: Vec<ProjectId> =
            model.projects.iter().map(|p| ProjectId::new(&p.name)).collect();
        change.projects_changed = *self.projects.read() != new_projects;

        let mut seen: HashSet<PathBuf> = HashSet::new();
        for project in model.projects {
            let project_id = ProjectId::new(&project.name);
            for document in project.documents {
                seen.insert(document.path.clone());
                let fresh = Document {
                    project: project_id.clone(),
                    types: document.types,
                };
                let unchanged = self
                    .documents
                    .get(&document.path)
                    .is_some_and(|existing| *existing == fresh);
                if !unchanged {
                    self.replace_document(&fresh.project, &document.path, fresh.types);
                    change.documents.push(document.path);
                }
            }
        }

        let stale: Vec<PathBuf> = self
            .documents
            .iter()
            .filter(|entry| !seen.contains(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        for path in stale {
            self.remove_document(&path);
            change.documents.push(path);
        }

        *self.projects.write() = new_projects;
        change.documents.sort();
        debug!(
            documents = change.documents.len(),
            projects_changed = change.projects_changed,
            "workspace model applied"
        );
        Ok(change)
    }

    /// Export the current state as a model.
    pub fn snapshot(&self) -> WorkspaceModel {
        let projects = self.projects.read().clone();
        WorkspaceModel {
            projects: projects
                .iter()
                .map(|project| ProjectModel {
                    name: project.0.clone(),
                    documents: self
                        .documents_of(project)
                        .into_iter()
                        .filter_map(|path| {
                            let document = self.documents.get(&path)?;
                            Some(DocumentModel {
                                path,
                                types: document.types.clone(),
                            })
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    fn forget_declarations(&self, path: &Path) {
        let Some(old) = self.documents.get(path).map(|d| d.types.clone()) else {
            return;
        };
        for decl in old {
            let key = decl.node_key();
            let now_empty = match self.declarations.get_mut(&key) {
                Some(mut paths) => {
                    paths.remove(path);
                    paths.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.declarations.remove(&key);
            }
        }
    }

    fn documents_of(&self, project: &ProjectId) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .documents
            .iter()
            .filter(|entry| &entry.value().project == project)
            .map(|entry| entry.key().clone())
            .collect();
        paths.sort();
        paths
    }

    /// All declarations of a key, with the project of the first one.
    fn declarations_of(&self, key: &NodeKey) -> Option<(ProjectId, Vec<(PathBuf, TypeDecl)>)> {
        let paths: Vec<PathBuf> = self.declarations.get(key)?.iter().cloned().collect();
        let mut project = None;
        let mut decls = Vec::new();
        for path in paths {
            let Some(document) = self.documents.get(&path) else {
                continue;
            };
            for decl in document.types.iter().filter(|d| &d.node_key() == key) {
                project.get_or_insert_with(|| document.project.clone());
                decls.push((path.clone(), decl.clone()));
            }
        }
        Some((project?, decls))
    }

    fn referenced_keys(&self, key: &NodeKey) -> Vec<NodeKey> {
        let Some((_, decls)) = self.declarations_of(key) else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        decls
            .iter()
            .flat_map(|(_, d)| d.base.iter().chain(&d.interfaces).chain(&d.uses))
            .map(|name| NodeKey::new(name.as_str()))
            .filter(|k| seen.insert(k.clone()))
            .collect()
    }
}

impl SourceResolver for MemoryWorkspace {
    fn projects(&self) -> Vec<ProjectId> {
        self.projects.read().clone()
    }

    fn documents(&self, project: &ProjectId) -> Vec<PathBuf> {
        self.documents_of(project)
    }

    fn declared_types(&self, path: &Path) -> Vec<TypeSymbol> {
        let keys: Vec<NodeKey> = match self.documents.get(path) {
            Some(document) => document.types.iter().map(TypeDecl::node_key).collect(),
            None => return Vec::new(),
        };
        keys.iter().filter_map(|key| self.resolve(key)).collect()
    }

    fn resolve(&self, key: &NodeKey) -> Option<TypeSymbol> {
        let (project, decls) = self.declarations_of(key)?;
        let (_, first) = decls.first()?;

        let mut symbol = TypeSymbol {
            key: key.clone(),
            name: first.name.clone(),
            kind: first.kind,
            project,
            files: Vec::new(),
            base_type: None,
            interfaces: Vec::new(),
            containing_type: None,
            nameable: true,
            generated: true,
        };
        for (path, decl) in &decls {
            if !symbol.files.contains(path) {
                symbol.files.push(path.clone());
            }
            if symbol.base_type.is_none() {
                symbol.base_type = decl.base.as_deref().map(NodeKey::from);
            }
            for interface in &decl.interfaces {
                let interface = NodeKey::from(interface.as_str());
                if !symbol.interfaces.contains(&interface) {
                    symbol.interfaces.push(interface);
                }
            }
            if symbol.containing_type.is_none() {
                symbol.containing_type = decl.nested_in.as_deref().map(NodeKey::from);
            }
            symbol.nameable &= !decl.anonymous;
            symbol.generated &= decl.generated;
        }
        Some(symbol)
    }

    fn dependencies<'a>(
        &'a self,
        symbol: &'a TypeSymbol,
    ) -> Box<dyn Iterator<Item = TypeSymbol> + 'a> {
        let keys = self.referenced_keys(&symbol.key);
        Box::new(keys.into_iter().filter_map(move |key| self.resolve(&key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODEL: &str = r#"
[[project]]
name = "Core"

[[project.document]]
path = "src/Shape.cs"

[[project.document.type]]
name = "Shape"
kind = "class"
interfaces = ["IDrawable"]

[[project.document]]
path = "src/IDrawable.cs"

[[project.document.type]]
name = "IDrawable"
kind = "interface"

[[project.document]]
path = "src/Circle.cs"

[[project.document.type]]
name = "Circle"
base = "Shape"
uses = ["Point", "Missing"]

[[project.document]]
path = "src/Circle.Generated.cs"

[[project.document.type]]
name = "Circle"
generated = true
interfaces = ["IDrawable"]

[[project.document.type]]
name = "Point"
kind = "struct"
"#;

    fn workspace() -> MemoryWorkspace {
        MemoryWorkspace::from_model(WorkspaceModel::from_toml_str(MODEL).unwrap()).unwrap()
    }

    #[test]
    fn test_partial_declarations_merge() {
        let ws = workspace();
        let circle = ws.resolve(&NodeKey::from("Circle")).unwrap();
        assert_eq!(
            circle.files,
            vec![
                PathBuf::from("src/Circle.Generated.cs"),
                PathBuf::from("src/Circle.cs")
            ]
        );
        assert_eq!(circle.base_type, Some(NodeKey::from("Shape")));
        assert_eq!(circle.interfaces, vec![NodeKey::from("IDrawable")]);
        assert!(!circle.generated, "only one declaration is generated");
    }

    #[test]
    fn test_dependencies_skip_unknown_types() {
        let ws = workspace();
        let circle = ws.resolve(&NodeKey::from("Circle")).unwrap();
        let mut deps: Vec<String> = ws.dependencies(&circle).map(|s| s.key.0).collect();
        deps.sort();
        assert_eq!(deps, vec!["IDrawable", "Point", "Shape"]);
    }

    #[test]
    fn test_resolution_misses_are_empty() {
        let ws = workspace();
        assert!(ws.resolve(&NodeKey::from("Nope")).is_none());
        assert!(ws.declared_types(Path::new("nope.cs")).is_empty());
        assert!(ws.documents(&ProjectId::new("Nope")).is_empty());
    }

    #[test]
    fn test_apply_reports_changed_documents() {
        let ws = workspace();
        let mut model = ws.snapshot();
        assert!(ws.apply(model.clone()).unwrap().is_empty());

        model.projects[0].documents.retain(|d| d.path != Path::new("src/IDrawable.cs"));
        let shape = model.projects[0]
            .documents
            .iter_mut()
            .find(|d| d.path == Path::new("src/Shape.cs"))
            .unwrap();
        shape.types[0].uses = vec!["Point".to_string()];
        let change = ws.apply(model).unwrap();
        assert_eq!(
            change.documents,
            vec![PathBuf::from("src/IDrawable.cs"), PathBuf::from("src/Shape.cs")]
        );
        assert!(!change.projects_changed);
        assert!(ws.resolve(&NodeKey::from("IDrawable")).is_none());
    }

    #[test]
    fn test_conflicting_projects_rejected() {
        let text = r#"
[[project]]
name = "A"
[[project.document]]
path = "a.cs"
[[project.document.type]]
name = "T"

[[project]]
name = "B"
[[project.document]]
path = "b.cs"
[[project.document.type]]
name = "T"
"#;
        assert!(matches!(
            WorkspaceModel::from_toml_str(text),
            Err(WorkspaceError::ConflictingProject { .. })
        ));
    }
}
