//! Source model resolver interface consumed by the graph

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::model::{NodeKey, ProjectId, Relationship, TypeKind};

/// A declared type as reported by the resolver.
///
/// `base_type` and `interfaces` refer to the unconstructed (generic
/// definition) keys, so a link to `List<T>` and one to `List<int>` resolve to
/// the same node.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeSymbol {
    pub key: NodeKey,
    pub name: String,
    pub kind: TypeKind,
    pub project: ProjectId,
    pub files: Vec<PathBuf>,
    pub base_type: Option<NodeKey>,
    pub interfaces: Vec<NodeKey>,
    pub containing_type: Option<NodeKey>,
    /// False for anonymous and compiler-only types.
    pub nameable: bool,
    /// True when every declaration lives in generated code.
    pub generated: bool,
}

impl TypeSymbol {
    /// Relationship of `self` (the dependent) to `dependency`.
    pub fn relationship_to(&self, dependency: &NodeKey) -> Relationship {
        let mut relationship = Relationship::UNSPECIFIED;
        if self.base_type.as_ref() == Some(dependency) {
            relationship |= Relationship::INHERITS;
        }
        if self.interfaces.iter().any(|i| i == dependency) {
            relationship |= Relationship::IMPLEMENTS;
        }
        relationship
    }
}

/// Provider of declared types and their dependencies.
///
/// Misses are soft: unknown projects, paths and keys yield empty results or
/// `None`, never an error.
pub trait SourceResolver: Send + Sync {
    /// All projects known to the resolver.
    fn projects(&self) -> Vec<ProjectId>;

    /// Syntax units (documents) belonging to a project.
    fn documents(&self, project: &ProjectId) -> Vec<PathBuf>;

    /// Types declared in a document.
    fn declared_types(&self, path: &Path) -> Vec<TypeSymbol>;

    /// Current symbol for a key, if it still exists.
    fn resolve(&self, key: &NodeKey) -> Option<TypeSymbol>;

    /// Types the symbol depends on, produced lazily.
    fn dependencies<'a>(
        &'a self,
        symbol: &'a TypeSymbol,
    ) -> Box<dyn Iterator<Item = TypeSymbol> + 'a>;
}

/// Which symbols belong to the graph.
#[derive(Debug, Clone, Default)]
pub struct Universe {
    /// `None` includes every project the resolver reports.
    pub included_projects: Option<HashSet<ProjectId>>,
    pub exclude_generated: bool,
}

impl Universe {
    pub fn all() -> Self {
        Universe::default()
    }

    pub fn with_projects(projects: impl IntoIterator<Item = ProjectId>) -> Self {
        Universe {
            included_projects: Some(projects.into_iter().collect()),
            exclude_generated: false,
        }
    }

    pub fn includes_project(&self, project: &ProjectId) -> bool {
        self.included_projects
            .as_ref()
            .is_none_or(|projects| projects.contains(project))
    }

    /// Whether a symbol becomes a node.
    pub fn contains(&self, symbol: &TypeSymbol) -> bool {
        self.includes_project(&symbol.project)
            && symbol.kind.is_graphable()
            && symbol.nameable
            && !(self.exclude_generated && symbol.generated)
    }

    /// Included projects in resolver order.
    pub fn projects(&self, resolver: &dyn SourceResolver) -> Vec<ProjectId> {
        resolver
            .projects()
            .into_iter()
            .filter(|p| self.includes_project(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(base: Option<&str>, interfaces: &[&str]) -> TypeSymbol {
        TypeSymbol {
            key: NodeKey::from("Derived"),
            name: "Derived".to_string(),
            kind: TypeKind::Class,
            project: ProjectId::new("Core"),
            files: vec![PathBuf::from("Derived.cs")],
            base_type: base.map(NodeKey::from),
            interfaces: interfaces.iter().map(|i| NodeKey::from(*i)).collect(),
            containing_type: None,
            nameable: true,
            generated: false,
        }
    }

    #[test]
    fn test_relationship_is_structural() {
        let s = symbol(Some("Base"), &["IThing", "Base"]);
        assert_eq!(s.relationship_to(&NodeKey::from("IThing")), Relationship::IMPLEMENTS);
        assert_eq!(
            s.relationship_to(&NodeKey::from("Base")),
            Relationship::INHERITS | Relationship::IMPLEMENTS
        );
        assert!(s.relationship_to(&NodeKey::from("Other")).is_unspecified());
    }

    #[test]
    fn test_universe_filters() {
        let mut s = symbol(None, &[]);
        let universe = Universe::with_projects([ProjectId::new("Core")]);
        assert!(universe.contains(&s));

        s.kind = TypeKind::Delegate;
        assert!(!universe.contains(&s));

        s.kind = TypeKind::Struct;
        s.nameable = false;
        assert!(!universe.contains(&s));

        s.nameable = true;
        s.generated = true;
        assert!(universe.contains(&s));
        let strict = Universe {
            exclude_generated: true,
            ..universe.clone()
        };
        assert!(!strict.contains(&s));

        s.project = ProjectId::new("Tests");
        assert!(!universe.contains(&s));
        assert!(Universe::all().contains(&s));
    }
}
