//! Core data structures for the type dependency graph

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable, value-identity key of a node, as reported by the source resolver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(pub String);

impl NodeKey {
    pub fn new(key: impl Into<String>) -> Self {
        NodeKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeKey {
    fn from(key: &str) -> Self {
        NodeKey(key.to_string())
    }
}

/// Identifier of a project (the unit whose types form the graph universe).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(name: impl Into<String>) -> Self {
        ProjectId(name.into())
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discriminates what kind of declared type a symbol is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    #[default]
    Class,
    Interface,
    Enum,
    Struct,
    Delegate,
    Other,
}

impl TypeKind {
    /// Kinds that become graph nodes.
    pub fn is_graphable(self) -> bool {
        matches!(
            self,
            TypeKind::Class | TypeKind::Interface | TypeKind::Enum | TypeKind::Struct
        )
    }
}

/// How a dependent relates to one of its dependencies.
///
/// The empty set means "unspecified usage"; inheritance and interface
/// implementation may both be set for the same link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Relationship {
    pub inherits: bool,
    pub implements: bool,
}

impl Relationship {
    pub const UNSPECIFIED: Relationship = Relationship {
        inherits: false,
        implements: false,
    };
    pub const INHERITS: Relationship = Relationship {
        inherits: true,
        implements: false,
    };
    pub const IMPLEMENTS: Relationship = Relationship {
        inherits: false,
        implements: true,
    };

    pub fn is_unspecified(self) -> bool {
        !self.inherits && !self.implements
    }

    /// True if every flag set in `other` is also set here.
    pub fn contains(self, other: Relationship) -> bool {
        (!other.inherits || self.inherits) && (!other.implements || self.implements)
    }

    /// True if the two sets share at least one flag.
    pub fn intersects(self, other: Relationship) -> bool {
        (self.inherits && other.inherits) || (self.implements && other.implements)
    }
}

impl BitOr for Relationship {
    type Output = Relationship;

    fn bitor(self, rhs: Relationship) -> Relationship {
        Relationship {
            inherits: self.inherits || rhs.inherits,
            implements: self.implements || rhs.implements,
        }
    }
}

impl BitOrAssign for Relationship {
    fn bitor_assign(&mut self, rhs: Relationship) {
        *self = *self | rhs;
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.inherits, self.implements) {
            (false, false) => f.write_str("uses"),
            (true, false) => f.write_str("inherits"),
            (false, true) => f.write_str("implements"),
            (true, true) => f.write_str("inherits+implements"),
        }
    }
}

/// Version-control status of a node's backing files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsStatus {
    #[default]
    Unmodified,
    Modified,
    Added,
    Untracked,
}

impl VcsStatus {
    pub fn is_changed(self) -> bool {
        self != VcsStatus::Unmodified
    }
}

/// Data carried by a type-backed node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeNode {
    pub name: String,
    pub kind: TypeKind,
    pub project: ProjectId,
    /// Key of the enclosing type for nested declarations.
    pub containing_type: Option<NodeKey>,
    pub generated: bool,
}

/// The kinds of vertex the graph can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeVariant {
    Type(TypeNode),
}

/// A single vertex of the dependency graph.
///
/// Links are not stored on the node itself; the owning [`crate::Graph`] keeps
/// them as arena edges so the forward and back sets cannot drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub key: NodeKey,
    pub variant: NodeVariant,
    /// Source files that declare this node, kept sorted.
    pub files: Vec<PathBuf>,
    pub vcs_status: VcsStatus,
    /// Opaque display values written by annotation passes.
    pub annotations: BTreeMap<String, String>,
}

impl Node {
    pub fn from_symbol(symbol: &crate::resolver::TypeSymbol) -> Self {
        let mut files = symbol.files.clone();
        files.sort();
        files.dedup();
        Node {
            key: symbol.key.clone(),
            variant: NodeVariant::Type(TypeNode {
                name: symbol.name.clone(),
                kind: symbol.kind,
                project: symbol.project.clone(),
                containing_type: symbol.containing_type.clone(),
                generated: symbol.generated,
            }),
            files,
            vcs_status: VcsStatus::default(),
            annotations: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        match &self.variant {
            NodeVariant::Type(t) => &t.name,
        }
    }

    pub fn project(&self) -> &ProjectId {
        match &self.variant {
            NodeVariant::Type(t) => &t.project,
        }
    }

    pub fn type_kind(&self) -> TypeKind {
        match &self.variant {
            NodeVariant::Type(t) => t.kind,
        }
    }

    pub fn is_nested(&self) -> bool {
        match &self.variant {
            NodeVariant::Type(t) => t.containing_type.is_some(),
        }
    }

    pub fn is_generated(&self) -> bool {
        match &self.variant {
            NodeVariant::Type(t) => t.generated,
        }
    }
}

/// A directed dependency edge: `dependent` depends on `dependency`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Link {
    pub dependency: NodeKey,
    pub dependent: NodeKey,
    pub relationship: Relationship,
}

impl Link {
    pub fn new(dependency: NodeKey, dependent: NodeKey, relationship: Relationship) -> Self {
        Link {
            dependency,
            dependent,
            relationship,
        }
    }
}
