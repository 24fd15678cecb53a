//! Categorized subset of graph nodes selected for attention
//!
//! A node is a member while it has at least one inclusion category. The
//! pin group (pinned / unpinned) and the importance group (low / medium /
//! high) each hold at most one value per node.

use crate::model::{Node, NodeKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinState {
    Pinned,
    Unpinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

/// One reason a node belongs to the subgraph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Pinned,
    Unpinned,
    Selected,
    SelectionNeighbour,
    Changed,
    Importance(Importance),
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Pinned,
        Category::Unpinned,
        Category::Selected,
        Category::SelectionNeighbour,
        Category::Changed,
        Category::Importance(Importance::Low),
        Category::Importance(Importance::Medium),
        Category::Importance(Importance::High),
    ];

    pub const IMPORTANCE: [Category; 3] = [
        Category::Importance(Importance::Low),
        Category::Importance(Importance::Medium),
        Category::Importance(Importance::High),
    ];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Pinned => f.write_str("pinned"),
            Category::Unpinned => f.write_str("unpinned"),
            Category::Selected => f.write_str("selected"),
            Category::SelectionNeighbour => f.write_str("selection-neighbour"),
            Category::Changed => f.write_str("changed"),
            Category::Importance(Importance::Low) => f.write_str("importance-low"),
            Category::Importance(Importance::Medium) => f.write_str("importance-medium"),
            Category::Importance(Importance::High) => f.write_str("importance-high"),
        }
    }
}

/// Inclusion state of one subgraph member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub pin: Option<PinState>,
    pub selected: bool,
    pub selection_neighbour: bool,
    pub changed: bool,
    pub importance: Option<Importance>,
}

impl Membership {
    pub fn is_empty(&self) -> bool {
        *self == Membership::default()
    }

    pub fn has(&self, category: Category) -> bool {
        match category {
            Category::Pinned => self.pin == Some(PinState::Pinned),
            Category::Unpinned => self.pin == Some(PinState::Unpinned),
            Category::Selected => self.selected,
            Category::SelectionNeighbour => self.selection_neighbour,
            Category::Changed => self.changed,
            Category::Importance(level) => self.importance == Some(level),
        }
    }

    /// Set a category. Returns whether it was newly set and the category of
    /// the same exclusive group it displaced, if any.
    fn set(&mut self, category: Category) -> (bool, Option<Category>) {
        if self.has(category) {
            return (false, None);
        }
        let displaced = match category {
            Category::Pinned => self.pin.replace(PinState::Pinned).map(|_| Category::Unpinned),
            Category::Unpinned => self.pin.replace(PinState::Unpinned).map(|_| Category::Pinned),
            Category::Selected => {
                self.selected = true;
                None
            }
            Category::SelectionNeighbour => {
                self.selection_neighbour = true;
                None
            }
            Category::Changed => {
                self.changed = true;
                None
            }
            Category::Importance(level) => self.importance.replace(level).map(Category::Importance),
        };
        (true, displaced)
    }

    /// Clear a category; returns whether it was set.
    fn clear(&mut self, category: Category) -> bool {
        if !self.has(category) {
            return false;
        }
        match category {
            Category::Pinned | Category::Unpinned => self.pin = None,
            Category::Selected => self.selected = false,
            Category::SelectionNeighbour => self.selection_neighbour = false,
            Category::Changed => self.changed = false,
            Category::Importance(_) => self.importance = None,
        }
        true
    }

    /// Categories currently set, in [`Category::ALL`] order.
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL.into_iter().filter(|c| self.has(*c)).collect()
    }
}

/// Whether [`Subgraph::add_node`] consults the node filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inclusion {
    /// Add regardless of the filter.
    Always,
    /// Let the filter veto the node.
    Filtered,
}

/// Predicate that can keep nodes out of the subgraph.
pub trait NodeFilter: Send + Sync + fmt::Debug {
    fn allows(&self, node: &Node) -> bool;
}

/// The filter built from subgraph configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeFilter {
    pub exclude_nested_types: bool,
    pub exclude_generated: bool,
}

impl NodeFilter for TypeFilter {
    fn allows(&self, node: &Node) -> bool {
        !(self.exclude_nested_types && node.is_nested())
            && !(self.exclude_generated && node.is_generated())
    }
}

/// Result of adding a node: (added to subgraph, added to category).
pub type Added = (bool, bool);

/// Result of removing a node: (removed from subgraph, removed from category).
pub type Removed = (bool, bool);

#[derive(Debug, Clone, Default)]
pub struct Subgraph {
    members: HashMap<NodeKey, Membership>,
    by_category: HashMap<Category, HashSet<NodeKey>>,
    filter: Option<Arc<dyn NodeFilter>>,
}

impl Subgraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(filter: Arc<dyn NodeFilter>) -> Self {
        Subgraph {
            filter: Some(filter),
            ..Self::default()
        }
    }

    /// A new empty subgraph sharing this one's filter.
    pub fn cleared(&self) -> Self {
        Subgraph {
            filter: self.filter.clone(),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, key: &NodeKey) -> bool {
        self.members.contains_key(key)
    }

    pub fn membership(&self, key: &NodeKey) -> Option<&Membership> {
        self.members.get(key)
    }

    pub fn has_category(&self, key: &NodeKey, category: Category) -> bool {
        self.by_category
            .get(&category)
            .is_some_and(|keys| keys.contains(key))
    }

    pub fn is_pinned(&self, key: &NodeKey) -> bool {
        self.has_category(key, Category::Pinned)
    }

    pub fn importance(&self, key: &NodeKey) -> Option<Importance> {
        self.members.get(key).and_then(|m| m.importance)
    }

    /// Members of one category.
    pub fn members(&self, category: Category) -> impl Iterator<Item = &NodeKey> {
        self.by_category.get(&category).into_iter().flatten()
    }

    pub fn category_len(&self, category: Category) -> usize {
        self.by_category.get(&category).map_or(0, HashSet::len)
    }

    /// Member counts per non-empty category.
    pub fn category_counts(&self) -> BTreeMap<Category, usize> {
        self.by_category
            .iter()
            .filter(|(_, keys)| !keys.is_empty())
            .map(|(c, keys)| (*c, keys.len()))
            .collect()
    }

    pub fn keys(&self) -> impl Iterator<Item = &NodeKey> {
        self.members.keys()
    }

    /// Member keys in sorted order.
    pub fn sorted_keys(&self) -> Vec<NodeKey> {
        let mut keys: Vec<NodeKey> = self.members.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Whether the filter would admit `node`.
    pub fn allows(&self, node: &Node) -> bool {
        self.filter.as_ref().is_none_or(|f| f.allows(node))
    }

    /// Add `node` under `category`, displacing the other member of an
    /// exclusive group.
    pub fn add_node(&mut self, node: &Node, category: Category, inclusion: Inclusion) -> Added {
        if inclusion == Inclusion::Filtered && !self.allows(node) {
            return (false, false);
        }
        let mut added_to_subgraph = false;
        let membership = self.members.entry(node.key.clone()).or_insert_with(|| {
            added_to_subgraph = true;
            Membership::default()
        });
        let (added_to_category, displaced) = membership.set(category);
        if let Some(displaced) = displaced {
            if let Some(keys) = self.by_category.get_mut(&displaced) {
                keys.remove(&node.key);
            }
        }
        if added_to_category {
            self.by_category
                .entry(category)
                .or_default()
                .insert(node.key.clone());
        }
        (added_to_subgraph, added_to_category)
    }

    /// Clear `category` on a node, dropping the node once nothing is left.
    pub fn remove_node_from_category(&mut self, key: &NodeKey, category: Category) -> Removed {
        let Some(membership) = self.members.get_mut(key) else {
            return (false, false);
        };
        if !membership.clear(category) {
            return (false, false);
        }
        if let Some(keys) = self.by_category.get_mut(&category) {
            keys.remove(key);
        }
        if membership.is_empty() {
            self.members.remove(key);
            return (true, true);
        }
        (false, true)
    }

    /// Like [`Subgraph::remove_node_from_category`], but a node that is not
    /// pinned stays behind as unpinned instead of disappearing.
    pub fn remove_node_from_category_leave_unpinned(
        &mut self,
        key: &NodeKey,
        category: Category,
    ) -> Removed {
        let Some(membership) = self.members.get_mut(key) else {
            return (false, false);
        };
        if !membership.has(category) {
            return (false, false);
        }
        let keep_as_unpinned = category != Category::Pinned
            && category != Category::Unpinned
            && membership.pin.is_none();
        if keep_as_unpinned {
            membership.set(Category::Unpinned);
            self.by_category
                .entry(Category::Unpinned)
                .or_default()
                .insert(key.clone());
        }
        self.remove_node_from_category(key, category)
    }

    /// Clear every importance level on a node.
    pub fn remove_importance(&mut self, key: &NodeKey) -> Removed {
        match self.importance(key) {
            Some(level) => self.remove_node_from_category(key, Category::Importance(level)),
            None => (false, false),
        }
    }

    /// Flip a node between pinned and unpinned; absent nodes become pinned.
    /// Returns the new pin state.
    pub fn toggle_pinned(&mut self, node: &Node) -> PinState {
        if self.is_pinned(&node.key) {
            self.add_node(node, Category::Unpinned, Inclusion::Always);
            PinState::Unpinned
        } else {
            self.add_node(node, Category::Pinned, Inclusion::Always);
            PinState::Pinned
        }
    }

    /// Drop a node from every category.
    pub fn remove_node(&mut self, key: &NodeKey) -> bool {
        let Some(membership) = self.members.remove(key) else {
            return false;
        };
        for category in membership.categories() {
            if let Some(keys) = self.by_category.get_mut(&category) {
                keys.remove(key);
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.by_category.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NodeVariant, ProjectId, TypeKind, TypeNode, VcsStatus};

    fn node(key: &str, nested: bool) -> Node {
        Node {
            key: NodeKey::from(key),
            variant: NodeVariant::Type(TypeNode {
                name: key.to_string(),
                kind: TypeKind::Class,
                project: ProjectId::new("Core"),
                containing_type: nested.then(|| NodeKey::from("Outer")),
                generated: false,
            }),
            files: Vec::new(),
            vcs_status: VcsStatus::Unmodified,
            annotations: Default::default(),
        }
    }

    #[test]
    fn test_pinned_and_unpinned_are_exclusive() {
        let mut subgraph = Subgraph::new();
        let a = node("A", false);
        assert_eq!(
            subgraph.add_node(&a, Category::Unpinned, Inclusion::Always),
            (true, true)
        );
        assert_eq!(
            subgraph.add_node(&a, Category::Pinned, Inclusion::Always),
            (false, true)
        );
        assert!(subgraph.is_pinned(&a.key));
        assert!(!subgraph.has_category(&a.key, Category::Unpinned));
        assert_eq!(subgraph.category_len(Category::Unpinned), 0);
        assert_eq!(
            subgraph.add_node(&a, Category::Pinned, Inclusion::Always),
            (false, false)
        );
    }

    #[test]
    fn test_importance_levels_are_exclusive() {
        let mut subgraph = Subgraph::new();
        let a = node("A", false);
        subgraph.add_node(&a, Category::Importance(Importance::Low), Inclusion::Always);
        subgraph.add_node(&a, Category::Importance(Importance::High), Inclusion::Always);
        assert_eq!(subgraph.importance(&a.key), Some(Importance::High));
        assert_eq!(subgraph.category_len(Category::Importance(Importance::Low)), 0);
    }

    #[test]
    fn test_last_category_removal_drops_node() {
        let mut subgraph = Subgraph::new();
        let a = node("A", false);
        subgraph.add_node(&a, Category::Selected, Inclusion::Always);
        subgraph.add_node(&a, Category::Changed, Inclusion::Always);

        assert_eq!(
            subgraph.remove_node_from_category(&a.key, Category::Selected),
            (false, true)
        );
        assert!(subgraph.contains(&a.key));
        assert_eq!(
            subgraph.remove_node_from_category(&a.key, Category::Changed),
            (true, true)
        );
        assert!(!subgraph.contains(&a.key));
        assert_eq!(
            subgraph.remove_node_from_category(&a.key, Category::Changed),
            (false, false)
        );
    }

    #[test]
    fn test_leave_unpinned_keeps_node() {
        let mut subgraph = Subgraph::new();
        let a = node("A", false);
        let b = node("B", false);
        subgraph.add_node(&a, Category::Selected, Inclusion::Always);
        subgraph.add_node(&b, Category::Selected, Inclusion::Always);
        subgraph.add_node(&b, Category::Pinned, Inclusion::Always);

        assert_eq!(
            subgraph.remove_node_from_category_leave_unpinned(&a.key, Category::Selected),
            (false, true)
        );
        assert!(subgraph.has_category(&a.key, Category::Unpinned));

        subgraph.remove_node_from_category_leave_unpinned(&b.key, Category::Selected);
        assert!(subgraph.is_pinned(&b.key));
        assert!(!subgraph.has_category(&b.key, Category::Unpinned));

        // removing the pin itself does not leave an unpinned shell
        assert_eq!(
            subgraph.remove_node_from_category_leave_unpinned(&b.key, Category::Pinned),
            (true, true)
        );
    }

    #[test]
    fn test_filter_vetoes_only_filtered_inclusion() {
        let filter = TypeFilter {
            exclude_nested_types: true,
            exclude_generated: false,
        };
        let mut subgraph = Subgraph::with_filter(Arc::new(filter));
        let inner = node("Inner", true);
        assert_eq!(
            subgraph.add_node(&inner, Category::Pinned, Inclusion::Filtered),
            (false, false)
        );
        assert_eq!(
            subgraph.add_node(&inner, Category::Pinned, Inclusion::Always),
            (true, true)
        );
    }

    #[test]
    fn test_toggle_pinned() {
        let mut subgraph = Subgraph::new();
        let a = node("A", false);
        assert_eq!(subgraph.toggle_pinned(&a), PinState::Pinned);
        assert_eq!(subgraph.toggle_pinned(&a), PinState::Unpinned);
        assert!(subgraph.contains(&a.key));
        assert_eq!(subgraph.toggle_pinned(&a), PinState::Pinned);
    }
}
