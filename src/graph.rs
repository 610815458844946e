//! The target graph.
//!
//! A `ModGraph` is an arena of slots: the mutable tree of game state
//! that modifier descriptions are applied against. Interior nodes are
//! string-keyed branches, leaves are numbers, booleans, reactive stats,
//! or reactive mods. Nodes are addressed by stable `NodeId` handles, so
//! modifier sources can reference live quantities without holding
//! borrows into the tree.

use crate::modifier::Mod;
use crate::path::ModPath;
use crate::policy::{AllowAll, WritePolicy};
use crate::source::{SourceRef, SourceResolver};
use crate::stat::Stat;
use std::collections::BTreeMap;

/// Stable handle to a slot in a [`ModGraph`].
///
/// Ids are never reused; a graph only grows within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One addressable cell of the target tree.
#[derive(Debug)]
pub enum Slot {
    /// Placeholder while a node is detached for mutation. Resolves to 0.
    Vacant,
    /// Plain number, modifiable only by materialization or subeffects.
    Number(f64),
    /// Boolean flag, settable by toggle descriptions.
    Bool(bool),
    /// Reactive stat; stacks modifiers and tracks changes.
    Stat(Stat),
    /// Reactive standalone mod; stacks modifiers onto a modifier.
    Mod(Mod),
    /// Interior node with string-keyed children.
    Branch(BTreeMap<String, NodeId>),
    /// Ordered collection; element-targeted applications fan out.
    List(Vec<NodeId>),
}

impl Slot {
    /// Whether this slot coerces to a number for source resolution and
    /// count propagation.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Slot::Number(_) | Slot::Bool(_) | Slot::Stat(_) | Slot::Mod(_)
        )
    }

    /// Whether this slot stacks modifiers itself.
    pub fn is_reactive(&self) -> bool {
        matches!(self, Slot::Stat(_) | Slot::Mod(_))
    }
}

/// Arena-backed tree of modifiable game state.
///
/// # Examples
///
/// ```rust
/// use modtree::{ModGraph, Slot};
///
/// let mut graph = ModGraph::new("player");
/// let root = graph.root();
/// let hp = graph.add_stat(root, "hp", 100.0, true).unwrap();
/// assert_eq!(graph.value(hp), 100.0);
/// assert_eq!(graph.path(hp).as_str(), "player.hp");
/// ```
pub struct ModGraph {
    nodes: Vec<Slot>,
    paths: Vec<ModPath>,
    root: NodeId,
    policy: Box<dyn WritePolicy>,
}

impl ModGraph {
    /// An empty graph whose root branch sits at `root_id`.
    pub fn new(root_id: impl Into<ModPath>) -> Self {
        Self {
            nodes: vec![Slot::Branch(BTreeMap::new())],
            paths: vec![root_id.into()],
            root: NodeId(0),
            policy: Box::new(AllowAll),
        }
    }

    /// Replace the write policy consulted before materializing holders
    /// (builder form).
    pub fn with_policy(mut self, policy: Box<dyn WritePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// The root branch.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Dotted path of a node, for diagnostics and modifier ids.
    pub fn path(&self, node: NodeId) -> &ModPath {
        &self.paths[node.0]
    }

    /// The slot stored at `node`.
    pub fn slot(&self, node: NodeId) -> &Slot {
        &self.nodes[node.0]
    }

    /// Mutable access to the slot stored at `node`.
    pub fn slot_mut(&mut self, node: NodeId) -> &mut Slot {
        &mut self.nodes[node.0]
    }

    pub(crate) fn can_write(&self, path: &ModPath, key: &str) -> bool {
        self.policy.can_write(path, key)
    }

    /// Child of a branch by key. `None` for other slot kinds.
    pub fn child(&self, node: NodeId, key: &str) -> Option<NodeId> {
        match &self.nodes[node.0] {
            Slot::Branch(children) => children.get(key).copied(),
            _ => None,
        }
    }

    /// Insert `slot` as a fresh child of the branch at `parent`.
    ///
    /// The child's path is derived from the parent's. An existing child
    /// under `key` is replaced in the branch; its old node stays in the
    /// arena but becomes unreachable.
    pub fn add_child(&mut self, parent: NodeId, key: &str, slot: Slot) -> Option<NodeId> {
        let path = self.paths[parent.0].child(key);
        let Slot::Branch(_) = &self.nodes[parent.0] else {
            return None;
        };
        let id = self.push(slot, path);
        if let Slot::Branch(children) = &mut self.nodes[parent.0] {
            children.insert(key.to_owned(), id);
        }
        Some(id)
    }

    /// Append `slot` to the list at `list`, keyed by its index.
    pub fn add_element(&mut self, list: NodeId, slot: Slot) -> Option<NodeId> {
        let Slot::List(items) = &self.nodes[list.0] else {
            return None;
        };
        let path = self.paths[list.0].child(&items.len().to_string());
        let id = self.push(slot, path);
        if let Slot::List(items) = &mut self.nodes[list.0] {
            items.push(id);
        }
        Some(id)
    }

    /// Convenience: add a [`Stat`] child whose id is its graph path.
    pub fn add_stat(&mut self, parent: NodeId, key: &str, base: f64, pos: bool) -> Option<NodeId> {
        let path = self.paths[parent.0].child(key);
        self.add_child(parent, key, Slot::Stat(Stat::new(base, path).with_pos(pos)))
    }

    /// Convenience: add an empty branch child.
    pub fn add_branch(&mut self, parent: NodeId, key: &str) -> Option<NodeId> {
        self.add_child(parent, key, Slot::Branch(BTreeMap::new()))
    }

    fn push(&mut self, slot: Slot, path: ModPath) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(slot);
        self.paths.push(path);
        id
    }

    /// Numeric reading of a node.
    ///
    /// Numbers are themselves, booleans coerce to 0/1, stats read their
    /// derived value, mods their flat bonus. A branch reads through its
    /// `value` child if it has one; lists and vacant slots read 0.
    pub fn value(&self, node: NodeId) -> f64 {
        match &self.nodes[node.0] {
            Slot::Vacant => 0.0,
            Slot::Number(n) => *n,
            Slot::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Slot::Stat(s) => s.value(),
            Slot::Mod(m) => m.bonus(),
            Slot::Branch(children) => match children.get("value") {
                Some(child) => self.value(*child),
                None => 0.0,
            },
            Slot::List(_) => 0.0,
        }
    }

    /// Run `f` on the slot at `node` with the rest of the graph readable
    /// as a resolver.
    ///
    /// The slot is detached for the duration, so a modifier sourcing the
    /// node being mutated reads 0 rather than a half-updated value.
    pub(crate) fn mutate_slot<R>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Slot, &ModGraph) -> R,
    ) -> R {
        let mut slot = std::mem::replace(&mut self.nodes[node.0], Slot::Vacant);
        let out = f(&mut slot, &*self);
        self.nodes[node.0] = slot;
        out
    }
}

impl SourceResolver for ModGraph {
    fn value_of(&self, source: &SourceRef) -> f64 {
        match source {
            SourceRef::Const(v) => *v,
            SourceRef::Node(node) => self.value(*node),
        }
    }
}

impl std::fmt::Debug for ModGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModGraph")
            .field("nodes", &self.nodes)
            .field("paths", &self.paths)
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_structure() {
        let mut g = ModGraph::new("player");
        let root = g.root();
        let hp = g.add_branch(root, "hp").unwrap();
        let max = g.add_stat(hp, "max", 50.0, true).unwrap();
        assert_eq!(g.path(max).as_str(), "player.hp.max");
    }

    #[test]
    fn test_value_readings() {
        let mut g = ModGraph::new("g");
        let root = g.root();
        let n = g.add_child(root, "gold", Slot::Number(7.0)).unwrap();
        let b = g.add_child(root, "locked", Slot::Bool(true)).unwrap();
        let s = g.add_stat(root, "hp", 10.0, true).unwrap();
        assert_eq!(g.value(n), 7.0);
        assert_eq!(g.value(b), 1.0);
        assert_eq!(g.value(s), 10.0);
    }

    #[test]
    fn test_branch_reads_through_value_child() {
        let mut g = ModGraph::new("g");
        let root = g.root();
        let speed = g.add_branch(root, "speed").unwrap();
        assert_eq!(g.value(speed), 0.0);
        g.add_child(speed, "value", Slot::Number(3.0)).unwrap();
        assert_eq!(g.value(speed), 3.0);
    }

    #[test]
    fn test_add_child_rejects_non_branch_parent() {
        let mut g = ModGraph::new("g");
        let root = g.root();
        let n = g.add_child(root, "gold", Slot::Number(1.0)).unwrap();
        assert!(g.add_child(n, "x", Slot::Number(2.0)).is_none());
    }

    #[test]
    fn test_source_resolution() {
        let mut g = ModGraph::new("g");
        let root = g.root();
        let str_node = g.add_stat(root, "str", 25.0, true).unwrap();
        assert_eq!(g.value_of(&SourceRef::Node(str_node)), 25.0);
        assert_eq!(g.value_of(&SourceRef::Const(4.0)), 4.0);
    }

    #[test]
    fn test_detached_mutation_sees_rest_of_graph() {
        let mut g = ModGraph::new("g");
        let root = g.root();
        let str_node = g.add_stat(root, "str", 30.0, true).unwrap();
        let hp = g.add_stat(root, "hp", 10.0, true).unwrap();

        let m = crate::Mod::flat("per_str", 1.0).with_source(SourceRef::Node(str_node));
        g.mutate_slot(hp, |slot, resolver| {
            if let Slot::Stat(stat) = slot {
                stat.add_mod(m, resolver);
            }
        });
        assert_eq!(g.value(hp), 40.0);

        // a detached node reads as 0 through the resolver
        g.mutate_slot(str_node, |_, resolver| {
            assert_eq!(resolver.value_of(&SourceRef::Node(str_node)), 0.0);
        });
    }

    #[test]
    fn test_list_elements() {
        let mut g = ModGraph::new("g");
        let root = g.root();
        let list = g.add_child(root, "minions", Slot::List(Vec::new())).unwrap();
        let e0 = g.add_element(list, Slot::Branch(BTreeMap::new())).unwrap();
        assert_eq!(g.path(e0).as_str(), "g.minions.0");
    }
}
