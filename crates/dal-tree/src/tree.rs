//! Arena tree with generational handles
//!
//! Parents are stored as handles, children as owned handles. A removed node
//! bumps its slot generation so old handles stop resolving.

use crate::error::{TreeError, TreeResult};
use indexmap::IndexMap;
use std::fmt;

/// Type tag carried by every node payload
///
/// Used by [`Tree::find_first_ancestor`] to locate the closest ancestor of a
/// given kind without storing back-pointers at every level.
pub trait NodeKind {
    /// Stable type tag
    fn node_type(&self) -> &'static str;
}

/// Handle to a node inside a [`Tree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// Shape of a node's child set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// No children
    Leaf,
    /// Ordered children, addressed by position
    List,
    /// Name-keyed children, insertion ordered
    Map,
}

#[derive(Debug)]
enum Children {
    Leaf,
    List(Vec<NodeId>),
    Map(IndexMap<String, NodeId>),
}

impl Children {
    fn new(layout: Layout) -> Self {
        match layout {
            Layout::Leaf => Self::Leaf,
            Layout::List => Self::List(Vec::new()),
            Layout::Map => Self::Map(IndexMap::new()),
        }
    }

    fn ids(&self) -> Vec<NodeId> {
        match self {
            Self::Leaf => Vec::new(),
            Self::List(ids) => ids.clone(),
            Self::Map(map) => map.values().copied().collect(),
        }
    }
}

#[derive(Debug)]
struct Node<T> {
    name: String,
    data: T,
    parent: Option<NodeId>,
    children: Children,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    node: Option<Node<T>>,
}

/// Arena owning every node of one or more trees
#[derive(Debug)]
pub struct Tree<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Tree<T> {
    /// Create an empty arena
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of live nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the arena holds no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a detached node
    pub fn insert(&mut self, name: impl Into<String>, data: T, layout: Layout) -> NodeId {
        let node = Node {
            name: name.into(),
            data,
            parent: None,
            children: Children::new(layout),
        };
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).unwrap_or(u32::MAX);
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    /// Whether the handle points to a live node
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    fn node(&self, id: NodeId) -> Option<&Node<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<T>> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn require(&self, id: NodeId) -> TreeResult<&Node<T>> {
        self.node(id).ok_or(TreeError::UnknownNode(id))
    }

    /// Payload of a node
    #[inline]
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.node(id).map(|n| &n.data)
    }

    /// Mutable payload of a node
    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id).map(|n| &mut n.data)
    }

    /// Name of a node
    #[inline]
    #[must_use]
    pub fn name(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(|n| n.name.as_str())
    }

    /// Child layout of a node
    #[must_use]
    pub fn layout(&self, id: NodeId) -> Option<Layout> {
        self.node(id).map(|n| match n.children {
            Children::Leaf => Layout::Leaf,
            Children::List(_) => Layout::List,
            Children::Map(_) => Layout::Map,
        })
    }

    /// Owning parent, if attached
    #[inline]
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Children in stable order
    ///
    /// List layouts keep insertion order; map layouts keep key insertion order.
    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.children.ids()).unwrap_or_default()
    }

    /// Number of direct children
    #[must_use]
    pub fn child_count(&self, id: NodeId) -> usize {
        match self.node(id).map(|n| &n.children) {
            Some(Children::List(ids)) => ids.len(),
            Some(Children::Map(map)) => map.len(),
            _ => 0,
        }
    }

    /// Direct child by name
    #[must_use]
    pub fn child(&self, id: NodeId, name: &str) -> Option<NodeId> {
        match &self.node(id)?.children {
            Children::Leaf => None,
            Children::Map(map) => map.get(name).copied(),
            Children::List(ids) => ids
                .iter()
                .copied()
                .find(|child| self.name(*child) == Some(name)),
        }
    }

    /// Attach a detached node under `parent`
    ///
    /// # Errors
    /// Fails if either handle is stale, the child already has a parent, the
    /// parent is a leaf, the name is taken in a map parent, or the child is
    /// an ancestor of the parent.
    pub fn attach(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let child_node = self.require(child)?;
        if child_node.parent.is_some() {
            return Err(TreeError::AlreadyAttached { child });
        }
        let name = child_node.name.clone();

        if parent == child || self.ancestors(parent).any(|a| a == child) {
            return Err(TreeError::Cycle { parent, child });
        }

        let parent_node = self.node_mut(parent).ok_or(TreeError::UnknownNode(parent))?;
        match &mut parent_node.children {
            Children::Leaf => return Err(TreeError::NotAContainer(parent)),
            Children::List(ids) => ids.push(child),
            Children::Map(map) => {
                if map.contains_key(&name) {
                    return Err(TreeError::NameTaken { name });
                }
                map.insert(name, child);
            }
        }

        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        Ok(())
    }

    /// Detach `child` from `parent`, leaving it alive in the arena
    ///
    /// # Errors
    /// Fails with [`TreeError::NotAChild`] if `parent` does not own `child`.
    pub fn detach(&mut self, parent: NodeId, child: NodeId) -> TreeResult<()> {
        let child_node = self.require(child)?;
        if child_node.parent != Some(parent) {
            return Err(TreeError::NotAChild { parent, child });
        }
        let name = child_node.name.clone();

        let parent_node = self.node_mut(parent).ok_or(TreeError::UnknownNode(parent))?;
        match &mut parent_node.children {
            Children::Leaf => return Err(TreeError::NotAChild { parent, child }),
            Children::List(ids) => ids.retain(|id| *id != child),
            Children::Map(map) => {
                map.shift_remove(&name);
            }
        }

        if let Some(node) = self.node_mut(child) {
            node.parent = None;
        }
        Ok(())
    }

    /// Remove a node and its whole subtree, returning the node's payload
    ///
    /// # Errors
    /// Fails if the handle is stale.
    pub fn remove(&mut self, id: NodeId) -> TreeResult<T> {
        if let Some(parent) = self.require(id)?.parent {
            self.detach(parent, id)?;
        }

        let mut stack = self.children(id);
        while let Some(next) = stack.pop() {
            stack.extend(self.children(next));
            self.free_slot(next);
        }

        self.free_slot(id).ok_or(TreeError::UnknownNode(id))
    }

    /// Remove every child of a node, keeping the node itself
    pub fn clear_children(&mut self, id: NodeId) -> TreeResult<()> {
        for child in self.children(id) {
            self.remove(child)?;
        }
        Ok(())
    }

    fn free_slot(&mut self, id: NodeId) -> Option<T> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.len -= 1;
        Some(node.data)
    }

    /// Ancestors from the parent up to the root
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// Distance from the root; a root has depth 0
    #[must_use]
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Path from the root, recomputed on every call
    ///
    /// Map children contribute their name, list children their position.
    #[must_use]
    pub fn path(&self, id: NodeId, separator: &str) -> String {
        let mut segments = vec![self.segment(id)];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            segments.push(self.segment(parent));
            current = parent;
        }
        segments.reverse();
        segments.join(separator)
    }

    fn segment(&self, id: NodeId) -> String {
        let name = self.name(id).unwrap_or_default().to_string();
        let Some(parent) = self.parent(id) else {
            return name;
        };
        match self.node(parent).map(|n| &n.children) {
            Some(Children::List(ids)) => ids
                .iter()
                .position(|c| *c == id)
                .map_or(name, |pos| pos.to_string()),
            _ => name,
        }
    }
}

impl<T: NodeKind> Tree<T> {
    /// Closest ancestor (excluding the node itself) with the given type tag
    #[must_use]
    pub fn find_first_ancestor(&self, id: NodeId, node_type: &str) -> Option<NodeId> {
        self.ancestors(id)
            .find(|a| self.get(*a).is_some_and(|d| d.node_type() == node_type))
    }

    /// Type tag of a node
    #[must_use]
    pub fn node_type(&self, id: NodeId) -> Option<&'static str> {
        self.get(id).map(NodeKind::node_type)
    }
}
