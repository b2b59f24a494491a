#![forbid(unsafe_code)]

//! Observable composite tree stored in an arena.
//!
//! # Design
//!
//! [`Tree<T>`] owns every node in a `Vec` slot arena. Nodes refer to their
//! parent and children by [`NodeId`] index, so the parent link never keeps
//! a node alive and cycle checks are index comparisons. Ids are never
//! reused: a removed subtree leaves its slots empty until
//! [`Tree::restore`] puts the same nodes back.
//!
//! Each node carries its own [`SourceId`]; structural facts are reported
//! under the node they concern, or under the tree when the node is a root.
//!
//! | Event type              | Source                  | Value          |
//! |-------------------------|-------------------------|----------------|
//! | `<Tree>.itemsAdded`     | tree                    | `Vec<NodeId>`  |
//! | `<Tree>.itemsRemoved`   | tree                    | `Vec<NodeId>`  |
//! | `<Tree>.childAdded`     | parent node, or tree    | `NodeId`       |
//! | `<Tree>.childRemoved`   | parent node, or tree    | `NodeId`       |
//! | `<Tree>.parentChanged`  | moved node              | `Option<NodeId>` |
//!
//! # Invariants
//!
//! 1. The parent chain of every live node is finite and acyclic.
//! 2. A node appears in exactly one sibling list: its parent's children or
//!    the root list.
//! 3. Every mutation validates first; a rejected call records no facts.
//! 4. A reparent is one round holding childRemoved, childAdded and
//!    parentChanged.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use taskframe_core::{EventType, FrameworkError, Publisher, Result, SourceId};
use tracing::debug;

/// Index of a node in a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Where a node sits: under `parent` (or among the roots) at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub parent: Option<NodeId>,
    pub index: usize,
}

/// Event type names for one tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEventTypes {
    pub items_added: EventType,
    pub items_removed: EventType,
    pub child_added: EventType,
    pub child_removed: EventType,
    pub parent_changed: EventType,
}

impl TreeEventTypes {
    #[must_use]
    pub fn for_tree(name: &str) -> Self {
        Self {
            items_added: EventType::from(format!("{name}.itemsAdded")),
            items_removed: EventType::from(format!("{name}.itemsRemoved")),
            child_added: EventType::from(format!("{name}.childAdded")),
            child_removed: EventType::from(format!("{name}.childRemoved")),
            parent_changed: EventType::from(format!("{name}.parentChanged")),
        }
    }

    /// Types that signal a structural change: membership of the tree and
    /// of any child list.
    #[must_use]
    pub fn modification_event_types(&self) -> Vec<EventType> {
        vec![
            self.items_added.clone(),
            self.items_removed.clone(),
            self.child_added.clone(),
            self.child_removed.clone(),
        ]
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    data: T,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    source: SourceId,
}

struct TreeInner<T> {
    slots: Vec<Option<Node<T>>>,
    roots: Vec<NodeId>,
    live: usize,
}

impl<T> TreeInner<T> {
    fn node(&self, id: NodeId) -> Result<&Node<T>> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(FrameworkError::NodeNotFound(id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<T>> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(FrameworkError::NodeNotFound(id.0))
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> Result<&mut Vec<NodeId>> {
        match parent {
            Some(p) => Ok(&mut self.node_mut(p)?.children),
            None => Ok(&mut self.roots),
        }
    }

    /// Source of the parent `subtree` goes back under, once every check
    /// that [`Tree::restore`] needs has passed.
    fn restore_target(&self, subtree: &RemovedSubtree<T>) -> Result<Option<SourceId>> {
        let parent_source = match subtree.position.parent {
            Some(p) => Some(self.node(p)?.source),
            None => None,
        };
        let occupied = subtree
            .nodes
            .iter()
            .any(|(id, _)| id.0 >= self.slots.len() || self.slots[id.0].is_some());
        if occupied {
            return Err(FrameworkError::invalid(format!(
                "cannot restore {}: slot unavailable",
                subtree.root
            )));
        }
        Ok(parent_source)
    }

    fn position(&self, id: NodeId) -> Result<Position> {
        let parent = self.node(id)?.parent;
        let siblings = match parent {
            Some(p) => &self.node(p)?.children,
            None => &self.roots,
        };
        let index = siblings.iter().position(|c| *c == id).unwrap_or(siblings.len());
        Ok(Position { parent, index })
    }

    /// Whether `ancestor` is on the parent chain of `id`.
    fn has_ancestor(&self, id: NodeId, ancestor: NodeId) -> bool {
        let mut current = self.node(id).ok().and_then(|n| n.parent);
        while let Some(p) = current {
            if p == ancestor {
                return true;
            }
            current = self.node(p).ok().and_then(|n| n.parent);
        }
        false
    }

    fn preorder(&self, start: NodeId, out: &mut Vec<NodeId>) {
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if let Ok(node) = self.node(id) {
                out.push(id);
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }
}

/// Nodes detached by [`Tree::remove`], ready for [`Tree::restore`].
#[derive(Debug, Clone)]
pub struct RemovedSubtree<T> {
    root: NodeId,
    position: Position,
    nodes: Vec<(NodeId, Node<T>)>,
}

impl<T> RemovedSubtree<T> {
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Where the subtree root was attached.
    #[must_use]
    pub fn position(&self) -> Position {
        self.position
    }

    /// Removed ids in depth-first order, root first.
    #[must_use]
    pub fn ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|(id, _)| *id).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Shared handle to an observable tree.
///
/// Cloning creates a new handle to the **same** tree.
pub struct Tree<T> {
    inner: Rc<RefCell<TreeInner<T>>>,
    publisher: Publisher,
    source: SourceId,
    name: Rc<str>,
    events: TreeEventTypes,
}

impl<T> Clone for Tree<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
            publisher: self.publisher.clone(),
            source: self.source,
            name: Rc::clone(&self.name),
            events: self.events.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Tree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Tree")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("live", &inner.live)
            .field("roots", &inner.roots)
            .finish()
    }
}

impl<T: 'static> Tree<T> {
    /// Create an empty tree publishing as `"<name>.itemsAdded"` etc.
    #[must_use]
    pub fn new(publisher: &Publisher, name: &str) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TreeInner {
                slots: Vec::new(),
                roots: Vec::new(),
                live: 0,
            })),
            publisher: publisher.clone(),
            source: SourceId::next(),
            name: Rc::from(name),
            events: TreeEventTypes::for_tree(name),
        }
    }

    #[must_use]
    pub fn source_id(&self) -> SourceId {
        self.source
    }

    #[must_use]
    pub fn event_types(&self) -> &TreeEventTypes {
        &self.events
    }

    #[must_use]
    pub fn modification_event_types(&self) -> Vec<EventType> {
        self.events.modification_event_types()
    }

    #[must_use]
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.borrow().live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.inner.borrow().node(id).is_ok()
    }

    /// Source identity facts about `id` are reported under.
    #[must_use]
    pub fn node_source(&self, id: NodeId) -> Option<SourceId> {
        self.inner.borrow().node(id).ok().map(|n| n.source)
    }

    // ========================================================================
    // Data access
    // ========================================================================

    /// Read node data by reference; `None` for a stale id.
    ///
    /// # Panics
    ///
    /// If `f` mutates this tree; the arena stays borrowed while `f` runs.
    pub fn with<R>(&self, id: NodeId, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.inner.borrow().node(id).ok().map(|n| f(&n.data))
    }

    /// Mutate node data in place. Publishes nothing; node payloads carry
    /// their own observable attributes.
    ///
    /// # Panics
    ///
    /// If `f` touches this tree in any way, reads included; the arena stays
    /// mutably borrowed while `f` runs.
    pub fn with_mut<R>(&self, id: NodeId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        self.inner.borrow_mut().node_mut(id).ok().map(|n| f(&mut n.data))
    }

    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<T>
    where
        T: Clone,
    {
        self.with(id, T::clone)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.inner.borrow().node(id).ok().and_then(|n| n.parent)
    }

    #[must_use]
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.inner
            .borrow()
            .node(id)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Other nodes sharing `id`'s parent (or the root list).
    #[must_use]
    pub fn siblings(&self, id: NodeId) -> Vec<NodeId> {
        let inner = self.inner.borrow();
        let Ok(node) = inner.node(id) else {
            return Vec::new();
        };
        let all = match node.parent {
            Some(p) => inner.node(p).map(|n| n.children.as_slice()).unwrap_or(&[]),
            None => inner.roots.as_slice(),
        };
        all.iter().copied().filter(|s| *s != id).collect()
    }

    #[must_use]
    pub fn root_items(&self) -> Vec<NodeId> {
        self.inner.borrow().roots.clone()
    }

    /// Current attachment point of `id`.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::NodeNotFound`] for a stale id.
    pub fn position(&self, id: NodeId) -> Result<Position> {
        self.inner.borrow().position(id)
    }

    /// Parent chain from `id` up to its root, excluding `id`.
    #[must_use]
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, T> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Number of ancestors; roots have depth 0.
    #[must_use]
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count()
    }

    /// Whether `ancestor` is on the parent chain of `node`.
    #[must_use]
    pub fn is_ancestor_of(&self, ancestor: NodeId, node: NodeId) -> bool {
        self.inner.borrow().has_ancestor(node, ancestor)
    }

    /// `id` followed by all its descendants, depth-first.
    #[must_use]
    pub fn family_members(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.inner.borrow().preorder(id, &mut out);
        out
    }

    /// All descendants of `id`, depth-first.
    #[must_use]
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut family = self.family_members(id);
        if !family.is_empty() {
            family.remove(0);
        }
        family
    }

    /// Every live node, depth-first from each root in order.
    #[must_use]
    pub fn flatten(&self) -> Vec<NodeId> {
        let inner = self.inner.borrow();
        let mut out = Vec::with_capacity(inner.live);
        for root in &inner.roots {
            inner.preorder(*root, &mut out);
        }
        out
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add a node as the last child of `parent`, or as a new root.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::NodeNotFound`] if `parent` is stale.
    pub fn insert(&self, data: T, parent: Option<NodeId>) -> Result<NodeId> {
        let (id, parent_source) = {
            let mut inner = self.inner.borrow_mut();
            let parent_source = match parent {
                Some(p) => Some(inner.node(p)?.source),
                None => None,
            };
            let id = NodeId(inner.slots.len());
            inner.slots.push(Some(Node {
                data,
                parent,
                children: Vec::new(),
                source: SourceId::next(),
            }));
            inner.live += 1;
            inner.siblings_mut(parent)?.push(id);
            (id, parent_source)
        };
        let _round = self.publisher.round();
        self.publisher.notify(
            self.events.items_added.clone(),
            self.source,
            Some(Rc::new(vec![id])),
        );
        if let Some(source) = parent_source {
            self.publisher
                .notify(self.events.child_added.clone(), source, Some(Rc::new(id)));
        }
        Ok(id)
    }

    /// Move `id` to the end of `new_parent`'s children (or the roots).
    ///
    /// Returns the position it was moved from.
    ///
    /// # Errors
    ///
    /// - [`FrameworkError::NodeNotFound`] for stale ids.
    /// - [`FrameworkError::InvalidOperation`] if `new_parent` is `id` or
    ///   one of its descendants.
    pub fn set_parent(&self, id: NodeId, new_parent: Option<NodeId>) -> Result<Position> {
        self.set_parent_at(id, new_parent, usize::MAX)
    }

    /// Like [`Tree::set_parent`] but inserting at `index` among the new
    /// siblings (clamped). Moving within the same parent is a no-op.
    ///
    /// # Errors
    ///
    /// See [`Tree::set_parent`].
    pub fn set_parent_at(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        index: usize,
    ) -> Result<Position> {
        let (old, node_source, old_source, new_source) = {
            let mut inner = self.inner.borrow_mut();
            let old = inner.position(id)?;
            let node_source = inner.node(id)?.source;
            let new_source = match new_parent {
                Some(p) => {
                    let parent = inner.node(p)?;
                    if p == id {
                        return Err(FrameworkError::invalid(format!(
                            "{id} cannot be its own parent"
                        )));
                    }
                    if inner.has_ancestor(p, id) {
                        return Err(FrameworkError::invalid(format!(
                            "{p} is a descendant of {id}"
                        )));
                    }
                    Some(parent.source)
                }
                None => None,
            };
            if old.parent == new_parent {
                return Ok(old);
            }
            let old_source = match old.parent {
                Some(p) => Some(inner.node(p)?.source),
                None => None,
            };

            inner.siblings_mut(old.parent)?.retain(|c| *c != id);
            let siblings = inner.siblings_mut(new_parent)?;
            siblings.insert(index.min(siblings.len()), id);
            inner.node_mut(id)?.parent = new_parent;
            (old, node_source, old_source, new_source)
        };

        debug!(tree = %self.name, node = %id, from = ?old.parent, to = ?new_parent, "reparent");
        let _round = self.publisher.round();
        self.publisher.notify(
            self.events.child_removed.clone(),
            old_source.unwrap_or(self.source),
            Some(Rc::new(id)),
        );
        self.publisher.notify(
            self.events.child_added.clone(),
            new_source.unwrap_or(self.source),
            Some(Rc::new(id)),
        );
        self.publisher.notify(
            self.events.parent_changed.clone(),
            node_source,
            Some(Rc::new(new_parent)),
        );
        Ok(old)
    }

    /// Detach `id` and all its descendants.
    ///
    /// # Errors
    ///
    /// [`FrameworkError::NodeNotFound`] for a stale id.
    pub fn remove(&self, id: NodeId) -> Result<RemovedSubtree<T>> {
        let (subtree, parent_source) = {
            let mut inner = self.inner.borrow_mut();
            let position = inner.position(id)?;
            let parent_source = match position.parent {
                Some(p) => Some(inner.node(p)?.source),
                None => None,
            };
            let mut family = Vec::new();
            inner.preorder(id, &mut family);

            inner.siblings_mut(position.parent)?.retain(|c| *c != id);
            let mut nodes = Vec::with_capacity(family.len());
            for member in family {
                if let Some(node) = inner.slots.get_mut(member.0).and_then(Option::take) {
                    nodes.push((member, node));
                }
            }
            inner.live -= nodes.len();
            (
                RemovedSubtree {
                    root: id,
                    position,
                    nodes,
                },
                parent_source,
            )
        };

        debug!(tree = %self.name, node = %id, removed = subtree.len(), "remove subtree");
        let _round = self.publisher.round();
        self.publisher.notify(
            self.events.items_removed.clone(),
            self.source,
            Some(Rc::new(subtree.ids())),
        );
        if let Some(source) = parent_source {
            self.publisher
                .notify(self.events.child_removed.clone(), source, Some(Rc::new(id)));
        }
        Ok(subtree)
    }

    /// Whether [`restore`](Self::restore) would accept `subtree` now.
    ///
    /// # Errors
    ///
    /// The error `restore` would return.
    pub fn check_restore(&self, subtree: &RemovedSubtree<T>) -> Result<()> {
        self.inner.borrow().restore_target(subtree).map(|_| ())
    }

    /// Put a removed subtree back under the same ids and position. A
    /// rejected subtree leaves the tree untouched.
    ///
    /// # Errors
    ///
    /// - [`FrameworkError::NodeNotFound`] if the former parent is gone.
    /// - [`FrameworkError::InvalidOperation`] if a slot is occupied.
    pub fn restore(&self, subtree: RemovedSubtree<T>) -> Result<()> {
        let parent_source = self.inner.borrow().restore_target(&subtree)?;
        let RemovedSubtree {
            root,
            position,
            nodes,
        } = subtree;
        let ids: Vec<NodeId> = nodes.iter().map(|(id, _)| *id).collect();
        {
            let mut inner = self.inner.borrow_mut();
            let count = nodes.len();
            for (id, node) in nodes {
                inner.slots[id.0] = Some(node);
            }
            inner.live += count;
            let siblings = inner.siblings_mut(position.parent)?;
            siblings.insert(position.index.min(siblings.len()), root);
        }

        let _round = self.publisher.round();
        self.publisher.notify(
            self.events.items_added.clone(),
            self.source,
            Some(Rc::new(ids)),
        );
        if let Some(source) = parent_source {
            self.publisher
                .notify(self.events.child_added.clone(), source, Some(Rc::new(root)));
        }
        Ok(())
    }
}

/// Lazy walk up the parent chain. See [`Tree::ancestors`].
pub struct Ancestors<'a, T> {
    tree: &'a Tree<T>,
    next: Option<NodeId>,
}

impl<T: 'static> Iterator for Ancestors<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
