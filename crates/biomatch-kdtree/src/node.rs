use crate::key::KdKey;

/// Index of a node slot in the arena of a [`KdTree`](crate::KdTree).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The arena slot of the node.
    #[inline]
    pub fn slot(self) -> usize {
        self.0
    }
}

/// Links and bookkeeping of a node slot. The key and bound values live in
/// the tree's value arena.
#[derive(Debug, Clone, Default)]
pub(crate) struct Node {
    pub(crate) index: usize,
    pub(crate) split: usize,
    pub(crate) parent: Option<NodeId>,
    pub(crate) child_n: Option<NodeId>,
    pub(crate) child_p: Option<NodeId>,
    pub(crate) live: bool,
}

/// A read-only view of a live node of a tree.
#[derive(Debug, Clone, Copy)]
pub struct KdNode<'a, K: KdKey> {
    pub(crate) id: NodeId,
    pub(crate) node: &'a Node,
    pub(crate) key: &'a [K],
    pub(crate) bound_n: &'a [K],
    pub(crate) bound_p: &'a [K],
}

impl<'a, K: KdKey> KdNode<'a, K> {
    /// The id of the node.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// The user index of the node.
    ///
    /// Defaults to the insertion order of the node and can be relabelled with
    /// [`KdTree::set_index`](crate::KdTree::set_index).
    pub fn index(&self) -> usize {
        self.node.index
    }

    /// The axis this node splits its subtree on.
    pub fn split(&self) -> usize {
        self.node.split
    }

    /// The parent node, `None` for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.node.parent
    }

    /// The child holding keys that compare lower than this node's key.
    pub fn child_n(&self) -> Option<NodeId> {
        self.node.child_n
    }

    /// The child holding keys that compare higher than this node's key.
    pub fn child_p(&self) -> Option<NodeId> {
        self.node.child_p
    }

    /// Whether the node has no children.
    pub fn is_leaf(&self) -> bool {
        self.node.child_n.is_none() && self.node.child_p.is_none()
    }

    /// The key of the node.
    pub fn key(&self) -> &'a [K] {
        self.key
    }

    /// Axis-wise lower bound of the node's subtree.
    pub fn bound_n(&self) -> &'a [K] {
        self.bound_n
    }

    /// Axis-wise upper bound of the node's subtree.
    pub fn bound_p(&self) -> &'a [K] {
        self.bound_p
    }
}
