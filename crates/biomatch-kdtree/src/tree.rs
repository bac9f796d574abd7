use std::cmp::Ordering;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::error::KdTreeError;
use crate::key::{KdKey, KeyType};
use crate::node::{KdNode, Node, NodeId};

/// Tolerance used for double key comparisons when none is given.
pub const DEFAULT_TOLERANCE: f64 = 1.0e-6;

/// Smallest number of node slots the arena grows by.
pub const DEFAULT_MIN_BLOCK_SIZE: usize = 1024;

/// Construction parameters of a [`KdTree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdTreeParams {
    /// Tolerance for double key comparisons. A negative value selects
    /// [`DEFAULT_TOLERANCE`]. Ignored for integer keys.
    pub tolerance: f64,
    /// Expected number of nodes, zero if unknown.
    pub expected_count: usize,
    /// Lower limit of the number of slots added each time the arena grows.
    pub min_block_size: usize,
}

impl Default for KdTreeParams {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            expected_count: 0,
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
        }
    }
}

impl KdTreeParams {
    /// Parameters with the given comparison tolerance and expected node count.
    pub fn new(tolerance: f64, expected_count: usize) -> Self {
        Self {
            tolerance,
            expected_count,
            ..Default::default()
        }
    }

    fn resolved_tolerance(&self) -> f64 {
        if self.tolerance < 0.0 || self.tolerance.is_nan() {
            DEFAULT_TOLERANCE
        } else {
            self.tolerance
        }
    }

    fn block_size(&self) -> usize {
        (self.expected_count / 10).max(self.min_block_size).max(1)
    }
}

/// Outcome of [`KdTree::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insertion {
    /// A new node was created for the key.
    Inserted(NodeId),
    /// The key matched the key of an existing node, nothing was inserted.
    Duplicate(NodeId),
}

impl Insertion {
    /// The new node, or the existing node the key matched.
    pub fn node(&self) -> NodeId {
        match *self {
            Insertion::Inserted(id) | Insertion::Duplicate(id) => id,
        }
    }

    /// Whether the key was already in the tree.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Insertion::Duplicate(_))
    }
}

/// Result of a nearest neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// The nearest node.
    pub node: NodeId,
    /// The user index of the nearest node.
    pub index: usize,
    /// Euclidean distance between the query key and the node key.
    pub distance: f64,
}

/// A k-dimensional tree with nodes held in a block-grown arena.
///
/// Nodes are never rebalanced, the shape of the tree follows insertion order.
/// Every node carries the axis-wise bounds of its subtree, which are used to
/// prune nearest neighbour searches.
///
/// Example:
///
/// ```
/// use biomatch_kdtree::{KdTree, KdTreeParams};
///
/// let mut tree = KdTree::<f64>::new(2, KdTreeParams::default()).unwrap();
/// tree.insert(&[0.0, 0.0]).unwrap();
/// tree.insert(&[10.0, 10.0]).unwrap();
/// let nn = tree.nearest_neighbor(&[9.0, 9.5], f64::INFINITY).unwrap().unwrap();
/// assert_eq!(nn.index, 1);
/// ```
#[derive(Debug, Clone)]
pub struct KdTree<K: KdKey> {
    dim: usize,
    tolerance: f64,
    block_size: usize,
    nodes: Vec<Node>,
    // key, bound_n and bound_p of every slot, 3 * dim values per slot
    values: Vec<K>,
    free: Vec<NodeId>,
    root: Option<NodeId>,
    len: usize,
}

impl<K: KdKey> KdTree<K> {
    /// Creates an empty tree of the given dimension.
    ///
    /// No node memory is allocated until the first insertion.
    pub fn new(dim: usize, params: KdTreeParams) -> Result<Self, KdTreeError> {
        if dim < 1 {
            return Err(KdTreeError::InvalidDimension(dim));
        }
        Ok(Self {
            dim,
            tolerance: params.resolved_tolerance(),
            block_size: params.block_size(),
            nodes: Vec::new(),
            values: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        })
    }

    /// The dimension of the keys.
    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// The key type of the tree.
    #[inline]
    pub fn key_type(&self) -> KeyType {
        K::KEY_TYPE
    }

    /// The tolerance used for double key comparisons.
    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree has no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of node slots allocated in the arena.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// The root node, `None` for an empty tree.
    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Returns a view of the given live node.
    pub fn node(&self, id: NodeId) -> Result<KdNode<'_, K>, KdTreeError> {
        self.check_node(id)?;
        Ok(self.view(id))
    }

    /// Relabels the user index of a node.
    pub fn set_index(&mut self, id: NodeId, index: usize) -> Result<(), KdTreeError> {
        self.check_node(id)?;
        self.nodes[id.0].index = index;
        Ok(())
    }

    /// Iterates over the live nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = KdNode<'_, K>> + '_ {
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        std::iter::from_fn(move || {
            let id = stack.pop()?;
            let node = &self.nodes[id.0];
            stack.extend(node.child_p);
            stack.extend(node.child_n);
            Some(self.view(id))
        })
    }

    /// Inserts a key, labelling a new node with its insertion order.
    ///
    /// See [`KdTree::insert_with_index`].
    pub fn insert(&mut self, key: &[K]) -> Result<Insertion, KdTreeError> {
        let index = self.len;
        self.insert_with_index(key, index)
    }

    /// Inserts a key unless a node with an equal key already exists.
    ///
    /// The key descends the tree comparing against each node on that node's
    /// split axis, cycling through the remaining axes on ties. A key equal to a
    /// node on every axis is a duplicate and the existing node is returned.
    ///
    /// If the arena cannot grow the tree is left unchanged.
    pub fn insert_with_index(&mut self, key: &[K], index: usize) -> Result<Insertion, KdTreeError> {
        self.check_key(key)?;

        let Some(mut current) = self.root else {
            let id = self.alloc_node(None, key, Ordering::Equal, index)?;
            self.root = Some(id);
            return Ok(Insertion::Inserted(id));
        };

        loop {
            let cmp = self.compare(current, key);
            let next = match cmp {
                Ordering::Equal => return Ok(Insertion::Duplicate(current)),
                Ordering::Greater => self.nodes[current.0].child_p,
                Ordering::Less => self.nodes[current.0].child_n,
            };
            match next {
                Some(next) => current = next,
                None => {
                    let id = self.alloc_node(Some(current), key, cmp, index)?;
                    let parent = &mut self.nodes[current.0];
                    if cmp == Ordering::Greater {
                        parent.child_p = Some(id);
                    } else {
                        parent.child_n = Some(id);
                    }
                    return Ok(Insertion::Inserted(id));
                }
            }
        }
    }

    /// Finds the node whose key equals the given key within tolerance.
    pub fn get_match(&self, key: &[K]) -> Result<Option<NodeId>, KdTreeError> {
        self.check_key(key)?;
        let mut current = self.root;
        while let Some(id) = current {
            current = match self.compare(id, key) {
                Ordering::Equal => return Ok(Some(id)),
                Ordering::Greater => self.nodes[id.0].child_p,
                Ordering::Less => self.nodes[id.0].child_n,
            };
        }
        Ok(None)
    }

    /// Descends from `from` to the node that would hold `key`: either a node
    /// with an equal key or the last node on the descent path.
    pub fn get_leaf(&self, from: NodeId, key: &[K]) -> Result<NodeId, KdTreeError> {
        self.check_node(from)?;
        self.check_key(key)?;
        Ok(self.leaf(from, key))
    }

    /// Finds the node nearest to `key` strictly closer than `max_dist`.
    ///
    /// The bound is exclusive: a node exactly `max_dist` away is not found.
    /// Use `f64::INFINITY` for an unbounded search. Returns `None` if the
    /// tree is empty or no node lies closer than `max_dist`.
    pub fn nearest_neighbor(
        &self,
        key: &[K],
        max_dist: f64,
    ) -> Result<Option<Neighbor>, KdTreeError> {
        self.check_key(key)?;
        if max_dist.is_nan() || max_dist < 0.0 {
            return Err(KdTreeError::InvalidRadius(max_dist));
        }
        let Some(root) = self.root else {
            return Ok(None);
        };

        // start from the leaf that would contain the key
        let leaf = self.leaf(root, key);
        let mut best = None;
        let mut best_dist = max_dist;
        let dist_sq = self.distance_sq(leaf, key);
        if dist_sq < max_dist * max_dist {
            best = Some(leaf);
            best_dist = dist_sq.sqrt();
        }

        // walk up while the ancestors' boxes reach the search sphere
        let mut top = leaf;
        while let Some(parent) = self.nodes[top.0].parent {
            if !self.intersects_sphere(parent, key, best_dist) {
                break;
            }
            top = parent;
        }

        // walk back down every branch whose box reaches the sphere
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            if !self.intersects_sphere(id, key, best_dist) {
                continue;
            }
            let dist_sq = self.distance_sq(id, key);
            if dist_sq < best_dist * best_dist {
                best = Some(id);
                best_dist = dist_sq.sqrt();
            }
            let node = &self.nodes[id.0];
            stack.extend(node.child_p);
            stack.extend(node.child_n);
        }

        Ok(best.map(|node| Neighbor {
            node,
            index: self.nodes[node.0].index,
            distance: best_dist,
        }))
    }

    /// Returns a node and all of its descendants to the free list.
    ///
    /// The node is unlinked from its parent, the slots are reused by later
    /// insertions and no memory is released.
    pub fn free_subtree(&mut self, id: NodeId) -> Result<usize, KdTreeError> {
        self.check_node(id)?;

        match self.nodes[id.0].parent {
            Some(parent) => {
                let parent = &mut self.nodes[parent.0];
                if parent.child_n == Some(id) {
                    parent.child_n = None;
                } else {
                    parent.child_p = None;
                }
            }
            None => self.root = None,
        }

        let mut freed = 0;
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let node = std::mem::take(&mut self.nodes[id.0]);
            stack.extend(node.child_n);
            stack.extend(node.child_p);
            self.free.push(id);
            freed += 1;
        }
        self.len -= freed;
        log::debug!("kd-tree freed {} nodes, {} remain", freed, self.len);

        Ok(freed)
    }

    /// Removes every node, keeping the arena slots for reuse.
    pub fn clear(&mut self) {
        if let Some(root) = self.root {
            // the root is live so this cannot fail
            let _ = self.free_subtree(root);
        }
    }

    /// Writes a description of the tree and all of its nodes.
    ///
    /// Returns the number of nodes written.
    pub fn facts<W: Write>(&self, writer: &mut W) -> std::io::Result<usize> {
        writeln!(writer, "type         {:?}", self.key_type())?;
        writeln!(writer, "dim          {}", self.dim)?;
        writeln!(writer, "tol          {}", self.tolerance)?;
        writeln!(writer, "nNodes       {}", self.len)?;
        writeln!(writer, "capacity     {}", self.capacity())?;
        writeln!(writer, "blockSz      {}", self.block_size)?;
        writeln!(writer, "root         {}", slot_or_none(self.root))?;
        writeln!(writer)?;

        let mut count = 0;
        for node in self.iter() {
            writeln!(writer, "slot         {}", node.id().slot())?;
            writeln!(writer, "idx          {}", node.index())?;
            writeln!(writer, "split        {}", node.split())?;
            writeln!(writer, "parent       {}", slot_or_none(node.parent()))?;
            writeln!(writer, "childN       {}", slot_or_none(node.child_n()))?;
            writeln!(writer, "childP       {}", slot_or_none(node.child_p()))?;
            writeln!(writer, "key          {:?}", node.key())?;
            writeln!(writer, "boundN       {:?}", node.bound_n())?;
            writeln!(writer, "boundP       {:?}", node.bound_p())?;
            writeln!(writer)?;
            count += 1;
        }

        Ok(count)
    }

    fn check_key(&self, key: &[K]) -> Result<(), KdTreeError> {
        if key.len() != self.dim {
            return Err(KdTreeError::KeyDimensionMismatch {
                expected: self.dim,
                actual: key.len(),
            });
        }
        if !key.iter().all(|v| v.is_finite()) {
            return Err(KdTreeError::NonFiniteKey);
        }
        Ok(())
    }

    fn check_node(&self, id: NodeId) -> Result<(), KdTreeError> {
        match self.nodes.get(id.0) {
            Some(node) if node.live => Ok(()),
            _ => Err(KdTreeError::InvalidNode(id.0)),
        }
    }

    fn view(&self, id: NodeId) -> KdNode<'_, K> {
        let offset = id.0 * 3 * self.dim;
        let values = &self.values[offset..offset + 3 * self.dim];
        let (key, bounds) = values.split_at(self.dim);
        let (bound_n, bound_p) = bounds.split_at(self.dim);
        KdNode {
            id,
            node: &self.nodes[id.0],
            key,
            bound_n,
            bound_p,
        }
    }

    #[inline]
    fn key_of(&self, id: NodeId) -> &[K] {
        let offset = id.0 * 3 * self.dim;
        &self.values[offset..offset + self.dim]
    }

    // Compares the key against the node key, starting on the node's split
    // axis and moving to the next axis while the values are equal.
    fn compare(&self, id: NodeId, key: &[K]) -> Ordering {
        let node_key = self.key_of(id);
        let split = self.nodes[id.0].split;
        (0..self.dim)
            .map(|i| (split + i) % self.dim)
            .map(|axis| key[axis].compare(node_key[axis], self.tolerance))
            .find(|cmp| *cmp != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }

    fn leaf(&self, from: NodeId, key: &[K]) -> NodeId {
        let mut current = from;
        loop {
            let next = match self.compare(current, key) {
                Ordering::Equal => None,
                Ordering::Greater => self.nodes[current.0].child_p,
                Ordering::Less => self.nodes[current.0].child_n,
            };
            match next {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    fn distance_sq(&self, id: NodeId, key: &[K]) -> f64 {
        self.key_of(id)
            .iter()
            .zip(key)
            .map(|(a, b)| {
                let d = a.to_f64() - b.to_f64();
                d * d
            })
            .sum()
    }

    // Box test between the node bounds and the bounding box of the sphere.
    // Evaluated on every axis without branching.
    fn intersects_sphere(&self, id: NodeId, centre: &[K], radius: f64) -> bool {
        let view = self.view(id);
        view.bound_n
            .iter()
            .zip(view.bound_p)
            .zip(centre)
            .fold(true, |inside, ((lo, hi), c)| {
                let c = c.to_f64();
                inside & (hi.to_f64() >= c - radius) & (lo.to_f64() <= c + radius)
            })
    }

    fn expand(&mut self) -> Result<(), KdTreeError> {
        let block = self.block_size;
        let stride = 3 * self.dim;
        self.nodes.try_reserve_exact(block)?;
        self.values.try_reserve_exact(block * stride)?;
        self.free.try_reserve(block)?;

        let first = self.nodes.len();
        self.nodes.resize_with(first + block, Node::default);
        self.values.resize((first + block) * stride, K::default());
        // lowest slots are handed out first
        self.free.extend((first..first + block).rev().map(NodeId));

        log::debug!("kd-tree arena grown to {} slots", self.nodes.len());
        Ok(())
    }

    fn alloc_node(
        &mut self,
        parent: Option<NodeId>,
        key: &[K],
        cmp: Ordering,
        index: usize,
    ) -> Result<NodeId, KdTreeError> {
        if self.free.is_empty() {
            self.expand()?;
        }
        let Some(id) = self.free.pop() else {
            return Err(KdTreeError::ArenaExhausted);
        };

        let dim = self.dim;
        let split = parent.map_or(0, |p| (self.nodes[p.0].split + 1) % dim);
        self.nodes[id.0] = Node {
            index,
            split,
            parent,
            child_n: None,
            child_p: None,
            live: true,
        };

        let offset = id.0 * 3 * dim;
        self.values[offset..offset + dim].copy_from_slice(key);
        match parent {
            None => {
                self.values[offset + dim..offset + 2 * dim].fill(K::LOWEST);
                self.values[offset + 2 * dim..offset + 3 * dim].fill(K::HIGHEST);
            }
            Some(parent) => {
                // inherit the parent's box, then cut it at the parent's key.
                // Keys within tolerance of the cut may be routed by a later
                // axis, so double cuts are widened by the tolerance.
                let parent_offset = parent.0 * 3 * dim;
                self.values
                    .copy_within(parent_offset + dim..parent_offset + 3 * dim, offset + dim);
                let axis = self.nodes[parent.0].split;
                let cut = self.values[parent_offset + axis];
                if cmp == Ordering::Greater {
                    self.values[offset + dim + axis] = cut.loosen(-self.tolerance);
                } else {
                    self.values[offset + 2 * dim + axis] = cut.loosen(self.tolerance);
                }
            }
        }

        self.len += 1;
        Ok(id)
    }
}

fn slot_or_none(id: Option<NodeId>) -> String {
    id.map_or_else(|| "-1".to_string(), |id| id.slot().to_string())
}
