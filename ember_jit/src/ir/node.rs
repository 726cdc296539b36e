//! IR nodes.
//!
//! Nodes live in the graph's arena and refer to each other through stable
//! [`NodeId`] handles. A node carries:
//!
//! - its operator,
//! - an ordered input list (data and control dependencies, duplicates allowed),
//! - successor slots (one `next` for fixed-with-next nodes, true/false for `If`),
//! - a predecessor back-link for fixed nodes,
//! - the list of nodes using it, maintained by the graph.

use super::operators::{NodeKind, Operator};
use smallvec::SmallVec;
use std::fmt;

// =============================================================================
// Node ID
// =============================================================================

/// Handle to a node in a graph's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Sentinel for "no node".
    pub const INVALID: NodeId = NodeId(u32::MAX);

    /// Create a node ID from a raw index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        NodeId(index)
    }

    /// Raw index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Raw index as `usize`.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Whether this refers to a node.
    #[inline]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "n{}", self.0)
        } else {
            f.write_str("n?")
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Input List
// =============================================================================

/// Ordered list of a node's inputs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct InputList(SmallVec<[NodeId; 4]>);

impl InputList {
    /// Empty input list.
    #[inline]
    pub fn new() -> Self {
        InputList(SmallVec::new())
    }

    /// Single input.
    #[inline]
    pub fn single(a: NodeId) -> Self {
        InputList(SmallVec::from_slice(&[a]))
    }

    /// Two inputs.
    #[inline]
    pub fn pair(a: NodeId, b: NodeId) -> Self {
        InputList(SmallVec::from_slice(&[a, b]))
    }

    /// Inputs copied from a slice.
    #[inline]
    pub fn from_slice(inputs: &[NodeId]) -> Self {
        InputList(SmallVec::from_slice(inputs))
    }

    /// Number of inputs.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no inputs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Input at `index`, if present.
    #[inline]
    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.0.get(index).copied()
    }

    /// Iterate over inputs in order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    /// Inputs as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[NodeId] {
        &self.0
    }

    /// Whether `id` appears among the inputs.
    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    /// Append an input.
    #[inline]
    pub fn push(&mut self, id: NodeId) {
        self.0.push(id);
    }

    /// Overwrite the input at `index`.
    #[inline]
    pub(crate) fn set(&mut self, index: usize, id: NodeId) {
        self.0[index] = id;
    }

    /// Replace every occurrence of `old` with `new`, returning the count.
    pub(crate) fn replace(&mut self, old: NodeId, new: NodeId) -> usize {
        let mut replaced = 0;
        for slot in self.0.iter_mut() {
            if *slot == old {
                *slot = new;
                replaced += 1;
            }
        }
        replaced
    }
}

impl FromIterator<NodeId> for InputList {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        InputList(iter.into_iter().collect())
    }
}

// =============================================================================
// Node Flags
// =============================================================================

/// Per-node flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NodeFlags(u8);

impl NodeFlags {
    /// No flags.
    pub const NONE: NodeFlags = NodeFlags(0);
    /// The node was deleted and is skipped by iteration.
    pub const DEAD: NodeFlags = NodeFlags(1 << 0);
    /// The node was synthesized by guard lowering.
    pub const LOWERED: NodeFlags = NodeFlags(1 << 1);

    /// Whether all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: NodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`.
    #[inline]
    pub fn insert(&mut self, other: NodeFlags) {
        self.0 |= other.0;
    }

    /// Clear the bits of `other`.
    #[inline]
    pub fn remove(&mut self, other: NodeFlags) {
        self.0 &= !other.0;
    }
}

// =============================================================================
// Node
// =============================================================================

/// A vertex of the IR graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// The operation.
    pub op: Operator,
    /// Ordered inputs.
    pub(crate) inputs: InputList,
    /// Successor slots: `[next]` or `[true, false]`.
    pub(crate) successors: SmallVec<[NodeId; 2]>,
    /// Fixed predecessor, `INVALID` if unlinked or floating.
    pub(crate) predecessor: NodeId,
    /// Users, one entry per input edge.
    pub(crate) uses: SmallVec<[NodeId; 4]>,
    /// Flag bits.
    pub flags: NodeFlags,
}

impl Node {
    /// Create an unlinked node.
    pub fn new(op: Operator, inputs: InputList) -> Self {
        let successors = SmallVec::from_elem(NodeId::INVALID, op.kind().successor_count());
        Node {
            op,
            inputs,
            successors,
            predecessor: NodeId::INVALID,
            uses: SmallVec::new(),
            flags: NodeFlags::NONE,
        }
    }

    /// Structural classification.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.op.kind()
    }

    /// Inputs of this node.
    #[inline]
    pub fn inputs(&self) -> &InputList {
        &self.inputs
    }

    /// Input at `index`, or `INVALID`.
    #[inline]
    pub fn input(&self, index: usize) -> NodeId {
        self.inputs.get(index).unwrap_or(NodeId::INVALID)
    }

    /// Users of this node (one entry per input edge).
    #[inline]
    pub fn uses(&self) -> &[NodeId] {
        &self.uses
    }

    /// Whether any node uses this one.
    #[inline]
    pub fn has_uses(&self) -> bool {
        !self.uses.is_empty()
    }

    /// Successor slots.
    #[inline]
    pub fn successors(&self) -> &[NodeId] {
        &self.successors
    }

    /// `next` successor of a fixed-with-next node, or `INVALID`.
    #[inline]
    pub fn next(&self) -> NodeId {
        if self.kind().has_next() {
            self.successors[0]
        } else {
            NodeId::INVALID
        }
    }

    /// True successor of an `If`, or `INVALID`.
    #[inline]
    pub fn true_successor(&self) -> NodeId {
        match self.kind() {
            NodeKind::ControlSplit => self.successors[0],
            _ => NodeId::INVALID,
        }
    }

    /// False successor of an `If`, or `INVALID`.
    #[inline]
    pub fn false_successor(&self) -> NodeId {
        match self.kind() {
            NodeKind::ControlSplit => self.successors[1],
            _ => NodeId::INVALID,
        }
    }

    /// Fixed predecessor, or `INVALID`.
    #[inline]
    pub fn predecessor(&self) -> NodeId {
        self.predecessor
    }

    /// Whether the node is linked into a fixed chain.
    #[inline]
    pub fn has_position(&self) -> bool {
        self.predecessor.is_valid() || self.successors.iter().any(|s| s.is_valid())
    }

    /// Whether the node lives in a fixed chain.
    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.kind().is_fixed()
    }

    /// Whether the node was deleted.
    #[inline]
    pub fn is_dead(&self) -> bool {
        self.flags.contains(NodeFlags::DEAD)
    }
}
