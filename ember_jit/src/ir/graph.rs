//! The program graph.
//!
//! `Graph` owns every node of one method's IR in an arena indexed by
//! [`NodeId`]. Edges are handle lists; the graph keeps use lists and fixed
//! predecessor links consistent across every mutation.
//!
//! # Invariants
//!
//! - The fixed chain of every block is a single linear sequence with no
//!   cycles and no dangling successor pointers.
//! - `uses(n)` holds one entry per input edge pointing at `n`.
//! - Deleted nodes are excised: they drop their input edges, are flagged
//!   `DEAD` and are skipped by [`Graph::iter`].

use super::node::{InputList, Node, NodeFlags, NodeId};
use super::operators::{ControlOp, NodeKind, Operator};
use ember_core::{JitError, JitResult};
use rustc_hash::{FxHashMap, FxHashSet};

// =============================================================================
// Value Numbering Key
// =============================================================================

/// Structural identity of a value-numberable node.
#[derive(Clone, PartialEq, Eq, Hash)]
struct ValueKey {
    op: Operator,
    inputs: InputList,
}

// =============================================================================
// Graph
// =============================================================================

/// Arena of IR nodes for a single method.
#[derive(Debug, Clone)]
pub struct Graph {
    /// All nodes ever created, including dead ones.
    nodes: Vec<Node>,
    /// Method entry.
    pub start: NodeId,
    /// Structural lookup table for `unique`.
    value_table: FxHashMap<ValueKey, NodeId>,
    /// Number of live nodes.
    live: usize,
}

impl std::fmt::Debug for ValueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}{:?}", self.op, self.inputs.as_slice())
    }
}

impl Graph {
    /// Create a graph containing only the `Start` node.
    pub fn new() -> Self {
        let mut graph = Graph {
            nodes: Vec::new(),
            start: NodeId::INVALID,
            value_table: FxHashMap::default(),
            live: 0,
        };
        graph.start = graph.add_node(Operator::Control(ControlOp::Start), InputList::new());
        graph
    }

    // -------------------------------------------------------------------------
    // Creation
    // -------------------------------------------------------------------------

    /// Add a node, returning its handle.
    ///
    /// Only the operator, inputs and flags of `node` are taken over; links
    /// are owned by the graph and start out empty.
    pub fn add(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        let flags = node.flags;
        let mut fresh = Node::new(node.op, node.inputs);
        fresh.flags = flags;
        fresh.flags.remove(NodeFlags::DEAD);
        for input in fresh.inputs.iter() {
            debug_assert!(input.as_usize() < self.nodes.len(), "input {input} out of range");
            self.nodes[input.as_usize()].uses.push(id);
        }
        self.nodes.push(fresh);
        self.live += 1;
        id
    }

    /// Add a node built from an operator and inputs.
    #[inline]
    pub fn add_node(&mut self, op: Operator, inputs: InputList) -> NodeId {
        self.add(Node::new(op, inputs))
    }

    /// Return an existing structurally equal node, or add `node`.
    ///
    /// Only value-numberable operators are shared; everything else is added.
    pub fn unique(&mut self, node: Node) -> NodeId {
        if !node.op.is_value_numberable() {
            return self.add(node);
        }

        let key = ValueKey {
            op: node.op,
            inputs: node.inputs.clone(),
        };
        if let Some(&existing) = self.value_table.get(&key) {
            let candidate = &self.nodes[existing.as_usize()];
            if !candidate.is_dead() && candidate.op == key.op && candidate.inputs == key.inputs {
                return existing;
            }
        }

        let id = self.add(node);
        self.value_table.insert(key, id);
        id
    }

    /// `unique` for an operator and inputs.
    #[inline]
    pub fn unique_node(&mut self, op: Operator, inputs: InputList) -> NodeId {
        self.unique(Node::new(op, inputs))
    }

    // -------------------------------------------------------------------------
    // Access
    // -------------------------------------------------------------------------

    /// Node for `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.as_usize()]
    }

    /// Mutable node for `id`; links and uses stay graph-managed.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.as_usize()]
    }

    /// Live node for `id`, if any.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_usize()).filter(|node| !node.is_dead())
    }

    /// Whether `id` refers to a live node.
    #[inline]
    pub fn is_live(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Iterate over live nodes in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.is_dead())
            .map(|(index, node)| (NodeId::new(index as u32), node))
    }

    /// Arena size, including dead nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of live nodes.
    #[inline]
    pub fn live_count(&self) -> usize {
        self.live
    }

    /// Users of `id`.
    #[inline]
    pub fn uses(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.as_usize()].uses
    }

    /// Count live nodes matching a predicate.
    pub fn count_where(&self, mut pred: impl FnMut(&Node) -> bool) -> usize {
        self.iter().filter(|(_, node)| pred(*node)).count()
    }

    /// Live guard nodes in creation order.
    pub fn guards(&self) -> Vec<NodeId> {
        self.iter()
            .filter(|(_, node)| node.op.is_guard())
            .map(|(id, _)| id)
            .collect()
    }

    /// Block-begin node an `End` or `LoopEnd` jumps to.
    pub fn end_target(&self, end: NodeId) -> Option<NodeId> {
        let node = self.get(end)?;
        match node.op {
            Operator::Control(ControlOp::LoopEnd) => Some(node.input(0)).filter(|t| t.is_valid()),
            Operator::Control(ControlOp::End) => node.uses.iter().copied().find(|&user| {
                matches!(
                    self.nodes[user.as_usize()].op,
                    Operator::Control(ControlOp::Region) | Operator::Control(ControlOp::Loop)
                ) && !self.nodes[user.as_usize()].is_dead()
            }),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Edge Mutation
    // -------------------------------------------------------------------------

    /// Replace input `index` of `node` with `new`.
    pub fn set_input(&mut self, node: NodeId, index: usize, new: NodeId) -> JitResult<()> {
        let old = self.nodes[node.as_usize()]
            .inputs
            .get(index)
            .ok_or_else(|| JitError::malformed(format!("{node} has no input {index}")))?;
        if old == new {
            return Ok(());
        }
        self.nodes[node.as_usize()].inputs.set(index, new);
        self.remove_use(old, node);
        self.nodes[new.as_usize()].uses.push(node);
        Ok(())
    }

    /// Append an input to `node`.
    pub fn push_input(&mut self, node: NodeId, input: NodeId) {
        self.nodes[node.as_usize()].inputs.push(input);
        self.nodes[input.as_usize()].uses.push(node);
    }

    /// Redirect every input edge pointing at `old` to `new`.
    pub fn replace_all_uses(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.nodes[old.as_usize()].uses);
        let mut seen = FxHashSet::default();
        for user in users {
            if !seen.insert(user) {
                continue;
            }
            let replaced = self.nodes[user.as_usize()].inputs.replace(old, new);
            for _ in 0..replaced {
                self.nodes[new.as_usize()].uses.push(user);
            }
        }
    }

    fn remove_use(&mut self, target: NodeId, user: NodeId) {
        let uses = &mut self.nodes[target.as_usize()].uses;
        if let Some(pos) = uses.iter().position(|&u| u == user) {
            uses.remove(pos);
        }
    }

    // -------------------------------------------------------------------------
    // Control Mutation
    // -------------------------------------------------------------------------

    /// Point successor slot `slot` of `node` at `successor`.
    ///
    /// The previous successor, if any, loses its predecessor link. Fails with
    /// `ConflictingPosition` if `successor` already hangs off another node.
    pub fn set_successor(&mut self, node: NodeId, slot: usize, successor: NodeId) -> JitResult<()> {
        if slot >= self.nodes[node.as_usize()].successors.len() {
            return Err(JitError::malformed(format!(
                "{node} ({:?}) has no successor slot {slot}",
                self.nodes[node.as_usize()].op
            )));
        }
        if successor.is_valid() {
            let pred = self.nodes[successor.as_usize()].predecessor;
            if pred.is_valid() && pred != node {
                return Err(JitError::ConflictingPosition {
                    node: successor.index(),
                });
            }
            if pred == node && self.nodes[node.as_usize()].successors[slot] != successor {
                return Err(JitError::ConflictingPosition {
                    node: successor.index(),
                });
            }
        }

        let old = self.nodes[node.as_usize()].successors[slot];
        if old.is_valid() && old != successor {
            self.nodes[old.as_usize()].predecessor = NodeId::INVALID;
        }
        self.nodes[node.as_usize()].successors[slot] = successor;
        if successor.is_valid() {
            self.nodes[successor.as_usize()].predecessor = node;
        }
        Ok(())
    }

    /// Set the `next` successor of a fixed-with-next node.
    pub fn set_next(&mut self, node: NodeId, next: NodeId) -> JitResult<()> {
        if !self.nodes[node.as_usize()].kind().has_next() {
            return Err(JitError::malformed(format!(
                "{node} ({:?}) has no next successor",
                self.nodes[node.as_usize()].op
            )));
        }
        self.set_successor(node, 0, next)
    }

    /// Insert the unlinked fixed-with-next `node` immediately before `anchor`.
    ///
    /// `anchor` may not be the `Begin` a branch points at.
    pub fn add_before_fixed(&mut self, anchor: NodeId, node: NodeId) -> JitResult<()> {
        let new_node = &self.nodes[node.as_usize()];
        if new_node.is_dead() || !new_node.kind().has_next() {
            return Err(JitError::malformed(format!(
                "{node} ({:?}) cannot be inserted into a fixed chain",
                new_node.op
            )));
        }
        if new_node.has_position() {
            return Err(JitError::ConflictingPosition { node: node.index() });
        }

        let pred = self.nodes[anchor.as_usize()].predecessor;
        if !pred.is_valid() {
            return Err(JitError::malformed(format!(
                "anchor {anchor} has no predecessor to insert after"
            )));
        }
        if self.nodes[pred.as_usize()].kind() == NodeKind::ControlSplit {
            return Err(JitError::malformed(format!(
                "anchor {anchor} starts a successor of branch {pred}"
            )));
        }
        let slot = self.successor_slot(pred, anchor)?;

        self.nodes[pred.as_usize()].successors[slot] = node;
        self.nodes[node.as_usize()].predecessor = pred;
        self.nodes[node.as_usize()].successors[0] = anchor;
        self.nodes[anchor.as_usize()].predecessor = node;
        Ok(())
    }

    /// Splice a fixed-with-next node out of its chain and delete it.
    ///
    /// Branch targets stay: a branch's successors are always `Begin`s.
    pub fn remove_fixed(&mut self, node: NodeId) -> JitResult<()> {
        let target = &self.nodes[node.as_usize()];
        if !target.kind().has_next() || target.kind() == NodeKind::BlockBegin {
            return Err(JitError::malformed(format!(
                "{node} ({:?}) is not a removable fixed node",
                target.op
            )));
        }
        if target.has_uses() {
            return Err(JitError::DanglingUse {
                node: node.index(),
                uses: target.uses.len(),
            });
        }

        let pred = target.predecessor;
        let next = target.successors[0];
        if !pred.is_valid() {
            return Err(JitError::malformed(format!("{node} is not linked into a chain")));
        }
        if self.nodes[pred.as_usize()].kind() == NodeKind::ControlSplit {
            return Err(JitError::malformed(format!(
                "{node} starts a successor of branch {pred}"
            )));
        }
        let slot = self.successor_slot(pred, node)?;

        self.nodes[node.as_usize()].successors[0] = NodeId::INVALID;
        self.nodes[node.as_usize()].predecessor = NodeId::INVALID;
        self.nodes[pred.as_usize()].successors[slot] = next;
        if next.is_valid() {
            self.nodes[next.as_usize()].predecessor = pred;
        }
        self.delete(node)
    }

    fn successor_slot(&self, pred: NodeId, successor: NodeId) -> JitResult<usize> {
        self.nodes[pred.as_usize()]
            .successors
            .iter()
            .position(|&s| s == successor)
            .ok_or_else(|| {
                JitError::malformed(format!(
                    "{successor} names {pred} as predecessor but is not its successor"
                ))
            })
    }

    // -------------------------------------------------------------------------
    // Deletion
    // -------------------------------------------------------------------------

    /// Delete an unused, unlinked node.
    pub fn delete(&mut self, id: NodeId) -> JitResult<()> {
        let node = &self.nodes[id.as_usize()];
        if node.is_dead() {
            return Ok(());
        }
        if node.has_uses() {
            return Err(JitError::DanglingUse {
                node: id.index(),
                uses: node.uses.len(),
            });
        }
        if node.has_position() {
            return Err(JitError::ConflictingPosition { node: id.index() });
        }

        let inputs = std::mem::take(&mut self.nodes[id.as_usize()].inputs);
        for input in inputs.iter() {
            self.remove_use(input, id);
        }
        self.nodes[id.as_usize()].flags.insert(NodeFlags::DEAD);
        self.live -= 1;
        log::trace!(target: "ember::graph", "deleted {id}");
        Ok(())
    }

    /// Redirect all uses of `old` to `new`, then delete `old`.
    pub fn replace_and_delete(&mut self, old: NodeId, new: NodeId) -> JitResult<()> {
        if self.nodes[old.as_usize()].has_position() {
            return Err(JitError::ConflictingPosition { node: old.index() });
        }
        self.replace_all_uses(old, new);
        self.delete(old)
    }

    // -------------------------------------------------------------------------
    // Verification
    // -------------------------------------------------------------------------

    /// Check fixed-chain integrity.
    ///
    /// Every successor must point back at its predecessor, every `If`
    /// successor must be a `Begin`, and every chain must run from its head
    /// to a terminator without visiting a node twice.
    pub fn verify_chains(&self) -> JitResult<()> {
        for (id, node) in self.iter() {
            if !node.is_fixed() {
                continue;
            }
            for &succ in node.successors() {
                let Some(succ_node) = self.get(succ) else {
                    return Err(JitError::malformed(format!(
                        "{id} ({:?}) has a dangling successor",
                        node.op
                    )));
                };
                if succ_node.predecessor != id {
                    return Err(JitError::malformed(format!(
                        "{succ} does not name {id} as its predecessor"
                    )));
                }
                if succ_node.kind() == NodeKind::BlockBegin {
                    return Err(JitError::malformed(format!(
                        "{id} flows into block header {succ} without an end"
                    )));
                }
                if node.kind() == NodeKind::ControlSplit && succ_node.kind() != NodeKind::Begin {
                    return Err(JitError::malformed(format!(
                        "branch {id} has non-begin successor {succ}"
                    )));
                }
            }
            if node.predecessor.is_valid() {
                let pred = self.get(node.predecessor).ok_or_else(|| {
                    JitError::malformed(format!("{id} has a dead predecessor"))
                })?;
                if !pred.successors.contains(&id) {
                    return Err(JitError::malformed(format!(
                        "{id} names {} as predecessor but is not its successor",
                        node.predecessor
                    )));
                }
            } else if node.kind() != NodeKind::BlockBegin {
                return Err(JitError::malformed(format!(
                    "fixed node {id} ({:?}) has no predecessor",
                    node.op
                )));
            }
        }

        let mut visited = FxHashSet::default();
        for (id, node) in self.iter() {
            let is_head = match node.kind() {
                NodeKind::BlockBegin => true,
                NodeKind::Begin => self
                    .get(node.predecessor)
                    .is_some_and(|pred| pred.kind() == NodeKind::ControlSplit),
                _ => false,
            };
            if !is_head {
                continue;
            }
            let mut current = id;
            loop {
                if !visited.insert(current) {
                    return Err(JitError::malformed(format!(
                        "{current} appears twice in fixed chains"
                    )));
                }
                let current_node = self.node(current);
                if current_node.kind().is_terminator() {
                    break;
                }
                let next = current_node.next();
                if !next.is_valid() {
                    return Err(JitError::malformed(format!(
                        "chain through {current} ends without a terminator"
                    )));
                }
                if self.node(next).kind() == NodeKind::Begin
                    && self.node(next).predecessor != current
                {
                    return Err(JitError::malformed(format!("{next} is shared by two chains")));
                }
                current = next;
            }
        }
        Ok(())
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::{ArithmeticBuilder, ControlBuilder, GraphBuilder};
    use crate::ir::deopt::{DeoptAction, DeoptReason};
    use crate::ir::operators::{ArithOp, BranchHint, CmpOp, GuardInfo, MemoryOp};

    fn load(graph: &mut Graph, offset: u32) -> NodeId {
        graph.add_node(Operator::Memory(MemoryOp::Load(offset)), InputList::new())
    }

    fn ret(graph: &mut Graph) -> NodeId {
        graph.add_node(Operator::Control(ControlOp::Return), InputList::new())
    }

    /// start -> a -> b -> return
    fn straight_line() -> (Graph, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let a = load(&mut graph, 0);
        let b = load(&mut graph, 8);
        let r = ret(&mut graph);
        graph.set_next(graph.start, a).unwrap();
        graph.set_next(a, b).unwrap();
        graph.set_next(b, r).unwrap();
        (graph, a, b, r)
    }

    // -------------------------------------------------------------------------
    // Creation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_new_graph_has_start() {
        let graph = Graph::new();
        assert_eq!(graph.live_count(), 1);
        assert!(matches!(
            graph.node(graph.start).op,
            Operator::Control(ControlOp::Start)
        ));
    }

    #[test]
    fn test_add_records_uses() {
        let mut graph = Graph::new();
        let p = graph.add_node(Operator::Parameter(0), InputList::new());
        let sum = graph.add_node(Operator::IntOp(ArithOp::Add), InputList::pair(p, p));
        assert_eq!(graph.uses(p), &[sum, sum]);
        assert!(graph.uses(sum).is_empty());
    }

    #[test]
    fn test_unique_shares_equal_floating_nodes() {
        let mut graph = Graph::new();
        let a = graph.unique_node(Operator::ConstInt(7), InputList::new());
        let b = graph.unique_node(Operator::ConstInt(7), InputList::new());
        let c = graph.unique_node(Operator::ConstInt(8), InputList::new());
        assert_eq!(a, b);
        assert_ne!(a, c);

        let lt1 = graph.unique_node(Operator::IntCmp(CmpOp::Lt), InputList::pair(a, c));
        let lt2 = graph.unique_node(Operator::IntCmp(CmpOp::Lt), InputList::pair(a, c));
        let gt = graph.unique_node(Operator::IntCmp(CmpOp::Lt), InputList::pair(c, a));
        assert_eq!(lt1, lt2);
        assert_ne!(lt1, gt);
    }

    #[test]
    fn test_unique_never_shares_fixed_nodes() {
        let mut graph = Graph::new();
        let a = graph.unique_node(Operator::Memory(MemoryOp::Load(0)), InputList::new());
        let b = graph.unique_node(Operator::Memory(MemoryOp::Load(0)), InputList::new());
        assert_ne!(a, b);
    }

    #[test]
    fn test_unique_ignores_deleted_entries() {
        let mut graph = Graph::new();
        let a = graph.unique_node(Operator::ConstInt(1), InputList::new());
        graph.delete(a).unwrap();
        let b = graph.unique_node(Operator::ConstInt(1), InputList::new());
        assert_ne!(a, b);
        assert!(graph.is_live(b));
    }

    #[test]
    fn test_unique_guards() {
        let mut graph = Graph::new();
        let cond = graph.add_node(Operator::ConstBool(true), InputList::new());
        let info = GuardInfo::new(DeoptReason::NullCheck, DeoptAction::InvalidateReprofile);
        let g1 = graph.unique_node(Operator::Guard(info), InputList::single(cond));
        let g2 = graph.unique_node(Operator::Guard(info), InputList::single(cond));
        let negated = GuardInfo::negated(DeoptReason::NullCheck, DeoptAction::InvalidateReprofile);
        let g3 = graph.unique_node(Operator::Guard(negated), InputList::single(cond));
        assert_eq!(g1, g2);
        assert_ne!(g1, g3);
        assert_eq!(graph.guards(), vec![g1, g3]);
    }

    // -------------------------------------------------------------------------
    // Mutation Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_replace_and_delete_redirects_uses() {
        let mut graph = Graph::new();
        let p = graph.add_node(Operator::Parameter(0), InputList::new());
        let old = graph.add_node(Operator::ConstInt(1), InputList::new());
        let new = graph.add_node(Operator::ConstInt(2), InputList::new());
        let sum = graph.add_node(
            Operator::IntOp(ArithOp::Add),
            InputList::from_slice(&[old, p, old]),
        );

        graph.replace_and_delete(old, new).unwrap();

        assert!(!graph.is_live(old));
        assert_eq!(graph.node(sum).inputs().as_slice(), &[new, p, new]);
        assert_eq!(graph.uses(new), &[sum, sum]);
    }

    #[test]
    fn test_delete_with_uses_is_dangling() {
        let mut graph = Graph::new();
        let p = graph.add_node(Operator::Parameter(0), InputList::new());
        let _neg = graph.add_node(Operator::LogicalNot, InputList::single(p));
        let err = graph.delete(p).unwrap_err();
        assert_eq!(err, JitError::DanglingUse { node: p.index(), uses: 1 });
        assert!(graph.is_live(p));
    }

    #[test]
    fn test_delete_releases_inputs() {
        let mut graph = Graph::new();
        let p = graph.add_node(Operator::Parameter(0), InputList::new());
        let neg = graph.add_node(Operator::LogicalNot, InputList::single(p));
        let before = graph.live_count();
        graph.delete(neg).unwrap();
        assert!(graph.uses(p).is_empty());
        assert_eq!(graph.live_count(), before - 1);
        assert_eq!(graph.iter().filter(|(id, _)| *id == neg).count(), 0);
    }

    #[test]
    fn test_set_next_rejects_conflicting_position() {
        let (mut graph, a, b, _r) = straight_line();
        let err = graph.set_next(graph.start, b).unwrap_err();
        assert_eq!(err, JitError::ConflictingPosition { node: b.index() });
        assert_eq!(graph.node(graph.start).next(), a);
    }

    #[test]
    fn test_add_before_fixed() {
        let (mut graph, a, b, _r) = straight_line();
        let c = load(&mut graph, 16);
        graph.add_before_fixed(b, c).unwrap();

        assert_eq!(graph.node(a).next(), c);
        assert_eq!(graph.node(c).next(), b);
        assert_eq!(graph.node(b).predecessor(), c);
        graph.verify_chains().unwrap();
    }

    #[test]
    fn test_add_before_fixed_rejects_positioned_node() {
        let (mut graph, a, b, _r) = straight_line();
        let err = graph.add_before_fixed(b, a).unwrap_err();
        assert_eq!(err, JitError::ConflictingPosition { node: a.index() });
        graph.verify_chains().unwrap();
    }

    /// start -> if(p) -> {t -> load -> return, f -> return}
    fn branch_graph() -> (Graph, NodeId, NodeId) {
        let mut builder = GraphBuilder::new();
        let p = builder.parameter(0);
        let (t, f) = builder.branch(p, BranchHint::None);
        builder.set_control(t);
        let load = builder.load(0, &[]);
        builder.return_value(&[]);
        builder.set_control(f);
        builder.return_value(&[]);
        (builder.finish().unwrap(), t, load)
    }

    #[test]
    fn test_add_before_branch_target_is_rejected() {
        let (mut graph, t, load) = branch_graph();
        let c = graph.add_node(Operator::Memory(MemoryOp::Load(16)), InputList::new());

        let err = graph.add_before_fixed(t, c).unwrap_err();
        assert!(matches!(err, JitError::MalformedGraph { .. }));
        assert!(!graph.node(c).has_position());
        assert_eq!(graph.node(t).next(), load);
        graph.verify_chains().unwrap();

        // Inserting after the target's `Begin` is fine.
        graph.add_before_fixed(load, c).unwrap();
        assert_eq!(graph.node(t).next(), c);
        graph.verify_chains().unwrap();
    }

    #[test]
    fn test_remove_branch_target_is_rejected() {
        let (mut graph, t, load) = branch_graph();
        let err = graph.remove_fixed(t).unwrap_err();
        assert!(matches!(err, JitError::MalformedGraph { .. }));
        assert!(graph.is_live(t));
        assert_eq!(graph.node(t).next(), load);
        graph.verify_chains().unwrap();
    }

    #[test]
    fn test_remove_fixed() {
        let (mut graph, a, b, r) = straight_line();
        graph.remove_fixed(b).unwrap();
        assert_eq!(graph.node(a).next(), r);
        assert_eq!(graph.node(r).predecessor(), a);
        assert!(!graph.is_live(b));
        graph.verify_chains().unwrap();
    }

    #[test]
    fn test_remove_fixed_with_uses_fails_without_mutation() {
        let (mut graph, a, b, _r) = straight_line();
        let _user = graph.add_node(Operator::LogicalNot, InputList::single(b));
        let err = graph.remove_fixed(b).unwrap_err();
        assert!(matches!(err, JitError::DanglingUse { .. }));
        assert_eq!(graph.node(a).next(), b);
        graph.verify_chains().unwrap();
    }

    // -------------------------------------------------------------------------
    // Verification Tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_verify_detects_missing_terminator() {
        let mut graph = Graph::new();
        let a = load(&mut graph, 0);
        graph.set_next(graph.start, a).unwrap();
        assert!(matches!(
            graph.verify_chains(),
            Err(JitError::MalformedGraph { .. })
        ));
    }

    #[test]
    fn test_verify_detects_unlinked_fixed_node() {
        let (mut graph, _a, _b, _r) = straight_line();
        let _orphan = load(&mut graph, 24);
        assert!(graph.verify_chains().is_err());
    }

    #[test]
    fn test_end_target() {
        let mut graph = Graph::new();
        let end = graph.add_node(Operator::Control(ControlOp::End), InputList::new());
        let region = graph.add_node(Operator::Control(ControlOp::Region), InputList::single(end));
        assert_eq!(graph.end_target(end), Some(region));
        assert_eq!(graph.end_target(region), None);
    }
}
