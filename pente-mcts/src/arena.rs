//! Lock-free node arena.
//!
//! Nodes are bump-allocated from a fixed-capacity `Vec<Node>`: each
//! worker claims a slot via `fetch_add` on a shared cursor, so no two
//! workers ever write the same slot. A node's non-atomic fields (the
//! move that led to it, its prior, its children range) are written
//! exactly once by the allocating thread and then published through
//! `expand_state`, which readers acquire before touching them.
//!
//! - Level 2: arena allocation, child-slot allocation
//! - Level 3: per-node atomic statistics (visits, value, virtual loss, solved status)

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, AtomicUsize, Ordering};

use pente_core::game_state::Player;
use pente_core::mv::Move;

/// Index into the node arena. `NONE` marks "no parent" (the root).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);
    pub const NONE: NodeId = NodeId(u32::MAX);

    pub fn is_none(self) -> bool {
        self.0 == u32::MAX
    }
}

/// Outcome of a solved-status propagation: the node is provably won,
/// provably lost, or still open. Distinct from the statistical
/// visit/value average, which keeps accumulating regardless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SolvedStatus {
    Unsolved = 0,
    SolvedWin = 1,
    SolvedLoss = 2,
}

impl SolvedStatus {
    fn from_u8(v: u8) -> SolvedStatus {
        match v {
            1 => SolvedStatus::SolvedWin,
            2 => SolvedStatus::SolvedLoss,
            _ => SolvedStatus::Unsolved,
        }
    }
}

/// Fields written exactly once, by the single thread that allocated
/// this slot, before any other thread can observe this `NodeId`.
struct NodeInner {
    parent: NodeId,
    mv: Move,
    /// Side to move at the state this node represents.
    to_move: Player,
    prior: f32,
    is_terminal: bool,
    /// Value from `to_move`'s perspective if `is_terminal`.
    terminal_value: f32,
    children_start: u32,
    children_len: u32,
}

impl NodeInner {
    fn placeholder() -> NodeInner {
        NodeInner {
            parent: NodeId::NONE,
            mv: Move::INVALID,
            to_move: Player::Black,
            prior: 0.0,
            is_terminal: false,
            terminal_value: 0.0,
            children_start: 0,
            children_len: 0,
        }
    }
}

const EXPAND_NOT_STARTED: u8 = 0;
const EXPAND_IN_PROGRESS: u8 = 1;
const EXPAND_DONE: u8 = 2;

/// One node. Every field beyond the one-time-written [`NodeInner`] is
/// atomic so concurrent workers can update statistics without a lock.
pub struct Node {
    inner: UnsafeCell<NodeInner>,
    visits: AtomicI32,
    total_value_bits: AtomicU32,
    virtual_loss: AtomicI32,
    unproven_count: AtomicI32,
    solved_status: AtomicU8,
    expand_state: AtomicU8,
}

// SAFETY: `inner` is written by exactly one thread (the allocator, then
// the sole winner of `expand_state`'s 0->1 transition) before any other
// thread observes `expand_state == EXPAND_DONE`. All reads of `inner`
// from other threads are gated behind an Acquire load of `expand_state`.
unsafe impl Sync for Node {}

impl Node {
    fn placeholder() -> Node {
        Node {
            inner: UnsafeCell::new(NodeInner::placeholder()),
            visits: AtomicI32::new(0),
            total_value_bits: AtomicU32::new(0f32.to_bits()),
            virtual_loss: AtomicI32::new(0),
            unproven_count: AtomicI32::new(0),
            solved_status: AtomicU8::new(SolvedStatus::Unsolved as u8),
            expand_state: AtomicU8::new(EXPAND_NOT_STARTED),
        }
    }

    pub fn parent(&self) -> NodeId {
        // SAFETY: written once at allocation time, before this NodeId
        // was published to any other thread.
        unsafe { (*self.inner.get()).parent }
    }

    pub fn incoming_move(&self) -> Move {
        unsafe { (*self.inner.get()).mv }
    }

    pub fn to_move(&self) -> Player {
        unsafe { (*self.inner.get()).to_move }
    }

    pub fn prior(&self) -> f32 {
        unsafe { (*self.inner.get()).prior }
    }

    pub fn is_terminal(&self) -> bool {
        unsafe { (*self.inner.get()).is_terminal }
    }

    pub fn terminal_value(&self) -> f32 {
        unsafe { (*self.inner.get()).terminal_value }
    }

    pub fn visits(&self) -> i32 {
        self.visits.load(Ordering::Acquire)
    }

    pub fn virtual_loss(&self) -> i32 {
        self.virtual_loss.load(Ordering::Acquire)
    }

    pub fn total_value(&self) -> f32 {
        f32::from_bits(self.total_value_bits.load(Ordering::Acquire))
    }

    /// Seed this (freshly allocated, unvisited) node's statistics from a
    /// node in a different tree, for explicit subtree-reuse between
    /// searches. Not safe to call once this node has real visits of its
    /// own to merge with; callers only ever do this once, right after
    /// [`TreeArena::new`].
    pub fn seed_from(&self, visits: i32, total_value: f32, status: SolvedStatus) {
        self.visits.store(visits, Ordering::Release);
        self.total_value_bits.store(total_value.to_bits(), Ordering::Release);
        if status != SolvedStatus::Unsolved {
            self.try_solve(status);
        }
    }

    pub fn mean_value(&self) -> f32 {
        let n = self.visits() + self.virtual_loss();
        if n <= 0 {
            0.0
        } else {
            (self.total_value() - self.virtual_loss() as f32) / n as f32
        }
    }

    pub fn solved_status(&self) -> SolvedStatus {
        SolvedStatus::from_u8(self.solved_status.load(Ordering::Acquire))
    }

    pub fn unproven_count(&self) -> i32 {
        self.unproven_count.load(Ordering::Acquire)
    }

    pub fn set_unproven_count(&self, n: i32) {
        self.unproven_count.store(n, Ordering::Release);
    }

    pub fn decrement_unproven(&self) -> i32 {
        self.unproven_count.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Attempt the single solved-status transition out of `Unsolved`.
    /// Returns `true` if this call made the transition (the caller
    /// should propagate it to the parent); `false` if the node was
    /// already solved.
    pub fn try_solve(&self, status: SolvedStatus) -> bool {
        self.solved_status
            .compare_exchange(
                SolvedStatus::Unsolved as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn add_virtual_loss(&self) {
        self.virtual_loss.fetch_add(1, Ordering::AcqRel);
    }

    pub fn remove_virtual_loss(&self) {
        self.virtual_loss.fetch_sub(1, Ordering::AcqRel);
    }

    /// Record one visit with `value` (from this node's own `to_move`
    /// perspective). Uses a CAS loop since there is no hardware atomic
    /// float add.
    pub fn record_visit(&self, value: f32) {
        self.visits.fetch_add(1, Ordering::AcqRel);
        let mut current = self.total_value_bits.load(Ordering::Acquire);
        loop {
            let new = f32::from_bits(current) + value;
            match self.total_value_bits.compare_exchange_weak(
                current,
                new.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_fully_expanded(&self) -> bool {
        self.expand_state.load(Ordering::Acquire) == EXPAND_DONE
    }

    pub fn children_range(&self) -> (u32, u32) {
        debug_assert!(self.is_fully_expanded());
        // SAFETY: gated on an Acquire load of expand_state == DONE,
        // which happens-after the writer's Release store.
        let inner = unsafe { &*self.inner.get() };
        (inner.children_start, inner.children_len)
    }

    /// Try to become the single expander of this node. Returns `true`
    /// if this call won the race and must finish by calling
    /// [`Node::publish_children`] or [`Node::publish_no_children`].
    pub fn try_begin_expand(&self) -> bool {
        self.expand_state
            .compare_exchange(
                EXPAND_NOT_STARTED,
                EXPAND_IN_PROGRESS,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Spin until the winning expander has published. Expansion does a
    /// bounded amount of work (one evaluator call plus a handful of
    /// node allocations) so this is a short wait in practice.
    pub fn wait_for_expansion(&self) {
        while self.expand_state.load(Ordering::Acquire) == EXPAND_IN_PROGRESS {
            std::hint::spin_loop();
        }
    }

    /// Only the thread that won [`Node::try_begin_expand`] may call this.
    pub fn publish_children(&self, start: u32, len: u32) {
        // SAFETY: sole writer, guaranteed by try_begin_expand's CAS.
        unsafe {
            let inner = &mut *self.inner.get();
            inner.children_start = start;
            inner.children_len = len;
        }
        self.expand_state.store(EXPAND_DONE, Ordering::Release);
    }
}

/// A fixed-capacity node store plus a parallel fixed-capacity array of
/// child-id slots, both bump-allocated from atomic cursors.
pub struct TreeArena {
    nodes: Vec<Node>,
    node_cursor: AtomicUsize,
    children: Vec<AtomicU32>,
    children_cursor: AtomicUsize,
}

impl TreeArena {
    /// Build a fresh arena and allocate its root node.
    pub fn new(node_capacity: usize, child_capacity: usize, root_to_move: Player) -> TreeArena {
        let nodes: Vec<Node> = (0..node_capacity).map(|_| Node::placeholder()).collect();
        let children: Vec<AtomicU32> = (0..child_capacity).map(|_| AtomicU32::new(u32::MAX)).collect();
        let arena = TreeArena {
            nodes,
            node_cursor: AtomicUsize::new(0),
            children,
            children_cursor: AtomicUsize::new(0),
        };
        let root = arena
            .alloc_node(NodeId::NONE, Move::INVALID, root_to_move, 1.0, false, 0.0)
            .expect("arena capacity must allow at least the root");
        debug_assert_eq!(root, NodeId::ROOT);
        arena
    }

    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn len(&self) -> usize {
        self.node_cursor.load(Ordering::Acquire).min(self.nodes.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_exhausted(&self) -> bool {
        self.node_cursor.load(Ordering::Acquire) >= self.nodes.len()
    }

    /// Allocate one node. Returns `None` if the arena is full.
    pub fn alloc_node(
        &self,
        parent: NodeId,
        mv: Move,
        to_move: Player,
        prior: f32,
        is_terminal: bool,
        terminal_value: f32,
    ) -> Option<NodeId> {
        let idx = self.node_cursor.fetch_add(1, Ordering::AcqRel);
        if idx >= self.nodes.len() {
            return None;
        }
        let node = &self.nodes[idx];
        // SAFETY: fetch_add hands out each index exactly once; no other
        // thread can reach this NodeId until we return it to our caller,
        // who alone decides when/whether to publish it into a parent.
        unsafe {
            let inner = &mut *node.inner.get();
            inner.parent = parent;
            inner.mv = mv;
            inner.to_move = to_move;
            inner.prior = prior;
            inner.is_terminal = is_terminal;
            inner.terminal_value = terminal_value;
        }
        Some(NodeId(idx as u32))
    }

    /// Reserve a contiguous block of `count` child-id slots. Returns the
    /// start index, or `None` if the child arena is full.
    pub fn alloc_child_slots(&self, count: usize) -> Option<u32> {
        if count == 0 {
            return Some(0);
        }
        let start = self.children_cursor.fetch_add(count, Ordering::AcqRel);
        if start + count > self.children.len() {
            return None;
        }
        Some(start as u32)
    }

    pub fn set_child_slot(&self, slot: u32, id: NodeId) {
        self.children[slot as usize].store(id.0, Ordering::Release);
    }

    pub fn child_at(&self, start: u32, offset: u32) -> NodeId {
        NodeId(self.children[(start + offset) as usize].load(Ordering::Acquire))
    }

    pub fn children_of(&self, id: NodeId) -> Vec<NodeId> {
        let node = self.get(id);
        if !node.is_fully_expanded() {
            return Vec::new();
        }
        let (start, len) = node.children_range();
        (0..len).map(|i| self.child_at(start, i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_allocated_at_construction() {
        let arena = TreeArena::new(16, 64, Player::Black);
        assert_eq!(arena.len(), 1);
        assert!(arena.get(NodeId::ROOT).parent().is_none());
    }

    #[test]
    fn alloc_node_respects_capacity() {
        let arena = TreeArena::new(2, 8, Player::Black);
        let second = arena.alloc_node(NodeId::ROOT, Move::new(0, 0), Player::White, 1.0, false, 0.0);
        assert!(second.is_some());
        let third = arena.alloc_node(NodeId::ROOT, Move::new(1, 0), Player::White, 1.0, false, 0.0);
        assert!(third.is_none());
    }

    #[test]
    fn record_visit_accumulates_value() {
        let arena = TreeArena::new(4, 8, Player::Black);
        let node = arena.get(NodeId::ROOT);
        node.record_visit(1.0);
        node.record_visit(-0.5);
        assert_eq!(node.visits(), 2);
        assert!((node.total_value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn solved_status_transitions_exactly_once() {
        let arena = TreeArena::new(4, 8, Player::Black);
        let node = arena.get(NodeId::ROOT);
        assert!(node.try_solve(SolvedStatus::SolvedWin));
        assert!(!node.try_solve(SolvedStatus::SolvedLoss));
        assert_eq!(node.solved_status(), SolvedStatus::SolvedWin);
    }

    #[test]
    fn expand_publish_exposes_children() {
        let arena = TreeArena::new(8, 8, Player::Black);
        let root = arena.get(NodeId::ROOT);
        assert!(root.try_begin_expand());
        let start = arena.alloc_child_slots(2).unwrap();
        let c0 = arena.alloc_node(NodeId::ROOT, Move::new(0, 0), Player::White, 0.5, false, 0.0).unwrap();
        let c1 = arena.alloc_node(NodeId::ROOT, Move::new(1, 0), Player::White, 0.5, false, 0.0).unwrap();
        arena.set_child_slot(start, c0);
        arena.set_child_slot(start + 1, c1);
        root.publish_children(start, 2);
        assert!(root.is_fully_expanded());
        assert_eq!(arena.children_of(NodeId::ROOT), vec![c0, c1]);
    }
}
