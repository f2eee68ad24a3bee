//! Replicated move with undo/redo conflict resolution.
//!
//! Grounded directly on `maidsafe-crdt_tree`'s `State::{do_op,undo_op,
//! redo_op,apply_op}` — the canonical Kleppmann move-op algorithm. That
//! implementation recurses ("pop log entries from the front, undo, apply,
//! redo") which works for its unbounded-recursion-friendly log shape; here
//! the log additionally has a pending-on-missing-parent buffer to drain
//! (spec.md §4.3 step 5), so the same algorithm is phrased with explicit
//! indices and an explicit work queue instead of recursion.

use crate::crdt::tree_state::{PriorParent, TreeState};
use crate::types::{MoveOp, OpId, VertexId};
use std::collections::{HashMap, VecDeque};

/// `(op, is_new)` for every move the engine finished processing while
/// handling one incoming op — the top-level op plus any pending moves it
/// unparked. `is_new` is true iff the vertex had no prior parent recorded,
/// i.e. it did not exist before this move. The full op (not just its id)
/// is returned so callers can notify op-applied observers for drained
/// dependents too, not just the top-level op.
pub type MoveResult = (MoveOp, bool);

#[derive(Default)]
pub struct MoveEngine {
    /// All applied Move ops, invariant: sorted by `OpId`.
    move_ops: Vec<MoveOp>,
    /// The target's parent immediately before each op was first applied.
    prior_parent: HashMap<OpId, PriorParent>,
    /// Parked moves keyed by the parent vertex they're waiting on.
    pending_moves: HashMap<VertexId, Vec<MoveOp>>,
}

impl MoveEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `op`, plus any previously-parked moves it unblocks.
    pub fn apply(&mut self, op: MoveOp, tree: &mut TreeState, clock: &mut u64) -> Vec<MoveResult> {
        let mut results = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(op);

        while let Some(m) = queue.pop_front() {
            if let Some(parent) = &m.parent_id {
                if !tree.vertex_exists(parent) {
                    self.pending_moves
                        .entry(parent.clone())
                        .or_default()
                        .push(m);
                    continue;
                }
            }

            *clock = (*clock).max(m.id.counter);

            let is_new = self.insert_and_apply(m.clone(), tree);
            results.push((m.clone(), is_new));

            if let Some(parked) = self.pending_moves.remove(&m.target_id) {
                queue.extend(parked);
            }
        }

        results
    }

    /// Inserts `op` into the sorted log at its causal position, undoing
    /// and redoing whatever moves that displaces, then runs `try_move`.
    /// Returns whether the target vertex was previously unseen.
    ///
    /// Mirrors `State::{do_op,undo_op,redo_op}` (maidsafe-crdt_tree's
    /// `state.rs`): `oldp`/`prior_parent` for the inserted op is snapshotted
    /// only *after* undoing everything causally after it — not before — and
    /// each redone op recomputes its own `oldp` fresh via `do_op`'s
    /// `tree.find`, rather than reusing whatever was recorded when it was
    /// first applied. Skipping either step lets `prior_parent` go stale
    /// once an older op gets inserted ahead of a younger one already in the
    /// log, corrupting a later undo.
    fn insert_and_apply(&mut self, op: MoveOp, tree: &mut TreeState) -> bool {
        let causally_last = self
            .move_ops
            .last()
            .map(|last| op.id > last.id)
            .unwrap_or(true);

        if causally_last {
            let prior = tree.prior_parent_snapshot(&op.target_id);
            let is_new = prior == PriorParent::VertexAbsent;
            self.move_ops.push(op.clone());
            self.prior_parent.insert(op.id.clone(), prior);
            Self::try_move(&op, tree);
            return is_new;
        }

        let pos = match self.move_ops.binary_search_by(|existing| existing.id.cmp(&op.id)) {
            Ok(_) => {
                log::warn!("duplicate op id {:?} seen by move engine; ignoring", op.id);
                return false;
            }
            Err(pos) => pos,
        };

        for j in (pos..self.move_ops.len()).rev() {
            let undone = self.move_ops[j].clone();
            match self.prior_parent.get(&undone.id) {
                Some(prior) => Self::restore(&undone.target_id, prior.clone(), tree),
                None => log::warn!(
                    "missing prior-parent record for {:?} during undo; skipping",
                    undone.id
                ),
            }
        }

        // Snapshot `oldp` for the inserted op only now, with everything
        // causally after it undone — this is the tree as it would look
        // with nothing but the causal past of `op` applied.
        let prior = tree.prior_parent_snapshot(&op.target_id);
        let is_new = prior == PriorParent::VertexAbsent;

        self.move_ops.insert(pos, op.clone());
        self.prior_parent.insert(op.id.clone(), prior);
        Self::try_move(&op, tree);

        for j in (pos + 1)..self.move_ops.len() {
            let redo = self.move_ops[j].clone();
            let redo_prior = tree.prior_parent_snapshot(&redo.target_id);
            self.prior_parent.insert(redo.id.clone(), redo_prior);
            Self::try_move(&redo, tree);
        }

        is_new
    }

    fn restore(target: &str, prior: PriorParent, tree: &mut TreeState) {
        match prior {
            PriorParent::VertexAbsent | PriorParent::NoParent => tree.set_parent(target, None),
            PriorParent::Parent(p) => tree.set_parent(target, Some(p)),
        }
    }

    /// No-op on self-parent or cycle-inducing moves; otherwise reparents
    /// (creating the target if necessary).
    fn try_move(op: &MoveOp, tree: &mut TreeState) {
        if op.parent_id.as_deref() == Some(op.target_id.as_str()) {
            return;
        }
        if let Some(parent) = &op.parent_id {
            if tree.is_ancestor(parent, &op.target_id) {
                return;
            }
        }
        tree.set_parent(&op.target_id, op.parent_id.clone());
    }

    /// All applied Move ops in sorted `OpId` order.
    pub fn applied_ops(&self) -> &[MoveOp] {
        &self.move_ops
    }
}
