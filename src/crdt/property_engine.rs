//! LWW property application with out-of-order tolerance and CRDT-blob
//! delegation.
//!
//! No teacher file implements this faithfully — the teacher's
//! `apply_property` just overwrites unconditionally and drops transient ops
//! outright — so this is new code grounded in spec.md §4.4's own algorithm
//! and the general last-writer-wins register pattern the rest of the CRDT
//! examples use for properties.

use crate::crdt::tree_state::TreeState;
use crate::types::{OpId, PropertyValue, SetPropOp, VertexId};
use std::collections::HashMap;

/// External collaborator that merges two CRDT blobs of the same kind.
/// Out of core scope per spec.md §9; the core only dispatches to it.
pub trait CrdtMerger {
    fn kind(&self) -> &str;
    fn merge(&self, current: &[u8], incoming: &[u8]) -> Vec<u8>;
}

#[derive(Default)]
pub struct PropertyEngine {
    /// Every applied SetProp op, durable or transient, in application order.
    /// Used by `missing_ops`/`all_ops` — kept distinct from the LWW
    /// win/lose bookkeeping that lives on each `VertexState`.
    applied_prop_ops: Vec<SetPropOp>,
    /// Target vertex -> parked ops awaiting that vertex's creation.
    pending_props: HashMap<VertexId, Vec<SetPropOp>>,
}

pub enum ApplyOutcome {
    /// Applied immediately; carries the op back so the caller can record
    /// its id and notify observers.
    Applied(SetPropOp),
    /// Parked; will apply once the target vertex is created.
    Parked,
    /// Dropped: transient op for a vertex that doesn't exist.
    Dropped,
}

impl PropertyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applied_ops(&self) -> &[SetPropOp] {
        &self.applied_prop_ops
    }

    /// Apply `op`, given `clock` to advance and an optional CRDT merger
    /// registry keyed by kind.
    pub fn apply(
        &mut self,
        op: SetPropOp,
        tree: &mut TreeState,
        clock: &mut u64,
        mergers: &HashMap<String, Box<dyn CrdtMerger>>,
    ) -> ApplyOutcome {
        if !tree.vertex_exists(&op.target_id) {
            if op.transient {
                return ApplyOutcome::Dropped;
            }
            self.pending_props
                .entry(op.target_id.clone())
                .or_default()
                .push(op);
            return ApplyOutcome::Parked;
        }

        *clock = (*clock).max(op.id.counter);
        let applied = op.clone();
        self.apply_to_existing(op, tree, mergers);
        ApplyOutcome::Applied(applied)
    }

    fn apply_to_existing(
        &mut self,
        op: SetPropOp,
        tree: &mut TreeState,
        mergers: &HashMap<String, Box<dyn CrdtMerger>>,
    ) {
        if op.transient {
            self.apply_transient(op, tree);
        } else {
            self.apply_durable(op, tree, mergers);
        }
    }

    fn apply_transient(&mut self, op: SetPropOp, tree: &mut TreeState) {
        let recorded = tree
            .get(&op.target_id)
            .and_then(|v| v.transient_props.get(&op.key).map(|(_, id)| id.clone()));
        let durable_id = tree
            .get(&op.target_id)
            .and_then(|v| v.durable_props.get(&op.key).map(|(_, id)| id.clone()));

        // A durable write for this key already beats this transient op.
        if let Some(d) = &durable_id {
            if *d > op.id {
                self.applied_prop_ops.push(op);
                return;
            }
        }

        if recorded.as_ref().map(|r| op.id > *r).unwrap_or(true) {
            tree.set_transient_prop(&op.target_id, &op.key, op.value.clone(), op.id.clone());
        }
        self.applied_prop_ops.push(op);
    }

    fn apply_durable(
        &mut self,
        op: SetPropOp,
        tree: &mut TreeState,
        mergers: &HashMap<String, Box<dyn CrdtMerger>>,
    ) {
        let recorded_durable = tree
            .get(&op.target_id)
            .and_then(|v| v.durable_props.get(&op.key).map(|(val, id)| (val.clone(), id.clone())));

        let wins = recorded_durable
            .as_ref()
            .map(|(_, id)| op.id > *id)
            .unwrap_or(true);

        if wins {
            let value = self.resolve_value(&op, recorded_durable.as_ref(), mergers);
            tree.set_durable_prop(&op.target_id, &op.key, value, op.id.clone());
        }

        let transient_id = tree
            .get(&op.target_id)
            .and_then(|v| v.transient_props.get(&op.key).map(|(_, id)| id.clone()));
        if let Some(t) = transient_id {
            if t < op.id {
                tree.remove_transient(&op.target_id, &op.key);
            }
        }

        self.applied_prop_ops.push(op);
    }

    /// If the incoming value and the current recorded value share a CRDT
    /// kind, delegate to the registered merger instead of overwriting.
    fn resolve_value(
        &self,
        op: &SetPropOp,
        current: Option<&(PropertyValue, OpId)>,
        mergers: &HashMap<String, Box<dyn CrdtMerger>>,
    ) -> PropertyValue {
        let incoming_kind = op.value.crdt_kind();
        let current_kind = current.and_then(|(v, _)| v.crdt_kind());

        match (incoming_kind, current) {
            (Some(kind), Some((PropertyValue::Crdt { payload: cur, .. }, _)))
                if current_kind == Some(kind) =>
            {
                if let Some(merger) = mergers.get(kind) {
                    let PropertyValue::Crdt { payload: incoming, .. } = &op.value else {
                        unreachable!()
                    };
                    let merged = merger.merge(cur, incoming);
                    PropertyValue::Crdt {
                        kind: kind.to_string(),
                        payload: merged,
                    }
                } else {
                    op.value.clone()
                }
            }
            _ => op.value.clone(),
        }
    }

    /// Drain ops parked on `target`, now that it exists. Call once per
    /// vertex creation, in arrival order. Returns the ops actually applied
    /// so the caller can record them in its own bookkeeping (state vector,
    /// known-ops set, op-applied observers) — they were excluded from all
    /// three while parked.
    pub fn drain_pending(
        &mut self,
        target: &str,
        tree: &mut TreeState,
        clock: &mut u64,
        mergers: &HashMap<String, Box<dyn CrdtMerger>>,
    ) -> Vec<SetPropOp> {
        let parked = self.pending_props.remove(target).unwrap_or_default();
        let mut applied = Vec::with_capacity(parked.len());
        for op in parked {
            *clock = (*clock).max(op.id.counter);
            applied.push(op.clone());
            self.apply_to_existing(op, tree, mergers);
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(peer: &str, counter: u64, target: &str, key: &str, value: i64, transient: bool) -> SetPropOp {
        SetPropOp {
            id: OpId::new(peer, counter),
            target_id: target.to_string(),
            key: key.to_string(),
            value: PropertyValue::I64(value),
            transient,
        }
    }

    fn mergers() -> HashMap<String, Box<dyn CrdtMerger>> {
        HashMap::new()
    }

    #[test]
    fn durable_supersedes_transient_in_arrival_order() {
        // S4 forward: transient(id=10) then durable(id=11).
        let mut tree = TreeState::new();
        tree.set_parent("v", None);
        let mut clock = 0;
        let mut props = PropertyEngine::new();

        props.apply(prop("p", 10, "v", "x", 1, true), &mut tree, &mut clock, &mergers());
        props.apply(prop("p", 11, "v", "x", 2, false), &mut tree, &mut clock, &mergers());

        let vertex = tree.get("v").unwrap();
        assert_eq!(vertex.durable_props.get("x").unwrap().0, PropertyValue::I64(2));
        assert!(!vertex.transient_props.contains_key("x"));
    }

    #[test]
    fn durable_wins_even_when_arriving_first() {
        // S4 reverse: durable(id=11) first, then transient(id=10).
        let mut tree = TreeState::new();
        tree.set_parent("v", None);
        let mut clock = 0;
        let mut props = PropertyEngine::new();

        props.apply(prop("p", 11, "v", "x", 2, false), &mut tree, &mut clock, &mergers());
        props.apply(prop("p", 10, "v", "x", 1, true), &mut tree, &mut clock, &mergers());

        let vertex = tree.get("v").unwrap();
        assert_eq!(vertex.durable_props.get("x").unwrap().0, PropertyValue::I64(2));
        assert!(!vertex.transient_props.contains_key("x"));
    }

    #[test]
    fn property_on_missing_vertex_parks_then_drains() {
        // S3.
        let mut tree = TreeState::new();
        let mut clock = 0;
        let mut props = PropertyEngine::new();

        let outcome = props.apply(prop("p", 5, "v123", "k", 7, false), &mut tree, &mut clock, &mergers());
        assert!(matches!(outcome, ApplyOutcome::Parked));
        assert!(!tree.vertex_exists("v123"));

        tree.set_parent("v123", Some("r".to_string()));
        let drained = props.drain_pending("v123", &mut tree, &mut clock, &mergers());
        assert_eq!(drained.iter().map(|op| op.id.clone()).collect::<Vec<_>>(), vec![OpId::new("p", 5)]);

        assert_eq!(
            tree.get("v123").unwrap().durable_props.get("k").unwrap().0,
            PropertyValue::I64(7)
        );
    }

    #[test]
    fn transient_on_missing_vertex_is_dropped_not_parked() {
        let mut tree = TreeState::new();
        let mut clock = 0;
        let mut props = PropertyEngine::new();

        let outcome = props.apply(prop("p", 5, "ghost", "k", 7, true), &mut tree, &mut clock, &mergers());
        assert!(matches!(outcome, ApplyOutcome::Dropped));
        assert!(!props.pending_props.contains_key("ghost"));
    }

    #[test]
    fn lww_picks_max_op_id_among_durable_writes() {
        let mut tree = TreeState::new();
        tree.set_parent("v", None);
        let mut clock = 0;
        let mut props = PropertyEngine::new();

        props.apply(prop("a", 3, "v", "k", 1, false), &mut tree, &mut clock, &mergers());
        props.apply(prop("b", 3, "v", "k", 2, false), &mut tree, &mut clock, &mergers());
        props.apply(prop("a", 2, "v", "k", 3, false), &mut tree, &mut clock, &mergers());

        // counter=3 ties broken by peer_id: "b" > "a", so b's write (2) wins.
        assert_eq!(tree.get("v").unwrap().durable_props.get("k").unwrap().0, PropertyValue::I64(2));
    }
}
