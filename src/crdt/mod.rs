//! CRDT implementation for RepTree.
//!
//! `Engine` replaces the teacher's async `RepTree`: the core is
//! synchronous and in-memory per spec.md §5 and Non-goals. The teacher's
//! async storage stack survives as an optional persistence adapter in
//! `crate::storage`, wired up externally via `observe_op_applied` rather
//! than sitting on this hot path.

mod move_engine;
mod property_engine;
mod state_vector;
mod tree_state;

pub use move_engine::MoveEngine;
pub use property_engine::{ApplyOutcome, CrdtMerger, PropertyEngine};
pub use state_vector::StateVector;
pub use tree_state::{Event, ObserverHandle, TreeState, VertexState};

use crate::types::{MoveOp, Op, OpId, PropertyValue, SetPropOp, VertexId, NULL_VERTEX_ID};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

type MoveObservers = Vec<(u64, Box<dyn FnMut(&VertexId, bool)>)>;
type OpObservers = Vec<(u64, Box<dyn FnMut(&Op)>)>;

/// Top-level engine: owns the tree, move/property sub-engines, state
/// vector, Lamport clock, local-ops outbox, known-ops set, and observers.
pub struct Engine {
    peer_id: String,
    clock: u64,
    tree: TreeState,
    moves: MoveEngine,
    props: PropertyEngine,
    state_vector: StateVector,
    known_ops: HashSet<OpId>,
    local_ops: Vec<Op>,
    mergers: HashMap<String, Box<dyn CrdtMerger>>,
    move_observers: MoveObservers,
    op_observers: OpObservers,
    next_handle: u64,
}

impl Engine {
    /// A fresh engine mints its own null-vertex-creation Move op so it
    /// naturally propagates via the normal replication path (spec.md §6.3).
    pub fn new(peer_id: impl Into<String>) -> Self {
        let mut engine = Self {
            peer_id: peer_id.into(),
            clock: 0,
            tree: TreeState::new(),
            moves: MoveEngine::new(),
            props: PropertyEngine::new(),
            state_vector: StateVector::new(),
            known_ops: HashSet::new(),
            local_ops: Vec::new(),
            mergers: HashMap::new(),
            move_observers: Vec::new(),
            op_observers: Vec::new(),
            next_handle: 0,
        };
        let op_id = engine.next_op_id();
        let op = Op::Move(MoveOp {
            id: op_id,
            target_id: NULL_VERTEX_ID.to_string(),
            parent_id: None,
        });
        engine.apply_local(op);
        engine
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn tree(&self) -> &TreeState {
        &self.tree
    }

    pub fn register_merger(&mut self, merger: Box<dyn CrdtMerger>) {
        self.mergers.insert(merger.kind().to_string(), merger);
    }

    fn next_op_id(&mut self) -> OpId {
        self.clock += 1;
        OpId::new(self.peer_id.clone(), self.clock)
    }

    /// Create the designated root vertex (parent = null). Rejects a second
    /// root locally — the one structural precondition this engine
    /// enforces itself (spec.md §7); remote ops are never re-validated.
    pub fn create_root(&mut self) -> Result<VertexId> {
        let has_root = self
            .tree
            .all_vertices()
            .any(|v| v.parent.is_none() && v.id != NULL_VERTEX_ID);
        if has_root {
            return Err(Error::InvalidOperation("root already exists".into()));
        }
        let id = Uuid::new_v4().to_string();
        let op_id = self.next_op_id();
        let op = Op::Move(MoveOp {
            id: op_id,
            target_id: id.clone(),
            parent_id: None,
        });
        self.apply_local(op);
        Ok(id)
    }

    pub fn create_vertex(&mut self, parent_id: &str) -> Result<VertexId> {
        let id = Uuid::new_v4().to_string();
        self.move_vertex(&id, Some(parent_id))?;
        Ok(id)
    }

    /// Move (or delete, via `NULL_VERTEX_ID`) a vertex. `parent_id = None`
    /// is only valid for root/null-vertex creation handled elsewhere;
    /// ordinary moves always specify a destination.
    pub fn move_vertex(&mut self, target_id: &str, parent_id: Option<&str>) -> Result<OpId> {
        let op_id = self.next_op_id();
        let op = Op::Move(MoveOp {
            id: op_id.clone(),
            target_id: target_id.to_string(),
            parent_id: parent_id.map(|s| s.to_string()),
        });
        self.apply_local(op);
        Ok(op_id)
    }

    /// Construct and apply a `SetProp` op. Rejected at construction
    /// (before minting an `OpId`) when `transient` is paired with a
    /// CRDT-blob value: a transient write that can be silently dropped on
    /// a missing vertex (spec.md §4.4 step 1) is incompatible with a
    /// merge-on-conflict value that's meant to accumulate history.
    pub fn set_property(
        &mut self,
        target_id: &str,
        key: &str,
        value: PropertyValue,
        transient: bool,
    ) -> Result<OpId> {
        if transient && value.crdt_kind().is_some() {
            return Err(Error::InvalidOperation(
                "a transient property cannot carry a CRDT-blob value".into(),
            ));
        }
        let op_id = self.next_op_id();
        let op = Op::Prop(SetPropOp {
            id: op_id.clone(),
            target_id: target_id.to_string(),
            key: key.to_string(),
            value,
            transient,
        });
        self.apply_local(op);
        Ok(op_id)
    }

    fn apply_local(&mut self, op: Op) {
        self.local_ops.push(op.clone());
        self.apply(op);
    }

    /// Records `op` as known (state vector + known-ops set) and fires
    /// `op_observers`. Every successfully applied op — top-level or a
    /// dependent unparked by it — must pass through here exactly once
    /// (spec.md §6.4, invariant 5 / "state-vector completeness").
    fn record_applied(&mut self, op: &Op) {
        let id = op.id();
        self.state_vector.insert(&id.peer_id, id.counter);
        self.known_ops.insert(id.clone());
        for (_, cb) in self.op_observers.iter_mut() {
            cb(op);
        }
    }

    fn drain_props_for(&mut self, target: &str) {
        let drained = self
            .props
            .drain_pending(target, &mut self.tree, &mut self.clock, &self.mergers);
        for op in drained {
            self.record_applied(&Op::Prop(op));
        }
    }

    /// Applies one op through the shared local/remote path: de-dup on
    /// `OpId`, dispatch by kind, update state vector + observers. A local
    /// op is always causally last for its own peer, so it is always
    /// applied (never parked) here.
    fn apply(&mut self, op: Op) {
        match op {
            Op::Move(m) => {
                let results = self.moves.apply(m, &mut self.tree, &mut self.clock);
                for (applied, is_new) in results {
                    for (_, cb) in self.move_observers.iter_mut() {
                        cb(&applied.target_id, is_new);
                    }
                    if is_new {
                        self.drain_props_for(&applied.target_id.clone());
                    }
                    self.record_applied(&Op::Move(applied));
                }
            }
            Op::Prop(p) => {
                let target = p.target_id.clone();
                let outcome = self.props.apply(p, &mut self.tree, &mut self.clock, &self.mergers);
                if let ApplyOutcome::Applied(applied) = outcome {
                    self.drain_props_for(&target);
                    self.record_applied(&Op::Prop(applied));
                }
            }
        }
    }

    /// Ingest a remote op: de-dup on `OpId`, apply, record, fire observers.
    pub fn merge(&mut self, ops: Vec<Op>) {
        for op in ops {
            if self.known_ops.contains(op.id()) {
                continue;
            }
            self.apply(op);
        }
    }

    /// Concatenation of all applied move and property ops. Order is not
    /// part of the external contract (spec.md §4.6, Decision D2).
    pub fn all_ops(&self) -> Vec<Op> {
        let mut ops: Vec<Op> = self
            .moves
            .applied_ops()
            .iter()
            .cloned()
            .map(Op::Move)
            .collect();
        ops.extend(self.props.applied_ops().iter().cloned().map(Op::Prop));
        ops
    }

    /// Construct a fresh engine under `new_peer_id` by replaying this
    /// engine's ops in their current internal order.
    pub fn replicate(&self, new_peer_id: impl Into<String>) -> Self {
        let mut replica = Engine {
            peer_id: new_peer_id.into(),
            clock: 0,
            tree: TreeState::new(),
            moves: MoveEngine::new(),
            props: PropertyEngine::new(),
            state_vector: StateVector::new(),
            known_ops: HashSet::new(),
            local_ops: Vec::new(),
            mergers: HashMap::new(),
            move_observers: Vec::new(),
            op_observers: Vec::new(),
            next_handle: 0,
        };
        replica.merge(self.all_ops());
        replica
    }

    pub fn pop_local_ops(&mut self) -> Vec<Op> {
        std::mem::take(&mut self.local_ops)
    }

    pub fn state_vector(&self) -> &StateVector {
        &self.state_vector
    }

    /// Ops present here but absent from `remote`, sorted by OpId so the
    /// receiver observes minimal undo/redo churn on ingest.
    pub fn missing_ops(&self, remote: &StateVector) -> Vec<Op> {
        let diff = self.state_vector.diff(remote);
        let mut result: Vec<Op> = self
            .all_ops()
            .into_iter()
            .filter(|op| {
                let id = op.id();
                diff.iter()
                    .any(|r| r.peer_id == id.peer_id && id.counter >= r.start && id.counter <= r.end)
            })
            .collect();
        result.sort_by(|a, b| a.id().cmp(b.id()));
        result
    }

    pub fn observe(&mut self, vertex_id: &str, f: impl FnMut(&Event) + 'static) -> ObserverHandle {
        self.tree.observe(vertex_id, f)
    }

    pub fn observe_all(&mut self, f: impl FnMut(&Event) + 'static) -> ObserverHandle {
        self.tree.observe_all(f)
    }

    pub fn unobserve(&mut self, handle: ObserverHandle) {
        self.tree.unobserve(handle);
    }

    pub fn observe_move(&mut self, f: impl FnMut(&VertexId, bool) + 'static) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.move_observers.push((handle, Box::new(f)));
        handle
    }

    pub fn observe_op_applied(&mut self, f: impl FnMut(&Op) + 'static) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.op_observers.push((handle, Box::new(f)));
        handle
    }

    pub fn unobserve_move(&mut self, handle: u64) {
        self.move_observers.retain(|(h, _)| *h != handle);
    }

    pub fn unobserve_op_applied(&mut self, handle: u64) {
        self.op_observers.retain(|(h, _)| *h != handle);
    }

    pub fn structurally_equals(&self, other: &Self) -> bool {
        let mut ours: Vec<_> = self.tree.all_vertices().collect();
        let mut theirs: Vec<_> = other.tree.all_vertices().collect();
        ours.sort_by(|a, b| a.id.cmp(&b.id));
        theirs.sort_by(|a, b| a.id.cmp(&b.id));

        if ours.len() != theirs.len() {
            return false;
        }
        ours.iter().zip(theirs.iter()).all(|(a, b)| {
            a.id == b.id
                && a.parent == b.parent
                && a.children == b.children
                && durable_values_equal(a, b)
        })
    }
}

fn durable_values_equal(a: &VertexState, b: &VertexState) -> bool {
    if a.durable_props.len() != b.durable_props.len() {
        return false;
    }
    a.durable_props.iter().all(|(k, (v, _))| {
        b.durable_props.get(k).map(|(v2, _)| v == v2).unwrap_or(false)
    })
}
