//! Core types for the RepTree CRDT implementation

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Unique identifier for a vertex in the tree.
pub type VertexId = String;

/// Reserved id of the tombstone parent used to represent deletion.
///
/// "Deleting" a vertex is a [`MoveOp`] whose `parent_id` is this sentinel —
/// not a distinct op kind. The vertex is never pruned: its properties
/// remain queryable and a later remote move may resurrect it.
pub const NULL_VERTEX_ID: &str = "0";

/// Lamport-clock operation identifier.
///
/// Total order: counter first, then peer id as a lexicographic tie-break.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId {
    pub counter: u64,
    pub peer_id: String,
}

impl OpId {
    pub fn new(peer_id: impl Into<String>, counter: u64) -> Self {
        Self {
            counter,
            peer_id: peer_id.into(),
        }
    }
}

impl Ord for OpId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.peer_id.cmp(&other.peer_id))
    }
}

impl PartialOrd for OpId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A property value. Arrays are homogeneous; `Undefined` is the delete
/// sentinel; `Crdt` carries an opaque blob tagged with a merge-kind
/// discriminator the core does not interpret (see [`crate::CrdtMerger`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    I64(i64),
    F64(f64),
    Bool(bool),
    String(String),
    Array(Vec<PropertyValue>),
    Undefined,
    Crdt { kind: String, payload: Vec<u8> },
}

impl PropertyValue {
    /// The CRDT kind discriminator, if this value carries one.
    pub fn crdt_kind(&self) -> Option<&str> {
        match self {
            PropertyValue::Crdt { kind, .. } => Some(kind.as_str()),
            _ => None,
        }
    }
}

/// Move a vertex to a new parent (or create it, if `target_id` is unseen).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOp {
    pub id: OpId,
    pub target_id: VertexId,
    pub parent_id: Option<VertexId>,
}

/// Set a durable or transient property on a vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPropOp {
    pub id: OpId,
    pub target_id: VertexId,
    pub key: String,
    pub value: PropertyValue,
    pub transient: bool,
}

/// The replicated primitive mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Op {
    Move(MoveOp),
    Prop(SetPropOp),
}

impl Op {
    pub fn id(&self) -> &OpId {
        match self {
            Op::Move(m) => &m.id,
            Op::Prop(p) => &p.id,
        }
    }

    pub fn target_id(&self) -> &VertexId {
        match self {
            Op::Move(m) => &m.target_id,
            Op::Prop(p) => &p.target_id,
        }
    }
}

/// An inclusive counter range `[start, end]` for one peer in a state vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRange {
    pub start: u64,
    pub end: u64,
}

impl CounterRange {
    pub fn contains(&self, counter: u64) -> bool {
        counter >= self.start && counter <= self.end
    }
}

/// A single `(peer_id, range)` entry, as returned by [`crate::StateVector::diff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRange {
    pub peer_id: String,
    pub start: u64,
    pub end: u64,
}
