//! RepTree: a replicated ordered-hierarchy CRDT.
//!
//! Independent peers concurrently mutate a shared tree of vertices, each
//! carrying arbitrary named properties, and converge deterministically
//! after exchanging operations. Structural changes are resolved by a
//! move-tree CRDT with undo/redo; properties use last-writer-wins.

pub mod crdt;
pub mod error;
pub mod storage;
pub mod types;
pub mod yrs_merger;

pub use crdt::{CrdtMerger, Engine, Event, ObserverHandle};
pub use error::{Error, Result, StorageError};
pub use types::{
    CounterRange, MoveOp, NULL_VERTEX_ID, Op, OpId, PeerRange, PropertyValue, SetPropOp, VertexId,
};
