//! Optional async persistence adapter.
//!
//! The core `Engine` (see [`crate::crdt::Engine`]) is synchronous and
//! in-memory per spec.md §5/§1 Non-goals — durable storage is explicitly
//! out of scope for the core. The teacher's async/SQLite stack is kept
//! here, generalized from vertex+op-log storage to a flat append-only op
//! log, and wired up externally via `Engine::observe_op_applied` rather
//! than sitting inside the engine's apply path.

mod sqlite;

pub use self::sqlite::SqliteStorage;
use crate::types::Op;
use crate::Result;
use async_trait::async_trait;

/// Storage configuration options.
#[derive(Debug, Clone)]
pub enum StorageConfig {
    /// In-memory SQLite database (for testing).
    Memory,
    /// SQLite-backed database file.
    Sqlite { path: String },
}

/// An append-only, replayable log of applied ops.
#[async_trait]
pub trait OpLogStore: Send + Sync {
    /// Persist `op`. Called once per successful `Engine::observe_op_applied`
    /// notification; implementations should be idempotent under retries
    /// since the engine does not track acknowledgement.
    async fn append(&self, op: &Op) -> Result<()>;

    /// Replay every persisted op in append order, for rebuilding an
    /// `Engine` at startup.
    async fn load_all(&self) -> Result<Vec<Op>>;
}

/// Persistence adapter: wraps an [`OpLogStore`] and bridges the engine's
/// synchronous observer callback to async storage via a channel, per
/// spec.md §9's guidance that observers must not mutate the engine and
/// should queue follow-up work externally.
pub struct PersistenceAdapter<S: OpLogStore> {
    store: S,
}

/// Subscribe to `engine`, returning a receiver of applied ops. Drive
/// [`PersistenceAdapter::run`] on the receiver (typically via
/// `tokio::spawn`) to actually persist them.
pub fn attach(engine: &mut crate::crdt::Engine) -> tokio::sync::mpsc::UnboundedReceiver<Op> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    engine.observe_op_applied(move |op| {
        let _ = tx.send(op.clone());
    });
    rx
}

impl<S: OpLogStore> PersistenceAdapter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Drain `rx`, persisting each op as it arrives. Runs until the
    /// engine (and its sender) is dropped.
    pub async fn run(&self, mut rx: tokio::sync::mpsc::UnboundedReceiver<Op>) -> Result<()> {
        while let Some(op) = rx.recv().await {
            self.store.append(&op).await?;
        }
        Ok(())
    }

    pub async fn load_all(&self) -> Result<Vec<Op>> {
        self.store.load_all().await
    }
}

impl PersistenceAdapter<SqliteStorage> {
    pub async fn open(config: StorageConfig) -> Result<Self> {
        let path = match config {
            StorageConfig::Memory => ":memory:".to_string(),
            StorageConfig::Sqlite { path } => path,
        };
        Ok(Self::new(SqliteStorage::new(&path).await?))
    }
}
