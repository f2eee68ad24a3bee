//! SQLite-backed [`OpLogStore`](super::OpLogStore).

use crate::error::StorageError;
use crate::types::Op;
use crate::Result;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<TokioMutex<Connection>>,
}

impl SqliteStorage {
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(StorageError::Sqlite)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(TokioMutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS rt_ops (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                payload TEXT NOT NULL
            )",
            [],
        )
        .map_err(StorageError::Sqlite)?;
        Ok(())
    }
}

#[async_trait]
impl super::OpLogStore for SqliteStorage {
    async fn append(&self, op: &Op) -> Result<()> {
        let payload = serde_json::to_string(op)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO rt_ops (payload) VALUES (?)",
            params![payload],
        )
        .map_err(StorageError::Sqlite)?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<Op>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn
            .prepare("SELECT payload FROM rt_ops ORDER BY seq")
            .map_err(StorageError::Sqlite)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(StorageError::Sqlite)?;

        let mut ops = Vec::new();
        for row in rows {
            let payload = row.map_err(StorageError::Sqlite)?;
            ops.push(serde_json::from_str(&payload)?);
        }
        Ok(ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::OpLogStore;
    use crate::types::{MoveOp, OpId};

    #[tokio::test]
    async fn round_trips_ops_in_append_order() {
        let storage = SqliteStorage::new(":memory:").await.unwrap();
        let op_a = Op::Move(MoveOp {
            id: OpId::new("a", 1),
            target_id: "x".to_string(),
            parent_id: None,
        });
        let op_b = Op::Move(MoveOp {
            id: OpId::new("a", 2),
            target_id: "y".to_string(),
            parent_id: Some("x".to_string()),
        });

        storage.append(&op_a).await.unwrap();
        storage.append(&op_b).await.unwrap();

        let loaded = storage.load_all().await.unwrap();
        assert_eq!(loaded, vec![op_a, op_b]);
    }
}
