//! Paused workflow snapshots in the `workflow_states` table

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use workflow_engine::{ExecutionSnapshot, StateStore, StoredSnapshot, WorkflowError, WorkflowResult};

use super::Database;

/// Versioned snapshot store
#[derive(Clone)]
pub struct SqliteStateStore {
    db: Database,
}

impl SqliteStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn store_err(e: rusqlite::Error) -> WorkflowError {
    WorkflowError::StateStore(e.to_string())
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> WorkflowResult<Option<StoredSnapshot>> {
        let conn = self.db.lock()?;

        let row = conn
            .query_row(
                "SELECT snapshot, version FROM workflow_states WHERE state_key = ?1",
                params![key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()
            .map_err(store_err)?;

        match row {
            Some((json, version)) => Ok(Some(StoredSnapshot {
                snapshot: ExecutionSnapshot::from_json(&json)?,
                version: version as u64,
            })),
            None => Ok(None),
        }
    }

    async fn put(
        &self,
        key: &str,
        snapshot: &ExecutionSnapshot,
        expected_version: Option<u64>,
    ) -> WorkflowResult<u64> {
        let json = snapshot.to_json()?;
        let conn = self.db.lock()?;
        let tx = conn.unchecked_transaction().map_err(store_err)?;

        let found: Option<i64> = tx
            .query_row(
                "SELECT version FROM workflow_states WHERE state_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        let found = found.map(|v| v as u64);

        if found != expected_version {
            return Err(WorkflowError::StateConflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }

        let version = found.unwrap_or(0) + 1;
        tx.execute(
            r#"
            INSERT INTO workflow_states (state_key, snapshot, version, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(state_key) DO UPDATE SET
                snapshot = excluded.snapshot,
                version = excluded.version,
                updated_at = excluded.updated_at
            "#,
            params![key, json, version as i64, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(store_err)?;

        tx.commit().map_err(store_err)?;
        Ok(version)
    }

    async fn delete(&self, key: &str, expected_version: Option<u64>) -> WorkflowResult<bool> {
        let conn = self.db.lock()?;

        let Some(expected) = expected_version else {
            let deleted = conn
                .execute("DELETE FROM workflow_states WHERE state_key = ?1", params![key])
                .map_err(store_err)?;
            return Ok(deleted > 0);
        };

        let deleted = conn
            .execute(
                "DELETE FROM workflow_states WHERE state_key = ?1 AND version = ?2",
                params![key, expected as i64],
            )
            .map_err(store_err)?;
        if deleted > 0 {
            return Ok(true);
        }

        let found: Option<i64> = conn
            .query_row(
                "SELECT version FROM workflow_states WHERE state_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(store_err)?;
        Err(WorkflowError::StateConflict {
            key: key.to_string(),
            expected: Some(expected),
            found: found.map(|v| v as u64),
        })
    }
}
