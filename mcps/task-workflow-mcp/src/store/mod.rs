//! SQLite-backed collaborators
//!
//! One connection is shared by the template lookup and the state store, the
//! same way the task tables are shared with the rest of the application.

mod schema;
mod state;
mod templates;

pub use state::SqliteStateStore;
pub use templates::{NewTemplateProperty, SqliteSchemaProvider};

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use workflow_engine::{WorkflowError, WorkflowResult};

/// Shared database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (creating if needed) the database and ensure tables exist
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {:?}", parent))?;
            }
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database at {:?}", db_path))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        schema::ensure_tables(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> WorkflowResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| WorkflowError::StateStore(format!("Database lock poisoned: {}", e)))
    }
}
