//! Database schema for templates and paused workflow state

use anyhow::Result;
use rusqlite::Connection;

/// Ensure tables exist and the default task template is present
pub fn ensure_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA foreign_keys = ON;

        -- Entity templates
        CREATE TABLE IF NOT EXISTS templates (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        -- Declared template properties, in display order
        CREATE TABLE IF NOT EXISTS template_properties (
            template_id TEXT NOT NULL,
            key TEXT NOT NULL,
            type TEXT NOT NULL DEFAULT 'text',
            description TEXT NOT NULL DEFAULT '',
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (template_id, key),
            FOREIGN KEY (template_id) REFERENCES templates(id) ON DELETE CASCADE
        );

        -- Snapshots of paused workflow runs
        CREATE TABLE IF NOT EXISTS workflow_states (
            state_key TEXT PRIMARY KEY,
            snapshot TEXT NOT NULL,
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_template_properties_order
        ON template_properties(template_id, position);

        -- Default task template
        INSERT OR IGNORE INTO templates (id, name, created_at)
        VALUES ('task', 'Task', datetime('now'));

        INSERT OR IGNORE INTO template_properties (template_id, key, type, description, position)
        VALUES
            ('task', 'title', 'text', 'Short, imperative task title', 0),
            ('task', 'description', 'text', 'What needs to be done and why', 1),
            ('task', 'priority', 'number', 'Priority from 1 (urgent) to 4 (low)', 2),
            ('task', 'due_date', 'date', 'Due date as YYYY-MM-DD', 3),
            ('task', 'tags', 'multi_select', 'Labels for grouping', 4);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_tables_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_tables(&conn).unwrap();
        ensure_tables(&conn).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM template_properties WHERE template_id = 'task'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 5);
    }
}
