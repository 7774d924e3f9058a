//! Template lookup over the `templates` and `template_properties` tables

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};
use workflow_engine::{
    PropertyType, SchemaProvider, TemplateProperty, TemplateSchema, WorkflowError, WorkflowResult,
};

use super::Database;

/// Property definition as stored, before type mapping
#[derive(Debug, Clone)]
pub struct NewTemplateProperty {
    pub key: String,
    /// Stored type name such as `text`, `number` or `multi_select`
    pub kind: String,
    pub description: String,
}

/// Schema provider reading templates from SQLite
#[derive(Clone)]
pub struct SqliteSchemaProvider {
    db: Database,
}

fn schema_err(e: rusqlite::Error) -> WorkflowError {
    WorkflowError::SchemaProvider(e.to_string())
}

impl SqliteSchemaProvider {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or replace a template and its properties
    pub fn save_template(
        &self,
        id: &str,
        name: &str,
        properties: &[NewTemplateProperty],
    ) -> WorkflowResult<()> {
        let conn = self.db.lock()?;
        let tx = conn.unchecked_transaction().map_err(schema_err)?;

        tx.execute(
            r#"
            INSERT INTO templates (id, name, created_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET name = excluded.name
            "#,
            params![id, name, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(schema_err)?;

        tx.execute(
            "DELETE FROM template_properties WHERE template_id = ?1",
            params![id],
        )
        .map_err(schema_err)?;

        for (position, property) in properties.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO template_properties (template_id, key, type, description, position)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    id,
                    &property.key,
                    &property.kind,
                    &property.description,
                    position as i64
                ],
            )
            .map_err(schema_err)?;
        }

        tx.commit().map_err(schema_err)
    }
}

#[async_trait]
impl SchemaProvider for SqliteSchemaProvider {
    async fn template(&self, template_id: &str) -> WorkflowResult<TemplateSchema> {
        let conn = self.db.lock()?;

        let name: Option<String> = conn
            .query_row(
                "SELECT name FROM templates WHERE id = ?1",
                params![template_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(schema_err)?;
        let name = name.ok_or_else(|| WorkflowError::TemplateNotFound(template_id.to_string()))?;

        let mut stmt = conn
            .prepare(
                r#"
                SELECT key, type, description
                FROM template_properties
                WHERE template_id = ?1
                ORDER BY position ASC, key ASC
                "#,
            )
            .map_err(schema_err)?;

        let properties = stmt
            .query_map(params![template_id], |row| {
                let kind: String = row.get(1)?;
                Ok(TemplateProperty {
                    key: row.get(0)?,
                    kind: PropertyType::from_stored(&kind),
                    description: row.get(2)?,
                })
            })
            .map_err(schema_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(schema_err)?;

        Ok(TemplateSchema {
            id: template_id.to_string(),
            name,
            properties,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> SqliteSchemaProvider {
        SqliteSchemaProvider::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_default_task_template() {
        let template = provider().template("task").await.unwrap();

        assert_eq!(template.name, "Task");
        let keys: Vec<&str> = template.properties.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(keys, vec!["title", "description", "priority", "due_date", "tags"]);
        assert_eq!(template.properties[2].kind, PropertyType::Number);
        assert_eq!(template.properties[3].kind, PropertyType::String);
        assert_eq!(template.properties[4].kind, PropertyType::Array);
    }

    #[tokio::test]
    async fn test_save_template_replaces_properties() {
        let provider = provider();
        let prop = |key: &str, kind: &str| NewTemplateProperty {
            key: key.to_string(),
            kind: kind.to_string(),
            description: format!("The {}", key),
        };

        provider
            .save_template("bug", "Bug", &[prop("summary", "text"), prop("severity", "select")])
            .unwrap();
        provider
            .save_template("bug", "Bug report", &[prop("summary", "text"), prop("fixed", "checkbox")])
            .unwrap();

        let template = provider.template("bug").await.unwrap();
        assert_eq!(template.name, "Bug report");
        assert_eq!(template.properties.len(), 2);
        assert_eq!(template.properties[1].key, "fixed");
        assert_eq!(template.properties[1].kind, PropertyType::Boolean);
        assert_eq!(template.properties[1].description, "The fixed");
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let err = provider().template("epic").await.unwrap_err();
        assert_eq!(err, WorkflowError::TemplateNotFound("epic".into()));
    }
}
