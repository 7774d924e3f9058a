//! In-memory collaborators
//!
//! Used when embedding the engine without a database, and by tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::{WorkflowError, WorkflowResult};
use crate::providers::{SchemaProvider, StateStore, StoredSnapshot, TemplateSchema};
use crate::snapshot::ExecutionSnapshot;

/// Fixed set of templates
#[derive(Debug, Default)]
pub struct StaticSchemaProvider {
    templates: HashMap<String, TemplateSchema>,
}

impl StaticSchemaProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: TemplateSchema) -> Self {
        self.templates.insert(template.id.clone(), template);
        self
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn template(&self, template_id: &str) -> WorkflowResult<TemplateSchema> {
        self.templates
            .get(template_id)
            .cloned()
            .ok_or_else(|| WorkflowError::TemplateNotFound(template_id.to_string()))
    }
}

/// Versioned snapshots kept in a map
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, StoredSnapshot>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> WorkflowResult<MutexGuard<'_, HashMap<String, StoredSnapshot>>> {
        self.entries
            .lock()
            .map_err(|e| WorkflowError::StateStore(format!("Failed to lock state map: {}", e)))
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.entries().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> WorkflowResult<Option<StoredSnapshot>> {
        Ok(self.entries()?.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        snapshot: &ExecutionSnapshot,
        expected_version: Option<u64>,
    ) -> WorkflowResult<u64> {
        let mut entries = self.entries()?;
        let found = entries.get(key).map(|stored| stored.version);
        if found != expected_version {
            return Err(WorkflowError::StateConflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }

        let version = found.unwrap_or(0) + 1;
        entries.insert(
            key.to_string(),
            StoredSnapshot {
                snapshot: snapshot.clone(),
                version,
            },
        );
        Ok(version)
    }

    async fn delete(&self, key: &str, expected_version: Option<u64>) -> WorkflowResult<bool> {
        let mut entries = self.entries()?;
        if let Some(expected) = expected_version {
            let found = entries.get(key).map(|stored| stored.version);
            if found != Some(expected) {
                return Err(WorkflowError::StateConflict {
                    key: key.to_string(),
                    expected: Some(expected),
                    found,
                });
            }
        }
        Ok(entries.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use serde_json::json;

    fn snapshot() -> ExecutionSnapshot {
        ExecutionSnapshot::capture(&ExecutionContext::new(json!({})))
    }

    #[tokio::test]
    async fn test_versioned_put() {
        let store = MemoryStateStore::new();

        let v1 = store.put("wf", &snapshot(), None).await.unwrap();
        assert_eq!(v1, 1);

        let v2 = store.put("wf", &snapshot(), Some(1)).await.unwrap();
        assert_eq!(v2, 2);

        let err = store.put("wf", &snapshot(), Some(1)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { found: Some(2), .. }));

        let err = store.put("wf", &snapshot(), None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let store = MemoryStateStore::new();
        assert!(store.get("wf").await.unwrap().is_none());

        store.put("wf", &snapshot(), None).await.unwrap();
        assert_eq!(store.get("wf").await.unwrap().unwrap().version, 1);

        assert!(store.delete("wf", None).await.unwrap());
        assert!(!store.delete("wf", None).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_versioned_delete() {
        let store = MemoryStateStore::new();
        store.put("wf", &snapshot(), None).await.unwrap();
        store.put("wf", &snapshot(), Some(1)).await.unwrap();

        let err = store.delete("wf", Some(1)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { found: Some(2), .. }));
        assert_eq!(store.len(), 1);

        assert!(store.delete("wf", Some(2)).await.unwrap());

        let err = store.delete("wf", Some(2)).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateConflict { found: None, .. }));
    }

    #[tokio::test]
    async fn test_unknown_template() {
        let provider = StaticSchemaProvider::new();
        let err = provider.template("nope").await.unwrap_err();
        assert_eq!(err, WorkflowError::TemplateNotFound("nope".into()));
    }
}
