//! Collaborators the engine depends on
//!
//! The host supplies these: a way to call external tools, a source of
//! template schemas for `create_object`, and a key/value store for paused
//! runs. The engine only ever calls into them.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkflowResult;
use crate::snapshot::ExecutionSnapshot;

/// Error type returned by tool callers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Invokes named external tools
#[async_trait]
pub trait ToolCaller: Send + Sync {
    /// Call `name` with a parameter object and return its structured result
    async fn call_tool(&self, name: &str, parameters: Value) -> Result<Value, BoxError>;
}

/// Declared type of a template property, as presented to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl PropertyType {
    /// Map a stored property type name onto a schema type
    pub fn from_stored(kind: &str) -> Self {
        match kind.to_ascii_lowercase().as_str() {
            "number" | "integer" | "float" | "currency" | "percent" => PropertyType::Number,
            "boolean" | "bool" | "checkbox" => PropertyType::Boolean,
            "array" | "multi_select" | "multiselect" | "relation" | "tags" | "files" => {
                PropertyType::Array
            }
            "object" | "json" => PropertyType::Object,
            _ => PropertyType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::String => "string",
            PropertyType::Number => "number",
            PropertyType::Boolean => "boolean",
            PropertyType::Array => "array",
            PropertyType::Object => "object",
        }
    }
}

/// One declared property of an entity template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateProperty {
    pub key: String,

    #[serde(rename = "type")]
    pub kind: PropertyType,

    #[serde(default)]
    pub description: String,
}

/// An entity template and its properties, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSchema {
    pub id: String,
    pub name: String,
    pub properties: Vec<TemplateProperty>,
}

/// Looks up entity templates
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Fetch a template; unknown ids fail with `TemplateNotFound`
    async fn template(&self, template_id: &str) -> WorkflowResult<TemplateSchema>;
}

/// A snapshot as held by a store, with its write version
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSnapshot {
    pub snapshot: ExecutionSnapshot,
    pub version: u64,
}

/// Persists snapshots of paused runs
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> WorkflowResult<Option<StoredSnapshot>>;

    /// Write a snapshot. `expected_version` is the version previously read
    /// (`None` when the key is expected to be absent); a mismatch fails with
    /// `StateConflict`. Returns the new version.
    async fn put(
        &self,
        key: &str,
        snapshot: &ExecutionSnapshot,
        expected_version: Option<u64>,
    ) -> WorkflowResult<u64>;

    /// Remove a snapshot, returning whether one existed
    ///
    /// With `Some(version)` the snapshot is removed only if it is still at
    /// that version; a missing or newer snapshot fails with `StateConflict`.
    /// `None` removes whatever is stored.
    async fn delete(&self, key: &str, expected_version: Option<u64>) -> WorkflowResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_type_mapping() {
        assert_eq!(PropertyType::from_stored("text"), PropertyType::String);
        assert_eq!(PropertyType::from_stored("date"), PropertyType::String);
        assert_eq!(PropertyType::from_stored("Number"), PropertyType::Number);
        assert_eq!(PropertyType::from_stored("checkbox"), PropertyType::Boolean);
        assert_eq!(PropertyType::from_stored("multi_select"), PropertyType::Array);
        assert_eq!(PropertyType::from_stored("json"), PropertyType::Object);
    }
}
