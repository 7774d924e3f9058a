//! In-process MCP servers
//!
//! [`EmbeddableMcp`] lets an MCP server be called directly, without a child
//! process or transport. This server implements it too, and
//! [`EmbeddedToolCaller`] uses it to let workflows call tools on servers
//! linked into the same binary.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;
use std::sync::Arc;
use workflow_engine::{BoxError, ToolCaller};

use super::{split_tool_name, tool_result_value};

#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("mcp error: {0}")]
    McpError(String),
}

impl From<rmcp::ErrorData> for EmbeddableError {
    fn from(err: rmcp::ErrorData) -> Self {
        EmbeddableError::McpError(err.message.to_string())
    }
}

pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

/// An MCP server callable in-process
#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Name used as the `server` part of `server__tool`
    fn server_name(&self) -> &str;

    fn list_tools(&self) -> Vec<Tool>;

    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }
}

/// Tool caller over a set of in-process servers
#[derive(Default, Clone)]
pub struct EmbeddedToolCaller {
    servers: Vec<Arc<dyn EmbeddableMcp>>,
}

impl EmbeddedToolCaller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, server: Arc<dyn EmbeddableMcp>) -> Self {
        self.servers.push(server);
        self
    }

    /// Server and local tool name for a possibly qualified tool name
    fn resolve(&self, name: &str) -> Option<(&Arc<dyn EmbeddableMcp>, String)> {
        if let Some((server, tool)) = split_tool_name(name) {
            if let Some(found) = self.servers.iter().find(|s| s.server_name() == server) {
                return Some((found, tool.to_string()));
            }
        }

        self.servers
            .iter()
            .find(|s| s.list_tools().iter().any(|t| t.name == name))
            .map(|s| (s, name.to_string()))
    }

    pub fn provides(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

#[async_trait]
impl ToolCaller for EmbeddedToolCaller {
    async fn call_tool(&self, name: &str, parameters: Value) -> Result<Value, BoxError> {
        let (server, tool) = self
            .resolve(name)
            .ok_or_else(|| EmbeddableError::ToolNotFound(name.to_string()))?;

        tracing::debug!(server = server.server_name(), tool = %tool, "Calling embedded tool");
        let result = server.call_tool(&tool, parameters).await?;
        tool_result_value(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::Content;
    use serde_json::json;

    /// Counts open tasks per project
    struct TasksServer;

    #[async_trait]
    impl EmbeddableMcp for TasksServer {
        fn server_name(&self) -> &str {
            "tasks"
        }

        fn list_tools(&self) -> Vec<Tool> {
            vec![]
        }

        async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
            match name {
                "count_open" => {
                    let project = params["project"].as_str().unwrap_or("inbox");
                    let body = json!({ "project": project, "open": 4 });
                    Ok(CallToolResult::success(vec![Content::text(body.to_string())]))
                }
                "fail" => Err(crate::error::invalid_params("missing id").into()),
                _ => Err(EmbeddableError::ToolNotFound(name.to_string())),
            }
        }
    }

    fn caller() -> EmbeddedToolCaller {
        EmbeddedToolCaller::new().with_server(Arc::new(TasksServer))
    }

    #[tokio::test]
    async fn test_qualified_call() {
        let value = caller()
            .call_tool("tasks__count_open", json!({ "project": "home" }))
            .await
            .unwrap();
        assert_eq!(value, json!({ "project": "home", "open": 4 }));
    }

    #[tokio::test]
    async fn test_server_error_propagates() {
        let err = caller().call_tool("tasks__fail", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("missing id"));
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let caller = caller();
        assert!(!caller.provides("mail__send"));
        assert!(caller.call_tool("mail__send", json!({})).await.is_err());
    }
}
