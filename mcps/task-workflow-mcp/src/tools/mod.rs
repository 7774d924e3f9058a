//! Tool callers for `call_tool` steps
//!
//! Tool names are either `server__tool` or a bare tool name. In-process
//! servers are tried first; anything they do not provide goes to the
//! external MCP servers from `.mcp.json`.

mod embedded;
mod stdio;

pub use embedded::{EmbeddableError, EmbeddableMcp, EmbeddableResult, EmbeddedToolCaller};
pub use stdio::StdioToolCaller;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, RawContent};
use serde_json::Value;
use workflow_engine::{BoxError, ToolCaller};

/// Separator between server and tool in qualified tool names
pub const TOOL_SEPARATOR: &str = "__";

/// Split `server__tool` into its parts
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(TOOL_SEPARATOR)
        .filter(|(server, tool)| !server.is_empty() && !tool.is_empty())
}

/// Turn an MCP tool result into the value bound to `resultVariable`
///
/// Structured content wins; otherwise the text content is parsed as JSON,
/// falling back to the raw string. Error results become errors.
pub fn tool_result_value(result: CallToolResult) -> Result<Value, BoxError> {
    let text = result
        .content
        .iter()
        .filter_map(|content| match &content.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");

    if result.is_error.unwrap_or(false) {
        let message = if text.is_empty() {
            "tool reported an error".to_string()
        } else {
            text
        };
        return Err(message.into());
    }

    if let Some(structured) = result.structured_content {
        return Ok(structured);
    }

    Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
}

/// Routes calls to in-process servers, then to external ones
#[derive(Default)]
pub struct ToolDispatcher {
    embedded: Option<EmbeddedToolCaller>,
    external: Option<StdioToolCaller>,
}

impl ToolDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Servers linked into this process, tried first
    pub fn with_embedded(mut self, embedded: EmbeddedToolCaller) -> Self {
        self.embedded = Some(embedded);
        self
    }

    /// Servers from `.mcp.json`
    pub fn with_external(mut self, external: StdioToolCaller) -> Self {
        self.external = Some(external);
        self
    }
}

#[async_trait]
impl ToolCaller for ToolDispatcher {
    async fn call_tool(&self, name: &str, parameters: Value) -> Result<Value, BoxError> {
        if let Some(embedded) = self.embedded.as_ref().filter(|e| e.provides(name)) {
            return embedded.call_tool(name, parameters).await;
        }
        match &self.external {
            Some(external) => external.call_tool(name, parameters).await,
            None => Err(format!("No MCP server provides tool '{}'", name).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{McpConfig, McpServerConfig};
    use rmcp::model::Content;
    use serde_json::json;

    #[test]
    fn test_split_tool_name() {
        assert_eq!(split_tool_name("tasks__create_task"), Some(("tasks", "create_task")));
        assert_eq!(split_tool_name("create_task"), None);
        assert_eq!(split_tool_name("__create_task"), None);
    }

    #[test]
    fn test_text_result_parsed_as_json() {
        let result = CallToolResult::success(vec![Content::text(r#"{"id": "t-1"}"#)]);
        assert_eq!(tool_result_value(result).unwrap(), json!({ "id": "t-1" }));
    }

    #[test]
    fn test_plain_text_result() {
        let result = CallToolResult::success(vec![Content::text("done")]);
        assert_eq!(tool_result_value(result).unwrap(), json!("done"));
    }

    #[test]
    fn test_structured_content_wins() {
        let mut result = CallToolResult::success(vec![Content::text("ignored")]);
        result.structured_content = Some(json!({ "count": 3 }));
        assert_eq!(tool_result_value(result).unwrap(), json!({ "count": 3 }));
    }

    #[test]
    fn test_error_result() {
        let result = CallToolResult::error(vec![Content::text("task not found")]);
        let err = tool_result_value(result).unwrap_err();
        assert_eq!(err.to_string(), "task not found");
    }

    #[tokio::test]
    async fn test_dispatcher_without_servers() {
        let dispatcher = ToolDispatcher::new();
        let err = dispatcher.call_tool("tasks__list", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("tasks__list"));
    }

    #[tokio::test]
    async fn test_dispatcher_falls_through_to_external() {
        let config = McpConfig {
            mcp_servers: [(
                "billing".to_string(),
                McpServerConfig {
                    command: "definitely-not-installed-billing".into(),
                    args: vec![],
                    env: Default::default(),
                },
            )]
            .into_iter()
            .collect(),
        };
        let dispatcher = ToolDispatcher::new()
            .with_embedded(EmbeddedToolCaller::new())
            .with_external(StdioToolCaller::new(config, std::time::Duration::from_secs(5)));

        // Nothing embedded provides it, so the external server is spawned
        let err = dispatcher.call_tool("billing__charge", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("billing"));
    }
}
