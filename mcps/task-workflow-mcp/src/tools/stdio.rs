//! External MCP servers over child-process stdio
//!
//! Spawn-per-call: each tool call starts the server, performs the call and
//! shuts it down. Slow, but needs no daemon and holds no state between calls.

use async_trait::async_trait;
use rmcp::{model::CallToolRequestParam, transport::TokioChildProcess, ServiceExt};
use serde_json::Value;
use std::time::Duration;
use tokio::process::Command;
use workflow_engine::{BoxError, ToolCaller};

use super::{split_tool_name, tool_result_value};
use crate::config::{McpConfig, McpServerConfig};

/// Tool caller for servers listed in `.mcp.json`
#[derive(Debug, Clone)]
pub struct StdioToolCaller {
    config: McpConfig,
    timeout: Duration,
}

impl StdioToolCaller {
    pub fn new(config: McpConfig, timeout: Duration) -> Self {
        Self { config, timeout }
    }

    /// Server config and tool name for a tool reference
    ///
    /// Bare names are accepted only when exactly one server is configured.
    fn resolve<'a>(&'a self, name: &'a str) -> Result<(&'a str, &'a McpServerConfig, &'a str), String> {
        if let Some((server, tool)) = split_tool_name(name) {
            return self
                .config
                .servers()
                .find(|(candidate, _)| candidate.as_str() == server)
                .map(|(server, config)| (server.as_str(), config, tool))
                .ok_or_else(|| format!("MCP server '{}' is not configured", server));
        }

        let mut servers = self.config.servers();
        match (servers.next(), servers.next()) {
            (Some((server, config)), None) => Ok((server.as_str(), config, name)),
            (None, _) => Err(format!("No MCP servers configured for tool '{}'", name)),
            _ => Err(format!(
                "Tool '{}' is ambiguous; use server__tool to pick a server",
                name
            )),
        }
    }

    async fn call_once(
        server: &str,
        config: &McpServerConfig,
        tool: &str,
        parameters: Value,
    ) -> Result<Value, BoxError> {
        let mut cmd = Command::new(&config.command);
        if !config.args.is_empty() {
            cmd.args(&config.args);
        }
        for (key, value) in &config.env {
            let expanded = shellexpand::env(value).unwrap_or_else(|_| value.clone().into());
            cmd.env(key, expanded.as_ref());
        }

        let transport = TokioChildProcess::new(cmd)
            .map_err(|e| format!("Failed to start MCP server '{}': {}", server, e))?;
        let service = ()
            .serve(transport)
            .await
            .map_err(|e| format!("Failed to connect to MCP server '{}': {}", server, e))?;

        let result = service
            .call_tool(CallToolRequestParam {
                name: tool.to_string().into(),
                arguments: parameters.as_object().cloned(),
                task: None,
            })
            .await
            .map_err(|e| format!("Call to {}__{} failed: {}", server, tool, e));

        if let Err(e) = service.cancel().await {
            tracing::debug!(server, "Error shutting down MCP server: {}", e);
        }

        tool_result_value(result?)
    }
}

#[async_trait]
impl ToolCaller for StdioToolCaller {
    async fn call_tool(&self, name: &str, parameters: Value) -> Result<Value, BoxError> {
        let (server, config, tool) = self.resolve(name)?;
        tracing::debug!(server, tool, "Calling external MCP tool");

        match tokio::time::timeout(
            self.timeout,
            Self::call_once(server, config, tool, parameters),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(format!(
                "Tool '{}' timed out after {}s",
                name,
                self.timeout.as_secs()
            )
            .into()),
        }
    }
}
