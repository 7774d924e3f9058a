//! MCP server exposing workflows as tools
//!
//! Tool bodies live in the handlers module; this file wires them into the
//! rmcp router and the in-process [`EmbeddableMcp`] interface.

use async_trait::async_trait;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde_json::Value;
use std::sync::Arc;
use workflow_engine::WorkflowExecutor;

use crate::config::{Config, SERVER_NAME};
use crate::handlers;
use crate::host::WorkflowHost;
use crate::params::{RunWorkflowParams, WorkflowStateParams};
use crate::registry::WorkflowRegistry;
use crate::store::{Database, SqliteSchemaProvider, SqliteStateStore};
use crate::tools::{
    EmbeddableError, EmbeddableMcp, EmbeddableResult, StdioToolCaller, ToolDispatcher,
};

const INSTRUCTIONS: &str = "Task workflow server - runs stored workflows over the task \
     database. Call list_workflows to see what is available and run_workflow to start one. \
     A run may pause with action 'create_object': create the object it describes, then call \
     run_workflow again with the same workflow, inputs and session, passing the created \
     object as resume_value.";

/// The main Task Workflow MCP Server
#[derive(Clone)]
pub struct TaskWorkflowMcpServer {
    host: Arc<WorkflowHost>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl TaskWorkflowMcpServer {
    pub fn new(host: Arc<WorkflowHost>) -> Self {
        Self {
            host,
            tool_router: Self::tool_router(),
        }
    }

    /// Build the full stack from configuration: SQLite store, tool callers
    /// and the workflow registry
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let db_path = config.db_path();
        tracing::info!(path = ?db_path, "Opening database");
        let db = Database::open(&db_path)?;

        // The binary links no other servers, so only `.mcp.json` servers are reachable
        let tools = match config.load_mcp_config()? {
            Some(mcp) => ToolDispatcher::new()
                .with_external(StdioToolCaller::new(mcp, config.tool_timeout())),
            None => {
                tracing::warn!("No MCP server config found; call_tool steps will fail");
                ToolDispatcher::new()
            }
        };

        let executor = WorkflowExecutor::new(
            Arc::new(tools),
            Arc::new(SqliteSchemaProvider::new(db.clone())),
        );
        let registry = WorkflowRegistry::load(Some(config.workflows_dir()))?;
        let host = WorkflowHost::new(
            Arc::new(registry),
            executor,
            Arc::new(SqliteStateStore::new(db)),
        );

        Ok(Self::new(Arc::new(host)))
    }

    pub fn host(&self) -> &WorkflowHost {
        &self.host
    }

    #[tool(
        description = "List available workflows with their descriptions, input schemas and steps"
    )]
    async fn list_workflows(&self) -> Result<CallToolResult, McpError> {
        handlers::list_workflows(&self.host).await
    }

    #[tool(
        description = "Run a workflow, or resume it if a run for the same workflow and session is paused. Returns status completed, paused (with the object to create) or failed"
    )]
    async fn run_workflow(
        &self,
        Parameters(params): Parameters<RunWorkflowParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::run_workflow(&self.host, params).await
    }

    #[tool(description = "Show the saved state of a paused workflow run")]
    async fn get_workflow_state(
        &self,
        Parameters(params): Parameters<WorkflowStateParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::get_workflow_state(&self.host, params).await
    }

    #[tool(description = "Discard a paused workflow run so the next call starts fresh")]
    async fn discard_workflow_state(
        &self,
        Parameters(params): Parameters<WorkflowStateParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::discard_workflow_state(&self.host, params).await
    }

    #[tool(description = "Reload workflow definitions from the workflows directory")]
    async fn reload_workflows(&self) -> Result<CallToolResult, McpError> {
        handlers::reload_workflows(&self.host).await
    }
}

#[tool_handler]
impl rmcp::ServerHandler for TaskWorkflowMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl EmbeddableMcp for TaskWorkflowMcpServer {
    fn server_name(&self) -> &str {
        SERVER_NAME
    }

    fn server_description(&self) -> Option<&str> {
        Some(INSTRUCTIONS)
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
        match name {
            "list_workflows" => self.list_workflows().await.map_err(Into::into),

            "run_workflow" => {
                let params: RunWorkflowParams = serde_json::from_value(params)?;
                self.run_workflow(Parameters(params)).await.map_err(Into::into)
            }

            "get_workflow_state" => {
                let params: WorkflowStateParams = serde_json::from_value(params)?;
                self.get_workflow_state(Parameters(params))
                    .await
                    .map_err(Into::into)
            }

            "discard_workflow_state" => {
                let params: WorkflowStateParams = serde_json::from_value(params)?;
                self.discard_workflow_state(Parameters(params))
                    .await
                    .map_err(Into::into)
            }

            "reload_workflows" => self.reload_workflows().await.map_err(Into::into),

            _ => Err(EmbeddableError::ToolNotFound(name.to_string())),
        }
    }
}
