//! Task Workflow MCP - runs stored task workflows as MCP tools over stdio

use clap::Parser;
use rmcp::{transport::io::stdio, ServiceExt};
use task_workflow_mcp::{telemetry, Config, TaskWorkflowMcpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    telemetry::init_tracing()?;

    tracing::info!("Starting Task Workflow MCP server");

    let server = TaskWorkflowMcpServer::from_config(&config)?;
    let service = server.serve(stdio()).await?;

    tracing::info!("Task Workflow MCP server running");

    service.waiting().await?;

    tracing::info!("Task Workflow MCP server stopped");

    Ok(())
}
