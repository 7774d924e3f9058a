//! Handler implementations for task-workflow tools
//!
//! Each handler turns tool params into a host call and the outcome into a
//! `CallToolResult`. Failed runs come back as an error result carrying the
//! step results; problems outside a run become MCP protocol errors.

use rmcp::model::CallToolResult;

use crate::error::{McpResult, ResultExt};
use crate::host::{state_key, Invocation, WorkflowHost};
use crate::params::{RunWorkflowParams, WorkflowStateParams};
use crate::response::{json_error, json_success};
use crate::types::{
    DiscardResponse, InvocationResponse, WorkflowListResponse, WorkflowStateResponse,
    WorkflowSummary,
};

pub async fn list_workflows(host: &WorkflowHost) -> McpResult<CallToolResult> {
    let registry = host.registry();
    let workflows: Vec<WorkflowSummary> = registry
        .list()
        .iter()
        .map(|workflow| {
            WorkflowSummary::from(workflow.as_ref())
                .with_source(registry.source(&workflow.name).as_ref())
        })
        .collect();

    json_success(&WorkflowListResponse {
        total: workflows.len(),
        workflows,
    })
}

pub async fn run_workflow(
    host: &WorkflowHost,
    params: RunWorkflowParams,
) -> McpResult<CallToolResult> {
    let mut invocation = Invocation::new(params.workflow, params.inputs);
    if let Some(session) = params.session {
        invocation = invocation.with_session(session);
    }
    if let Some(value) = params.resume_value {
        invocation = invocation.with_resume_value(value);
    }

    let response = host.invoke(invocation).await.to_mcp_err()?;
    match &response {
        InvocationResponse::Failed(_) => json_error(&response),
        _ => json_success(&response),
    }
}

pub async fn get_workflow_state(
    host: &WorkflowHost,
    params: WorkflowStateParams,
) -> McpResult<CallToolResult> {
    let session = params.session.as_deref();
    let stored = host.state(&params.workflow, session).await.to_mcp_err()?;

    json_success(&WorkflowStateResponse {
        key: state_key(&params.workflow, session),
        paused: stored.is_some(),
        version: stored.as_ref().map(|s| s.version),
        snapshot: stored.map(|s| s.snapshot),
    })
}

pub async fn discard_workflow_state(
    host: &WorkflowHost,
    params: WorkflowStateParams,
) -> McpResult<CallToolResult> {
    let session = params.session.as_deref();
    let discarded = host.discard(&params.workflow, session).await.to_mcp_err()?;

    json_success(&DiscardResponse {
        key: state_key(&params.workflow, session),
        discarded,
    })
}

pub async fn reload_workflows(host: &WorkflowHost) -> McpResult<CallToolResult> {
    let summary = host.registry().refresh().to_mcp_err()?;
    json_success(&summary)
}
