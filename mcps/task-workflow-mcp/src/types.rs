//! Response types returned to the agent

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use crate::registry::WorkflowSource;
use workflow_engine::{ExecutionSnapshot, InputSchema, PausePayload, Step, StepAction, StepRecord, Workflow};

/// Outcome of one `run_workflow` call
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InvocationResponse {
    Paused(PausedResponse),
    Completed(CompletedResponse),
    Failed(FailedResponse),
}

impl InvocationResponse {
    pub fn status(&self) -> &'static str {
        match self {
            InvocationResponse::Paused(_) => "paused",
            InvocationResponse::Completed(_) => "completed",
            InvocationResponse::Failed(_) => "failed",
        }
    }
}

/// The run is waiting for the agent
#[derive(Debug, Clone, Serialize)]
pub struct PausedResponse {
    /// 1-based top-level position of the paused step
    pub step: usize,
    pub total_steps: usize,

    #[serde(flatten)]
    pub payload: PausePayload,

    /// What the agent should do to continue
    pub next_action: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletedResponse {
    pub steps_executed: usize,
    pub step_results: Vec<StepRecord>,
    pub logs: Vec<String>,
    pub variables: BTreeMap<String, Value>,

    /// Value of the `return` step, when one ran
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedResponse {
    pub error: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,

    pub step_results: Vec<StepRecord>,
    pub logs: Vec<String>,
}

/// Entry in `list_workflows`
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,

    /// `builtin`, `file` or `registered`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,

    pub input_schema: InputSchema,

    /// Steps including those nested in branches
    pub step_count: usize,
    pub steps: Vec<StepSummary>,
}

impl WorkflowSummary {
    pub fn with_source(mut self, source: Option<&WorkflowSource>) -> Self {
        self.source = source.map(WorkflowSource::as_str);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub then: Vec<StepSummary>,

    #[serde(rename = "else", skip_serializing_if = "Vec::is_empty")]
    pub otherwise: Vec<StepSummary>,
}

impl From<&Step> for StepSummary {
    fn from(step: &Step) -> Self {
        let (then, otherwise) = match &step.action {
            StepAction::Conditional {
                then_steps,
                else_steps,
                ..
            } => (
                then_steps.iter().map(StepSummary::from).collect(),
                else_steps.iter().map(StepSummary::from).collect(),
            ),
            _ => (Vec::new(), Vec::new()),
        };
        Self {
            name: step.name.clone(),
            kind: step.action.kind(),
            then,
            otherwise,
        }
    }
}

impl From<&Workflow> for WorkflowSummary {
    fn from(workflow: &Workflow) -> Self {
        Self {
            name: workflow.name.clone(),
            description: workflow.description.clone(),
            source: None,
            input_schema: workflow.input_schema.clone(),
            step_count: workflow.steps.iter().map(Step::count).sum(),
            steps: workflow.steps.iter().map(StepSummary::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowListResponse {
    pub total: usize,
    pub workflows: Vec<WorkflowSummary>,
}

/// Paused state for a key, if any
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowStateResponse {
    pub key: String,
    pub paused: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ExecutionSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscardResponse {
    pub key: String,
    pub discarded: bool,
}
