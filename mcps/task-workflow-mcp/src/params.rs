//! Parameter definitions for task-workflow tools

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunWorkflowParams {
    #[schemars(description = "Name of the workflow to run (see list_workflows)")]
    pub workflow: String,

    #[schemars(description = "Workflow inputs as an object matching its input schema")]
    #[serde(default)]
    pub inputs: Value,

    #[schemars(
        description = "Optional session id; runs of the same workflow with different sessions pause independently"
    )]
    #[serde(default)]
    pub session: Option<String>,

    #[schemars(
        description = "When resuming a paused run: the object you created, bound to the paused step's result variable"
    )]
    #[serde(default)]
    pub resume_value: Option<Value>,
}

/// Identifies one paused run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WorkflowStateParams {
    pub workflow: String,
    #[serde(default)]
    pub session: Option<String>,
}
