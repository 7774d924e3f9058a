//! Saved execution snapshots
//!
//! A snapshot is the part of an [`ExecutionContext`] that has to survive
//! between the invocation that paused and the one that resumes. It is stored
//! as JSON with camelCase keys; fields added after the first version default
//! to empty so older snapshots keep loading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::{ExecutionContext, ResumeFrame, StepRecord};
use crate::error::{WorkflowError, WorkflowResult};

/// Serializable state needed to resume a paused run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    /// Top-level index of the paused step
    pub current_step: usize,

    /// Variables as `[key, value]` pairs, sorted by key
    pub variables: Vec<(String, Value)>,

    pub step_results: Vec<StepRecord>,

    #[serde(default)]
    pub logs: Vec<String>,

    /// Nested position of the paused step, outermost first
    #[serde(default)]
    pub resume_path: Vec<ResumeFrame>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_result_variable: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
}

impl ExecutionSnapshot {
    /// Capture a context
    pub fn capture(ctx: &ExecutionContext) -> Self {
        Self {
            current_step: ctx.current_step,
            variables: ctx
                .variables
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            step_results: ctx.step_results.clone(),
            logs: ctx.logs.clone(),
            resume_path: ctx.resume_path().to_vec(),
            pending_result_variable: ctx.pending_result_variable.clone(),
            saved_at: Some(Utc::now()),
        }
    }

    pub fn to_json(&self) -> WorkflowResult<String> {
        serde_json::to_string(self).map_err(|e| WorkflowError::Parse(e.to_string()))
    }

    pub fn from_json(json: &str) -> WorkflowResult<Self> {
        serde_json::from_str(json).map_err(|e| WorkflowError::Parse(e.to_string()))
    }
}
