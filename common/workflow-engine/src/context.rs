//! Per-invocation execution state

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::definition::Step;
use crate::error::WorkflowError;
use crate::providers::PropertyType;
use crate::template::Scope;

/// Status of one executed step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step started; nested steps of a conditional are still running
    Running,
    Completed,
    Failed,
}

/// Result entry for one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Step name
    pub step: String,

    /// Step type tag
    #[serde(rename = "type")]
    pub kind: String,

    pub status: StepStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Which list of a conditional was taken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Then,
    Else,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Then => "then",
            Branch::Else => "else",
        }
    }
}

/// One level of a step position: index in its list, plus the branch taken
/// when the step is a conditional that was entered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeFrame {
    pub index: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<Branch>,
}

/// Agent-facing description of a property the agent must fill in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyField {
    pub key: String,

    #[serde(rename = "type")]
    pub kind: PropertyType,

    pub description: String,
}

/// Payload handed to the agent when a `create_object` step pauses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PausePayload {
    pub action: String,
    pub template_id: String,
    pub template_name: String,

    /// Properties the agent still has to supply
    pub property_schemas: Vec<PropertyField>,

    /// Properties already resolved from the inputs
    pub property_values: Map<String, Value>,

    pub instruction: String,
}

/// Why execution stopped before running out of steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Halt {
    /// A `return` step produced the final value
    Returned { value: Value },

    /// A step needs the agent to act; the run will be resumed later
    Paused { payload: PausePayload },
}

/// Mutable state for a single invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionContext {
    pub variables: BTreeMap<String, Value>,

    /// Caller-supplied arguments, read-only during the run
    pub inputs: Value,

    pub logs: Vec<String>,

    pub step_results: Vec<StepRecord>,

    /// Set by `return` or by a pausing step; stops execution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halt: Option<Halt>,

    /// Top-level index of the step running or paused at
    pub current_step: usize,

    /// Variable the paused step wants the agent's result bound to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_result_variable: Option<String>,

    /// Position of the running step, outermost first
    #[serde(skip)]
    pub(crate) cursor: Vec<ResumeFrame>,
}

impl ExecutionContext {
    /// Fresh context for the given inputs
    pub fn new(inputs: Value) -> Self {
        let inputs = match inputs {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Self {
            variables: BTreeMap::new(),
            inputs,
            logs: Vec::new(),
            step_results: Vec::new(),
            halt: None,
            current_step: 0,
            pending_result_variable: None,
            cursor: Vec::new(),
        }
    }

    /// Read-only view used for template resolution
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            variables: &self.variables,
            inputs: &self.inputs,
            logs: &self.logs,
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halt.is_some()
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.halt, Some(Halt::Paused { .. }))
    }

    /// Value of the `return` step that ended the run, if any
    pub fn returned_value(&self) -> Option<&Value> {
        match &self.halt {
            Some(Halt::Returned { value }) => Some(value),
            _ => None,
        }
    }

    pub fn pause_payload(&self) -> Option<&PausePayload> {
        match &self.halt {
            Some(Halt::Paused { payload }) => Some(payload),
            _ => None,
        }
    }

    /// Nested position of the step the run paused at
    pub fn resume_path(&self) -> &[ResumeFrame] {
        &self.cursor
    }

    /// Open a result entry for a step at `index` of a list at `depth`
    pub(crate) fn begin_step(&mut self, step: &Step, index: usize, depth: usize) -> usize {
        self.cursor.truncate(depth);
        self.cursor.push(ResumeFrame {
            index,
            branch: None,
        });
        if depth == 0 {
            self.current_step = index;
        }

        self.step_results.push(StepRecord {
            step: step.name.clone(),
            kind: step.action.kind().to_string(),
            status: StepStatus::Running,
            output: None,
            error: None,
        });
        self.step_results.len() - 1
    }

    pub(crate) fn complete_step(&mut self, record: usize, output: Option<Value>) {
        if let Some(entry) = self.step_results.get_mut(record) {
            entry.status = StepStatus::Completed;
            entry.output = output;
        }
    }

    pub(crate) fn fail_step(&mut self, record: usize, error: &WorkflowError) {
        if let Some(entry) = self.step_results.get_mut(record) {
            entry.status = StepStatus::Failed;
            entry.error = Some(error.to_string());
        }
    }

    /// Record the branch taken by the conditional at `depth`
    pub(crate) fn enter_branch(&mut self, depth: usize, branch: Branch) {
        if let Some(frame) = self.cursor.get_mut(depth) {
            frame.branch = Some(branch);
        }
    }

    /// Restore the position of an enclosing conditional while resuming into it
    pub(crate) fn restore_frame(&mut self, depth: usize, frame: &ResumeFrame) {
        self.cursor.truncate(depth);
        self.cursor.push(frame.clone());
        if depth == 0 {
            self.current_step = frame.index;
        }
    }
}
