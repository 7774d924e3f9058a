//! Workflow-related errors
//!
//! Every failure the interpreter can raise is a [`WorkflowError`]. Failures
//! that happen once steps have started running are wrapped in
//! [`ExecutionFailure`] so callers still see the partial step results and
//! logs produced before the failing step.

use crate::context::ExecutionContext;

/// Workflow-related errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    /// A step is missing a required field or has a malformed one
    #[error("Invalid definition for step '{step}': {message}")]
    InvalidDefinition { step: String, message: String },

    /// A step declares a type the interpreter does not know
    #[error("Unknown step type '{kind}' in step '{step}'")]
    UnknownStepType { step: String, kind: String },

    /// Invocation inputs are not a JSON object
    #[error("Invalid inputs: {0}")]
    InvalidInputs(String),

    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    #[error("Invalid type for field '{field}': expected {expected}, got {actual}")]
    InvalidFieldType {
        field: String,
        expected: String,
        actual: String,
    },

    /// The tool caller raised an error
    #[error("Tool '{tool}' failed: {message}")]
    ToolCall { tool: String, message: String },

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    #[error("Property '{property}' is not declared by template '{template}'")]
    UnknownTemplateProperty { template: String, property: String },

    #[error("Schema provider error: {0}")]
    SchemaProvider(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("State store error: {0}")]
    StateStore(String),

    /// A snapshot was written by someone else since it was read
    #[error("State conflict for '{key}': expected version {expected:?}, found {found:?}")]
    StateConflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// Snapshot does not fit the workflow it is resumed against
    #[error("Cannot resume: {0}")]
    InvalidSnapshot(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl WorkflowError {
    /// True for errors raised by input validation, before any step ran
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidInputs(_)
                | WorkflowError::MissingRequiredField(_)
                | WorkflowError::InvalidFieldType { .. }
        )
    }

    pub(crate) fn definition(step: &str, message: impl Into<String>) -> Self {
        WorkflowError::InvalidDefinition {
            step: step.to_string(),
            message: message.into(),
        }
    }
}

/// A failed execution together with the context it left behind
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ExecutionFailure {
    /// The error that aborted the invocation
    pub error: WorkflowError,

    /// Context at the point of failure (step results, logs, variables)
    pub context: Box<ExecutionContext>,
}

impl ExecutionFailure {
    pub fn new(error: WorkflowError, context: ExecutionContext) -> Self {
        Self {
            error,
            context: Box::new(context),
        }
    }

    /// Name of the step that failed, if a step was running
    pub fn failed_step(&self) -> Option<&str> {
        self.context
            .step_results
            .iter()
            .rev()
            .find(|record| record.status == crate::context::StepStatus::Failed)
            .map(|record| record.step.as_str())
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
