//! Workflow execution engine
//!
//! Runs stored workflows: ordered, possibly nested lists of typed steps
//! (`log`, `set_variable`, `conditional`, `call_tool`, `return`,
//! `create_object`) over a per-invocation variable scope with `{{path}}`
//! templating.
//!
//! A `create_object` step cannot finish on its own because the agent has to
//! supply property values. It halts the run with a pause payload; the host
//! saves an [`ExecutionSnapshot`] and later calls [`WorkflowExecutor::resume`].
//!
//! The engine talks to the outside world only through [`ToolCaller`],
//! [`SchemaProvider`] and [`StateStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use workflow_engine::{Step, Workflow, WorkflowExecutor};
//!
//! let workflow = Workflow::new("counter")
//!     .with_step(Step::set_variable("init", "count", 1))
//!     .with_step(Step::returning("done", "{{count}}"));
//!
//! let ctx = executor.execute(&workflow, serde_json::json!({})).await?;
//! assert_eq!(ctx.returned_value(), Some(&serde_json::json!(1)));
//! ```

pub mod condition;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod memory;
pub mod pause;
pub mod providers;
pub mod snapshot;
pub mod template;
pub mod validate;

pub use context::{
    Branch, ExecutionContext, Halt, PausePayload, PropertyField, ResumeFrame, StepRecord,
    StepStatus,
};
pub use definition::{InputSchema, PropertyMapping, PropertySchema, Step, StepAction, Workflow};
pub use error::{ExecutionFailure, WorkflowError, WorkflowResult};
pub use executor::{ExecutionResult, WorkflowExecutor};
pub use memory::{MemoryStateStore, StaticSchemaProvider};
pub use providers::{
    BoxError, PropertyType, SchemaProvider, StateStore, StoredSnapshot, TemplateProperty,
    TemplateSchema, ToolCaller,
};
pub use snapshot::ExecutionSnapshot;
pub use template::Scope;
pub use validate::validate_inputs;
