//! Task Workflow MCP Library
//!
//! Runs stored workflows over the task database and exposes them to an agent
//! as MCP tools. A run can pause on a `create_object` step, hand the agent a
//! description of the object to create, and resume once the agent passes the
//! created object back.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use task_workflow_mcp::{Config, TaskWorkflowMcpServer};
//!
//! let server = TaskWorkflowMcpServer::from_config(&config)?;
//! // Serve via stdio, or call it in-process through EmbeddableMcp
//! ```
//!
//! - Paused runs are stored in SQLite, keyed by workflow and session
//! - Calls on one key are serialised; the snapshot is versioned
//! - `call_tool` steps reach in-process servers first, then `.mcp.json` servers

pub mod config;
pub mod error;
pub mod handlers;
pub mod host;
pub mod params;
pub mod registry;
pub mod response;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod tools;
pub mod types;

pub use config::{Config, McpConfig, McpServerConfig};
pub use host::{state_key, Invocation, WorkflowHost};
pub use registry::{LoadSummary, WorkflowRegistry, WorkflowSource};
pub use server::TaskWorkflowMcpServer;
pub use store::{Database, SqliteSchemaProvider, SqliteStateStore};
pub use tools::{EmbeddableError, EmbeddableMcp, EmbeddableResult, EmbeddedToolCaller, ToolDispatcher};
pub use types::InvocationResponse;

// Re-export parameter types for direct API usage
pub use params::*;
