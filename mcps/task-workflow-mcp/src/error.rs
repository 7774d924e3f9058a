//! Error conversion at the MCP boundary
//!
//! Tool handlers return `Result<CallToolResult, McpError>`. Anything the
//! caller got wrong (unknown workflow, bad inputs, malformed definition)
//! becomes `invalid_params`; everything else is an internal error.

use rmcp::ErrorData as McpError;
use workflow_engine::WorkflowError;

/// Type alias for MCP tool results
pub type McpResult<T> = Result<T, McpError>;

/// Conversion into an MCP protocol error
pub trait IntoMcpError {
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for WorkflowError {
    fn into_mcp_error(self) -> McpError {
        match self {
            WorkflowError::WorkflowNotFound(_)
            | WorkflowError::InvalidInputs(_)
            | WorkflowError::MissingRequiredField(_)
            | WorkflowError::InvalidFieldType { .. }
            | WorkflowError::InvalidDefinition { .. }
            | WorkflowError::UnknownStepType { .. }
            | WorkflowError::InvalidSnapshot(_) => invalid_params(self.to_string()),
            other => internal_error(other.to_string()),
        }
    }
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        internal_error(format!("JSON error: {}", self))
    }
}

/// `to_mcp_err()` for any result whose error converts
pub trait ResultExt<T> {
    fn to_mcp_err(self) -> McpResult<T>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> McpResult<T> {
        self.map_err(IntoMcpError::into_mcp_error)
    }
}

pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

pub fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::invalid_params(message.into(), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::model::ErrorCode;

    #[test]
    fn test_caller_errors_are_invalid_params() {
        let err = WorkflowError::WorkflowNotFound("nope".into()).into_mcp_error();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("nope"));

        let err = WorkflowError::MissingRequiredField("title".into()).into_mcp_error();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn test_store_errors_are_internal() {
        let err = WorkflowError::StateStore("disk full".into()).into_mcp_error();
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    }

    #[test]
    fn test_result_ext() {
        let result: Result<(), WorkflowError> = Err(WorkflowError::Parse("bad".into()));
        let err = result.to_mcp_err().unwrap_err();
        assert!(err.message.contains("bad"));
    }
}
