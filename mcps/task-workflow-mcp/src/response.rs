//! `CallToolResult` builders

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::error::{McpResult, ResultExt};

/// Pretty-printed JSON success result
pub fn json_success<T: Serialize>(data: &T) -> McpResult<CallToolResult> {
    Ok(CallToolResult::success(vec![Content::text(to_json(data)?)]))
}

/// Pretty-printed JSON result flagged `is_error`
///
/// Used for failed runs: the caller still gets the step results and logs.
pub fn json_error<T: Serialize>(data: &T) -> McpResult<CallToolResult> {
    Ok(CallToolResult::error(vec![Content::text(to_json(data)?)]))
}

fn to_json<T: Serialize>(data: &T) -> McpResult<String> {
    serde_json::to_string_pretty(data).to_mcp_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_success() {
        let result = json_success(&json!({ "status": "completed" })).unwrap();
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(result.content.len(), 1);
    }

    #[test]
    fn test_unserialisable_data_is_internal_error() {
        let data = std::collections::HashMap::from([((1, 2), "pair keys")]);
        let err = json_success(&data).unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INTERNAL_ERROR);
        assert!(err.message.contains("JSON error"));
    }

    #[test]
    fn test_json_error() {
        let result = json_error(&json!({ "status": "failed" })).unwrap();
        assert!(result.is_error.unwrap_or(false));
    }
}
