//! Server configuration
//!
//! Command-line flags with environment fallbacks, plus the `.mcp.json` file
//! describing the MCP servers workflows may call.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name this server is registered under in `.mcp.json`; skipped as a tool target
pub const SERVER_NAME: &str = "task-workflow";

const MCP_CONFIG_FILE: &str = ".mcp.json";

#[derive(Debug, Clone, Parser)]
#[command(name = "task-workflow-mcp")]
#[command(about = "Runs stored task workflows as MCP tools")]
pub struct Config {
    /// SQLite database holding templates and paused workflow state
    /// (default: ~/.taskflow/taskflow.db)
    #[arg(long, env = "TASK_WORKFLOW_DB")]
    pub db_path: Option<PathBuf>,

    /// Directory of *.json / *.toml workflow definitions
    /// (default: ~/.taskflow/workflows)
    #[arg(long, env = "TASK_WORKFLOW_DIR")]
    pub workflows_dir: Option<PathBuf>,

    /// MCP server config used by call_tool steps
    /// (default: nearest .mcp.json, then ~/.config/taskflow/.mcp.json)
    #[arg(long, env = "TASK_WORKFLOW_MCP_CONFIG")]
    pub mcp_config: Option<PathBuf>,

    /// Per-call timeout for tools on external MCP servers
    #[arg(long, env = "TASK_WORKFLOW_TOOL_TIMEOUT", default_value_t = 60)]
    pub tool_timeout_secs: u64,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| data_dir().join("taskflow.db"))
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.workflows_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("workflows"))
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Load the MCP server config: the explicit path if given, else discovery
    pub fn load_mcp_config(&self) -> Result<Option<McpConfig>> {
        match &self.mcp_config {
            Some(path) => McpConfig::load_from_path(path).map(Some),
            None => McpConfig::discover(),
        }
    }
}

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".taskflow")
}

/// `.mcp.json` contents
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: HashMap<String, McpServerConfig>,
}

/// How to launch one MCP server
#[derive(Debug, Clone, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Values may reference environment variables (`$HOME`, `${TOKEN}`)
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl McpConfig {
    /// Search order:
    /// 1. Walk up the directory tree from cwd looking for .mcp.json
    /// 2. ~/.config/taskflow/.mcp.json
    pub fn discover() -> Result<Option<Self>> {
        match find_config_file(MCP_CONFIG_FILE) {
            Some(path) => {
                tracing::debug!("Loading MCP config from: {}", path.display());
                Self::load_from_path(&path).map(Some)
            }
            None => {
                tracing::debug!("No .mcp.json found");
                Ok(None)
            }
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read MCP config {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse MCP config {:?}", path))
    }

    /// Configured servers other than this one
    pub fn servers(&self) -> impl Iterator<Item = (&String, &McpServerConfig)> {
        self.mcp_servers
            .iter()
            .filter(|(name, _)| name.as_str() != SERVER_NAME)
    }
}

fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    let global_path = dirs::config_dir()?.join("taskflow").join(filename);
    global_path.exists().then_some(global_path)
}
