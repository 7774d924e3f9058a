//! Workflow registry
//!
//! Holds the workflows this server can run: built-ins compiled into the
//! binary, definitions loaded from a directory, and ones registered at
//! runtime. Each server owns its own registry; nothing is global.

use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use workflow_engine::{InputSchema, PropertyMapping, Step, Workflow, WorkflowError, WorkflowResult};

/// Where a registered workflow came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowSource {
    Builtin,
    File(PathBuf),
    Registered,
}

impl WorkflowSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowSource::Builtin => "builtin",
            WorkflowSource::File(_) => "file",
            WorkflowSource::Registered => "registered",
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    workflow: Arc<Workflow>,
    source: WorkflowSource,
}

/// Outcome of a directory (re)load
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct LoadSummary {
    /// Workflows loaded from files
    pub loaded: Vec<String>,
    /// Files that failed to parse
    pub skipped: Vec<PathBuf>,
}

pub struct WorkflowRegistry {
    dir: Option<PathBuf>,
    builtins: bool,
    entries: RwLock<HashMap<String, Entry>>,
}

impl WorkflowRegistry {
    /// Empty registry with no directory
    pub fn new() -> Self {
        Self {
            dir: None,
            builtins: false,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Built-in workflows plus every definition in `dir`
    pub fn load(dir: Option<PathBuf>) -> WorkflowResult<Self> {
        let mut registry = Self::new();
        registry.dir = dir;
        registry.builtins = true;
        for workflow in builtin_workflows() {
            registry.insert(workflow, WorkflowSource::Builtin);
        }
        registry.refresh()?;
        Ok(registry)
    }

    /// Reload the directory, replacing every file-backed workflow at once
    ///
    /// Runtime registrations keep precedence over files with the same name.
    pub fn refresh(&self) -> WorkflowResult<LoadSummary> {
        let (files, summary) = match &self.dir {
            Some(dir) => load_dir(dir)?,
            None => (Vec::new(), LoadSummary::default()),
        };

        let mut entries = self.write();
        entries.retain(|_, entry| !matches!(entry.source, WorkflowSource::File(_)));

        for (path, workflow) in files {
            if matches!(
                entries.get(&workflow.name).map(|e| &e.source),
                Some(WorkflowSource::Registered)
            ) {
                tracing::debug!(name = %workflow.name, "Keeping registered workflow over {:?}", path);
                continue;
            }
            entries.insert(
                workflow.name.clone(),
                Entry {
                    workflow: Arc::new(workflow),
                    source: WorkflowSource::File(path),
                },
            );
        }

        // Built-ins shadowed by a file that has since been removed come back
        let builtins = if self.builtins { builtin_workflows() } else { Vec::new() };
        for workflow in builtins {
            entries.entry(workflow.name.clone()).or_insert_with(|| Entry {
                workflow: Arc::new(workflow),
                source: WorkflowSource::Builtin,
            });
        }

        tracing::info!(
            loaded = summary.loaded.len(),
            skipped = summary.skipped.len(),
            total = entries.len(),
            "Workflows refreshed"
        );
        Ok(summary)
    }

    /// Add or replace a workflow; returns the one it replaced
    pub fn register(&self, workflow: Workflow) -> Option<Arc<Workflow>> {
        self.insert(workflow, WorkflowSource::Registered)
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.write().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Workflow>> {
        self.read().get(name).map(|entry| entry.workflow.clone())
    }

    pub fn source(&self, name: &str) -> Option<WorkflowSource> {
        self.read().get(name).map(|entry| entry.source.clone())
    }

    /// All workflows sorted by name
    pub fn list(&self) -> Vec<Arc<Workflow>> {
        let mut workflows: Vec<_> = self
            .read()
            .values()
            .map(|entry| entry.workflow.clone())
            .collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name));
        workflows
    }

    fn insert(&self, workflow: Workflow, source: WorkflowSource) -> Option<Arc<Workflow>> {
        let name = workflow.name.clone();
        self.write()
            .insert(
                name,
                Entry {
                    workflow: Arc::new(workflow),
                    source,
                },
            )
            .map(|previous| previous.workflow)
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse every `*.json` / `*.toml` file in `dir`; invalid files are skipped
fn load_dir(dir: &Path) -> WorkflowResult<(Vec<(PathBuf, Workflow)>, LoadSummary)> {
    let mut workflows = Vec::new();
    let mut summary = LoadSummary::default();

    if !dir.exists() {
        return Ok((workflows, summary));
    }

    let entries = std::fs::read_dir(dir).map_err(|e| WorkflowError::Io(e.to_string()))?;
    let mut paths: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext == "json" || ext == "toml")
        })
        .collect();
    paths.sort();

    for path in paths {
        match Workflow::from_file(&path) {
            Ok(workflow) => {
                summary.loaded.push(workflow.name.clone());
                workflows.push((path, workflow));
            }
            Err(e) => {
                tracing::warn!("Failed to load workflow from {:?}: {}", path, e);
                summary.skipped.push(path);
            }
        }
    }

    Ok((workflows, summary))
}

/// Workflows available without any configuration
///
/// - `create_task`: ask the agent for the task details and create it
/// - `triage_task`: decide whether a task is urgent from its priority
pub fn builtin_workflows() -> Vec<Workflow> {
    vec![
        Workflow::new("create_task")
            .with_description("Create a task from a title; the agent fills in the details")
            .with_input_schema(
                InputSchema::new()
                    .property("title", "string")
                    .property("priority", "number")
                    .require("title"),
            )
            .with_step(Step::log("announce", "Creating task '{{input.title}}'"))
            .with_step(Step::create_object(
                "create",
                "task",
                vec![
                    ("title", PropertyMapping::Template("{{input.title}}".into())),
                    ("priority", PropertyMapping::Template("{{input.priority}}".into())),
                    ("description", PropertyMapping::Agent),
                    ("due_date", PropertyMapping::Agent),
                ],
                Some("task"),
            ))
            .with_step(Step::log("created", "Created task '{{input.title}}'"))
            .with_step(Step::returning("done", "{{task}}")),
        Workflow::new("triage_task")
            .with_description("Classify a task as urgent or routine from its priority")
            .with_input_schema(
                InputSchema::new()
                    .property("title", "string")
                    .property("priority", "number")
                    .require("title")
                    .require("priority"),
            )
            .with_step(Step::conditional(
                "check_priority",
                "{{input.priority}} == 1",
                vec![
                    Step::set_variable("mark_urgent", "lane", "urgent"),
                    Step::log("urgent", "'{{input.title}}' needs attention today"),
                ],
                vec![Step::set_variable("mark_routine", "lane", "routine")],
            ))
            .with_step(Step::returning(
                "result",
                json!({ "title": "{{input.title}}", "lane": "{{lane}}" }),
            )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const FILE_WORKFLOW: &str = r#"{
        "name": "weekly_review",
        "description": "Summarise the week",
        "inputSchema": { "properties": {}, "required": [] },
        "steps": [
            { "name": "start", "type": "log", "message": "Reviewing" }
        ]
    }"#;

    #[test]
    fn test_builtin_workflows() {
        let registry = WorkflowRegistry::load(None).unwrap();
        let names: Vec<String> = registry.list().iter().map(|w| w.name.clone()).collect();
        assert_eq!(names, vec!["create_task", "triage_task"]);
        assert_eq!(registry.source("create_task"), Some(WorkflowSource::Builtin));
    }

    #[test]
    fn test_load_directory_skips_invalid_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("weekly.json"), FILE_WORKFLOW).unwrap();
        fs::write(
            dir.path().join("broken.json"),
            r#"{ "name": "broken", "steps": [{ "name": "x", "type": "teleport" }] }"#,
        )
        .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a workflow").unwrap();

        let registry = WorkflowRegistry::load(Some(dir.path().to_path_buf())).unwrap();

        assert!(registry.get("weekly_review").is_some());
        assert!(registry.get("broken").is_none());
        assert_eq!(registry.list().len(), 3);
    }

    #[test]
    fn test_refresh_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorkflowRegistry::load(Some(dir.path().to_path_buf())).unwrap();
        assert!(registry.get("weekly_review").is_none());

        let path = dir.path().join("weekly.json");
        fs::write(&path, FILE_WORKFLOW).unwrap();
        let summary = registry.refresh().unwrap();
        assert_eq!(summary.loaded, vec!["weekly_review".to_string()]);
        assert_eq!(registry.source("weekly_review"), Some(WorkflowSource::File(path.clone())));

        fs::remove_file(&path).unwrap();
        registry.refresh().unwrap();
        assert!(registry.get("weekly_review").is_none());
    }

    #[test]
    fn test_file_shadows_builtin_until_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("triage.toml");
        fs::write(
            &path,
            r#"
            name = "triage_task"
            description = "Custom triage"

            [[steps]]
            name = "only"
            type = "return"
            value = "custom"
            "#,
        )
        .unwrap();

        let registry = WorkflowRegistry::load(Some(dir.path().to_path_buf())).unwrap();
        assert_eq!(registry.get("triage_task").unwrap().description, "Custom triage");

        fs::remove_file(&path).unwrap();
        registry.refresh().unwrap();
        assert_eq!(registry.source("triage_task"), Some(WorkflowSource::Builtin));
    }

    #[test]
    fn test_register_and_unregister() {
        let registry = WorkflowRegistry::new();
        assert!(registry
            .register(Workflow::new("adhoc").with_step(Step::log("a", "a")))
            .is_none());
        assert!(registry.register(Workflow::new("adhoc")).is_some());

        registry.refresh().unwrap();
        assert_eq!(registry.source("adhoc"), Some(WorkflowSource::Registered));
        assert_eq!(registry.list().len(), 1);

        assert!(registry.unregister("adhoc"));
        assert!(!registry.unregister("adhoc"));
        assert!(registry.get("adhoc").is_none());
    }
}
