//! Step interpreter
//!
//! [`WorkflowExecutor`] runs a workflow's steps in order against an
//! [`ExecutionContext`]. Execution stops when the steps run out, when a step
//! fails (the error propagates, nothing is retried), or when a step halts the
//! context: `return` with a final value, `create_object` with a pause
//! payload. The halt check runs after every step, at every nesting level.
//!
//! A paused run is continued with [`WorkflowExecutor::resume`], which rebuilds
//! the context from an [`ExecutionSnapshot`] and carries on right after the
//! paused step, inside whatever conditional branch it was in.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::Instrument;

use crate::condition;
use crate::context::{Branch, ExecutionContext, Halt, ResumeFrame, StepRecord};
use crate::definition::{Step, StepAction, Workflow};
use crate::error::{ExecutionFailure, WorkflowError, WorkflowResult};
use crate::pause;
use crate::providers::{SchemaProvider, ToolCaller};
use crate::snapshot::ExecutionSnapshot;
use crate::validate::validate_inputs;

type StepsFuture<'a> = Pin<Box<dyn Future<Output = WorkflowResult<()>> + Send + 'a>>;

/// Outcome of running a workflow
pub type ExecutionResult = Result<ExecutionContext, ExecutionFailure>;

/// Interprets workflow definitions
#[derive(Clone)]
pub struct WorkflowExecutor {
    tools: Arc<dyn ToolCaller>,
    schemas: Arc<dyn SchemaProvider>,
}

impl WorkflowExecutor {
    pub fn new(tools: Arc<dyn ToolCaller>, schemas: Arc<dyn SchemaProvider>) -> Self {
        Self { tools, schemas }
    }

    /// Run a workflow from its first step
    pub async fn execute(&self, workflow: &Workflow, inputs: Value) -> ExecutionResult {
        self.execute_from_step(workflow, inputs, 0, Vec::new(), Vec::new())
            .await
    }

    /// Rebuild a context from saved state and run from `start_index`
    pub async fn execute_from_step(
        &self,
        workflow: &Workflow,
        inputs: Value,
        start_index: usize,
        saved_variables: Vec<(String, Value)>,
        saved_step_results: Vec<StepRecord>,
    ) -> ExecutionResult {
        if let Err(error) = validate_inputs(&workflow.input_schema, &inputs) {
            return Err(ExecutionFailure::new(error, ExecutionContext::new(inputs)));
        }

        let mut ctx = ExecutionContext::new(inputs);
        ctx.variables.extend(saved_variables);
        ctx.step_results = saved_step_results;
        ctx.current_step = start_index;

        self.run(workflow, ctx, start_index, &[]).await
    }

    /// Continue a paused run after the step it paused at
    ///
    /// When the paused step declared a `resultVariable` and the caller hands
    /// back a value (typically the created object), it is bound before the
    /// remaining steps run.
    pub async fn resume(
        &self,
        workflow: &Workflow,
        inputs: Value,
        snapshot: ExecutionSnapshot,
        resume_value: Option<Value>,
    ) -> ExecutionResult {
        if let Err(error) = validate_inputs(&workflow.input_schema, &inputs) {
            return Err(ExecutionFailure::new(error, ExecutionContext::new(inputs)));
        }

        let mut ctx = ExecutionContext::new(inputs);
        ctx.variables.extend(snapshot.variables);
        ctx.step_results = snapshot.step_results;
        ctx.logs = snapshot.logs;
        ctx.current_step = snapshot.current_step;

        match (snapshot.pending_result_variable, resume_value) {
            (Some(variable), Some(value)) => {
                ctx.variables.insert(variable, value);
            }
            (None, Some(_)) => {
                tracing::debug!("Paused step has no result variable, ignoring resume value");
            }
            _ => {}
        }

        let path = if snapshot.resume_path.is_empty() {
            vec![ResumeFrame {
                index: snapshot.current_step,
                branch: None,
            }]
        } else {
            snapshot.resume_path
        };

        if path[0].index >= workflow.steps.len() {
            let error = WorkflowError::InvalidSnapshot(format!(
                "paused at step {} but workflow '{}' has {} steps",
                path[0].index,
                workflow.name,
                workflow.steps.len()
            ));
            return Err(ExecutionFailure::new(error, ctx));
        }

        self.run(workflow, ctx, 0, &path).await
    }

    async fn run(
        &self,
        workflow: &Workflow,
        mut ctx: ExecutionContext,
        start: usize,
        resume: &[ResumeFrame],
    ) -> ExecutionResult {
        let span = tracing::info_span!("workflow", name = %workflow.name);
        let outcome = self
            .run_steps(&workflow.steps, 0, start, resume, &mut ctx)
            .instrument(span)
            .await;

        match outcome {
            Ok(()) => {
                match &ctx.halt {
                    Some(Halt::Paused { payload }) => tracing::info!(
                        workflow = %workflow.name,
                        step = ctx.current_step,
                        action = %payload.action,
                        "Workflow paused"
                    ),
                    _ => tracing::info!(
                        workflow = %workflow.name,
                        steps = ctx.step_results.len(),
                        "Workflow completed"
                    ),
                }
                Ok(ctx)
            }
            Err(error) => {
                tracing::warn!(workflow = %workflow.name, step = ctx.current_step, "Workflow failed: {}", error);
                Err(ExecutionFailure::new(error, ctx))
            }
        }
    }

    /// Run a step list from `start`, or from just after the position in `resume`
    fn run_steps<'a>(
        &'a self,
        steps: &'a [Step],
        depth: usize,
        start: usize,
        resume: &'a [ResumeFrame],
        ctx: &'a mut ExecutionContext,
    ) -> StepsFuture<'a> {
        Box::pin(async move {
            let mut index = start;

            if let Some((frame, inner)) = resume.split_first() {
                index = frame.index + 1;
                if !inner.is_empty() {
                    let branch_steps = branch_to_resume(steps, frame)?;
                    ctx.restore_frame(depth, frame);
                    self.run_steps(branch_steps, depth + 1, 0, inner, ctx).await?;
                    if ctx.is_halted() {
                        return Ok(());
                    }
                }
            }

            while let Some(step) = steps.get(index) {
                self.run_step(step, index, depth, ctx).await?;
                if ctx.is_halted() {
                    break;
                }
                index += 1;
            }
            Ok(())
        })
    }

    async fn run_step(
        &self,
        step: &Step,
        index: usize,
        depth: usize,
        ctx: &mut ExecutionContext,
    ) -> WorkflowResult<()> {
        tracing::debug!(step = %step.name, kind = step.action.kind(), index, depth, "Executing step");

        let record = ctx.begin_step(step, index, depth);
        match self.dispatch(step, depth, ctx).await {
            Ok(output) => {
                ctx.complete_step(record, output);
                Ok(())
            }
            Err(error) => {
                ctx.fail_step(record, &error);
                Err(error)
            }
        }
    }

    async fn dispatch(
        &self,
        step: &Step,
        depth: usize,
        ctx: &mut ExecutionContext,
    ) -> WorkflowResult<Option<Value>> {
        match &step.action {
            StepAction::Log { message } => {
                let message = ctx.scope().render(message);
                tracing::info!(step = %step.name, "{}", message);
                ctx.logs.push(message.clone());
                Ok(Some(Value::String(message)))
            }

            StepAction::SetVariable {
                variable_name,
                value,
            } => {
                let value = ctx.scope().interpolate(value);
                ctx.variables.insert(variable_name.clone(), value.clone());
                Ok(Some(value))
            }

            StepAction::Conditional {
                condition,
                then_steps,
                else_steps,
            } => {
                let taken = condition::evaluate(condition, &ctx.scope());
                let (branch, steps) = if taken {
                    (Branch::Then, then_steps.as_slice())
                } else {
                    (Branch::Else, else_steps.as_slice())
                };
                tracing::debug!(step = %step.name, branch = branch.as_str(), "Condition evaluated");

                ctx.enter_branch(depth, branch);
                self.run_steps(steps, depth + 1, 0, &[], ctx).await?;
                Ok(Some(serde_json::json!({
                    "condition": taken,
                    "branch": branch.as_str(),
                })))
            }

            StepAction::CallTool {
                tool_name,
                parameters,
                result_variable,
            } => {
                let parameters = ctx.scope().interpolate(parameters);
                let result = self
                    .tools
                    .call_tool(tool_name, parameters)
                    .await
                    .map_err(|e| WorkflowError::ToolCall {
                        tool: tool_name.clone(),
                        message: e.to_string(),
                    })?;

                if let Some(variable) = result_variable {
                    ctx.variables.insert(variable.clone(), result.clone());
                }
                Ok(Some(result))
            }

            StepAction::Return { value } => {
                let value = ctx.scope().interpolate(value);
                ctx.halt = Some(Halt::Returned {
                    value: value.clone(),
                });
                Ok(Some(value))
            }

            StepAction::CreateObject {
                template_id,
                properties,
                result_variable,
            } => {
                let template = self.schemas.template(template_id).await?;
                let payload = pause::create_object_payload(&template, properties, &ctx.scope())?;
                let output = serde_json::to_value(&payload)
                    .map_err(|e| WorkflowError::Parse(e.to_string()))?;

                ctx.pending_result_variable = result_variable.clone();
                ctx.halt = Some(Halt::Paused { payload });
                Ok(Some(output))
            }
        }
    }
}

/// The branch list a saved frame points into
fn branch_to_resume<'a>(steps: &'a [Step], frame: &ResumeFrame) -> WorkflowResult<&'a [Step]> {
    let step = steps.get(frame.index).ok_or_else(|| {
        WorkflowError::InvalidSnapshot(format!("no step at index {}", frame.index))
    })?;

    match (&step.action, frame.branch) {
        (
            StepAction::Conditional {
                then_steps,
                else_steps,
                ..
            },
            Some(branch),
        ) => Ok(match branch {
            Branch::Then => then_steps.as_slice(),
            Branch::Else => else_steps.as_slice(),
        }),
        _ => Err(WorkflowError::InvalidSnapshot(format!(
            "step '{}' is not a conditional that was entered",
            step.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StepStatus;
    use crate::definition::{InputSchema, PropertyMapping};
    use crate::memory::StaticSchemaProvider;
    use crate::providers::{BoxError, PropertyType, TemplateProperty, TemplateSchema};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Echoes its parameters back and remembers every call
    #[derive(Default)]
    struct RecordingTools {
        calls: Mutex<Vec<(String, Value)>>,
        fail_with: Option<String>,
    }

    impl RecordingTools {
        fn failing(message: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            }
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolCaller for RecordingTools {
        async fn call_tool(&self, name: &str, parameters: Value) -> Result<Value, BoxError> {
            self.calls
                .lock()
                .unwrap()
                .push((name.to_string(), parameters.clone()));
            match &self.fail_with {
                Some(message) => Err(message.clone().into()),
                None => Ok(json!({ "tool": name, "echo": parameters })),
            }
        }
    }

    fn task_template() -> TemplateSchema {
        TemplateSchema {
            id: "tpl-task".into(),
            name: "Task".into(),
            properties: vec![
                TemplateProperty {
                    key: "title".into(),
                    kind: PropertyType::String,
                    description: "Task title".into(),
                },
                TemplateProperty {
                    key: "notes".into(),
                    kind: PropertyType::String,
                    description: "Longer description".into(),
                },
            ],
        }
    }

    fn executor_with(tools: Arc<RecordingTools>) -> WorkflowExecutor {
        let schemas = StaticSchemaProvider::new().with_template(task_template());
        WorkflowExecutor::new(tools, Arc::new(schemas))
    }

    fn executor() -> WorkflowExecutor {
        executor_with(Arc::new(RecordingTools::default()))
    }

    fn create_task(result_variable: Option<&str>) -> Step {
        Step::create_object(
            "create",
            "tpl-task",
            vec![
                ("title", PropertyMapping::Template("{{input.title}}".into())),
                ("notes", PropertyMapping::Agent),
            ],
            result_variable,
        )
    }

    #[tokio::test]
    async fn test_counter_scenario() {
        let workflow = Workflow::new("counter")
            .with_step(Step::set_variable("init", "count", 1))
            .with_step(Step::conditional(
                "check",
                "{{count}} == 1",
                vec![Step::log("ok", "ok")],
                vec![Step::log("bad", "bad")],
            ))
            .with_step(Step::returning("done", "{{count}}"));

        let ctx = executor().execute(&workflow, json!({})).await.unwrap();

        assert_eq!(ctx.logs, vec!["ok".to_string()]);
        assert_eq!(ctx.returned_value(), Some(&json!(1)));
        assert!(!ctx.is_paused());

        let names: Vec<&str> = ctx.step_results.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(names, vec!["init", "check", "ok", "done"]);
        assert!(ctx
            .step_results
            .iter()
            .all(|r| r.status == StepStatus::Completed));
        assert_eq!(ctx.step_results[1].output.as_ref().unwrap()["branch"], "then");
    }

    #[tokio::test]
    async fn test_return_inside_branch_halts_workflow() {
        let workflow = Workflow::new("early")
            .with_step(Step::conditional(
                "gate",
                "true",
                vec![
                    Step::returning("bail", json!({ "reason": "early" })),
                    Step::log("unreachable", "inner"),
                ],
                vec![],
            ))
            .with_step(Step::log("after", "outer"));

        let ctx = executor().execute(&workflow, json!({})).await.unwrap();

        assert!(ctx.logs.is_empty());
        assert_eq!(ctx.returned_value(), Some(&json!({ "reason": "early" })));
        assert_eq!(ctx.step_results.len(), 2);
    }

    #[tokio::test]
    async fn test_returned_action_key_is_not_a_pause() {
        let workflow = Workflow::new("lookalike")
            .with_step(Step::returning("done", json!({ "action": "create_object" })));

        let ctx = executor().execute(&workflow, json!({})).await.unwrap();

        assert!(!ctx.is_paused());
        assert_eq!(ctx.returned_value().unwrap()["action"], "create_object");
    }

    #[tokio::test]
    async fn test_missing_required_field_runs_nothing() {
        let tools = Arc::new(RecordingTools::default());
        let workflow = Workflow::new("needs_title")
            .with_input_schema(InputSchema::new().property("title", "string").require("title"))
            .with_step(Step::log("hello", "hello"))
            .with_step(Step::call_tool("call", "echo", json!({}), None));

        let failure = executor_with(tools.clone())
            .execute(&workflow, json!({ "other": 1 }))
            .await
            .unwrap_err();

        assert_eq!(failure.error, WorkflowError::MissingRequiredField("title".into()));
        assert!(failure.error.is_validation());
        assert!(failure.context.logs.is_empty());
        assert!(failure.context.step_results.is_empty());
        assert!(tools.calls().is_empty());
    }

    #[tokio::test]
    async fn test_tool_result_bound_and_nested_access() {
        let tools = Arc::new(RecordingTools::default());
        let workflow = Workflow::new("lookup")
            .with_step(Step::call_tool(
                "call",
                "tasks__get",
                json!({ "id": "{{input.id}}", "tags": ["{{input.tag}}", 3] }),
                Some("found"),
            ))
            .with_step(Step::log("report", "Called {{found.tool}} for {{found.echo.id}}"));

        let ctx = executor_with(tools.clone())
            .execute(&workflow, json!({ "id": 42, "tag": "urgent" }))
            .await
            .unwrap();

        let calls = tools.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "tasks__get");
        assert_eq!(calls[0].1, json!({ "id": 42, "tags": ["urgent", 3] }));
        assert_eq!(ctx.logs, vec!["Called tasks__get for 42".to_string()]);
        assert_eq!(ctx.variables["found"]["echo"]["id"], json!(42));
    }

    #[tokio::test]
    async fn test_tool_error_is_wrapped() {
        let tools = Arc::new(RecordingTools::failing("connection refused"));
        let workflow = Workflow::new("broken")
            .with_step(Step::log("before", "starting"))
            .with_step(Step::call_tool("call", "tasks__get", json!({}), Some("out")))
            .with_step(Step::log("after", "never"));

        let failure = executor_with(tools)
            .execute(&workflow, json!({}))
            .await
            .unwrap_err();

        assert_eq!(
            failure.error,
            WorkflowError::ToolCall {
                tool: "tasks__get".into(),
                message: "connection refused".into(),
            }
        );
        assert_eq!(failure.failed_step(), Some("call"));
        assert_eq!(failure.context.logs, vec!["starting".to_string()]);
        let last = failure.context.step_results.last().unwrap();
        assert_eq!(last.kind, "call_tool");
        assert!(last.error.as_deref().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_unknown_template_fails_step() {
        let workflow = Workflow::new("bad_template").with_step(Step::create_object(
            "create",
            "tpl-missing",
            vec![("title", PropertyMapping::Agent)],
            None,
        ));

        let failure = executor().execute(&workflow, json!({})).await.unwrap_err();

        assert_eq!(failure.error, WorkflowError::TemplateNotFound("tpl-missing".into()));
        assert_eq!(failure.failed_step(), Some("create"));
        assert!(!failure.context.is_halted());
    }

    #[tokio::test]
    async fn test_create_object_pauses_with_payload() {
        let workflow = Workflow::new("new_task")
            .with_step(Step::log("start", "Creating {{input.title}}"))
            .with_step(create_task(Some("created")))
            .with_step(Step::log("finish", "never yet"));

        let ctx = executor()
            .execute(&workflow, json!({ "title": "Write docs" }))
            .await
            .unwrap();

        assert!(ctx.is_paused());
        assert_eq!(ctx.current_step, 1);
        assert_eq!(ctx.logs.len(), 1);
        assert_eq!(ctx.pending_result_variable.as_deref(), Some("created"));

        let payload = ctx.pause_payload().unwrap();
        assert_eq!(payload.template_id, "tpl-task");
        assert_eq!(payload.property_values["title"], json!("Write docs"));
        assert_eq!(payload.property_schemas.len(), 1);
        assert_eq!(payload.property_schemas[0].key, "notes");
    }

    #[tokio::test]
    async fn test_resume_binds_value_and_continues() {
        let workflow = Workflow::new("new_task")
            .with_step(create_task(Some("created")))
            .with_step(Step::log("finish", "Created {{created.id}}"))
            .with_step(Step::returning("done", "{{created}}"));
        let inputs = json!({ "title": "Write docs" });
        let exec = executor();

        let paused = exec.execute(&workflow, inputs.clone()).await.unwrap();
        let snapshot = ExecutionSnapshot::capture(&paused);

        let ctx = exec
            .resume(&workflow, inputs, snapshot, Some(json!({ "id": "obj-7" })))
            .await
            .unwrap();

        assert_eq!(ctx.logs, vec!["Created obj-7".to_string()]);
        assert_eq!(ctx.returned_value(), Some(&json!({ "id": "obj-7" })));
        assert_eq!(ctx.step_results.len(), 3);
    }

    #[tokio::test]
    async fn test_pause_inside_branch_resumes_in_branch() {
        let workflow = Workflow::new("branchy")
            .with_step(Step::set_variable("flag", "wanted", true))
            .with_step(Step::conditional(
                "maybe_create",
                "{{wanted}}",
                vec![
                    create_task(Some("created")),
                    Step::log("inner", "inside branch {{created.id}}"),
                ],
                vec![Step::log("skipped", "no task")],
            ))
            .with_step(Step::log("outer", "done"));
        let inputs = json!({ "title": "Plan sprint" });
        let exec = executor();

        let paused = exec.execute(&workflow, inputs.clone()).await.unwrap();
        assert!(paused.is_paused());
        assert_eq!(paused.current_step, 1);
        assert_eq!(paused.resume_path().len(), 2);

        let snapshot = ExecutionSnapshot::capture(&paused);
        let ctx = exec
            .resume(&workflow, inputs, snapshot, Some(json!({ "id": "t-1" })))
            .await
            .unwrap();

        assert_eq!(
            ctx.logs,
            vec!["inside branch t-1".to_string(), "done".to_string()]
        );
        assert!(!ctx.is_halted());
    }

    #[tokio::test]
    async fn test_resume_from_stored_snapshot_matches_in_process_resume() {
        let workflow = Workflow::new("greet")
            .with_input_schema(InputSchema::new().property("title", "string").require("title"))
            .with_step(Step::set_variable("name", "who", "{{input.title}}"))
            .with_step(Step::log("hello", "Hello {{who}}"))
            .with_step(create_task(None))
            .with_step(Step::set_variable("count", "logged", "{{logs.length}}"))
            .with_step(Step::log("bye", "Bye {{who}} after {{logged}} lines"));
        let inputs = json!({ "title": "Ada" });
        let exec = executor();

        let paused = exec.execute(&workflow, inputs.clone()).await.unwrap();
        let snapshot = ExecutionSnapshot::capture(&paused);
        let stored = ExecutionSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();

        let direct = exec
            .resume(&workflow, inputs.clone(), snapshot, None)
            .await
            .unwrap();
        let reloaded = exec.resume(&workflow, inputs, stored, None).await.unwrap();

        assert_eq!(direct.variables, reloaded.variables);
        assert_eq!(direct.logs, reloaded.logs);
        assert_eq!(direct.step_results, reloaded.step_results);
        assert_eq!(
            direct.logs,
            vec!["Hello Ada".to_string(), "Bye Ada after 1 lines".to_string()]
        );
        assert_eq!(direct.variables["logged"], json!(1));
        assert_eq!(direct.step_results.len(), 5);
    }

    #[tokio::test]
    async fn test_execute_from_step_skips_earlier_steps() {
        let workflow = Workflow::new("partial")
            .with_step(Step::log("first", "first"))
            .with_step(Step::set_variable("set", "n", 5))
            .with_step(Step::returning("done", "{{n}}"));

        let ctx = executor()
            .execute_from_step(&workflow, json!({}), 2, vec![("n".into(), json!(9))], vec![])
            .await
            .unwrap();

        assert!(ctx.logs.is_empty());
        assert_eq!(ctx.returned_value(), Some(&json!(9)));
        assert_eq!(ctx.step_results.len(), 1);
    }

    #[tokio::test]
    async fn test_resume_rejects_snapshot_past_end() {
        let workflow = Workflow::new("short").with_step(Step::log("only", "x"));
        let snapshot = ExecutionSnapshot {
            current_step: 3,
            variables: vec![],
            step_results: vec![],
            logs: vec![],
            resume_path: vec![],
            pending_result_variable: None,
            saved_at: None,
        };

        let failure = executor()
            .resume(&workflow, json!({}), snapshot, None)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, WorkflowError::InvalidSnapshot(_)));
    }

    #[tokio::test]
    async fn test_interpolation_round_trip() {
        let stored = json!({ "nested": [1, { "deep": true }], "n": 2.5 });
        let workflow = Workflow::new("round_trip")
            .with_step(Step::set_variable("store", "v", stored.clone()))
            .with_step(Step::set_variable("copy", "whole", "{{v}}"))
            .with_step(Step::set_variable("text", "partial", "n={{v.n}}"));

        let ctx = executor().execute(&workflow, json!({})).await.unwrap();

        assert_eq!(ctx.variables["whole"], stored);
        assert_eq!(ctx.variables["partial"], json!("n=2.5"));
    }
}
