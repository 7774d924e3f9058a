//! Invocation host
//!
//! Glue between an agent's `run_workflow` call and the engine: picks the
//! workflow, decides between a fresh run and a resume, and keeps the state
//! store in step with the outcome.
//!
//! - paused: the snapshot is written (versioned against what was read)
//! - completed: the snapshot for the key is deleted
//! - failed: the store is left exactly as it was
//!
//! Calls for the same state key are serialised with an async lock, so two
//! concurrent resumes of one paused run cannot both proceed.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::Instrument;
use workflow_engine::{
    ExecutionContext, ExecutionFailure, ExecutionSnapshot, Halt, PausePayload, StateStore,
    StoredSnapshot, Workflow, WorkflowError, WorkflowExecutor, WorkflowResult,
};

use crate::registry::WorkflowRegistry;
use crate::types::{CompletedResponse, FailedResponse, InvocationResponse, PausedResponse};

/// One `run_workflow` request
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    pub workflow: String,
    pub inputs: Value,
    /// Distinguishes concurrent runs of the same workflow
    pub session: Option<String>,
    /// Bound to the paused step's result variable on resume
    pub resume_value: Option<Value>,
}

impl Invocation {
    pub fn new(workflow: impl Into<String>, inputs: Value) -> Self {
        Self {
            workflow: workflow.into(),
            inputs,
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_resume_value(mut self, value: Value) -> Self {
        self.resume_value = Some(value);
        self
    }
}

/// State store key for a workflow run
pub fn state_key(workflow: &str, session: Option<&str>) -> String {
    match session {
        Some(session) if !session.is_empty() => format!("{}:{}", workflow, session),
        _ => workflow.to_string(),
    }
}

/// Async lock per state key
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Drop locks nobody is holding or waiting on
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_default().clone()
    }
}

pub struct WorkflowHost {
    registry: Arc<WorkflowRegistry>,
    executor: WorkflowExecutor,
    states: Arc<dyn StateStore>,
    locks: KeyedLocks,
}

impl WorkflowHost {
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        executor: WorkflowExecutor,
        states: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            registry,
            executor,
            states,
            locks: KeyedLocks::default(),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    /// Start or resume a run
    ///
    /// `Err` is reserved for problems outside the run itself (unknown
    /// workflow, rejected inputs, state store failures); a run that fails
    /// once steps have started is reported as [`InvocationResponse::Failed`].
    pub async fn invoke(&self, request: Invocation) -> WorkflowResult<InvocationResponse> {
        let workflow = self
            .registry
            .get(&request.workflow)
            .ok_or_else(|| WorkflowError::WorkflowNotFound(request.workflow.clone()))?;
        let key = state_key(&workflow.name, request.session.as_deref());

        let run_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("invocation", %run_id, workflow = %workflow.name, key = %key);

        self.run(&workflow, &key, request).instrument(span).await
    }

    async fn run(
        &self,
        workflow: &Workflow,
        key: &str,
        request: Invocation,
    ) -> WorkflowResult<InvocationResponse> {
        let lock = self.locks.lock_for(key);
        let _guard = lock.lock().await;

        let stored = self.states.get(key).await?;
        let expected_version = stored.as_ref().map(|s| s.version);

        let outcome = match stored {
            Some(StoredSnapshot { snapshot, version }) => {
                tracing::info!(version, step = snapshot.current_step, "Resuming paused workflow");
                self.executor
                    .resume(workflow, request.inputs, snapshot, request.resume_value)
                    .await
            }
            None => {
                tracing::info!("Starting workflow");
                self.executor.execute(workflow, request.inputs).await
            }
        };

        let mut ctx = match outcome {
            Ok(ctx) => ctx,
            Err(failure) if failure.error.is_validation() => return Err(failure.error),
            Err(failure) => return Ok(failed_response(failure)),
        };

        match ctx.halt.take() {
            Some(Halt::Paused { payload }) => {
                let snapshot = ExecutionSnapshot::capture(&ctx);
                let version = self.states.put(key, &snapshot, expected_version).await?;
                tracing::info!(version, "Saved paused workflow");
                Ok(paused_response(&ctx, payload, workflow.steps.len()))
            }
            halt => {
                // A resumed run is done only if nobody else finished or re-paused it
                if let Some(version) = expected_version {
                    self.states.delete(key, Some(version)).await?;
                }
                let result = match halt {
                    Some(Halt::Returned { value }) => Some(value),
                    _ => None,
                };
                Ok(completed_response(ctx, result))
            }
        }
    }

    /// Paused snapshot for a workflow run, if any
    pub async fn state(
        &self,
        workflow: &str,
        session: Option<&str>,
    ) -> WorkflowResult<Option<StoredSnapshot>> {
        self.states.get(&state_key(workflow, session)).await
    }

    /// Drop a paused run; returns whether one existed
    pub async fn discard(&self, workflow: &str, session: Option<&str>) -> WorkflowResult<bool> {
        let key = state_key(workflow, session);
        let lock = self.locks.lock_for(&key);
        let _guard = lock.lock().await;

        let discarded = self.states.delete(&key, None).await?;
        if discarded {
            tracing::info!(key = %key, "Discarded paused workflow");
        }
        Ok(discarded)
    }
}

fn paused_response(
    ctx: &ExecutionContext,
    payload: PausePayload,
    total_steps: usize,
) -> InvocationResponse {
    let next_action = format!(
        "Create the {} object with the values above, then call run_workflow again with the \
         same workflow and inputs, passing the created object as resume_value.",
        payload.template_name
    );

    InvocationResponse::Paused(PausedResponse {
        step: ctx.current_step + 1,
        total_steps,
        payload,
        next_action,
    })
}

fn completed_response(ctx: ExecutionContext, result: Option<Value>) -> InvocationResponse {
    InvocationResponse::Completed(CompletedResponse {
        steps_executed: ctx.step_results.len(),
        step_results: ctx.step_results,
        logs: ctx.logs,
        variables: ctx.variables,
        result,
    })
}

fn failed_response(failure: ExecutionFailure) -> InvocationResponse {
    let failed_step = failure.failed_step().map(str::to_string);
    let context = *failure.context;
    InvocationResponse::Failed(FailedResponse {
        error: failure.error.to_string(),
        failed_step,
        step_results: context.step_results,
        logs: context.logs,
    })
}
