//! Workflow orchestration.
//!
//! `WorkflowEngine` owns one browser backend and replays one workflow at a time:
//! launch, steps in recorded order inside the retry envelope, teardown, verdict.
//! Phases move `Idle -> Starting -> Running -> Finishing -> Idle`.

use crate::actions::{ActionContext, ActionOutcome, StepError, execute_action};
use crate::backend::Backend;
use crate::config::ExecutionConfig;
use crate::heuristics::{InputHeuristic, ProgressiveSubmit};
use crate::progress::{ProgressPublisher, ProgressSink};
use crate::resolution::{ResolvedLocators, resolve_locators};
use crate::retry::RetryPolicy;
use crate::telemetry::{RunRecorder, SharedSnapshot};
use chrono::Utc;
use parking_lot::Mutex;
use retrace_common::execution::{
    ExecutionProgress, ExecutionResult, ExecutionStatus, LogLevel, StepExecutionResult,
};
use retrace_common::trace::{StepAction, TraceStep, Workflow};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("A workflow is already executing on this engine")]
    AlreadyRunning,

    #[error("No workflow is currently executing")]
    NotRunning,

    #[error("Browser session not initialized")]
    SessionNotInitialized,

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Workflow run aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnginePhase {
    Idle,
    Starting,
    Running,
    Finishing,
}

struct EngineState {
    phase: EnginePhase,
    cancel: Option<watch::Sender<bool>>,
    done: Option<watch::Receiver<bool>>,
}

/// Marks the engine busy for the lifetime of one run. Dropping it returns the
/// engine to `Idle` and releases anyone waiting in `stop_execution`.
struct RunSlot {
    state: Arc<Mutex<EngineState>>,
    done: watch::Sender<bool>,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        {
            let mut state = self.state.lock();
            state.phase = EnginePhase::Idle;
            state.cancel = None;
            state.done = None;
        }
        self.done.send_replace(true);
    }
}

/// How a step ended inside the retry envelope.
enum StepOutcome {
    Finished(StepExecutionResult),
    Cancelled,
}

pub struct WorkflowEngine<B: Backend> {
    config: Arc<ExecutionConfig>,
    backend: Arc<tokio::sync::Mutex<B>>,
    state: Arc<Mutex<EngineState>>,
    publisher: ProgressPublisher,
    snapshot: SharedSnapshot,
    heuristics: Vec<Arc<dyn InputHeuristic>>,
}

/// One run, detached from the engine. It runs on its own task so that dropping
/// the caller's future never skips teardown.
struct Replay<B: Backend> {
    config: Arc<ExecutionConfig>,
    backend: Arc<tokio::sync::Mutex<B>>,
    state: Arc<Mutex<EngineState>>,
    heuristics: Vec<Arc<dyn InputHeuristic>>,
}

impl<B: Backend + 'static> WorkflowEngine<B> {
    pub fn new(config: ExecutionConfig, backend: B) -> Self {
        let progressive = ProgressiveSubmit::new(config.heuristics.progressive_submit.clone());
        Self {
            config: Arc::new(config),
            backend: Arc::new(tokio::sync::Mutex::new(backend)),
            state: Arc::new(Mutex::new(EngineState {
                phase: EnginePhase::Idle,
                cancel: None,
                done: None,
            })),
            publisher: ProgressPublisher::new(),
            snapshot: Arc::new(Mutex::new(None)),
            heuristics: vec![Arc::new(progressive)],
        }
    }

    /// Replace the post-input heuristics (an empty list disables them).
    pub fn with_heuristics(mut self, heuristics: Vec<Arc<dyn InputHeuristic>>) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn add_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.publisher.add_sink(sink);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionProgress> {
        self.publisher.subscribe()
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn phase(&self) -> EnginePhase {
        self.state.lock().phase
    }

    pub fn is_currently_executing(&self) -> bool {
        self.phase() != EnginePhase::Idle
    }

    /// Copy of the in-flight result, or of the last finished one.
    pub fn get_current_execution(&self) -> Option<ExecutionResult> {
        self.snapshot.lock().clone()
    }

    /// Request a cooperative stop and wait until the run has torn down.
    pub async fn stop_execution(&self) -> Result<(), EngineError> {
        let done = {
            let state = self.state.lock();
            if state.phase == EnginePhase::Idle {
                return Err(EngineError::NotRunning);
            }
            if let Some(cancel) = &state.cancel {
                cancel.send_replace(true);
            }
            state.done.clone()
        };
        if let Some(mut done) = done {
            // An error means the run already released its slot.
            let _ = done.wait_for(|finished| *finished).await;
        }
        Ok(())
    }

    /// Replay `workflow` and return its result.
    ///
    /// Only the precondition check rejects; every failure after that is reported
    /// on the returned `ExecutionResult`. The run continues to teardown even if
    /// this future is dropped.
    pub async fn execute_workflow(
        &self,
        workflow: &Workflow,
    ) -> Result<ExecutionResult, EngineError> {
        let (cancel_tx, cancel) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        {
            let mut state = self.state.lock();
            if state.phase != EnginePhase::Idle {
                return Err(EngineError::AlreadyRunning);
            }
            state.phase = EnginePhase::Starting;
            state.cancel = Some(cancel_tx);
            state.done = Some(done_rx);
        }
        let slot = RunSlot {
            state: self.state.clone(),
            done: done_tx,
        };

        let execution_id = Uuid::new_v4().to_string();
        let recorder = RunRecorder::new(
            ExecutionResult::new(&workflow.id, &execution_id, workflow.steps.len()),
            self.publisher.clone(),
            self.snapshot.clone(),
        );
        let replay = Replay {
            config: self.config.clone(),
            backend: self.backend.clone(),
            state: self.state.clone(),
            heuristics: self.heuristics.clone(),
        };
        let workflow = workflow.clone();

        let run = tokio::spawn(async move {
            let _slot = slot;
            replay.run(&workflow, recorder, cancel).await
        });
        run.await.map_err(|e| EngineError::Aborted(e.to_string()))
    }
}

impl<B: Backend + 'static> Replay<B> {
    async fn run(
        &self,
        workflow: &Workflow,
        mut recorder: RunRecorder,
        mut cancel: watch::Receiver<bool>,
    ) -> ExecutionResult {
        let started = Instant::now();
        recorder.log(
            LogLevel::Info,
            format!(
                "Starting workflow {} ({} steps)",
                workflow.name.as_deref().unwrap_or(&workflow.id),
                workflow.steps.len()
            ),
        );
        for warning in workflow.validate() {
            recorder.log(LogLevel::Warn, warning);
        }
        recorder.progress(ExecutionStatus::Starting, 0, None);

        let mut backend = self.backend.lock().await;
        let mut stopped = false;

        let launched = tokio::select! {
            biased;
            _ = cancelled(&mut cancel) => None,
            launch = self.launch(&mut *backend) => Some(launch),
        };
        match launched {
            None => stopped = true,
            Some(Err(e)) => {
                recorder.log(LogLevel::Error, e.to_string());
                recorder.result_mut().error = Some(e.to_string());
            }
            Some(Ok(())) => {
                self.state.lock().phase = EnginePhase::Running;
                recorder.log(LogLevel::Info, "Browser session ready");
                recorder.progress(ExecutionStatus::Running, 0, None);
                recorder.publish_snapshot();
                stopped = self
                    .run_steps(&mut *backend, &mut recorder, workflow, &mut cancel)
                    .await;
            }
        }

        self.state.lock().phase = EnginePhase::Finishing;
        self.teardown(&mut *backend, &mut recorder).await;
        drop(backend);

        self.finalize(&mut recorder, workflow, stopped, started);
        recorder.into_result()
    }

    async fn launch(&self, backend: &mut B) -> Result<(), EngineError> {
        backend
            .launch(&self.config)
            .await
            .map_err(|e| EngineError::Launch(e.to_string()))?;
        if !backend.is_ready().await {
            return Err(EngineError::SessionNotInitialized);
        }
        Ok(())
    }

    /// Runs the step loop. Returns true if the run was stopped.
    async fn run_steps(
        &self,
        backend: &mut B,
        recorder: &mut RunRecorder,
        workflow: &Workflow,
        cancel: &mut watch::Receiver<bool>,
    ) -> bool {
        let total = workflow.steps.len();
        for (index, step) in workflow.steps.iter().enumerate() {
            if *cancel.borrow() {
                return true;
            }
            recorder.progress(
                ExecutionStatus::Running,
                index + 1,
                Some(step.description()),
            );
            recorder.step_log(
                LogLevel::Info,
                &step.id,
                format!("Executing step {}/{}: {}", index + 1, total, step.description()),
            );

            let result = match self.run_step(backend, recorder, step, index, cancel).await {
                StepOutcome::Finished(result) => result,
                StepOutcome::Cancelled => return true,
            };
            let critical_failure = !result.success && step.is_critical();
            let error = result.error.clone();
            {
                let run = recorder.result_mut();
                run.step_results.push(result);
                run.steps_executed += 1;
            }
            recorder.publish_snapshot();

            if critical_failure {
                let message = format!(
                    "Critical step {} failed: {}",
                    step.id,
                    error.as_deref().unwrap_or("unknown error")
                );
                recorder.step_log(LogLevel::Error, &step.id, message.clone());
                recorder.result_mut().error = Some(message);
                break;
            }
            if let Some(error) = error {
                recorder.step_log(
                    LogLevel::Warn,
                    &step.id,
                    format!("Non-critical step failed, continuing: {}", error),
                );
            }
        }
        false
    }

    /// One step inside the retry envelope.
    async fn run_step(
        &self,
        backend: &mut B,
        recorder: &mut RunRecorder,
        step: &TraceStep,
        index: usize,
        cancel: &mut watch::Receiver<bool>,
    ) -> StepOutcome {
        let policy = RetryPolicy::for_step(step, &self.config.retry);
        let locators = resolve_locators(&step.id, step.selectors.as_deref());
        log_resolution(recorder, step, &locators);

        let started = Instant::now();
        let mut retry_count: u32 = 0;
        let mut screenshot = None;

        loop {
            if retry_count > 0 {
                recorder.step_log(
                    LogLevel::Info,
                    &step.id,
                    format!(
                        "Retrying step (attempt {}/{})",
                        retry_count.saturating_add(1),
                        policy.total_attempts()
                    ),
                );
            }
            if let Some(path) = self.capture(backend, recorder, index, "before").await {
                screenshot = Some(path);
            }

            let attempt = {
                let mut ctx = ActionContext {
                    backend: &mut *backend,
                    recorder: &mut *recorder,
                    config: &*self.config,
                    heuristics: &self.heuristics,
                    step,
                    step_index: index,
                };
                tokio::select! {
                    biased;
                    _ = cancelled(cancel) => None,
                    result = execute_action(&mut ctx, &locators) => Some(result),
                }
            };
            let Some(attempt) = attempt else {
                recorder.step_log(LogLevel::Warn, &step.id, "Step interrupted by stop request");
                return StepOutcome::Cancelled;
            };

            if let Some(path) = self.capture(backend, recorder, index, "after").await {
                screenshot = Some(path);
            }

            match attempt {
                Ok(outcome) => {
                    if let Some(pause) = self.config.slow_mo() {
                        tokio::time::sleep(pause).await;
                    }
                    recorder.step_log(LogLevel::Info, &step.id, "Step completed");
                    return StepOutcome::Finished(step_result(
                        step,
                        index,
                        started,
                        retry_count,
                        screenshot,
                        Ok(outcome),
                    ));
                }
                Err(e) => {
                    recorder.step_log(
                        LogLevel::Warn,
                        &step.id,
                        format!("Attempt {} failed: {}", retry_count.saturating_add(1), e),
                    );
                    if !e.is_retryable() || !policy.should_retry(retry_count) {
                        recorder.step_log(
                            LogLevel::Error,
                            &step.id,
                            format!(
                                "Step failed after {} attempt(s): {}",
                                retry_count.saturating_add(1),
                                e
                            ),
                        );
                        return StepOutcome::Finished(step_result(
                            step,
                            index,
                            started,
                            retry_count,
                            screenshot,
                            Err(e),
                        ));
                    }
                    retry_count += 1;
                    tokio::select! {
                        biased;
                        _ = cancelled(cancel) => return StepOutcome::Cancelled,
                        _ = tokio::time::sleep(policy.delay) => {}
                    }
                }
            }
        }
    }

    /// Best-effort screenshot. Failures are logged and never fail the step.
    async fn capture(
        &self,
        backend: &mut B,
        recorder: &mut RunRecorder,
        index: usize,
        phase: &str,
    ) -> Option<String> {
        let settings = &self.config.screenshots;
        if !settings.enabled {
            return None;
        }
        let path = settings.dir.join(format!(
            "{}-step{}-{}.png",
            recorder.execution_id(),
            index,
            phase
        ));

        let written = async {
            let bytes = backend.screenshot().await.map_err(|e| e.to_string())?;
            tokio::fs::create_dir_all(&settings.dir)
                .await
                .map_err(|e| e.to_string())?;
            tokio::fs::write(&path, bytes)
                .await
                .map_err(|e| e.to_string())
        }
        .await;

        match written {
            Ok(()) => {
                let reference = path.display().to_string();
                recorder.result_mut().screenshots.push(reference.clone());
                Some(reference)
            }
            Err(e) => {
                recorder.log(
                    LogLevel::Warn,
                    format!("Screenshot ({} step {}) failed: {}", phase, index, e),
                );
                None
            }
        }
    }

    /// Close page, context and browser. Errors are logged, never propagated.
    async fn teardown(&self, backend: &mut B, recorder: &mut RunRecorder) {
        if let Err(e) = backend.close_page().await {
            recorder.log(LogLevel::Warn, format!("Failed to close page: {}", e));
        }
        if let Err(e) = backend.close_context().await {
            recorder.log(LogLevel::Warn, format!("Failed to close browser context: {}", e));
        }
        if let Err(e) = backend.close_browser().await {
            recorder.log(LogLevel::Warn, format!("Failed to close browser: {}", e));
        }
        recorder.log(LogLevel::Debug, "Browser session closed");
    }

    fn finalize(
        &self,
        recorder: &mut RunRecorder,
        workflow: &Workflow,
        stopped: bool,
        started: Instant,
    ) {
        let result = recorder.result_mut();
        let critical_failure = result.step_results.iter().any(|r| {
            !r.success
                && workflow
                    .steps
                    .get(r.step_index)
                    .is_none_or(TraceStep::is_critical)
        });

        if stopped {
            result.stopped = true;
            result.error = Some("Execution stopped by user".into());
        }
        result.success = !stopped && result.error.is_none() && !critical_failure;
        result.end_time = Some(Utc::now());
        result.duration = Some(started.elapsed().as_millis() as u64);

        let (success, executed) = (result.success, result.steps_executed);
        if success {
            recorder.log(LogLevel::Info, "Workflow completed successfully");
            recorder.progress(ExecutionStatus::Completed, executed, None);
        } else {
            let reason = recorder
                .result()
                .error
                .clone()
                .unwrap_or_else(|| "Workflow failed".into());
            recorder.log(LogLevel::Error, format!("Workflow failed: {}", reason));
            recorder.progress(ExecutionStatus::Failed, executed, Some(reason));
        }
    }
}

fn log_resolution(recorder: &mut RunRecorder, step: &TraceStep, locators: &ResolvedLocators) {
    if !matches!(step.action, StepAction::Click | StepAction::Input) {
        return;
    }
    if locators.synthetic {
        recorder.step_log(
            LogLevel::Warn,
            &step.id,
            format!(
                "No usable selectors recorded, using step marker {}",
                locators.primary
            ),
        );
    } else {
        recorder.step_log(
            LogLevel::Debug,
            &step.id,
            format!(
                "Resolved {} ({} fallbacks)",
                locators.primary,
                locators.fallbacks.len()
            ),
        );
    }
}

fn step_result(
    step: &TraceStep,
    index: usize,
    started: Instant,
    retry_count: u32,
    screenshot: Option<String>,
    outcome: Result<ActionOutcome, StepError>,
) -> StepExecutionResult {
    let (success, error, mut metadata) = match outcome {
        Ok(metadata) => (true, None, metadata),
        Err(e) => {
            let mut metadata = ActionOutcome::new();
            metadata.insert("errorCode".into(), json!(e.code()));
            (false, Some(e.to_string()), metadata)
        }
    };
    metadata.insert("critical".into(), json!(step.is_critical()));

    StepExecutionResult {
        step_id: step.id.clone(),
        step_index: index,
        action: step.action.clone(),
        success,
        duration: started.elapsed().as_millis() as u64,
        error,
        screenshot,
        retry_count,
        metadata,
    }
}

/// Resolves once a stop has been requested. Pends forever if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
