//! Step action executors.
//!
//! `execute_action` dispatches on the step's action kind. Each executor makes one
//! attempt; retries live in the orchestrator.

pub mod click;
pub mod input;
pub mod navigate;
pub mod scroll;
pub mod wait;

use crate::backend::{Backend, BackendError};
use crate::config::ExecutionConfig;
use crate::heuristics::InputHeuristic;
use crate::resolution::ResolvedLocators;
use crate::telemetry::RunRecorder;
use retrace_common::execution::LogLevel;
use retrace_common::trace::{StepAction, TraceStep};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Pause after an action so triggered navigation or rendering can begin.
pub const SETTLE_DELAY: Duration = Duration::from_millis(1000);

/// Shorter settle for actions that rarely trigger navigation.
pub const SHORT_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum StepError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Step is missing required field: {0}")]
    MissingField(&'static str),

    #[error("Element not found: {locator} (tried {attempted} strategies)")]
    ElementNotFound { locator: String, attempted: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StepError {
    /// Errors that another attempt cannot fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            StepError::UnknownAction(_) | StepError::MissingField(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            StepError::UnknownAction(_) => "UNKNOWN_ACTION",
            StepError::MissingField(_) => "MISSING_FIELD",
            StepError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            StepError::Backend(e) => e.code(),
        }
    }
}

/// Metadata an executor reports about how it succeeded.
pub type ActionOutcome = Map<String, Value>;

/// Everything an executor may touch during one attempt.
pub struct ActionContext<'a> {
    pub backend: &'a mut dyn Backend,
    pub recorder: &'a mut RunRecorder,
    pub config: &'a ExecutionConfig,
    pub heuristics: &'a [Arc<dyn InputHeuristic>],
    pub step: &'a TraceStep,
    pub step_index: usize,
}

impl ActionContext<'_> {
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.recorder.step_log(level, &self.step.id, message);
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }
}

/// Run one attempt of `ctx.step` against the live page.
pub async fn execute_action(
    ctx: &mut ActionContext<'_>,
    locators: &ResolvedLocators,
) -> Result<ActionOutcome, StepError> {
    let action = ctx.step.action.clone();
    if let StepAction::Unknown(name) = &action {
        return Err(StepError::UnknownAction(name.clone()));
    }
    if action != StepAction::Navigate {
        navigate::ensure_on_step_page(ctx).await?;
    }

    match action {
        StepAction::Click => click::execute(ctx, locators).await,
        StepAction::Input => input::execute(ctx, locators).await,
        StepAction::Scroll => scroll::execute(ctx).await,
        StepAction::Navigate => navigate::execute(ctx).await,
        StepAction::Wait => wait::execute(ctx).await,
        StepAction::Unknown(name) => Err(StepError::UnknownAction(name)),
    }
}
