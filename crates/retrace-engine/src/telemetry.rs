//! Run-scoped log and progress recording.
//!
//! `RunRecorder` owns the in-flight `ExecutionResult`. Every log entry is appended to
//! the result and mirrored to `tracing`; coarse transitions become progress events.
//! Readers outside the run only ever see the copy published by `publish_snapshot`.

use crate::progress::ProgressPublisher;
use chrono::Utc;
use parking_lot::Mutex;
use retrace_common::execution::{
    ExecutionLog, ExecutionProgress, ExecutionResult, ExecutionStatus, LogLevel,
};
use serde_json::{Map, Value};
use std::sync::Arc;

pub type SharedSnapshot = Arc<Mutex<Option<ExecutionResult>>>;

pub struct RunRecorder {
    result: ExecutionResult,
    publisher: ProgressPublisher,
    snapshot: SharedSnapshot,
}

impl RunRecorder {
    pub fn new(
        result: ExecutionResult,
        publisher: ProgressPublisher,
        snapshot: SharedSnapshot,
    ) -> Self {
        let recorder = Self {
            result,
            publisher,
            snapshot,
        };
        recorder.publish_snapshot();
        recorder
    }

    pub fn execution_id(&self) -> &str {
        &self.result.execution_id
    }

    pub fn result(&self) -> &ExecutionResult {
        &self.result
    }

    pub fn result_mut(&mut self) -> &mut ExecutionResult {
        &mut self.result
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log_with(level, message, None, None);
    }

    pub fn step_log(&mut self, level: LogLevel, step_id: &str, message: impl Into<String>) {
        self.log_with(level, message, Some(step_id), None);
    }

    pub fn log_with(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        step_id: Option<&str>,
        metadata: Option<Map<String, Value>>,
    ) {
        let message = message.into();
        let execution_id = self.result.execution_id.as_str();
        match level {
            LogLevel::Debug => tracing::debug!(execution_id, step_id, "{}", message),
            LogLevel::Info => tracing::info!(execution_id, step_id, "{}", message),
            LogLevel::Warn => tracing::warn!(execution_id, step_id, "{}", message),
            LogLevel::Error => tracing::error!(execution_id, step_id, "{}", message),
        }
        self.result.logs.push(ExecutionLog {
            timestamp: Utc::now(),
            level,
            message,
            step_id: step_id.map(String::from),
            metadata,
        });
    }

    /// Emit a progress event. `current_step` is 1-based; 0 means "before the first step".
    pub fn progress(
        &self,
        status: ExecutionStatus,
        current_step: usize,
        description: Option<String>,
    ) {
        let total = self.result.total_steps;
        let done = if status == ExecutionStatus::Completed {
            total
        } else {
            self.result.steps_executed
        };
        self.publisher.publish(ExecutionProgress {
            execution_id: self.result.execution_id.clone(),
            workflow_id: self.result.workflow_id.clone(),
            status,
            current_step,
            total_steps: total,
            progress: ExecutionProgress::percent(done, total),
            current_step_description: description,
            estimated_time_remaining: (!status.is_terminal())
                .then(|| self.estimate_remaining_ms())
                .flatten(),
        });
    }

    /// Mean duration of finished steps times the number of steps left.
    pub fn estimate_remaining_ms(&self) -> Option<u64> {
        let finished = &self.result.step_results;
        if finished.is_empty() {
            return None;
        }
        let mean = finished.iter().map(|r| r.duration).sum::<u64>() / finished.len() as u64;
        let remaining = self
            .result
            .total_steps
            .saturating_sub(self.result.steps_executed) as u64;
        Some(mean * remaining)
    }

    /// Make the current state visible to `get_current_execution` callers.
    pub fn publish_snapshot(&self) {
        *self.snapshot.lock() = Some(self.result.clone());
    }

    pub fn into_result(self) -> ExecutionResult {
        self.publish_snapshot();
        self.result
    }
}
