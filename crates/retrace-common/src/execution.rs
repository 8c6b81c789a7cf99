//! Execution results, log entries and progress events produced while replaying a workflow.

use crate::trace::StepAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLog {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionResult {
    pub step_id: String,
    pub step_index: usize,
    pub action: StepAction,
    pub success: bool,
    /// Wall-clock time spent on the step including retries, in milliseconds.
    pub duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub retry_count: u32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Accumulated outcome of one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub workflow_id: String,
    pub execution_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Total run time in milliseconds, set when the run ends.
    #[serde(default)]
    pub duration: Option<u64>,
    pub steps_executed: usize,
    pub total_steps: usize,
    pub step_results: Vec<StepExecutionResult>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the run ended because of an explicit stop request.
    #[serde(default)]
    pub stopped: bool,
    pub screenshots: Vec<String>,
    pub logs: Vec<ExecutionLog>,
}

impl ExecutionResult {
    pub fn new(
        workflow_id: impl Into<String>,
        execution_id: impl Into<String>,
        total_steps: usize,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            execution_id: execution_id.into(),
            start_time: Utc::now(),
            end_time: None,
            duration: None,
            steps_executed: 0,
            total_steps,
            step_results: Vec::new(),
            success: false,
            error: None,
            stopped: false,
            screenshots: Vec::new(),
            logs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Starting,
    Running,
    Completed,
    Failed,
    Paused,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// Coarse-grained progress notification; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionProgress {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub current_step: usize,
    pub total_steps: usize,
    /// 0-100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step_description: Option<String>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_time_remaining: Option<u64>,
}

impl ExecutionProgress {
    /// Integer percentage of `current` out of `total`, clamped to 0-100.
    pub fn percent(current: usize, total: usize) -> u8 {
        if total == 0 {
            return 100;
        }
        let pct = (current.min(total) * 100) / total;
        pct as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(ExecutionProgress::percent(0, 4), 0);
        assert_eq!(ExecutionProgress::percent(1, 3), 33);
        assert_eq!(ExecutionProgress::percent(5, 4), 100);
        assert_eq!(ExecutionProgress::percent(0, 0), 100);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = ExecutionResult::new("wf", "exec", 2);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["workflowId"], "wf");
        assert_eq!(value["totalSteps"], 2);
        assert_eq!(value["stepsExecuted"], 0);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_progress_status_wire_format() {
        let status = serde_json::to_value(ExecutionStatus::Completed).unwrap();
        assert_eq!(status, "completed");
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }
}
