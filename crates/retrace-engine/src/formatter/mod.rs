use retrace_common::execution::{ExecutionProgress, ExecutionResult, ExecutionStatus};

/// Human-readable summary of a finished run.
pub fn format_result(result: &ExecutionResult) -> String {
    let verdict = if result.success {
        "succeeded"
    } else if result.stopped {
        "stopped"
    } else {
        "failed"
    };
    let mut output = format!(
        "Workflow {} {} ({}/{} steps executed",
        result.workflow_id, verdict, result.steps_executed, result.total_steps
    );
    if let Some(ms) = result.duration {
        output.push_str(&format!(", {}", format_millis(ms)));
    }
    output.push(')');
    output.push_str(&format!("\nExecution: {}", result.execution_id));

    for step in &result.step_results {
        let mark = if step.success { "ok" } else { "FAILED" };
        output.push_str(&format!(
            "\n  [{}] {} {} {}",
            step.step_index + 1,
            step.action,
            step.step_id,
            mark
        ));
        if step.retry_count > 0 {
            output.push_str(&format!(" (retries: {})", step.retry_count));
        }
        if let Some(error) = &step.error {
            output.push_str(&format!("\n      {}", error));
        }
    }

    if let Some(error) = &result.error {
        output.push_str(&format!("\nError: {}", error));
    }
    if !result.screenshots.is_empty() {
        output.push_str(&format!("\nScreenshots: {}", result.screenshots.len()));
    }
    output
}

/// One-line rendering of a progress event.
pub fn format_progress(progress: &ExecutionProgress) -> String {
    let status = match progress.status {
        ExecutionStatus::Starting => "starting",
        ExecutionStatus::Running => "running",
        ExecutionStatus::Completed => "completed",
        ExecutionStatus::Failed => "failed",
        ExecutionStatus::Paused => "paused",
    };
    let mut line = format!(
        "[{:>3}%] {} {}/{}",
        progress.progress, status, progress.current_step, progress.total_steps
    );
    if let Some(description) = &progress.current_step_description {
        line.push_str(&format!(" - {}", description));
    }
    if let Some(eta) = progress.estimated_time_remaining {
        line.push_str(&format!(" (~{} left)", format_millis(eta)));
    }
    line
}

fn format_millis(ms: u64) -> String {
    if ms < 1000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_common::execution::StepExecutionResult;
    use retrace_common::trace::StepAction;
    use serde_json::Map;

    #[test]
    fn test_format_result_lists_failures() {
        let mut result = ExecutionResult::new("wf-1", "exec-1", 2);
        result.steps_executed = 1;
        result.duration = Some(2500);
        result.error = Some("Critical step s1 failed: boom".into());
        result.step_results.push(StepExecutionResult {
            step_id: "s1".into(),
            step_index: 0,
            action: StepAction::Click,
            success: false,
            duration: 2400,
            error: Some("boom".into()),
            screenshot: None,
            retry_count: 3,
            metadata: Map::new(),
        });

        let text = format_result(&result);
        assert!(text.starts_with("Workflow wf-1 failed (1/2 steps executed, 2.5s)"));
        assert!(text.contains("[1] click s1 FAILED (retries: 3)"));
        assert!(text.contains("Error: Critical step s1 failed: boom"));
    }

    #[test]
    fn test_format_progress_line() {
        let line = format_progress(&ExecutionProgress {
            execution_id: "e".into(),
            workflow_id: "w".into(),
            status: ExecutionStatus::Running,
            current_step: 2,
            total_steps: 4,
            progress: 25,
            current_step_description: Some("Click login".into()),
            estimated_time_remaining: Some(900),
        });
        assert_eq!(line, "[ 25%] running 2/4 - Click login (~900ms left)");
    }
}
