mod common;

use common::{MockBackend, workflow};
use retrace_engine::backend::FieldInfo;
use retrace_engine::config::ExecutionConfig;
use retrace_engine::execution::{ExecutionStatus, LogLevel};
use retrace_engine::{EngineError, EnginePhase, WorkflowEngine};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn engine(mock: &MockBackend) -> WorkflowEngine<MockBackend> {
    WorkflowEngine::new(ExecutionConfig::default(), mock.clone())
}

fn long_wait_workflow() -> retrace_engine::trace::Workflow {
    workflow(json!({
        "id": "wf-long",
        "steps": [{"id": "w1", "action": "wait", "waitTime": 30000}]
    }))
}

async fn wait_until_running(engine: &WorkflowEngine<MockBackend>) {
    for _ in 0..200 {
        if engine.phase() == EnginePhase::Running {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("engine never reached Running");
}

#[tokio::test(start_paused = true)]
async fn test_navigate_click_wait_scenario() {
    let mock = MockBackend::new();
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-1",
        "name": "login",
        "steps": [
            {"id": "s1", "action": "navigate", "url": "https://a.test/login"},
            {"id": "s2", "action": "click", "url": "https://a.test/login",
             "selectors": [{"css": "#submit"}]},
            {"id": "s3", "action": "wait", "waitTime": 1000}
        ]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(result.success);
    assert_eq!(result.steps_executed, 3);
    assert_eq!(result.step_results.len(), 3);
    assert!(result.step_results.iter().all(|r| r.retry_count == 0));
    assert!(result.error.is_none());
    assert!(result.end_time.is_some());
    assert_eq!(mock.count("navigate:https://a.test/login"), 1);
    assert_eq!(mock.count("click:#submit"), 1);
    assert_eq!(result.step_results[1].metadata["strategy"], "primary");
}

#[tokio::test(start_paused = true)]
async fn test_failing_step_is_attempted_four_times() {
    let mock = MockBackend::with(|s| s.hide_everything = true);
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-retry",
        "steps": [{"id": "c1", "action": "click", "selectors": [{"css": "#missing"}]}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    let step = &result.step_results[0];
    assert!(!step.success);
    assert_eq!(step.retry_count, 3);
    assert_eq!(mock.count("wait_visible:#missing"), 4);
    assert!(step.error.as_deref().unwrap().contains("#missing"));

    // Three 2s delays between attempts, none after the last one.
    let duration = result.duration.unwrap();
    assert!(duration >= 6000, "duration was {}", duration);
    assert!(duration < 8000, "duration was {}", duration);
}

#[tokio::test(start_paused = true)]
async fn test_step_retry_config_overrides_defaults() {
    let mock = MockBackend::with(|s| s.hide_everything = true);
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-retry",
        "steps": [{"id": "c1", "action": "click", "selectors": ["#missing"],
                   "metadata": {"retryConfig": {"maxAttempts": 1, "delay": 100}}}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert_eq!(result.step_results[0].retry_count, 1);
    assert_eq!(mock.count("wait_visible:#missing"), 2);
    assert!(result.duration.unwrap() < 1000);
}

#[tokio::test(start_paused = true)]
async fn test_critical_failure_stops_the_loop() {
    // Heuristic submit shapes would otherwise find something to click.
    let mock = MockBackend::with(|s| s.hide_everything = true);
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-critical",
        "steps": [
            {"id": "s1", "action": "wait", "waitTime": 10},
            {"id": "s2", "action": "wait", "waitTime": 10},
            {"id": "s3", "action": "click", "selectors": ["#broken"],
             "metadata": {"retryConfig": {"maxAttempts": 0}}},
            {"id": "s4", "action": "wait", "waitTime": 10},
            {"id": "s5", "action": "wait", "waitTime": 10}
        ]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps_executed, 3);
    assert_eq!(result.step_results.len(), 3);
    assert!(result.error.as_deref().unwrap().contains("s3"));
}

#[tokio::test(start_paused = true)]
async fn test_non_critical_failure_continues() {
    let mock = MockBackend::with(|s| s.hide_everything = true);
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-optional",
        "steps": [
            {"id": "s1", "action": "wait", "waitTime": 10},
            {"id": "s2", "action": "wait", "waitTime": 10},
            {"id": "s3", "action": "click", "selectors": ["#cookie-banner"],
             "metadata": {"critical": false, "retryConfig": {"maxAttempts": 0}}},
            {"id": "s4", "action": "wait", "waitTime": 10},
            {"id": "s5", "action": "wait", "waitTime": 10}
        ]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(result.success);
    assert_eq!(result.steps_executed, 5);
    assert!(!result.step_results[2].success);
    assert_eq!(result.step_results[2].metadata["critical"], false);
    assert!(result.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_teardown_runs_once_in_order() {
    let mock = MockBackend::with(|s| {
        s.hide_everything = true;
        s.close_page_error = true;
    });
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-teardown",
        "steps": [{"id": "c1", "action": "click", "selectors": ["#gone"],
                   "metadata": {"retryConfig": {"maxAttempts": 0}}}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert_eq!(
        mock.teardown_calls(),
        vec!["close_page", "close_context", "close_browser"]
    );
    // A teardown failure is logged without replacing the step error.
    assert!(result.error.as_deref().unwrap().contains("c1"));
    assert!(
        result
            .logs
            .iter()
            .any(|l| l.level == LogLevel::Warn && l.message.contains("close page"))
    );
}

#[tokio::test(start_paused = true)]
async fn test_launch_failure_is_reported_on_result() {
    let mock = MockBackend::with(|s| s.launch_error = Some("no chrome binary".into()));
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-launch",
        "steps": [{"id": "w1", "action": "wait", "waitTime": 10}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.steps_executed, 0);
    assert!(result.error.as_deref().unwrap().contains("no chrome binary"));
    assert_eq!(mock.teardown_calls().len(), 3);
    assert!(!engine.is_currently_executing());
}

#[tokio::test]
async fn test_stop_while_idle_is_an_error() {
    let engine = engine(&MockBackend::new());
    assert!(matches!(
        engine.stop_execution().await,
        Err(EngineError::NotRunning)
    ));
}

#[tokio::test]
async fn test_stop_while_running_marks_result_stopped() {
    let mock = MockBackend::new();
    let engine = Arc::new(engine(&mock));
    let mut events = engine.subscribe();

    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.execute_workflow(&long_wait_workflow()).await });

    wait_until_running(&engine).await;
    assert!(engine.is_currently_executing());
    engine.stop_execution().await.unwrap();

    let result = handle.await.unwrap().unwrap();
    assert!(result.stopped);
    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Execution stopped by user"));
    assert_eq!(mock.teardown_calls().len(), 3);
    assert!(!engine.is_currently_executing());
    assert!(engine.get_current_execution().unwrap().stopped);

    let mut last = None;
    while let Ok(event) = events.try_recv() {
        last = Some(event);
    }
    assert_eq!(last.unwrap().status, ExecutionStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_caller_does_not_skip_teardown() {
    let mock = MockBackend::new();
    let engine = engine(&mock);

    let timed_out = tokio::time::timeout(
        Duration::from_millis(300),
        engine.execute_workflow(&long_wait_workflow()),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(engine.is_currently_executing());

    // The detached run finishes its 30s wait and tears down on its own.
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(engine.phase(), EnginePhase::Idle);
    assert_eq!(mock.count("launch"), 1);
    assert_eq!(
        mock.teardown_calls(),
        vec!["close_page", "close_context", "close_browser"]
    );
    let snapshot = engine.get_current_execution().unwrap();
    assert!(snapshot.success);
    assert!(snapshot.end_time.is_some());
    assert_eq!(snapshot.steps_executed, 1);
}

#[tokio::test]
async fn test_second_run_is_rejected_while_active() {
    let mock = MockBackend::new();
    let engine = Arc::new(engine(&mock));
    let runner = engine.clone();
    let handle = tokio::spawn(async move { runner.execute_workflow(&long_wait_workflow()).await });

    wait_until_running(&engine).await;
    let second = engine.execute_workflow(&long_wait_workflow()).await;
    assert!(matches!(second, Err(EngineError::AlreadyRunning)));

    engine.stop_execution().await.unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(mock.count("launch"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sensitive_values_never_reach_logs() {
    let mock = MockBackend::with(|s| {
        s.field_infos.insert(
            "#pin".into(),
            FieldInfo {
                input_type: Some("password".into()),
                ..Default::default()
            },
        );
    });
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-secret",
        "steps": [
            {"id": "i1", "action": "input", "selectors": ["#token"],
             "inputData": {"value": "hunter2", "sensitive": true}},
            {"id": "i2", "action": "input", "selectors": ["#pin"], "inputValue": "s3cret-pin"}
        ]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(result.success);
    assert_eq!(mock.state.lock().values["#token"], "hunter2");
    assert_eq!(mock.state.lock().values["#pin"], "s3cret-pin");
    let serialized = serde_json::to_string(&result).unwrap();
    assert!(!serialized.contains("hunter2"));
    assert!(!serialized.contains("s3cret-pin"));
    assert!(result.logs.iter().any(|l| l.message.contains("********")));
    assert_eq!(result.step_results[0].metadata["masked"], true);
    assert_eq!(result.step_results[1].metadata["masked"], true);
}

#[tokio::test(start_paused = true)]
async fn test_input_skips_clear_when_value_matches() {
    let mock = MockBackend::with(|s| {
        s.values.insert("#city".into(), "Oslo".into());
        s.values.insert("#zip".into(), "0000".into());
    });
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-input",
        "steps": [
            {"id": "i1", "action": "input", "selectors": ["#city"], "inputValue": "Oslo"},
            {"id": "i2", "action": "input", "selectors": ["#zip"], "inputValue": "0150"}
        ]
    }));

    engine.execute_workflow(&wf).await.unwrap();

    assert_eq!(mock.count("clear:#city"), 0);
    assert_eq!(mock.count("fill:#city"), 0);
    assert_eq!(mock.count("clear:#zip"), 1);
    assert_eq!(mock.count("fill:#zip"), 1);
    assert_eq!(mock.count("dispatch:#zip:input,change,blur"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_action_fails_without_retry() {
    let mock = MockBackend::new();
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-unknown",
        "steps": [{"id": "h1", "action": "hover", "selectors": ["#menu"]}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(!result.success);
    let step = &result.step_results[0];
    assert_eq!(step.error.as_deref(), Some("Unknown action: hover"));
    assert_eq!(step.retry_count, 0);
    assert_eq!(step.metadata["errorCode"], "UNKNOWN_ACTION");
}

#[tokio::test(start_paused = true)]
async fn test_steps_are_moved_to_their_recorded_page() {
    let mock = MockBackend::new();
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-pages",
        "steps": [
            {"id": "c1", "action": "click", "url": "https://shop.test/cart",
             "selectors": ["#checkout"]},
            {"id": "c2", "action": "click", "url": "https://shop.test/checkout",
             "selectors": ["#pay"]},
            {"id": "c3", "action": "click", "url": "https://pay.test/",
             "selectors": ["#confirm"]}
        ]
    }));

    engine.execute_workflow(&wf).await.unwrap();

    let navigations: Vec<String> = mock
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("navigate:"))
        .collect();
    // Same-origin steps stay put; blank pages and origin changes navigate.
    assert_eq!(
        navigations,
        vec!["navigate:https://shop.test/cart", "navigate:https://pay.test/"]
    );
    let calls = mock.calls();
    let nav = calls.iter().position(|c| c == "navigate:https://shop.test/cart");
    let click = calls.iter().position(|c| c == "click:#checkout");
    assert!(nav < click);
}

#[tokio::test(start_paused = true)]
async fn test_progressive_submit_after_email_input() {
    let mock = MockBackend::with(|s| {
        s.field_infos.insert(
            "#email".into(),
            FieldInfo {
                input_type: Some("email".into()),
                ..Default::default()
            },
        );
        s.form_submit.insert("#email".into());
    });
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-email",
        "steps": [{"id": "i1", "action": "input", "selectors": ["#email"],
                   "inputValue": "a@b.test"}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert_eq!(mock.count("click_form_submit:#email"), 1);
    assert_eq!(
        result.step_results[0].metadata["autoSubmitted"],
        "progressive-submit"
    );
}

#[tokio::test(start_paused = true)]
async fn test_progressive_submit_can_be_disabled() {
    let mock = MockBackend::with(|s| {
        s.field_infos.insert(
            "#email".into(),
            FieldInfo {
                input_type: Some("email".into()),
                ..Default::default()
            },
        );
        s.form_submit.insert("#email".into());
    });
    let mut config = ExecutionConfig::default();
    config.heuristics.progressive_submit.enabled = false;
    let engine = WorkflowEngine::new(config, mock.clone());
    let wf = workflow(json!({
        "id": "wf-email",
        "steps": [{"id": "i1", "action": "input", "selectors": ["#email"],
                   "inputValue": "a@b.test"}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert_eq!(mock.count("click_form_submit:#email"), 0);
    assert!(result.step_results[0].metadata["autoSubmitted"].is_null());
}

#[tokio::test(start_paused = true)]
async fn test_empty_heuristic_list_disables_auto_submit() {
    let mock = MockBackend::with(|s| {
        s.field_infos.insert(
            "#email".into(),
            FieldInfo {
                input_type: Some("email".into()),
                ..Default::default()
            },
        );
        s.form_submit.insert("#email".into());
    });
    let engine = engine(&mock).with_heuristics(Vec::new());
    let wf = workflow(json!({
        "id": "wf-email",
        "steps": [{"id": "i1", "action": "input", "selectors": ["#email"],
                   "inputValue": "a@b.test"}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(result.success);
    assert_eq!(mock.count("click_form_submit:#email"), 0);
    assert!(result.step_results[0].metadata["autoSubmitted"].is_null());
}

#[tokio::test(start_paused = true)]
async fn test_progressive_submit_presses_enter_when_focus_fails() {
    let mock = MockBackend::with(|s| {
        s.field_infos.insert(
            "#email".into(),
            FieldInfo {
                input_type: Some("email".into()),
                ..Default::default()
            },
        );
        s.form_submit.insert("#email".into());
        s.form_submit_unclickable = true;
        s.focus_error = true;
        s.hidden.insert("role=button[name=\"Continue\"]".into());
        s.hidden.insert("role=button[name=\"Next\"]".into());
    });
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-email",
        "steps": [{"id": "i1", "action": "input", "selectors": ["#email"],
                   "inputValue": "a@b.test"}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(result.success);
    assert_eq!(mock.count("focus:#email"), 2);
    assert_eq!(mock.count("press_key:Enter"), 1);
    assert_eq!(
        result.step_results[0].metadata["autoSubmitted"],
        "progressive-submit"
    );
}

#[tokio::test(start_paused = true)]
async fn test_click_falls_back_to_frames_and_keyboard() {
    let mock = MockBackend::with(|s| {
        s.frames = 2;
        s.frame_only.insert("#framed".into());
        s.disabled.insert("#locked".into());
    });
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-frames",
        "steps": [
            {"id": "c1", "action": "click", "selectors": ["#framed"]},
            {"id": "c2", "action": "click", "selectors": ["#locked"]}
        ]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(result.success);
    assert_eq!(result.step_results[0].metadata["strategy"], "primary-frames");
    assert_eq!(result.step_results[0].metadata["frame"], 0);
    assert_eq!(result.step_results[1].metadata["keyboardSubmit"], true);
    assert_eq!(mock.count("press_key:Enter"), 1);
    assert_eq!(mock.count("click:#locked"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_progress_events_follow_the_run() {
    let mock = MockBackend::new();
    let engine = engine(&mock);
    let mut events = engine.subscribe();
    let wf = workflow(json!({
        "id": "wf-progress",
        "steps": [
            {"id": "w1", "action": "wait", "waitTime": 100},
            {"id": "w2", "action": "wait", "waitTime": 100}
        ]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.execution_id, result.execution_id);
        seen.push((event.status, event.current_step, event.progress));
    }
    assert_eq!(
        seen,
        vec![
            (ExecutionStatus::Starting, 0, 0),
            (ExecutionStatus::Running, 0, 0),
            (ExecutionStatus::Running, 1, 0),
            (ExecutionStatus::Running, 2, 50),
            (ExecutionStatus::Completed, 2, 100),
        ]
    );
    assert_eq!(engine.get_current_execution(), Some(result));
}

#[tokio::test(start_paused = true)]
async fn test_screenshots_are_written_per_attempt_phase() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockBackend::new();
    let mut config = ExecutionConfig::default();
    config.screenshots.enabled = true;
    config.screenshots.dir = dir.path().to_path_buf();
    let engine = WorkflowEngine::new(config, mock.clone());
    let wf = workflow(json!({
        "id": "wf-shots",
        "steps": [{"id": "w1", "action": "wait", "waitTime": 10}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert_eq!(result.screenshots.len(), 2);
    let before = dir
        .path()
        .join(format!("{}-step0-before.png", result.execution_id));
    let after = dir
        .path()
        .join(format!("{}-step0-after.png", result.execution_id));
    assert!(before.exists());
    assert!(after.exists());
    assert_eq!(
        result.step_results[0].screenshot.as_deref(),
        Some(after.display().to_string().as_str())
    );
}

#[tokio::test(start_paused = true)]
async fn test_screenshot_failure_does_not_fail_step() {
    let dir = tempfile::tempdir().unwrap();
    let mock = MockBackend::with(|s| s.screenshot_error = true);
    let mut config = ExecutionConfig::default();
    config.screenshots.enabled = true;
    config.screenshots.dir = dir.path().to_path_buf();
    let engine = WorkflowEngine::new(config, mock.clone());
    let wf = workflow(json!({
        "id": "wf-shots",
        "steps": [{"id": "w1", "action": "wait", "waitTime": 10}]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert!(result.success);
    assert!(result.screenshots.is_empty());
    assert_eq!(
        result
            .logs
            .iter()
            .filter(|l| l.level == LogLevel::Warn && l.message.contains("Screenshot"))
            .count(),
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_scroll_and_missing_url_navigation() {
    let mock = MockBackend::new();
    let engine = engine(&mock);
    let wf = workflow(json!({
        "id": "wf-misc",
        "steps": [
            {"id": "s1", "action": "scroll", "scrollPosition": {"x": 0, "y": 640}},
            {"id": "n1", "action": "navigate", "metadata": {"critical": false}}
        ]
    }));

    let result = engine.execute_workflow(&wf).await.unwrap();

    assert_eq!(mock.count("scroll_to:0,640"), 1);
    let nav = &result.step_results[1];
    assert!(!nav.success);
    assert_eq!(nav.retry_count, 0);
    assert_eq!(nav.metadata["errorCode"], "MISSING_FIELD");
    assert!(result.success);
    assert!(
        result
            .logs
            .iter()
            .any(|l| l.level == LogLevel::Warn && l.message.contains("has no url"))
    );
}
