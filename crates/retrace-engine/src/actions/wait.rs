use super::{ActionContext, ActionOutcome, StepError};
use retrace_common::execution::LogLevel;
use serde_json::json;
use std::time::Duration;

pub const DEFAULT_WAIT_MS: u64 = 1000;

pub async fn execute(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, StepError> {
    let wait_ms = ctx.step.wait_time.unwrap_or(DEFAULT_WAIT_MS);
    ctx.log(LogLevel::Debug, format!("Waiting {}ms", wait_ms));
    tokio::time::sleep(Duration::from_millis(wait_ms)).await;

    let mut outcome = ActionOutcome::new();
    outcome.insert("waited_ms".into(), json!(wait_ms));
    Ok(outcome)
}
