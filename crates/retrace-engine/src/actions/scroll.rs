use super::{ActionContext, ActionOutcome, SHORT_SETTLE_DELAY, StepError};
use retrace_common::execution::LogLevel;
use serde_json::json;

pub async fn execute(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, StepError> {
    let position = ctx.step.scroll_position.unwrap_or_default();
    ctx.log(
        LogLevel::Debug,
        format!("Scrolling to ({}, {})", position.x, position.y),
    );
    ctx.backend.scroll_to(position.x, position.y).await?;
    tokio::time::sleep(SHORT_SETTLE_DELAY).await;

    let mut outcome = ActionOutcome::new();
    outcome.insert("x".into(), json!(position.x));
    outcome.insert("y".into(), json!(position.y));
    Ok(outcome)
}
