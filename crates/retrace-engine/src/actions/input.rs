use super::{ActionContext, ActionOutcome, SETTLE_DELAY, StepError};
use crate::backend::ElementTarget;
use crate::resolution::ResolvedLocators;
use retrace_common::execution::LogLevel;
use serde_json::json;

/// Placeholder logged instead of sensitive values.
pub const MASK: &str = "********";

/// Events that make framework-bound inputs notice a programmatic value change.
const SYNC_EVENTS: [&str; 3] = ["input", "change", "blur"];

pub async fn execute(
    ctx: &mut ActionContext<'_>,
    locators: &ResolvedLocators,
) -> Result<ActionOutcome, StepError> {
    let value = ctx
        .step
        .input_text()
        .ok_or(StepError::MissingField("inputValue"))?
        .to_string();
    let target = ElementTarget::main(locators.primary.clone());

    ctx.backend.wait_visible(&target, ctx.timeout()).await?;
    let field = ctx.backend.field_info(&target).await.unwrap_or_default();
    let masked = ctx.step.is_sensitive() || field.is_password();
    let shown = if masked { MASK } else { value.as_str() }.to_string();

    if let Err(e) = ctx.backend.focus(&target).await {
        ctx.log(LogLevel::Debug, format!("focus failed on {}: {}", target, e));
    }

    let current = ctx.backend.input_value(&target).await.unwrap_or_default();
    if current == value {
        ctx.log(
            LogLevel::Debug,
            format!("{} already holds the expected value", target),
        );
    } else {
        if !current.is_empty() {
            if let Err(e) = ctx.backend.clear(&target).await {
                ctx.log(LogLevel::Debug, format!("clear failed on {}: {}", target, e));
            }
        }
        ctx.backend.fill(&target, &value).await?;
        if let Err(e) = ctx.backend.dispatch_events(&target, &SYNC_EVENTS).await {
            ctx.log(
                LogLevel::Warn,
                format!("could not dispatch input events on {}: {}", target, e),
            );
        }
    }
    ctx.log(LogLevel::Info, format!("Typed {} into {}", shown, target));

    let mut engaged = None;
    let heuristics = ctx.heuristics;
    for heuristic in heuristics {
        match heuristic.after_fill(&mut *ctx.backend, &target, &field).await {
            Ok(Some(description)) => {
                ctx.log(
                    LogLevel::Info,
                    format!("{} heuristic engaged: {}", heuristic.name(), description),
                );
                engaged = Some(heuristic.name().to_string());
                break;
            }
            Ok(None) => {}
            Err(e) => ctx.log(
                LogLevel::Warn,
                format!("{} heuristic failed: {}", heuristic.name(), e),
            ),
        }
    }
    if engaged.is_some() {
        tokio::time::sleep(SETTLE_DELAY).await;
    }

    let mut outcome = ActionOutcome::new();
    outcome.insert("locator".into(), json!(target.locator));
    outcome.insert("masked".into(), json!(masked));
    outcome.insert("autoSubmitted".into(), json!(engaged));
    Ok(outcome)
}
