use super::{ActionContext, ActionOutcome, SETTLE_DELAY, StepError};
use crate::backend::WaitUntil;
use retrace_common::execution::LogLevel;
use serde_json::json;
use url::Url;

pub async fn execute(ctx: &mut ActionContext<'_>) -> Result<ActionOutcome, StepError> {
    let url = ctx
        .step
        .url
        .clone()
        .filter(|u| !u.trim().is_empty())
        .ok_or(StepError::MissingField("url"))?;

    ctx.log(LogLevel::Info, format!("Navigating to {}", url));
    let nav = ctx
        .backend
        .navigate(&url, WaitUntil::DomContentLoaded, ctx.timeout())
        .await?;
    tokio::time::sleep(SETTLE_DELAY).await;

    let mut outcome = ActionOutcome::new();
    outcome.insert("url".into(), json!(nav.url));
    outcome.insert("title".into(), json!(nav.title));
    Ok(outcome)
}

/// Navigate to the step's recorded page first when the browser is somewhere else.
///
/// Runs before every non-navigation step so a skipped or failed navigation step
/// does not strand later steps on the wrong origin.
pub async fn ensure_on_step_page(ctx: &mut ActionContext<'_>) -> Result<(), StepError> {
    let Some(target) = ctx.step.url.clone().filter(|u| !u.trim().is_empty()) else {
        return Ok(());
    };
    let current = match ctx.backend.current_url().await {
        Ok(url) => url,
        Err(e) => {
            ctx.log(
                LogLevel::Debug,
                format!("Could not read current URL ({}), assuming blank page", e),
            );
            String::new()
        }
    };

    if !needs_navigation(&current, &target) {
        return Ok(());
    }

    ctx.log(
        LogLevel::Info,
        format!(
            "Current page {} does not match step page, navigating to {}",
            if current.is_empty() { "(none)" } else { current.as_str() },
            target
        ),
    );
    ctx.backend
        .navigate(&target, WaitUntil::DomContentLoaded, ctx.timeout())
        .await?;
    tokio::time::sleep(SETTLE_DELAY).await;
    Ok(())
}

/// True when `current` is blank or on a different origin than `target`.
pub fn needs_navigation(current: &str, target: &str) -> bool {
    let current = current.trim();
    if current.is_empty() || current == "about:blank" {
        return true;
    }
    let Ok(target_url) = Url::parse(target) else {
        // Nothing sensible to compare against.
        return false;
    };
    let Ok(current_url) = Url::parse(current) else {
        return true;
    };
    let (target_origin, current_origin) = (target_url.origin(), current_url.origin());
    if target_origin.is_tuple() && current_origin.is_tuple() {
        target_origin != current_origin
    } else {
        // Opaque origins (data:, file:) never compare equal; fall back to the full URL.
        target_url.as_str() != current_url.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_pages_need_navigation() {
        assert!(needs_navigation("", "https://example.com"));
        assert!(needs_navigation("about:blank", "https://example.com"));
    }

    #[test]
    fn test_same_origin_different_path_is_fine() {
        assert!(!needs_navigation(
            "https://example.com/account",
            "https://example.com/login?next=1"
        ));
    }

    #[test]
    fn test_different_origin_needs_navigation() {
        assert!(needs_navigation(
            "https://example.com/",
            "https://accounts.example.com/"
        ));
        assert!(needs_navigation("http://example.com/", "https://example.com/"));
    }

    #[test]
    fn test_opaque_origins_compare_full_url() {
        assert!(!needs_navigation(
            "data:text/html,<p>hi</p>",
            "data:text/html,<p>hi</p>"
        ));
        assert!(needs_navigation("data:text/html,a", "data:text/html,b"));
    }

    #[test]
    fn test_unparseable_target_is_ignored() {
        assert!(!needs_navigation("https://example.com", "not a url"));
    }
}
