//! Post-input heuristics.
//!
//! Some forms only reveal the next field after the current one is submitted
//! (email first, password on the next screen). A recorded trace of such a form
//! may not contain the submit click, so replay would stall. Heuristics run after
//! every successful fill and may advance the form.

use crate::backend::{Backend, BackendError, ElementTarget, FieldInfo};
use crate::config::ProgressiveSubmitConfig;
use crate::resolution::sanitize::escape_attr;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

const CONTINUE_BUTTON_TIMEOUT: Duration = Duration::from_millis(2000);

#[async_trait]
pub trait InputHeuristic: Send + Sync {
    fn name(&self) -> &str;

    /// Inspect the filled field and optionally act on the page.
    /// Returns a description of what was done, or `None` if the heuristic did not engage.
    async fn after_fill(
        &self,
        backend: &mut dyn Backend,
        target: &ElementTarget,
        field: &FieldInfo,
    ) -> Result<Option<String>, BackendError>;
}

/// Submits single-field "identifier first" forms once the identifier is typed.
pub struct ProgressiveSubmit {
    config: ProgressiveSubmitConfig,
}

impl ProgressiveSubmit {
    pub fn new(config: ProgressiveSubmitConfig) -> Self {
        Self { config }
    }

    /// Whether the field looks like an email or username input.
    pub fn matches(&self, field: &FieldInfo) -> bool {
        if field.is_password() {
            return false;
        }
        if field
            .input_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("email"))
        {
            return true;
        }
        let haystacks = [
            field.name.as_deref(),
            field.id.as_deref(),
            field.placeholder.as_deref(),
            field.autocomplete.as_deref(),
        ];
        haystacks.into_iter().flatten().any(|h| {
            let h = h.to_lowercase();
            self.config
                .field_keywords
                .iter()
                .any(|k| h.contains(&k.to_lowercase()))
        })
    }
}

#[async_trait]
impl InputHeuristic for ProgressiveSubmit {
    fn name(&self) -> &str {
        "progressive-submit"
    }

    async fn after_fill(
        &self,
        backend: &mut dyn Backend,
        target: &ElementTarget,
        field: &FieldInfo,
    ) -> Result<Option<String>, BackendError> {
        if !self.config.enabled || !self.matches(field) {
            return Ok(None);
        }
        if !backend.has_form_submit(target).await? {
            return Ok(None);
        }

        if backend.click_form_submit(target).await.unwrap_or(false) {
            return Ok(Some("clicked the form's submit button".into()));
        }

        for label in &self.config.continue_labels {
            let button =
                ElementTarget::main(format!("role=button[name=\"{}\"]", escape_attr(label)));
            if backend
                .wait_visible(&button, CONTINUE_BUTTON_TIMEOUT)
                .await
                .is_ok()
                && backend.click(&button).await.is_ok()
            {
                return Ok(Some(format!("clicked '{}' button", label)));
            }
        }

        // Focus may already be on the field; Enter submits from there.
        if let Err(e) = backend.focus(target).await {
            debug!("focus before Enter failed on {}: {}", target, e);
        }
        backend.press_key("Enter", &[]).await?;
        Ok(Some("pressed Enter in the field".into()))
    }
}
