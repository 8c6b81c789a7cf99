use crate::config::ExecutionConfig;
use async_trait::async_trait;
pub use retrace_common::error::BackendError;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct NavigationResult {
    pub url: String,
    pub title: String,
}

/// Which document a locator is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameScope {
    #[default]
    Main,
    /// Index into the page's embedded frames, in document order.
    Frame(usize),
}

/// A locator string bound to the document it should be resolved in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementTarget {
    pub locator: String,
    pub frame: FrameScope,
}

impl ElementTarget {
    pub fn main(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            frame: FrameScope::Main,
        }
    }

    pub fn in_frame(locator: impl Into<String>, index: usize) -> Self {
        Self {
            locator: locator.into(),
            frame: FrameScope::Frame(index),
        }
    }
}

impl fmt::Display for ElementTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.frame {
            FrameScope::Main => write!(f, "{}", self.locator),
            FrameScope::Frame(i) => write!(f, "{} (frame {})", self.locator, i),
        }
    }
}

/// Lifecycle event a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitUntil {
    #[default]
    DomContentLoaded,
    Load,
}

/// What the page reports about a form field, used by input heuristics and masking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldInfo {
    pub input_type: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub placeholder: Option<String>,
    pub autocomplete: Option<String>,
}

impl FieldInfo {
    pub fn is_password(&self) -> bool {
        self.input_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("password"))
    }
}

/// The Backend trait is the browser capability the engine drives.
///
/// One backend owns one browser session (browser, context, page). Optional
/// operations default to `NotSupported` so minimal drivers stay small.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Launch the browser and open a page configured from `config`.
    async fn launch(&mut self, config: &ExecutionConfig) -> Result<(), BackendError>;

    /// Check if the backend has a live page.
    async fn is_ready(&self) -> bool;

    async fn close_page(&mut self) -> Result<(), BackendError>;

    async fn close_context(&mut self) -> Result<(), BackendError>;

    async fn close_browser(&mut self) -> Result<(), BackendError>;

    /// URL of the current page, `about:blank` before any navigation.
    async fn current_url(&mut self) -> Result<String, BackendError>;

    async fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<NavigationResult, BackendError>;

    /// Number of embedded frames addressable through `FrameScope::Frame`.
    async fn frame_count(&mut self) -> Result<usize, BackendError> {
        Ok(0)
    }

    /// Wait until the target resolves to a visible element.
    async fn wait_visible(
        &mut self,
        target: &ElementTarget,
        timeout: Duration,
    ) -> Result<(), BackendError>;

    async fn click(&mut self, target: &ElementTarget) -> Result<(), BackendError>;

    /// Replace the element's value with `value`.
    async fn fill(&mut self, target: &ElementTarget, value: &str) -> Result<(), BackendError>;

    async fn focus(&mut self, _target: &ElementTarget) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("focus".into()))
    }

    async fn clear(&mut self, _target: &ElementTarget) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("clear".into()))
    }

    async fn input_value(&mut self, _target: &ElementTarget) -> Result<String, BackendError> {
        Err(BackendError::NotSupported("input_value".into()))
    }

    async fn is_disabled(&mut self, _target: &ElementTarget) -> Result<bool, BackendError> {
        Ok(false)
    }

    async fn scroll_into_view(&mut self, _target: &ElementTarget) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("scroll_into_view".into()))
    }

    /// Dispatch DOM events (e.g. `input`, `change`, `blur`) on the element.
    async fn dispatch_events(
        &mut self,
        _target: &ElementTarget,
        _events: &[&str],
    ) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("dispatch_events".into()))
    }

    async fn field_info(&mut self, _target: &ElementTarget) -> Result<FieldInfo, BackendError> {
        Ok(FieldInfo::default())
    }

    /// Whether the element sits inside a `<form>` that has a submit control.
    async fn has_form_submit(&mut self, _target: &ElementTarget) -> Result<bool, BackendError> {
        Ok(false)
    }

    /// Click the submit control of the element's enclosing form. Returns false if none was clicked.
    async fn click_form_submit(&mut self, _target: &ElementTarget) -> Result<bool, BackendError> {
        Ok(false)
    }

    /// Scroll the main document to an absolute position.
    async fn scroll_to(&mut self, x: f64, y: f64) -> Result<(), BackendError>;

    /// Execute a script in the page context.
    async fn execute_script(
        &mut self,
        _script: &str,
        _args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, BackendError> {
        Err(BackendError::NotSupported("execute_script".into()))
    }

    /// Capture a PNG screenshot of the current viewport.
    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError>;

    /// Press a key (with optional modifiers) on the focused element.
    async fn press_key(&mut self, _key: &str, _modifiers: &[String]) -> Result<(), BackendError> {
        Err(BackendError::NotSupported("press_key".into()))
    }
}
