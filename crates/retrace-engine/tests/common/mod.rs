#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use retrace_engine::backend::{
    Backend, BackendError, ElementTarget, FieldInfo, FrameScope, NavigationResult, WaitUntil,
};
use retrace_engine::config::ExecutionConfig;
use retrace_engine::trace::Workflow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Scripted page state shared between a test and the engine that owns the backend.
pub struct MockState {
    pub calls: Vec<String>,
    pub current_url: String,
    pub launch_error: Option<String>,
    /// Every element lookup fails.
    pub hide_everything: bool,
    pub hidden: HashSet<String>,
    /// Locators that only exist inside embedded frames.
    pub frame_only: HashSet<String>,
    pub frames: usize,
    pub fail_clicks: HashSet<String>,
    pub disabled: HashSet<String>,
    pub values: HashMap<String, String>,
    pub field_infos: HashMap<String, FieldInfo>,
    /// Locators of fields whose form has a submit control.
    pub form_submit: HashSet<String>,
    /// The form reports a submit control but clicking it does nothing.
    pub form_submit_unclickable: bool,
    pub focus_error: bool,
    pub screenshot_error: bool,
    pub close_page_error: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            current_url: "about:blank".into(),
            launch_error: None,
            hide_everything: false,
            hidden: HashSet::new(),
            frame_only: HashSet::new(),
            frames: 0,
            fail_clicks: HashSet::new(),
            disabled: HashSet::new(),
            values: HashMap::new(),
            field_infos: HashMap::new(),
            form_submit: HashSet::new(),
            form_submit_unclickable: false,
            focus_error: false,
            screenshot_error: false,
            close_page_error: false,
        }
    }
}

#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(configure: impl FnOnce(&mut MockState)) -> Self {
        let mock = Self::new();
        configure(&mut mock.state.lock());
        mock
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == call).count()
    }

    pub fn teardown_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with("close_"))
            .collect()
    }

    fn record(&self, call: impl Into<String>) {
        self.state.lock().calls.push(call.into());
    }

    fn is_visible(&self, target: &ElementTarget) -> bool {
        let state = self.state.lock();
        if state.hide_everything || state.hidden.contains(&target.locator) {
            return false;
        }
        let in_frames = state.frame_only.contains(&target.locator);
        match target.frame {
            FrameScope::Main => !in_frames,
            FrameScope::Frame(i) => in_frames && i < state.frames,
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn launch(&mut self, _config: &ExecutionConfig) -> Result<(), BackendError> {
        self.record("launch");
        match self.state.lock().launch_error.clone() {
            Some(message) => Err(BackendError::Launch(message)),
            None => Ok(()),
        }
    }

    async fn is_ready(&self) -> bool {
        true
    }

    async fn close_page(&mut self) -> Result<(), BackendError> {
        self.record("close_page");
        if self.state.lock().close_page_error {
            return Err(BackendError::ConnectionLost);
        }
        Ok(())
    }

    async fn close_context(&mut self) -> Result<(), BackendError> {
        self.record("close_context");
        Ok(())
    }

    async fn close_browser(&mut self) -> Result<(), BackendError> {
        self.record("close_browser");
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        Ok(self.state.lock().current_url.clone())
    }

    async fn navigate(
        &mut self,
        url: &str,
        _wait_until: WaitUntil,
        _timeout: Duration,
    ) -> Result<NavigationResult, BackendError> {
        self.record(format!("navigate:{}", url));
        self.state.lock().current_url = url.to_string();
        Ok(NavigationResult {
            url: url.to_string(),
            title: "Mock Page".into(),
        })
    }

    async fn frame_count(&mut self) -> Result<usize, BackendError> {
        Ok(self.state.lock().frames)
    }

    async fn wait_visible(
        &mut self,
        target: &ElementTarget,
        _timeout: Duration,
    ) -> Result<(), BackendError> {
        self.record(format!("wait_visible:{}", target));
        if self.is_visible(target) {
            Ok(())
        } else {
            Err(BackendError::ElementNotVisible {
                locator: target.locator.clone(),
            })
        }
    }

    async fn click(&mut self, target: &ElementTarget) -> Result<(), BackendError> {
        self.record(format!("click:{}", target));
        if self.state.lock().fail_clicks.contains(&target.locator) {
            return Err(BackendError::Other("click intercepted".into()));
        }
        Ok(())
    }

    async fn fill(&mut self, target: &ElementTarget, value: &str) -> Result<(), BackendError> {
        self.record(format!("fill:{}", target));
        self.state
            .lock()
            .values
            .insert(target.locator.clone(), value.to_string());
        Ok(())
    }

    async fn focus(&mut self, target: &ElementTarget) -> Result<(), BackendError> {
        self.record(format!("focus:{}", target));
        if self.state.lock().focus_error {
            return Err(BackendError::ElementNotVisible {
                locator: target.locator.clone(),
            });
        }
        Ok(())
    }

    async fn clear(&mut self, target: &ElementTarget) -> Result<(), BackendError> {
        self.record(format!("clear:{}", target));
        self.state.lock().values.remove(&target.locator);
        Ok(())
    }

    async fn input_value(&mut self, target: &ElementTarget) -> Result<String, BackendError> {
        Ok(self
            .state
            .lock()
            .values
            .get(&target.locator)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_disabled(&mut self, target: &ElementTarget) -> Result<bool, BackendError> {
        Ok(self.state.lock().disabled.contains(&target.locator))
    }

    async fn dispatch_events(
        &mut self,
        target: &ElementTarget,
        events: &[&str],
    ) -> Result<(), BackendError> {
        self.record(format!("dispatch:{}:{}", target, events.join(",")));
        Ok(())
    }

    async fn field_info(&mut self, target: &ElementTarget) -> Result<FieldInfo, BackendError> {
        Ok(self
            .state
            .lock()
            .field_infos
            .get(&target.locator)
            .cloned()
            .unwrap_or_default())
    }

    async fn has_form_submit(&mut self, target: &ElementTarget) -> Result<bool, BackendError> {
        Ok(self.state.lock().form_submit.contains(&target.locator))
    }

    async fn click_form_submit(&mut self, target: &ElementTarget) -> Result<bool, BackendError> {
        self.record(format!("click_form_submit:{}", target));
        let state = self.state.lock();
        Ok(!state.form_submit_unclickable && state.form_submit.contains(&target.locator))
    }

    async fn scroll_to(&mut self, x: f64, y: f64) -> Result<(), BackendError> {
        self.record(format!("scroll_to:{},{}", x, y));
        Ok(())
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        self.record("screenshot");
        if self.state.lock().screenshot_error {
            return Err(BackendError::ScriptError("capture failed".into()));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn press_key(&mut self, key: &str, _modifiers: &[String]) -> Result<(), BackendError> {
        self.record(format!("press_key:{}", key));
        Ok(())
    }
}

pub fn workflow(value: serde_json::Value) -> Workflow {
    serde_json::from_value(value).expect("valid workflow fixture")
}
