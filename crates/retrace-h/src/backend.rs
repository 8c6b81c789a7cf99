use crate::cdp::CdpClient;
use crate::inject::{element_op, evaluate, page_op};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, EventLoadEventFired, NavigateParams,
};
use chromiumoxide::layout::Point;
use futures::StreamExt;
use futures::stream::BoxStream;
use retrace_engine::backend::{
    Backend, BackendError, ElementTarget, FieldInfo, NavigationResult, WaitUntil,
};
use retrace_engine::config::ExecutionConfig;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const VISIBILITY_POLL: Duration = Duration::from_millis(100);

pub struct HeadlessBackend {
    client: Option<CdpClient>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self { client: None }
    }

    pub fn get_client(&self) -> Option<&CdpClient> {
        self.client.as_ref()
    }

    fn page(&self) -> Result<&Page, BackendError> {
        self.client
            .as_ref()
            .and_then(|c| c.page.as_ref())
            .ok_or(BackendError::NotReady)
    }

    async fn get_navigation_result(page: &Page) -> Result<NavigationResult, BackendError> {
        let title = page
            .get_title()
            .await
            .unwrap_or_default()
            .unwrap_or_default();
        let url = page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_default();
        Ok(NavigationResult { url, title })
    }
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn as_bool(value: &Value) -> bool {
    value.as_bool().unwrap_or(false)
}

fn opt_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(String::from)
}

#[async_trait]
impl Backend for HeadlessBackend {
    async fn launch(&mut self, config: &ExecutionConfig) -> Result<(), BackendError> {
        if let Some(previous) = self.client.take() {
            warn!("Launch requested with a live session, closing it first");
            previous.close().await.ok();
        }
        info!("Launching Chromium backend...");
        let client = CdpClient::launch(config)
            .await
            .map_err(|e| BackendError::Launch(e.to_string()))?;
        self.client = Some(client);
        Ok(())
    }

    async fn is_ready(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.page.is_some())
    }

    async fn close_page(&mut self) -> Result<(), BackendError> {
        let Some(page) = self.client.as_mut().and_then(|c| c.page.take()) else {
            return Ok(());
        };
        page.close()
            .await
            .map_err(|e| BackendError::Other(format!("Closing page failed: {}", e)))
    }

    async fn close_context(&mut self) -> Result<(), BackendError> {
        // Pages live in the default context, which goes away with the browser.
        debug!("Default browser context is released with the browser");
        Ok(())
    }

    async fn close_browser(&mut self) -> Result<(), BackendError> {
        if let Some(client) = self.client.take() {
            client
                .close()
                .await
                .map_err(|e| BackendError::Other(e.to_string()))?;
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BackendError> {
        let page = self.page()?;
        Ok(page
            .url()
            .await
            .map_err(|e| BackendError::Navigation(e.to_string()))?
            .unwrap_or_else(|| "about:blank".into()))
    }

    async fn navigate(
        &mut self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<NavigationResult, BackendError> {
        let page = self.page()?;
        info!("Navigating to: {}", url);

        let listen = |e: chromiumoxide::error::CdpError| BackendError::Navigation(e.to_string());
        let mut lifecycle: BoxStream<'_, ()> = match wait_until {
            WaitUntil::DomContentLoaded => page
                .event_listener::<EventDomContentEventFired>()
                .await
                .map_err(listen)?
                .map(|_| ())
                .boxed(),
            WaitUntil::Load => page
                .event_listener::<EventLoadEventFired>()
                .await
                .map_err(listen)?
                .map(|_| ())
                .boxed(),
        };

        let navigated = async {
            let response = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| BackendError::Navigation(e.to_string()))?;
            if let Some(error) = &response.result.error_text {
                return Err(BackendError::Navigation(format!("{}: {}", url, error)));
            }
            // Same-document navigations have no loader and fire no lifecycle events.
            if response.result.loader_id.is_some() {
                lifecycle.next().await;
            }
            Ok(())
        };
        tokio::time::timeout(timeout, navigated)
            .await
            .map_err(|_| BackendError::Timeout {
                operation: format!("navigation to {}", url),
            })??;

        Self::get_navigation_result(page).await
    }

    async fn frame_count(&mut self) -> Result<usize, BackendError> {
        let value = page_op(self.page()?, "frame_count", Value::Null).await?;
        Ok(value.as_u64().unwrap_or(0) as usize)
    }

    async fn wait_visible(
        &mut self,
        target: &ElementTarget,
        timeout: Duration,
    ) -> Result<(), BackendError> {
        let page = self.page()?;
        let deadline = Instant::now() + timeout;
        loop {
            let last_error = match element_op(page, "visible", target, Value::Null).await {
                Ok(value) if as_bool(&value) => return Ok(()),
                Ok(_) => BackendError::ElementNotVisible {
                    locator: target.to_string(),
                },
                Err(e @ BackendError::LocatorInvalid { .. }) => return Err(e),
                Err(e) => e,
            };
            if Instant::now() + VISIBILITY_POLL > deadline {
                return Err(last_error);
            }
            tokio::time::sleep(VISIBILITY_POLL).await;
        }
    }

    async fn click(&mut self, target: &ElementTarget) -> Result<(), BackendError> {
        let page = self.page()?;
        let point = element_op(page, "point", target, Value::Null).await?;
        match (
            point.get("x").and_then(Value::as_f64),
            point.get("y").and_then(Value::as_f64),
        ) {
            (Some(x), Some(y)) => {
                page.click(Point { x, y })
                    .await
                    .map_err(|e| BackendError::Other(format!("click failed: {}", e)))?;
            }
            _ => {
                debug!("No click point for {}, using DOM click", target);
                element_op(page, "click", target, Value::Null).await?;
            }
        }
        Ok(())
    }

    async fn fill(&mut self, target: &ElementTarget, value: &str) -> Result<(), BackendError> {
        element_op(self.page()?, "fill", target, json!(value)).await?;
        Ok(())
    }

    async fn focus(&mut self, target: &ElementTarget) -> Result<(), BackendError> {
        element_op(self.page()?, "focus", target, Value::Null).await?;
        Ok(())
    }

    async fn clear(&mut self, target: &ElementTarget) -> Result<(), BackendError> {
        element_op(self.page()?, "clear", target, Value::Null).await?;
        Ok(())
    }

    async fn input_value(&mut self, target: &ElementTarget) -> Result<String, BackendError> {
        let value = element_op(self.page()?, "value", target, Value::Null).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn is_disabled(&mut self, target: &ElementTarget) -> Result<bool, BackendError> {
        let value = element_op(self.page()?, "disabled", target, Value::Null).await?;
        Ok(as_bool(&value))
    }

    async fn scroll_into_view(&mut self, target: &ElementTarget) -> Result<(), BackendError> {
        element_op(self.page()?, "scroll_into_view", target, Value::Null).await?;
        Ok(())
    }

    async fn dispatch_events(
        &mut self,
        target: &ElementTarget,
        events: &[&str],
    ) -> Result<(), BackendError> {
        element_op(self.page()?, "dispatch", target, json!(events)).await?;
        Ok(())
    }

    async fn field_info(&mut self, target: &ElementTarget) -> Result<FieldInfo, BackendError> {
        let value = element_op(self.page()?, "field_info", target, Value::Null).await?;
        Ok(FieldInfo {
            input_type: opt_string(&value, "inputType"),
            name: opt_string(&value, "name"),
            id: opt_string(&value, "id"),
            placeholder: opt_string(&value, "placeholder"),
            autocomplete: opt_string(&value, "autocomplete"),
        })
    }

    async fn has_form_submit(&mut self, target: &ElementTarget) -> Result<bool, BackendError> {
        let value = element_op(self.page()?, "has_form_submit", target, Value::Null).await?;
        Ok(as_bool(&value))
    }

    async fn click_form_submit(&mut self, target: &ElementTarget) -> Result<bool, BackendError> {
        let value = element_op(self.page()?, "click_form_submit", target, Value::Null).await?;
        Ok(as_bool(&value))
    }

    async fn scroll_to(&mut self, x: f64, y: f64) -> Result<(), BackendError> {
        page_op(self.page()?, "scroll_to", json!({ "x": x, "y": y })).await?;
        Ok(())
    }

    /// `script` must be a function expression; `args` are spread into the call.
    async fn execute_script(
        &mut self,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, BackendError> {
        let expression = format!("({})(...{})", script, serde_json::to_string(&args)?);
        evaluate(self.page()?, &expression).await
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, BackendError> {
        let page = self.page()?;
        let bytes = page
            .screenshot(chromiumoxide::page::ScreenshotParams::builder().build())
            .await
            .map_err(|e| BackendError::Other(format!("Screenshot failed: {}", e)))?;
        Ok(bytes)
    }

    async fn press_key(&mut self, key: &str, modifiers: &[String]) -> Result<(), BackendError> {
        let page = self.page()?;

        let mut modifier_flags = 0;
        for m in modifiers {
            match m.to_lowercase().as_str() {
                "alt" => modifier_flags |= 1,
                "ctrl" | "control" => modifier_flags |= 2,
                "meta" | "cmd" | "command" => modifier_flags |= 4,
                "shift" => modifier_flags |= 8,
                _ => {}
            }
        }

        use chromiumoxide::cdp::browser_protocol::input::{
            DispatchKeyEventParams, DispatchKeyEventType,
        };

        // Enter needs its text for the browser to submit the focused form.
        let text = match key {
            "Enter" => Some("\r"),
            "Tab" => Some("\t"),
            _ => None,
        };

        let mut key_down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .code(key)
            .modifiers(modifier_flags);
        if let Some(text) = text {
            key_down = key_down.text(text);
        }
        if key == "Enter" {
            key_down = key_down.windows_virtual_key_code(13);
        }
        let key_down = key_down
            .build()
            .map_err(|e| BackendError::Other(format!("Failed to build key event: {:?}", e)))?;
        page.execute(key_down)
            .await
            .map_err(|e| BackendError::Other(format!("press_key down failed: {}", e)))?;

        let key_up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .code(key)
            .modifiers(modifier_flags)
            .build()
            .map_err(|e| BackendError::Other(format!("Failed to build key event: {:?}", e)))?;
        page.execute(key_up)
            .await
            .map_err(|e| BackendError::Other(format!("press_key up failed: {}", e)))?;

        Ok(())
    }
}
