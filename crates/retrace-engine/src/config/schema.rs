use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine configuration, fixed for the lifetime of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Extra pause after every successful step action.
    #[serde(default)]
    pub slow_mo_ms: u64,
    /// Default ceiling for element waits and navigations.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub screenshots: ScreenshotConfig,
    #[serde(default)]
    pub viewport: ViewportConfig,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub browser_channel: Option<BrowserChannel>,
    #[serde(default)]
    pub executable_path: Option<PathBuf>,
    /// Used for steps whose metadata carries no retry configuration.
    #[serde(default)]
    pub retry: RetryDefaults,
    #[serde(default)]
    pub heuristics: HeuristicsConfig,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            slow_mo_ms: 0,
            timeout_ms: default_timeout_ms(),
            screenshots: ScreenshotConfig::default(),
            viewport: ViewportConfig::default(),
            user_agent: None,
            browser_channel: None,
            executable_path: None,
            retry: RetryDefaults::default(),
            heuristics: HeuristicsConfig::default(),
        }
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn slow_mo(&self) -> Option<Duration> {
        (self.slow_mo_ms > 0).then(|| Duration::from_millis(self.slow_mo_ms))
    }
}

fn default_headless() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    30000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_screenshot_dir")]
    pub dir: PathBuf,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_screenshot_dir(),
        }
    }
}

fn default_screenshot_dir() -> PathBuf {
    PathBuf::from("./screenshots")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ViewportConfig {
    #[serde(default = "default_viewport_width")]
    pub width: u32,
    #[serde(default = "default_viewport_height")]
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: default_viewport_width(),
            height: default_viewport_height(),
        }
    }
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    720
}

/// Preferred browser build. Drivers map this to an executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserChannel {
    Chrome,
    Chromium,
    Msedge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryDefaults {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    #[serde(default)]
    pub progressive_submit: ProgressiveSubmitConfig,
}

/// Auto-submit after filling a lone email/username field of a multi-page login form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressiveSubmitConfig {
    #[serde(default = "default_progressive_enabled")]
    pub enabled: bool,
    /// Matched case-insensitively against the field's type, name, id, placeholder and autocomplete.
    #[serde(default = "default_field_keywords")]
    pub field_keywords: Vec<String>,
    /// Button labels tried when the form has no clickable submit control.
    #[serde(default = "default_continue_labels")]
    pub continue_labels: Vec<String>,
}

impl Default for ProgressiveSubmitConfig {
    fn default() -> Self {
        Self {
            enabled: default_progressive_enabled(),
            field_keywords: default_field_keywords(),
            continue_labels: default_continue_labels(),
        }
    }
}

fn default_progressive_enabled() -> bool {
    true
}

fn default_field_keywords() -> Vec<String> {
    ["email", "username", "user", "login", "identifier"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_continue_labels() -> Vec<String> {
    ["Continue", "Next"].into_iter().map(String::from).collect()
}
