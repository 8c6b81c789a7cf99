use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use retrace_engine::config::{BrowserChannel, ExecutionConfig};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;

type CdpResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const HANDLER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct CdpClient {
    pub browser: Browser,
    pub handler_task: JoinHandle<()>,
    /// `None` once the page has been closed.
    pub page: Option<Page>,
    user_data_dir: PathBuf,
    cleanup_user_data_dir: bool,
}

impl CdpClient {
    pub async fn launch(config: &ExecutionConfig) -> CdpResult<Self> {
        let mut config_builder = BrowserConfig::builder();
        config_builder = config_builder.no_sandbox(); // Often needed in docker/CI/restricted envs
        let (user_data_dir, cleanup_user_data_dir) = resolve_user_data_dir()?;
        config_builder = config_builder
            .user_data_dir(&user_data_dir)
            .window_size(config.viewport.width, config.viewport.height)
            .arg("--disable-blink-features=AutomationControlled");

        if config.headless {
            tracing::info!("Launching browser in headless mode");
        } else {
            tracing::info!("Launching browser in visible mode");
            config_builder = config_builder.with_head();
        }

        if let Some(user_agent) = &config.user_agent {
            config_builder = config_builder.arg(format!("--user-agent={}", user_agent));
        }

        if let Some(executable) = resolve_executable(config) {
            tracing::info!("Using browser binary: {}", executable.display());
            config_builder = config_builder.chrome_executable(executable);
        }

        let (browser, mut handler) = Browser::launch(
            config_builder
                .build()
                .map_err(|e| format!("Failed to build browser config: {}", e))?,
        )
        .await
        .map_err(|e| format!("Failed to launch browser: {}", e))?;

        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if let Err(e) = h {
                    tracing::debug!("Browser handler error (ignoring): {}", e);
                }
            }
            tracing::debug!("Browser handler task ended");
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| format!("Failed to create page: {}", e))?;

        let mut console_events = page
            .event_listener::<chromiumoxide::cdp::js_protocol::runtime::EventConsoleApiCalled>()
            .await
            .map_err(|e| format!("Failed to subscribe to console events: {}", e))?;
        tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                let args: Vec<String> = event
                    .args
                    .iter()
                    .map(|arg| arg.description.clone().unwrap_or_default())
                    .collect();
                tracing::debug!("Browser console [{:?}]: {}", event.r#type, args.join(" "));
            }
        });

        // A recorded trace never contains dialog handling; accept so replay keeps moving.
        let mut dialog_events = page
            .event_listener::<chromiumoxide::cdp::browser_protocol::page::EventJavascriptDialogOpening>()
            .await
            .map_err(|e| format!("Failed to subscribe to dialog events: {}", e))?;
        let dialog_page = page.clone();
        tokio::spawn(async move {
            while let Some(event) = dialog_events.next().await {
                tracing::info!("Accepting JavaScript dialog: {} ({:?})", event.message, event.r#type);
                let cmd =
                    chromiumoxide::cdp::browser_protocol::page::HandleJavaScriptDialogParams::new(
                        true,
                    );
                if let Err(e) = dialog_page.execute(cmd).await {
                    tracing::warn!("Failed to accept dialog: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
            page: Some(page),
            user_data_dir,
            cleanup_user_data_dir,
        })
    }

    pub async fn close(mut self) -> CdpResult<()> {
        self.browser
            .close()
            .await
            .map_err(|e| format!("Error closing browser: {}", e))?;
        if tokio::time::timeout(HANDLER_SHUTDOWN_TIMEOUT, &mut self.handler_task)
            .await
            .is_err()
        {
            tracing::debug!("Browser handler did not stop in time, aborting it");
            self.handler_task.abort();
        }

        if self.cleanup_user_data_dir {
            if let Err(e) = tokio::fs::remove_dir_all(&self.user_data_dir).await {
                tracing::debug!(
                    "Failed to clean up user-data-dir {}: {}",
                    self.user_data_dir.display(),
                    e
                );
            }
        }
        Ok(())
    }
}

/// Explicit path, then `CHROME_BIN`, then the requested channel's binaries on `PATH`.
/// `None` lets chromiumoxide use its own detection.
pub fn resolve_executable(config: &ExecutionConfig) -> Option<PathBuf> {
    if let Some(path) = &config.executable_path {
        return Some(path.clone());
    }
    if let Ok(chrome_bin) = std::env::var("CHROME_BIN") {
        return Some(PathBuf::from(chrome_bin));
    }
    let channel = config.browser_channel?;
    let path = std::env::var_os("PATH")?;
    let dirs: Vec<PathBuf> = std::env::split_paths(&path).collect();
    find_binary(channel_binaries(channel), &dirs)
}

pub fn channel_binaries(channel: BrowserChannel) -> &'static [&'static str] {
    match channel {
        BrowserChannel::Chrome => &["google-chrome", "google-chrome-stable", "chrome"],
        BrowserChannel::Chromium => &["chromium", "chromium-browser"],
        BrowserChannel::Msedge => &["microsoft-edge", "microsoft-edge-stable", "msedge"],
    }
}

fn find_binary(names: &[&str], dirs: &[PathBuf]) -> Option<PathBuf> {
    names.iter().find_map(|name| {
        dirs.iter()
            .map(|dir| dir.join(name))
            .find(|candidate| is_file(candidate))
    })
}

fn is_file(path: &Path) -> bool {
    path.metadata().is_ok_and(|m| m.is_file())
}

fn resolve_user_data_dir() -> CdpResult<(PathBuf, bool)> {
    if let Ok(dir) = std::env::var("RETRACE_USER_DATA_DIR") {
        let path = PathBuf::from(dir);
        std::fs::create_dir_all(&path)?;
        tracing::info!(
            "Using user data dir from RETRACE_USER_DATA_DIR: {}",
            path.display()
        );
        return Ok((path, false));
    }

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("System clock error: {}", e))?
        .as_nanos();
    let unique = format!("retrace-chromium-profile-{}-{}", std::process::id(), nanos);
    let path = std::env::temp_dir().join(unique);
    std::fs::create_dir_all(&path)?;
    tracing::debug!("Using isolated user data dir: {}", path.display());
    Ok((path, true))
}
