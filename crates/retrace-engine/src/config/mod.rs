pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    BrowserChannel, ExecutionConfig, HeuristicsConfig, ProgressiveSubmitConfig, RetryDefaults,
    ScreenshotConfig, ViewportConfig,
};
