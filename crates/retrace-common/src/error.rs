use thiserror::Error;

/// Errors raised by a browser driver while executing a single operation.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    // ============================================================
    // Session Errors
    // ============================================================
    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Session not initialized")]
    NotReady,

    #[error("Connection lost")]
    ConnectionLost,

    // ============================================================
    // Navigation Errors
    // ============================================================
    #[error("Navigation failed: {0}")]
    Navigation(String),

    // ============================================================
    // Element Errors
    // ============================================================
    #[error("Element not found: {locator}")]
    ElementNotFound { locator: String },

    #[error("Element not visible: {locator}")]
    ElementNotVisible { locator: String },

    #[error("Element is disabled: {locator}")]
    ElementDisabled { locator: String },

    #[error("Invalid locator: {locator}")]
    LocatorInvalid { locator: String },

    // ============================================================
    // Execution Errors
    // ============================================================
    #[error("Script execution error: {0}")]
    ScriptError(String),

    #[error("Timeout: {operation}")]
    Timeout { operation: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Other: {0}")]
    Other(String),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

impl BackendError {
    /// Stable machine-readable code, recorded in step metadata.
    pub fn code(&self) -> &'static str {
        match self {
            BackendError::Launch(_) => "LAUNCH_FAILED",
            BackendError::NotReady => "NOT_READY",
            BackendError::ConnectionLost => "CONNECTION_LOST",
            BackendError::Navigation(_) => "NAVIGATION_ERROR",
            BackendError::ElementNotFound { .. } => "ELEMENT_NOT_FOUND",
            BackendError::ElementNotVisible { .. } => "ELEMENT_NOT_VISIBLE",
            BackendError::ElementDisabled { .. } => "ELEMENT_DISABLED",
            BackendError::LocatorInvalid { .. } => "LOCATOR_INVALID",
            BackendError::ScriptError(_) => "SCRIPT_ERROR",
            BackendError::Timeout { .. } => "TIMEOUT",
            BackendError::Io(_) => "IO_ERROR",
            BackendError::Serialization(_) => "SERIALIZATION_ERROR",
            BackendError::NotSupported(_) => "NOT_SUPPORTED",
            BackendError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether waiting longer could plausibly make the operation succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BackendError::ElementNotFound { .. }
                | BackendError::ElementNotVisible { .. }
                | BackendError::ElementDisabled { .. }
                | BackendError::Timeout { .. }
                | BackendError::Navigation(_)
        )
    }
}
