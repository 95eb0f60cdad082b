use thiserror::Error;

/// Errors raised by a capture session.
///
/// Variants are split along the boundaries that matter to consumers: fatal
/// session/protocol failures tear the session down, per-operation replay
/// failures are reported to the caller of the command, and everything else
/// is recoverable on the next polling tick.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The initial URL could not be opened because it is malformed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The target server refused the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The browser and its driver disagree on versions.
    #[error("webdriver version mismatch: {0}")]
    WebDriverVersionMismatch(String),

    /// The browser process could not be launched or connected to.
    #[error("failed to launch browser: {0}")]
    LaunchFailed(String),

    /// The remote session died or rejected a protocol-level request.
    #[error("webdriver session error: {0}")]
    Session(String),

    /// A window-level request (switch, enumerate, close) failed.
    #[error("window operation failed: {0}")]
    WindowOperationFailed(String),

    /// A frame switch or frame-scoped request failed.
    #[error("frame operation failed: {0}")]
    FrameOperationFailed(String),

    /// An injected script could not be executed or returned garbage.
    #[error("script execution failed: {0}")]
    ScriptFailed(String),

    /// A replayed operation was malformed (e.g. missing target element).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// The target element of a replayed operation no longer exists.
    #[error("element not found: {0}")]
    ElementNotFound(String),

    /// The target element exists but cannot be interacted with.
    #[error("element not interactable: {0}")]
    ElementNotInteractable(String),

    /// Taking a screenshot failed.
    #[error("screenshot failed: {0}")]
    ScreenshotFailed(String),

    /// Anything that does not fit a known category.
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl CaptureError {
    /// Categorized code for this error, suitable for a wire protocol.
    ///
    /// Unrecognized failures map to `unknown_error` rather than being
    /// dropped.
    pub fn code(&self) -> &'static str {
        match self {
            CaptureError::InvalidUrl(_) => "invalid_url",
            CaptureError::ConnectionRefused(_) => "connection_refused",
            CaptureError::WebDriverVersionMismatch(_) => "web_driver_version_mismatch",
            CaptureError::LaunchFailed(_) => "launch_failed",
            CaptureError::Session(_) => "capture_failed",
            CaptureError::WindowOperationFailed(_) => "capture_failed",
            CaptureError::FrameOperationFailed(_) => "capture_failed",
            CaptureError::ScriptFailed(_) => "capture_failed",
            CaptureError::InvalidOperation(_) => "invalid_operation",
            CaptureError::ElementNotFound(_) => "element_not_found",
            CaptureError::ElementNotInteractable(_) => "element_not_interactable",
            CaptureError::ScreenshotFailed(_) => "capture_failed",
            CaptureError::Unknown(_) => "unknown_error",
        }
    }

    /// Whether this error terminates the capture session.
    ///
    /// Replay and screenshot failures are reported per-command; transient
    /// browser-state races surface as window/frame/script failures and are
    /// resolved by re-reading ground truth on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaptureError::InvalidUrl(_)
                | CaptureError::ConnectionRefused(_)
                | CaptureError::WebDriverVersionMismatch(_)
                | CaptureError::LaunchFailed(_)
                | CaptureError::Session(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CaptureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CaptureError::ElementNotFound("xpath".into()).code(),
            "element_not_found"
        );
        assert_eq!(
            CaptureError::WebDriverVersionMismatch("v".into()).code(),
            "web_driver_version_mismatch"
        );
        assert_eq!(
            CaptureError::ConnectionRefused("refused".into()).code(),
            "connection_refused"
        );
        assert_eq!(CaptureError::Unknown("?".into()).code(), "unknown_error");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(CaptureError::Session("gone".into()).is_fatal());
        assert!(CaptureError::LaunchFailed("no chrome".into()).is_fatal());
        assert!(!CaptureError::ElementNotFound("xpath".into()).is_fatal());
        assert!(!CaptureError::ScriptFailed("stale frame".into()).is_fatal());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = CaptureError::InvalidOperation("no target".into());
        assert_eq!(err.to_string(), "invalid operation: no target");
    }
}
