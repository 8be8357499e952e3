use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Stability wait timed out after {waited_ms}ms")]
    StabilityTimeout { waited_ms: u64 },

    #[error("Frame did not answer in time: {src}")]
    FrameTimeout { src: String },

    #[error("Frame unreachable ({src}): {reason}")]
    FrameUnreachable { src: String, reason: String },

    #[error("Snapshot processing exceeded its {budget_ms}ms budget")]
    ProcessingTimeout { budget_ms: u64 },

    #[error("Snapshot processing failed: {0}")]
    ProcessingFailed(String),

    #[error("Screenshot timed out")]
    ScreenshotTimeout,

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Element enumeration failed: {0}")]
    FatalEnumeration(String),

    #[error("Page capture failed: {0}")]
    CaptureFailed(String),

    #[error("JavaScript execution failed: {0}")]
    JavaScriptFailed(String),

    #[error("JavaScript execution timeout")]
    JavaScriptTimeout,

    #[error("Browser not launched")]
    BrowserNotLaunched,

    #[error("Browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("Tab creation failed: {0}")]
    TabCreationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Element handle from pass {handle_pass} used against pass {current_pass}")]
    StaleHandle {
        handle_pass: uuid::Uuid,
        current_pass: uuid::Uuid,
    },

    #[error("Unknown element id: {0}")]
    UnknownElement(u32),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Anyhow error: {0}")]
    Anyhow(String),
}

pub type Result<T> = std::result::Result<T, SnapshotError>;

// Custom processors and frame connectors report through anyhow
impl From<anyhow::Error> for SnapshotError {
    fn from(err: anyhow::Error) -> Self {
        SnapshotError::Anyhow(format!("{:#}", err))
    }
}

impl SnapshotError {
    pub fn from_any_error<E: std::fmt::Display>(err: E) -> Self {
        SnapshotError::Browser(err.to_string())
    }

    /// Whether the error aborts the whole pass instead of degrading it.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SnapshotError::StabilityTimeout { .. }
                | SnapshotError::FrameTimeout { .. }
                | SnapshotError::FrameUnreachable { .. }
                | SnapshotError::ProcessingTimeout { .. }
                | SnapshotError::ProcessingFailed(_)
                | SnapshotError::ScreenshotTimeout
                | SnapshotError::ScreenshotFailed(_)
        )
    }

    /// The error followed by its `source()` chain, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut out = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            out.push(err.to_string());
            source = err.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_traversal_and_host_errors_are_fatal() {
        assert!(SnapshotError::FatalEnumeration("boom".into()).is_fatal());
        assert!(SnapshotError::CaptureFailed("gone".into()).is_fatal());
        assert!(!SnapshotError::ScreenshotTimeout.is_fatal());
        assert!(!SnapshotError::ProcessingTimeout { budget_ms: 25_000 }.is_fatal());
        assert!(!SnapshotError::FrameTimeout {
            src: "https://example.com/frame".into()
        }
        .is_fatal());
    }

    #[test]
    fn test_chain_includes_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let err = SnapshotError::from(io);
        let chain = err.chain();
        assert_eq!(chain[0], "IO error: disk");
        assert_eq!(chain.len(), 2);
    }
}
