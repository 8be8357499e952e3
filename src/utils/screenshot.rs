use crate::core::config::{ScreenshotFormat, ScreenshotOptions};
use crate::core::page::PageSource;
use crate::errors::{Result, SnapshotError};
use base64::Engine;
use std::time::Duration;

pub struct ScreenshotManager;

impl ScreenshotManager {
    pub fn encode_base64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    pub fn format_name(options: &ScreenshotOptions) -> &'static str {
        match options.format {
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpeg => "jpeg",
        }
    }

    /// Capture through `source` within `timeout_ms`, base64-encoded.
    pub async fn take_base64<S: PageSource + ?Sized>(
        source: &S,
        options: &ScreenshotOptions,
        timeout_ms: u64,
    ) -> Result<String> {
        let capture = source.screenshot(options);
        let bytes = tokio::time::timeout(Duration::from_millis(timeout_ms), capture)
            .await
            .map_err(|_| SnapshotError::ScreenshotTimeout)?
            .map_err(|err| match err {
                SnapshotError::ScreenshotFailed(_) => err,
                other => SnapshotError::ScreenshotFailed(other.to_string()),
            })?;
        if bytes.is_empty() {
            return Err(SnapshotError::ScreenshotFailed("empty image".into()));
        }
        Ok(Self::encode_base64(&bytes))
    }
}
