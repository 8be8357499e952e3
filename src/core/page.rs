use crate::core::config::ScreenshotOptions;
use crate::dom::page::PageModel;
use crate::errors::{Result, SnapshotError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Cheap liveness sample used by the stability monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySample {
    pub node_count: usize,
    /// Monotonic count of observed DOM mutations.
    pub mutation_count: u64,
    pub ready_state: String,
}

impl Default for ActivitySample {
    fn default() -> Self {
        Self {
            node_count: 0,
            mutation_count: 0,
            ready_state: "loading".to_string(),
        }
    }
}

/// The document a pipeline pass runs against.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Capture the rendered document, child frames included.
    async fn capture(&self) -> Result<PageModel>;

    async fn sample_activity(&self) -> Result<ActivitySample>;

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>>;

    /// Vertical scroll offset of the top document.
    async fn scroll_y(&self) -> Result<f64> {
        Err(SnapshotError::Browser("scrolling not supported".into()))
    }

    async fn scroll_to(&self, _y: f64) -> Result<()> {
        Err(SnapshotError::Browser("scrolling not supported".into()))
    }
}
