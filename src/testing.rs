use crate::core::config::ScreenshotOptions;
use crate::core::page::{ActivitySample, PageSource};
use crate::dom::element::{ElementAttributes, ElementStyles, RawElementRecord};
use crate::dom::page::{DocumentSpec, NodeSpec, PageModel};
use crate::errors::{Result, SnapshotError};
use crate::types::{ElementRect, Viewport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub struct TestHelper;

impl TestHelper {
    pub const URL: &'static str = "https://example.com/";

    /// A complete document at `URL` with the default viewport.
    pub fn page(root: NodeSpec) -> PageModel {
        PageModel::from_spec(DocumentSpec {
            url: Self::URL.to_string(),
            viewport: Viewport::default(),
            scroll_y: 0.0,
            ready_state: "complete".to_string(),
            root,
            truncated_at: None,
        })
    }

    /// A visible, static, 100x20 record at the origin.
    pub fn raw_record(tag: &str) -> RawElementRecord {
        RawElementRecord {
            id: 0,
            tag: tag.to_string(),
            rect: ElementRect::new(0.0, 0.0, 100.0, 20.0),
            styles: ElementStyles {
                display: "block".to_string(),
                visibility: "visible".to_string(),
                opacity: 1.0,
                z_index: "auto".to_string(),
                position: "static".to_string(),
                bg_color: "rgb(255, 255, 255)".to_string(),
                color: "rgb(0, 0, 0)".to_string(),
                cursor: "auto".to_string(),
                font_weight: "400".to_string(),
                font_size: "16px".to_string(),
            },
            attributes: ElementAttributes::default(),
            text: None,
            in_viewport: true,
            is_occluded: false,
            scroll_y: 0.0,
            has_direct_text: false,
            parent_signature: String::new(),
            iframe_context: None,
        }
    }

    /// `count` links laid out as a vertical list of search results.
    pub fn result_list(count: usize) -> NodeSpec {
        let items = (0..count).map(|i| {
            let y = 100.0 + 40.0 * i as f64;
            NodeSpec::element("li")
                .attr("class", &format!("result result-{}", i))
                .rect(0.0, y, 600.0, 30.0)
                .child(
                    NodeSpec::element("a")
                        .attr("href", &format!("/result/{}", i))
                        .attr("class", "result-link")
                        .rect(10.0, y, 400.0, 24.0)
                        .with_text(&format!("Result number {}", i)),
                )
        });
        NodeSpec::element("ul")
            .attr("class", "results")
            .rect(0.0, 100.0, 600.0, 40.0 * count as f64)
            .children(items)
    }
}

/// Shared, mutable activity counters behind a `StaticPage`.
#[derive(Debug, Clone, Default)]
pub struct PageActivity {
    reading: Arc<RwLock<ActivitySample>>,
}

impl PageActivity {
    pub async fn set_node_count(&self, count: usize) {
        let mut reading = self.reading.write().await;
        reading.node_count = count;
        reading.mutation_count += 1;
    }

    pub async fn add_nodes(&self, count: usize) {
        let mut reading = self.reading.write().await;
        reading.node_count += count;
        reading.mutation_count += 1;
    }

    pub async fn mutate(&self) {
        self.reading.write().await.mutation_count += 1;
    }

    pub async fn set_ready_state(&self, ready_state: &str) {
        self.reading.write().await.ready_state = ready_state.to_string();
    }

    pub async fn current(&self) -> ActivitySample {
        self.reading.read().await.clone()
    }
}

/// In-memory `PageSource` serving a fixed document.
pub struct StaticPage {
    page: Arc<RwLock<PageModel>>,
    activity: PageActivity,
    screenshot: Option<Vec<u8>>,
    screenshot_delay: Option<Duration>,
    activity_delay: Option<Duration>,
    scroll_y: Arc<RwLock<f64>>,
    capture_error: Option<String>,
}

impl StaticPage {
    pub fn new(page: PageModel) -> Self {
        let scroll_y = page.scroll_y;
        let reading = ActivitySample {
            node_count: page.node_count(),
            mutation_count: 0,
            ready_state: page.ready_state.clone(),
        };
        Self {
            page: Arc::new(RwLock::new(page)),
            activity: PageActivity {
                reading: Arc::new(RwLock::new(reading)),
            },
            screenshot: None,
            screenshot_delay: None,
            activity_delay: None,
            scroll_y: Arc::new(RwLock::new(scroll_y)),
            capture_error: None,
        }
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes);
        self
    }

    pub fn with_screenshot_delay(mut self, delay: Duration) -> Self {
        self.screenshot_delay = Some(delay);
        self
    }

    /// Every activity reading takes `delay` to answer.
    pub fn with_activity_delay(mut self, delay: Duration) -> Self {
        self.activity_delay = Some(delay);
        self
    }

    pub fn failing_capture(mut self, message: &str) -> Self {
        self.capture_error = Some(message.to_string());
        self
    }

    pub fn activity(&self) -> PageActivity {
        self.activity.clone()
    }

    /// Swap in a new document, counting it as a mutation.
    pub async fn replace(&self, page: PageModel) {
        let count = page.node_count();
        *self.page.write().await = page;
        self.activity.set_node_count(count).await;
    }
}

#[async_trait]
impl PageSource for StaticPage {
    async fn capture(&self) -> Result<PageModel> {
        if let Some(message) = &self.capture_error {
            return Err(SnapshotError::CaptureFailed(message.clone()));
        }
        let scroll_y = *self.scroll_y.read().await;
        Ok(self.page.read().await.scrolled_to(scroll_y))
    }

    async fn sample_activity(&self) -> Result<ActivitySample> {
        if let Some(delay) = self.activity_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.activity.current().await)
    }

    async fn screenshot(&self, _options: &ScreenshotOptions) -> Result<Vec<u8>> {
        if let Some(delay) = self.screenshot_delay {
            tokio::time::sleep(delay).await;
        }
        self.screenshot
            .clone()
            .ok_or_else(|| SnapshotError::ScreenshotFailed("no screenshot configured".into()))
    }

    async fn scroll_y(&self) -> Result<f64> {
        Ok(*self.scroll_y.read().await)
    }

    async fn scroll_to(&self, y: f64) -> Result<()> {
        *self.scroll_y.write().await = y.max(0.0);
        Ok(())
    }
}
