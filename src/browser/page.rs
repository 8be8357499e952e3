use super::element_monitor::ElementMonitor;
use crate::core::config::{LaunchConfig, ScreenshotOptions};
use crate::core::page::{ActivitySample, PageSource};
use crate::core::BrowserTrait;
use crate::dom::page::{DocumentSpec, PageModel};
use crate::errors::{Result, SnapshotError};
use crate::utils::javascript::{
    scroll_to_script, JavaScriptRunner, CAPTURE_SCRIPT, SCROLL_Y_SCRIPT,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// A live browser tab exposed as a `PageSource`.
pub struct BrowserPage<B: BrowserTrait> {
    browser: Arc<B>,
    tab: B::TabHandle,
    monitor: ElementMonitor,
    script_timeout_ms: u64,
}

impl<B: BrowserTrait> BrowserPage<B> {
    /// Launch `browser`, open a tab and navigate it to `url`.
    pub async fn open(mut browser: B, config: &LaunchConfig, url: &str) -> Result<Self> {
        browser.launch(config).await?;
        let tab = browser.new_tab().await?;
        browser.navigate(&tab, url).await?;
        debug!(url, "page opened");
        Ok(Self::attach(Arc::new(browser), tab, config.script_timeout_ms))
    }

    /// Wrap a tab that is already open.
    pub fn attach(browser: Arc<B>, tab: B::TabHandle, script_timeout_ms: u64) -> Self {
        Self {
            browser,
            tab,
            monitor: ElementMonitor::new(script_timeout_ms),
            script_timeout_ms,
        }
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.browser.navigate(&self.tab, url).await
    }

    pub async fn url(&self) -> Result<String> {
        self.browser.get_url(&self.tab).await
    }

    pub fn browser(&self) -> &Arc<B> {
        &self.browser
    }

    pub fn tab(&self) -> &B::TabHandle {
        &self.tab
    }
}

#[async_trait]
impl<B: BrowserTrait + 'static> PageSource for BrowserPage<B> {
    async fn capture(&self) -> Result<PageModel> {
        let spec: DocumentSpec = JavaScriptRunner::evaluate_json(
            self.browser.as_ref(),
            &self.tab,
            CAPTURE_SCRIPT,
            self.script_timeout_ms,
        )
        .await
        .map_err(|err| match err {
            SnapshotError::CaptureFailed(_) => err,
            other => SnapshotError::CaptureFailed(other.to_string()),
        })?;
        let page = PageModel::from_spec(spec);
        debug!(url = %page.url, nodes = page.node_count(), "document captured");
        Ok(page)
    }

    async fn sample_activity(&self) -> Result<ActivitySample> {
        self.monitor.read_activity(self.browser.as_ref(), &self.tab).await
    }

    async fn screenshot(&self, options: &ScreenshotOptions) -> Result<Vec<u8>> {
        self.browser.take_screenshot(&self.tab, options).await
    }

    async fn scroll_y(&self) -> Result<f64> {
        JavaScriptRunner::evaluate_json(
            self.browser.as_ref(),
            &self.tab,
            SCROLL_Y_SCRIPT,
            self.script_timeout_ms,
        )
        .await
    }

    async fn scroll_to(&self, y: f64) -> Result<()> {
        let _: serde_json::Value = JavaScriptRunner::evaluate_json(
            self.browser.as_ref(),
            &self.tab,
            &scroll_to_script(y),
            self.script_timeout_ms,
        )
        .await?;
        Ok(())
    }
}
