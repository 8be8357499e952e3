use crate::core::config::{LaunchConfig, ScreenshotOptions};
use crate::errors::Result;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait BrowserTrait: Send + Sync {
    type TabHandle: Send + Sync;

    /// Launch a new browser instance
    async fn launch(&mut self, config: &LaunchConfig) -> Result<()>;

    /// Create a new tab/page
    async fn new_tab(&self) -> Result<Self::TabHandle>;

    /// Navigate to a URL and wait for the load to finish
    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()>;

    /// Evaluate a script and return its (JSON) result
    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value>;

    async fn take_screenshot(
        &self,
        tab: &Self::TabHandle,
        options: &ScreenshotOptions,
    ) -> Result<Vec<u8>>;

    async fn get_url(&self, tab: &Self::TabHandle) -> Result<String>;

    fn is_running(&self) -> bool;

    async fn close(&mut self) -> Result<()>;
}
