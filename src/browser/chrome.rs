use crate::core::config::{LaunchConfig, ScreenshotFormat, ScreenshotOptions};
use crate::core::BrowserTrait;
use crate::errors::{Result, SnapshotError};
use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use tracing::debug;

/// Chrome over the DevTools protocol.
#[derive(Default)]
pub struct ChromeBrowser {
    browser: Option<Browser>,
}

impl ChromeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    fn launch_args(config: &LaunchConfig) -> Vec<String> {
        let mut args = vec![
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            format!(
                "--window-size={},{}",
                config.viewport.width, config.viewport.height
            ),
        ];
        if let Some(ua) = &config.user_agent {
            args.push(format!("--user-agent={}", ua));
        }
        args.extend(config.args.iter().cloned());
        args
    }
}

#[async_trait]
impl BrowserTrait for ChromeBrowser {
    type TabHandle = Arc<Tab>;

    async fn launch(&mut self, config: &LaunchConfig) -> Result<()> {
        let args = Self::launch_args(config);
        debug!(headless = config.headless, args = ?args, "launching chrome");

        let launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .args(args.iter().map(OsStr::new).collect())
            .build()
            .map_err(|e| SnapshotError::LaunchFailed(e.to_string()))?;

        let browser =
            Browser::new(launch_options).map_err(|e| SnapshotError::LaunchFailed(e.to_string()))?;

        self.browser = Some(browser);
        Ok(())
    }

    async fn new_tab(&self) -> Result<Self::TabHandle> {
        let browser = self
            .browser
            .as_ref()
            .ok_or(SnapshotError::BrowserNotLaunched)?;

        browser
            .new_tab()
            .map_err(|e| SnapshotError::TabCreationFailed(e.to_string()))
    }

    async fn navigate(&self, tab: &Self::TabHandle, url: &str) -> Result<()> {
        tab.navigate_to(url)
            .map_err(|e| SnapshotError::NavigationFailed(e.to_string()))?;

        tab.wait_until_navigated()
            .map_err(|e| SnapshotError::NavigationFailed(e.to_string()))?;

        Ok(())
    }

    async fn execute_script(&self, tab: &Self::TabHandle, script: &str) -> Result<Value> {
        let result = tab
            .evaluate(script, false)
            .map_err(|e| SnapshotError::JavaScriptFailed(e.to_string()))?;

        Ok(result.value.unwrap_or(Value::Null))
    }

    async fn take_screenshot(
        &self,
        tab: &Self::TabHandle,
        options: &ScreenshotOptions,
    ) -> Result<Vec<u8>> {
        let (format, quality) = match options.format {
            ScreenshotFormat::Png => (CaptureScreenshotFormatOption::Png, None),
            ScreenshotFormat::Jpeg => (
                CaptureScreenshotFormatOption::Jpeg,
                options.quality.map(u32::from),
            ),
        };

        tab.capture_screenshot(format, quality, None, true)
            .map_err(|e| SnapshotError::ScreenshotFailed(e.to_string()))
    }

    async fn get_url(&self, tab: &Self::TabHandle) -> Result<String> {
        Ok(tab.get_url())
    }

    fn is_running(&self) -> bool {
        self.browser.is_some()
    }

    async fn close(&mut self) -> Result<()> {
        self.browser = None;
        Ok(())
    }
}
