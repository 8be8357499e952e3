use crate::core::page::ActivitySample;
use crate::core::BrowserTrait;
use crate::errors::Result;
use crate::utils::javascript::JavaScriptRunner;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

const INSTALL_SCRIPT: &str = r#"
(function() {
    if (window.__semanticDomActivity) {
        return JSON.stringify({ installed: false });
    }
    const state = { mutationCount: 0, lastChange: Date.now() };
    const observer = new MutationObserver((mutations) => {
        state.mutationCount += mutations.length;
        state.lastChange = Date.now();
    });
    observer.observe(document.documentElement, {
        childList: true,
        subtree: true,
        attributes: true,
        characterData: true
    });
    window.__semanticDomActivity = { state: state, observer: observer };
    return JSON.stringify({ installed: true });
})()
"#;

const ACTIVITY_SCRIPT: &str = r#"
(function() {
    const activity = window.__semanticDomActivity;
    return JSON.stringify({
        nodeCount: document.getElementsByTagName('*').length,
        mutationCount: activity ? activity.state.mutationCount : 0,
        readyState: document.readyState
    });
})()
"#;

const REMOVE_SCRIPT: &str = r#"
(function() {
    const activity = window.__semanticDomActivity;
    if (activity) {
        activity.observer.disconnect();
        delete window.__semanticDomActivity;
    }
    return JSON.stringify({ removed: !!activity });
})()
"#;

/// Mutation observer living in the page, read back through readings.
pub struct ElementMonitor {
    installed: Arc<RwLock<bool>>,
    timeout_ms: u64,
}

impl ElementMonitor {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            installed: Arc::new(RwLock::new(false)),
            timeout_ms,
        }
    }

    /// Install the observer once per document; navigation drops it, so the
    /// page-side guard is the source of truth.
    pub async fn ensure_installed<B: BrowserTrait>(
        &self,
        browser: &B,
        tab: &B::TabHandle,
    ) -> Result<()> {
        let result: serde_json::Value =
            JavaScriptRunner::evaluate_json(browser, tab, INSTALL_SCRIPT, self.timeout_ms).await?;
        if result.get("installed").and_then(|v| v.as_bool()) == Some(true) {
            debug!("activity observer installed");
        }
        *self.installed.write().await = true;
        Ok(())
    }

    pub async fn read_activity<B: BrowserTrait>(
        &self,
        browser: &B,
        tab: &B::TabHandle,
    ) -> Result<ActivitySample> {
        self.ensure_installed(browser, tab).await?;
        JavaScriptRunner::evaluate_json(browser, tab, ACTIVITY_SCRIPT, self.timeout_ms).await
    }

    pub async fn remove<B: BrowserTrait>(&self, browser: &B, tab: &B::TabHandle) -> Result<()> {
        let _: serde_json::Value =
            JavaScriptRunner::evaluate_json(browser, tab, REMOVE_SCRIPT, self.timeout_ms).await?;
        *self.installed.write().await = false;
        Ok(())
    }

    pub async fn is_installed(&self) -> bool {
        *self.installed.read().await
    }
}
