use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotOptions {
    pub wait_for_stability: StabilitySetting,
    pub enable_inference: bool,
    pub inference_config: InferenceOverride,
    pub collect_iframes: bool,
    pub screenshot: Option<ScreenshotOptions>,
    pub debug: bool,
    pub limit: usize,
    pub filter: Option<SnapshotFilter>,
    pub timeouts: PipelineTimeouts,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            wait_for_stability: StabilitySetting::Enabled(true),
            enable_inference: true,
            inference_config: InferenceOverride::default(),
            collect_iframes: true,
            screenshot: None,
            debug: false,
            limit: DEFAULT_LIMIT,
            filter: None,
            timeouts: PipelineTimeouts::default(),
        }
    }
}

impl SnapshotOptions {
    /// Options forwarded to a child frame: nesting stays on, the stability gate
    /// only runs in the top frame.
    pub fn for_child_frame(&self) -> Self {
        Self {
            wait_for_stability: StabilitySetting::Enabled(false),
            collect_iframes: true,
            screenshot: None,
            ..self.clone()
        }
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn stability(&self) -> Option<StabilityConfig> {
        match &self.wait_for_stability {
            StabilitySetting::Enabled(true) => Some(StabilityConfig::default()),
            StabilitySetting::Enabled(false) => None,
            StabilitySetting::Custom(config) => Some(config.clone()),
        }
    }

    pub fn inference(&self) -> Option<InferenceConfig> {
        if self.enable_inference {
            Some(self.inference_config.apply(&InferenceConfig::default()))
        } else {
            None
        }
    }
}

/// `waitForStability` accepts either a flag or a full config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StabilitySetting {
    Enabled(bool),
    Custom(StabilityConfig),
}

impl Default for StabilitySetting {
    fn default() -> Self {
        StabilitySetting::Enabled(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StabilityConfig {
    pub min_node_count: usize,
    pub quiet_period_ms: u64,
    pub max_wait_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            min_node_count: 500,
            quiet_period_ms: 200,
            max_wait_ms: 5000,
            poll_interval_ms: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceConfig {
    pub allowed_tags: Vec<String>,
    pub allowed_roles: Vec<String>,
    pub class_patterns: Vec<String>,
    pub max_parent_depth: usize,
    pub max_sibling_distance: usize,
    pub require_same_container: bool,
    pub use_labels: bool,
    pub use_aria_labelledby: bool,
    pub use_parent_traversal: bool,
    pub use_siblings: bool,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            allowed_tags: strings(&["label", "span", "div", "p", "legend", "strong", "dt"]),
            allowed_roles: strings(&["label", "heading", "note", "tooltip"]),
            class_patterns: strings(&[
                "label",
                "field",
                "caption",
                "title",
                "legend",
                "form-group",
                "input-group",
            ]),
            max_parent_depth: 3,
            max_sibling_distance: 2,
            require_same_container: true,
            use_labels: true,
            use_aria_labelledby: true,
            use_parent_traversal: true,
            use_siblings: true,
        }
    }
}

/// Partial `InferenceConfig`; set fields replace the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InferenceOverride {
    pub allowed_tags: Option<Vec<String>>,
    pub allowed_roles: Option<Vec<String>>,
    pub class_patterns: Option<Vec<String>>,
    pub max_parent_depth: Option<usize>,
    pub max_sibling_distance: Option<usize>,
    pub require_same_container: Option<bool>,
    pub use_labels: Option<bool>,
    pub use_aria_labelledby: Option<bool>,
    pub use_parent_traversal: Option<bool>,
    pub use_siblings: Option<bool>,
}

impl InferenceOverride {
    pub fn apply(&self, base: &InferenceConfig) -> InferenceConfig {
        InferenceConfig {
            allowed_tags: self
                .allowed_tags
                .clone()
                .unwrap_or_else(|| base.allowed_tags.clone()),
            allowed_roles: self
                .allowed_roles
                .clone()
                .unwrap_or_else(|| base.allowed_roles.clone()),
            class_patterns: self
                .class_patterns
                .clone()
                .unwrap_or_else(|| base.class_patterns.clone()),
            max_parent_depth: self.max_parent_depth.unwrap_or(base.max_parent_depth),
            max_sibling_distance: self
                .max_sibling_distance
                .unwrap_or(base.max_sibling_distance),
            require_same_container: self
                .require_same_container
                .unwrap_or(base.require_same_container),
            use_labels: self.use_labels.unwrap_or(base.use_labels),
            use_aria_labelledby: self.use_aria_labelledby.unwrap_or(base.use_aria_labelledby),
            use_parent_traversal: self
                .use_parent_traversal
                .unwrap_or(base.use_parent_traversal),
            use_siblings: self.use_siblings.unwrap_or(base.use_siblings),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScreenshotFormat {
    #[default]
    Png,
    Jpeg,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotOptions {
    pub format: ScreenshotFormat,
    /// JPEG only, 1..=100.
    pub quality: Option<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SnapshotFilter {
    pub min_area: Option<f64>,
    pub allowed_roles: Option<Vec<String>>,
    pub min_z_index: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineTimeouts {
    pub frame_ms: u64,
    pub processing_ms: u64,
    pub screenshot_ms: u64,
}

impl Default for PipelineTimeouts {
    fn default() -> Self {
        Self {
            frame_ms: 5_000,
            processing_ms: 25_000,
            screenshot_ms: 10_000,
        }
    }
}

/// Scroll-and-merge sampling for long or virtualized pages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SampleOptions {
    pub samples: usize,
    /// Defaults to 90% of the viewport height.
    pub scroll_delta_y: Option<f64>,
    pub settle_ms: u64,
    pub union_limit: Option<usize>,
    pub restore_scroll: bool,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            samples: 4,
            scroll_delta_y: None,
            settle_ms: 250,
            union_limit: None,
            restore_scroll: true,
        }
    }
}

/// Settings for launching a live browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaunchConfig {
    pub headless: bool,
    pub viewport: crate::types::Viewport,
    pub user_agent: Option<String>,
    pub args: Vec<String>,
    /// Budget for a single capture or reading script.
    pub script_timeout_ms: u64,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport: crate::types::Viewport::default(),
            user_agent: None,
            args: Vec::new(),
            script_timeout_ms: 15_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let options = SnapshotOptions::default();
        assert!(options.enable_inference);
        assert!(options.collect_iframes);
        assert_eq!(options.stability(), Some(StabilityConfig::default()));
        assert_eq!(options.effective_limit(), 50);
    }

    #[test]
    fn test_wait_for_stability_accepts_bool_or_config() {
        let off: SnapshotOptions = serde_json::from_value(json!({ "waitForStability": false })).unwrap();
        assert!(off.stability().is_none());

        let custom: SnapshotOptions = serde_json::from_value(json!({
            "waitForStability": { "minNodeCount": 10, "maxWaitMs": 1000 }
        }))
        .unwrap();
        let config = custom.stability().unwrap();
        assert_eq!(config.min_node_count, 10);
        assert_eq!(config.max_wait_ms, 1000);
        assert_eq!(config.quiet_period_ms, 200);
    }

    #[test]
    fn test_inference_override_merges_over_defaults() {
        let options: SnapshotOptions = serde_json::from_value(json!({
            "inferenceConfig": { "maxParentDepth": 1, "useSiblings": false }
        }))
        .unwrap();
        let config = options.inference().unwrap();
        assert_eq!(config.max_parent_depth, 1);
        assert!(!config.use_siblings);
        assert_eq!(config.allowed_tags, InferenceConfig::default().allowed_tags);

        let disabled = SnapshotOptions {
            enable_inference: false,
            ..Default::default()
        };
        assert!(disabled.inference().is_none());
    }

    #[test]
    fn test_child_frame_options() {
        let options = SnapshotOptions {
            collect_iframes: false,
            screenshot: Some(ScreenshotOptions::default()),
            limit: 120,
            ..Default::default()
        };
        let child = options.for_child_frame();
        assert!(child.collect_iframes);
        assert!(child.stability().is_none());
        assert!(child.screenshot.is_none());
        assert_eq!(child.limit, 120);
    }

    #[test]
    fn test_limit_is_clamped() {
        let options = SnapshotOptions {
            limit: 10_000,
            ..Default::default()
        };
        assert_eq!(options.effective_limit(), MAX_LIMIT);
    }
}
