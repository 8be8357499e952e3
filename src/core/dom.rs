use crate::core::config::SnapshotOptions;
use crate::dom::element::{Element, RawElementRecord};

/// Ranking stage run in isolation over the flattened raw elements.
///
/// Implementations must be deterministic: identical input yields identical
/// output. The pipeline runs them off the async runtime under a time budget
/// and substitutes a 1:1 fallback mapping when they fail.
pub trait SnapshotProcessor: Send + Sync {
    fn process(
        &self,
        raw_elements: &[RawElementRecord],
        options: &ProcessOptions,
    ) -> anyhow::Result<Vec<Element>>;
}

/// Structural-similarity grouping used to find the dominant repeated group.
pub trait GroupingStrategy: Send + Sync {
    /// One flag per input element, `true` for dominant group members.
    fn dominant_group(&self, elements: &[RawElementRecord]) -> Vec<bool>;
}

/// The slice of `SnapshotOptions` the ranking stage sees.
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub limit: usize,
    pub filter: Option<crate::core::config::SnapshotFilter>,
    pub viewport_height: f64,
    pub debug: bool,
}

impl ProcessOptions {
    pub fn from_snapshot_options(options: &SnapshotOptions, viewport_height: f64) -> Self {
        Self {
            limit: options.effective_limit(),
            filter: options.filter.clone(),
            viewport_height,
            debug: options.debug,
        }
    }
}
