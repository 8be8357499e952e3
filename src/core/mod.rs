pub mod browser;
pub mod config;
pub mod dom;
pub mod page;

pub use browser::BrowserTrait;
pub use config::{
    InferenceConfig, InferenceOverride, LaunchConfig, PipelineTimeouts, SampleOptions,
    ScreenshotFormat, ScreenshotOptions, SnapshotFilter, SnapshotOptions, StabilityConfig,
    StabilitySetting,
};
pub use dom::{GroupingStrategy, ProcessOptions, SnapshotProcessor};
pub use page::{ActivitySample, PageSource};
