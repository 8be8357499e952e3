pub mod browser;
pub mod captcha;
pub mod collect;
pub mod core;
pub mod dom;
pub mod errors;
pub mod frames;
pub mod pipeline;
pub mod session;
pub mod stability;
pub mod testing;
pub mod types;
pub mod utils;

pub use browser::BrowserPage;
pub use crate::core::{PageSource, SnapshotOptions, SnapshotProcessor};
pub use dom::{merge_snapshots, Element, RawElementRecord, Snapshot, SnapshotResponse};
pub use errors::{Result, SnapshotError};
pub use pipeline::{SnapshotCache, SnapshotPass, SnapshotPipeline};
pub use session::{ElementHandle, PassSession};
pub use types::*;
