pub mod element;
pub mod grouping;
pub mod page;
pub mod processor;
pub mod state;

pub use element::{Element, RawElementRecord, VisualCues};
pub use grouping::FingerprintGrouping;
pub use page::{DocumentSpec, NodeId, NodeSpec, PageModel};
pub use processor::Ranker;
pub use state::{merge_snapshots, Diagnostics, PipelineWarning, Snapshot, SnapshotResponse};
