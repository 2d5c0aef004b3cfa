//! Page layout stages: box merging, table detection, purging and paragraph
//! grouping.

mod box_merger;
mod paragraph;
mod purge;
mod table_detector;

pub use box_merger::{BoxMergeOutput, BoxMerger, BoxMergerConfig};
pub(crate) use box_merger::merged_id;
pub use paragraph::{ParagraphConfig, ParagraphGrouper};
pub use purge::{MemoryCanvas, PageCanvas, PurgeReport, Purger, MAX_SWEEPS};
pub use table_detector::{DetectedTable, TableDetector, TableDetectorConfig};
