//! Reconciliation stages: suggested token merges, multi-source
//! deduplication and text canonicalization.

mod chain;
mod position;
mod scrub;
mod suggester;

pub use chain::{
    apply_merges, chain_merge, check_geometry, ChainGuardConfig, ChainMergeOutput, ChainMerger,
    GuardRejection,
};
pub use position::{BlockStream, PositionMergeConfig, PositionMergeOutput, PositionMerger, MAX_STREAMS};
pub use scrub::{
    ChangeLog, ChangeLogEntry, ChangeReason, ScrubConfig, ScrubStats, Scrubber, SpatialIndex,
};
pub use suggester::{
    BoundedSuggester, GlueSuggester, MergeGroup, MergeSuggester, NoopSuggester, PageImage,
};
