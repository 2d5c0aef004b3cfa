//! Pipeline result with audit trail and statistics.

use serde::{Deserialize, Serialize};

use crate::error::{Issue, IssueKind};
use crate::model::{Document, PageStatus};
use crate::package::Package;
use crate::reconcile::ChangeLog;

/// Result of processing one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    /// The reconciled document
    pub document: Document,

    /// Every text rewrite performed by Scrub
    pub change_log: ChangeLog,

    /// Non-fatal problems from every stage
    pub issues: Vec<Issue>,

    /// Packaged views
    pub package: Package,

    /// Processing counters
    pub stats: PipelineStats,
}

impl PipelineResult {
    /// Issues of one kind.
    pub fn issues_of(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    /// Check if any stage degraded or flagged a problem.
    pub fn has_issues(&self) -> bool {
        !self.issues.is_empty()
    }
}

/// Counters collected while processing a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Pages seen
    pub page_count: u32,

    /// Pages processed normally
    pub pages_ok: u32,

    /// Pages skipped as blank
    pub pages_skipped: u32,

    /// Pages that could not be processed
    pub pages_failed: u32,

    /// Raw tokens received
    pub token_count: usize,

    /// Merged elements built from suggested groups
    pub merges_applied: usize,

    /// Suggested groups rejected by the geometry guard
    pub merges_rejected: usize,

    /// Pages where the suggester failed and tokens passed through
    pub suggester_degraded: u32,

    /// Consolidated text boxes
    pub text_box_count: usize,

    /// Paragraphs emitted by the grouper
    pub paragraph_count: usize,

    /// Blocks dropped as positional duplicates
    pub duplicates_suppressed: usize,

    /// Elements whose text matched the physical layer
    pub scrub_confirmed: usize,

    /// Elements whose text was replaced from the physical layer
    pub scrub_replaced: usize,

    /// Elements with no physical glyphs underneath
    pub scrub_unmatched: usize,

    /// Residual sweeps performed by purge
    pub purge_sweeps: u32,

    /// Tables reconciled
    pub table_count: usize,

    /// Tables claimed by a domain handler
    pub domain_tables: usize,
}

impl PipelineStats {
    /// Create empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a page by its final status.
    pub fn record_page(&mut self, status: PageStatus) {
        self.page_count += 1;
        match status {
            PageStatus::Ok => self.pages_ok += 1,
            PageStatus::BlankSkip => self.pages_skipped += 1,
            PageStatus::Error => self.pages_failed += 1,
        }
    }

    /// Merge counters from another run.
    pub fn merge(&mut self, other: &PipelineStats) {
        self.page_count += other.page_count;
        self.pages_ok += other.pages_ok;
        self.pages_skipped += other.pages_skipped;
        self.pages_failed += other.pages_failed;
        self.token_count += other.token_count;
        self.merges_applied += other.merges_applied;
        self.merges_rejected += other.merges_rejected;
        self.suggester_degraded += other.suggester_degraded;
        self.text_box_count += other.text_box_count;
        self.paragraph_count += other.paragraph_count;
        self.duplicates_suppressed += other.duplicates_suppressed;
        self.scrub_confirmed += other.scrub_confirmed;
        self.scrub_replaced += other.scrub_replaced;
        self.scrub_unmatched += other.scrub_unmatched;
        self.purge_sweeps += other.purge_sweeps;
        self.table_count += other.table_count;
        self.domain_tables += other.domain_tables;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_page() {
        let mut stats = PipelineStats::new();
        stats.record_page(PageStatus::Ok);
        stats.record_page(PageStatus::BlankSkip);
        stats.record_page(PageStatus::Error);
        assert_eq!(stats.page_count, 3);
        assert_eq!((stats.pages_ok, stats.pages_skipped, stats.pages_failed), (1, 1, 1));
    }

    #[test]
    fn test_merge() {
        let mut a = PipelineStats {
            merges_applied: 2,
            ..Default::default()
        };
        let b = PipelineStats {
            merges_applied: 3,
            table_count: 1,
            ..Default::default()
        };
        a.merge(&b);
        assert_eq!(a.merges_applied, 5);
        assert_eq!(a.table_count, 1);
    }
}
