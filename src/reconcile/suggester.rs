//! Merge-suggester port.
//!
//! A suggester looks at a page's tokens (and optionally its image) and
//! proposes groups of tokens that belong to one visual word. Suggestions are
//! untrusted; the chain merger validates them before applying anything.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use serde::{Deserialize, Serialize};

use crate::error::SuggestError;
use crate::model::{cmp_f32, ExtractedElement};

/// A candidate group of token ids to merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroup {
    /// Ids of the tokens in the group
    pub member_ids: BTreeSet<String>,

    /// Replacement text for the merged token, if the suggester has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_text: Option<String>,
}

impl MergeGroup {
    /// Create a group from ids.
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            member_ids: ids.into_iter().map(Into::into).collect(),
            corrected_text: None,
        }
    }

    /// Set corrected text and return self.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.corrected_text = Some(text.into());
        self
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.member_ids.len()
    }

    /// Check if the group has no members.
    pub fn is_empty(&self) -> bool {
        self.member_ids.is_empty()
    }

    /// Check if the group shares any member with another.
    pub fn overlaps(&self, other: &MergeGroup) -> bool {
        self.member_ids.iter().any(|id| other.member_ids.contains(id))
    }
}

/// Rendered page image handed to suggesters that need visual context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Encoded image bytes
    pub data: Arc<[u8]>,
}

impl PageImage {
    /// Create a page image.
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }
}

/// Proposes token merges for a page.
///
/// Implementations may be rule-based or model-backed. Failure is reported
/// through [`SuggestError`] and always degrades to "no merges".
pub trait MergeSuggester: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Propose merge groups for the given tokens.
    fn suggest(
        &self,
        tokens: &[ExtractedElement],
        image: Option<&PageImage>,
    ) -> Result<Vec<MergeGroup>, SuggestError>;

    /// Whether the suggester never proposes anything and costs nothing to call.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Suggester that never proposes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSuggester;

impl MergeSuggester for NoopSuggester {
    fn name(&self) -> &str {
        "noop"
    }

    fn is_noop(&self) -> bool {
        true
    }

    fn suggest(
        &self,
        _tokens: &[ExtractedElement],
        _image: Option<&PageImage>,
    ) -> Result<Vec<MergeGroup>, SuggestError> {
        Ok(Vec::new())
    }
}

/// Rule-based suggester gluing fragments that touch on the same line.
#[derive(Debug, Clone)]
pub struct GlueSuggester {
    /// Maximum horizontal gap between glued fragments
    pub max_gap: f32,
    /// Maximum vertical center delta as a fraction of the smaller height
    pub max_center_delta: f32,
}

impl GlueSuggester {
    /// Create a glue suggester with default thresholds.
    pub fn new() -> Self {
        Self {
            max_gap: 1.5,
            max_center_delta: 0.5,
        }
    }

    /// Set the maximum glue gap.
    pub fn with_max_gap(mut self, gap: f32) -> Self {
        self.max_gap = gap;
        self
    }

    fn touches(&self, a: &ExtractedElement, b: &ExtractedElement) -> bool {
        let min_h = a.bbox.height().min(b.bbox.height());
        let gap = b.bbox.x0 - a.bbox.x1;
        a.page == b.page
            && (a.bbox.center_y() - b.bbox.center_y()).abs() <= min_h * self.max_center_delta
            && gap >= -self.max_gap
            && gap <= self.max_gap
    }
}

impl Default for GlueSuggester {
    fn default() -> Self {
        Self::new()
    }
}

impl MergeSuggester for GlueSuggester {
    fn name(&self) -> &str {
        "glue"
    }

    fn suggest(
        &self,
        tokens: &[ExtractedElement],
        _image: Option<&PageImage>,
    ) -> Result<Vec<MergeGroup>, SuggestError> {
        let mut sorted: Vec<&ExtractedElement> = tokens.iter().filter(|t| t.validate()).collect();
        sorted.sort_by(|a, b| {
            a.page
                .cmp(&b.page)
                .then(cmp_f32(a.bbox.center_y(), b.bbox.center_y()))
                .then(cmp_f32(a.bbox.x0, b.bbox.x0))
        });

        let mut groups = Vec::new();
        let mut run: Vec<&ExtractedElement> = Vec::new();

        for token in sorted {
            let extends = run.last().is_some_and(|last| self.touches(last, token));
            if !extends {
                if run.len() > 1 {
                    groups.push(MergeGroup::new(run.iter().map(|t| t.id.clone())));
                }
                run.clear();
            }
            run.push(token);
        }
        if run.len() > 1 {
            groups.push(MergeGroup::new(run.iter().map(|t| t.id.clone())));
        }

        Ok(groups)
    }
}

/// Runs another suggester on a worker thread with a deadline.
///
/// The call is made at most once; there is no retry. A worker that misses
/// the deadline is detached, not cancelled: it runs to completion in the
/// background and its late answer is discarded. No-op suggesters are called
/// inline without a worker.
pub struct BoundedSuggester {
    inner: Arc<dyn MergeSuggester>,
    timeout: Duration,
}

impl BoundedSuggester {
    /// Wrap a suggester with a timeout.
    pub fn new(inner: Arc<dyn MergeSuggester>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The configured timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl MergeSuggester for BoundedSuggester {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_noop(&self) -> bool {
        self.inner.is_noop()
    }

    fn suggest(
        &self,
        tokens: &[ExtractedElement],
        image: Option<&PageImage>,
    ) -> Result<Vec<MergeGroup>, SuggestError> {
        if self.inner.is_noop() {
            return self.inner.suggest(tokens, image);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let inner = Arc::clone(&self.inner);
        let tokens = tokens.to_vec();
        let image = image.cloned();

        thread::Builder::new()
            .name("docweave-suggester".into())
            .spawn(move || {
                let result = inner.suggest(&tokens, image.as_ref());
                // The receiver may have timed out already
                let _ = tx.send(result);
            })
            .map_err(|e| SuggestError::Failed(format!("cannot spawn worker: {}", e)))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                Err(SuggestError::Timeout(self.timeout.as_millis() as u64))
            }
            Err(RecvTimeoutError::Disconnected) => Err(SuggestError::Disconnected),
        }
    }
}
