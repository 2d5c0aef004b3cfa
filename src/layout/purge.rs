//! Purge: redact consumed regions from the source page.
//!
//! Once text has been extracted from a region, the region is blanked on the
//! page so that later readers (OCR, vision) do not read it twice. Redaction
//! is re-checked by a bounded residual sweep.

use serde::{Deserialize, Serialize};

use crate::error::{Issue, IssueKind};
use crate::model::{BoundingBox, PhysicalChar};

/// Maximum number of residual sweeps after the initial redaction.
pub const MAX_SWEEPS: u32 = 5;

/// A page surface that can be redacted and re-scanned.
pub trait PageCanvas {
    /// Blank every visible glyph inside the region.
    fn redact(&mut self, region: &BoundingBox);

    /// Glyphs still visible on the page.
    fn visible_chars(&self) -> Vec<PhysicalChar>;
}

/// In-memory canvas backed by a glyph list.
#[derive(Debug, Clone, Default)]
pub struct MemoryCanvas {
    chars: Vec<PhysicalChar>,
}

impl MemoryCanvas {
    /// Create a canvas from glyphs.
    pub fn new(chars: Vec<PhysicalChar>) -> Self {
        Self { chars }
    }

    /// Number of glyphs still visible.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Check if nothing is visible.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Consume the canvas, returning the glyphs still visible.
    pub fn into_chars(self) -> Vec<PhysicalChar> {
        self.chars
    }
}

impl PageCanvas for MemoryCanvas {
    fn redact(&mut self, region: &BoundingBox) {
        self.chars.retain(|c| {
            let (cx, cy) = c.bbox.center();
            !region.contains_point(cx, cy, 0.0)
        });
    }

    fn visible_chars(&self) -> Vec<PhysicalChar> {
        self.chars.clone()
    }
}

/// Outcome of a purge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Residual sweeps performed
    pub iterations: u32,

    /// Glyphs still visible inside consumed regions at the end
    pub residual: usize,

    /// Whether all consumed regions ended up blank
    pub converged: bool,
}

/// Redacts consumed regions with a bounded residual sweep.
pub struct Purger {
    max_sweeps: u32,
}

impl Purger {
    /// Create a purger with the default sweep cap.
    pub fn new() -> Self {
        Self {
            max_sweeps: MAX_SWEEPS,
        }
    }

    /// Create a purger with a custom sweep cap (at most [`MAX_SWEEPS`]).
    pub fn with_max_sweeps(max_sweeps: u32) -> Self {
        Self {
            max_sweeps: max_sweeps.min(MAX_SWEEPS),
        }
    }

    /// Redact `consumed` on the canvas.
    ///
    /// Never loops past the sweep cap. Residual text after the cap is
    /// reported as an issue, not an error.
    pub fn purge<C: PageCanvas + ?Sized>(
        &self,
        page: i32,
        canvas: &mut C,
        consumed: &[BoundingBox],
    ) -> (PurgeReport, Option<Issue>) {
        for region in consumed {
            canvas.redact(region);
        }

        let mut report = PurgeReport::default();
        let mut residual = residual_chars(canvas, consumed);

        while !residual.is_empty() && report.iterations < self.max_sweeps {
            report.iterations += 1;
            log::trace!(
                "Purger: sweep {} on page {} redacting {} leftover glyphs",
                report.iterations,
                page,
                residual.len()
            );
            for ch in &residual {
                canvas.redact(&ch.bbox);
            }
            residual = residual_chars(canvas, consumed);
        }

        report.residual = residual.len();
        report.converged = residual.is_empty();

        if report.converged {
            return (report, None);
        }

        log::warn!(
            "Purger: {} glyphs remain on page {} after {} sweeps",
            report.residual,
            page,
            report.iterations
        );
        let issue = Issue::new(
            IssueKind::ResidualTextAfterRedactionCap,
            format!(
                "{} glyphs still visible after {} sweeps",
                report.residual, report.iterations
            ),
        )
        .on_page(page);
        (report, Some(issue))
    }
}

impl Default for Purger {
    fn default() -> Self {
        Self::new()
    }
}

/// Visible glyphs whose centers fall inside any consumed region.
fn residual_chars<C: PageCanvas + ?Sized>(canvas: &C, consumed: &[BoundingBox]) -> Vec<PhysicalChar> {
    canvas
        .visible_chars()
        .into_iter()
        .filter(|c| {
            let (cx, cy) = c.bbox.center();
            consumed.iter().any(|r| r.contains_point(cx, cy, 0.0))
        })
        .collect()
}
