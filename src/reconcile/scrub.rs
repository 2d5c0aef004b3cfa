//! Scrub: canonicalize element text against physical characters.
//!
//! This is the only stage allowed to rewrite an element's text. Every
//! rewrite is recorded in an append-only [`ChangeLog`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::{Issue, IssueKind};
use crate::model::{
    cmp_f32, BoundingBox, Document, ExtractedElement, PageElements, PageStatus, PhysicalChar,
    TextProvenance,
};

/// Scrub configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrubConfig {
    /// Side of a spatial index cell
    pub cell_size: f32,

    /// Slack added around an element box when collecting glyphs
    pub tolerance: f32,

    /// Center distance below which identical consecutive glyphs collapse
    pub duplicate_distance: f32,

    /// Gap, as a fraction of glyph height, that becomes a space
    pub word_gap_ratio: f32,
}

impl Default for ScrubConfig {
    fn default() -> Self {
        Self {
            cell_size: 50.0,
            tolerance: 2.0,
            duplicate_distance: 3.0,
            word_gap_ratio: 0.3,
        }
    }
}

/// Bucketed index of physical glyphs by page and center position.
#[derive(Debug, Clone)]
pub struct SpatialIndex {
    cell_size: f32,
    chars: Vec<PhysicalChar>,
    buckets: HashMap<(i32, i64, i64), Vec<usize>>,
    /// Smallest and largest occupied bucket on each axis
    extent: Option<((i64, i64), (i64, i64))>,
}

impl SpatialIndex {
    /// Index glyphs into cells of `cell_size` units.
    pub fn new(chars: Vec<PhysicalChar>, cell_size: f32) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 50.0 };
        let mut buckets: HashMap<(i32, i64, i64), Vec<usize>> = HashMap::new();
        let mut extent: Option<((i64, i64), (i64, i64))> = None;

        for (i, ch) in chars.iter().enumerate() {
            if !ch.bbox.is_valid() {
                continue;
            }
            let (cx, cy) = ch.bbox.center();
            let (bx, by) = (bucket(cx, cell_size), bucket(cy, cell_size));
            extent = Some(match extent {
                None => ((bx, bx), (by, by)),
                Some(((x0, x1), (y0, y1))) => ((x0.min(bx), x1.max(bx)), (y0.min(by), y1.max(by))),
            });
            buckets.entry((ch.page, bx, by)).or_default().push(i);
        }

        Self {
            cell_size,
            chars,
            buckets,
            extent,
        }
    }

    /// Glyphs on `page` whose centers fall inside `bbox` grown by `tolerance`.
    ///
    /// Only buckets inside the indexed extent are visited, so the cost is
    /// bounded by the glyph layout and not by the size of `bbox`.
    pub fn query(&self, page: i32, bbox: &BoundingBox, tolerance: f32) -> Vec<&PhysicalChar> {
        let mut found = Vec::new();
        let Some(((min_x, max_x), (min_y, max_y))) = self.extent else {
            return found;
        };

        let area = bbox.expand(tolerance);
        let bx0 = bucket(area.x0, self.cell_size).max(min_x);
        let bx1 = bucket(area.x1, self.cell_size).min(max_x);
        let by0 = bucket(area.y0, self.cell_size).max(min_y);
        let by1 = bucket(area.y1, self.cell_size).min(max_y);

        for bx in bx0..=bx1 {
            for by in by0..=by1 {
                let Some(indices) = self.buckets.get(&(page, bx, by)) else {
                    continue;
                };
                for &i in indices {
                    let (cx, cy) = self.chars[i].bbox.center();
                    if area.contains_point(cx, cy, 0.0) {
                        found.push(&self.chars[i]);
                    }
                }
            }
        }
        found
    }

    /// Number of indexed glyphs.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Check if the index holds no glyphs.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Check if any glyph sits on `page`.
    pub fn has_page(&self, page: i32) -> bool {
        self.buckets.keys().any(|(p, _, _)| *p == page)
    }
}

fn bucket(v: f32, cell: f32) -> i64 {
    (v / cell).floor() as i64
}

/// Why a change log entry was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    /// Text replaced by the physical characters under the element
    PhysicalReplacement,
}

impl ChangeReason {
    /// Stable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeReason::PhysicalReplacement => "physical_replacement",
        }
    }
}

/// One text mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// Element whose text changed
    pub item_id: String,
    /// Text before the change
    pub before: String,
    /// Text after the change
    pub after: String,
    /// Why it changed
    pub reason: ChangeReason,
    /// When it changed
    pub timestamp: DateTime<Utc>,
}

/// Append-only audit trail of text mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeLog {
    entries: Vec<ChangeLogEntry>,
}

impl ChangeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, item_id: &str, before: &str, after: &str, reason: ChangeReason) {
        self.entries.push(ChangeLogEntry {
            item_id: item_id.to_string(),
            before: before.to_string(),
            after: after.to_string(),
            reason,
            timestamp: Utc::now(),
        });
    }

    /// Entries in the order they were written.
    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeLogEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing was changed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counts from scrubbing a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubStats {
    /// Elements whose text matched the physical layer
    pub confirmed: usize,
    /// Elements whose text was replaced
    pub replaced: usize,
    /// Elements with no physical glyphs underneath
    pub unmatched: usize,
}

/// Canonicalizes element text using physical glyphs.
pub struct Scrubber {
    config: ScrubConfig,
    index: SpatialIndex,
}

impl Scrubber {
    /// Create a scrubber over glyphs with default configuration.
    pub fn new(chars: Vec<PhysicalChar>) -> Self {
        Self::with_config(chars, ScrubConfig::default())
    }

    /// Create a scrubber with custom configuration.
    pub fn with_config(chars: Vec<PhysicalChar>, config: ScrubConfig) -> Self {
        let index = SpatialIndex::new(chars, config.cell_size);
        Self { config, index }
    }

    /// The glyph index.
    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Assemble the physical text under a box, or `None` if no glyph is there.
    pub fn canonical_text(&self, page: i32, bbox: &BoundingBox) -> Option<String> {
        let mut glyphs = self.index.query(page, bbox, self.config.tolerance);
        if glyphs.is_empty() {
            return None;
        }
        glyphs.sort_by(|a, b| cmp_f32(a.bbox.center_y(), b.bbox.center_y()));

        let mut lines: Vec<Vec<&PhysicalChar>> = Vec::new();
        for glyph in glyphs {
            let same_line = lines.last().is_some_and(|line| {
                let anchor = line[0];
                (anchor.bbox.center_y() - glyph.bbox.center_y()).abs()
                    <= anchor.bbox.height().min(glyph.bbox.height()) * 0.5
            });
            if same_line {
                if let Some(line) = lines.last_mut() {
                    line.push(glyph);
                }
            } else {
                lines.push(vec![glyph]);
            }
        }

        let text = lines
            .iter_mut()
            .map(|line| {
                line.sort_by(|a, b| cmp_f32(a.bbox.center_x(), b.bbox.center_x()));
                self.join_line(line)
            })
            .collect::<Vec<_>>()
            .join(" ");

        let text: String = text.split_whitespace().collect::<Vec<_>>().join(" ").nfc().collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    fn join_line(&self, line: &[&PhysicalChar]) -> String {
        let mut result = String::new();
        let mut prev: Option<&PhysicalChar> = None;

        for &glyph in line {
            if let Some(p) = prev {
                let dx = p.bbox.center_x() - glyph.bbox.center_x();
                let dy = p.bbox.center_y() - glyph.bbox.center_y();
                if p.text == glyph.text && (dx * dx + dy * dy).sqrt() < self.config.duplicate_distance {
                    continue;
                }
                let gap = glyph.bbox.x0 - p.bbox.x1;
                let height = p.bbox.height().max(glyph.bbox.height());
                let boundary_space =
                    result.ends_with(char::is_whitespace) || glyph.text.starts_with(char::is_whitespace);
                if gap > height * self.config.word_gap_ratio && !boundary_space {
                    result.push(' ');
                }
            }
            result.push_str(&glyph.text);
            prev = Some(glyph);
        }

        result
    }

    /// Scrub one element, logging any change.
    pub fn scrub_element(&self, element: &mut ExtractedElement, log: &mut ChangeLog) -> TextProvenance {
        let provenance = match self.canonical_text(element.page, &element.bbox) {
            None => TextProvenance::NoPhysicalMatch,
            Some(canonical) => {
                element.metadata.tagged.physical = Some(canonical.clone());
                if canonical == element.text() {
                    TextProvenance::PhysicalConfirmed
                } else {
                    log::trace!(
                        "Scrub: {} '{}' -> '{}'",
                        element.id,
                        element.text(),
                        canonical
                    );
                    log.record(
                        &element.id,
                        element.text(),
                        &canonical,
                        ChangeReason::PhysicalReplacement,
                    );
                    element.replace_text(canonical);
                    TextProvenance::PhysicalReplaced
                }
            }
        };

        // A replaced element stays replaced when it is confirmed on a later run
        if !(element.metadata.provenance == TextProvenance::PhysicalReplaced
            && provenance == TextProvenance::PhysicalConfirmed)
        {
            element.metadata.provenance = provenance;
        }
        provenance
    }

    /// Scrub every free-text element and table cell on a page.
    pub fn scrub_page(&self, page: &mut PageElements, log: &mut ChangeLog) -> ScrubStats {
        let mut stats = ScrubStats::default();

        let has_content = !page.elements.is_empty() || !page.tables.is_empty();
        if has_content && !self.index.has_page(page.page) {
            log::debug!("Scrub: no physical glyphs on page {}, keeping source text", page.page);
            let issue = Issue::new(
                IssueKind::ExtractionUnavailable,
                "no physical characters; keeping best available source text",
            )
            .on_page(page.page);
            push_once(&mut page.issues, issue);
        }

        let mut issues = Vec::new();
        let elements = page
            .elements
            .iter_mut()
            .chain(page.tables.iter_mut().flat_map(|t| t.cell_elements_mut()));

        for element in elements {
            if !element.validate() {
                issues.push(
                    Issue::new(IssueKind::InvalidBoundingBox, "excluded from scrub")
                        .on_page(element.page)
                        .for_item(element.id.clone()),
                );
                element.metadata.provenance = TextProvenance::NoPhysicalMatch;
                stats.unmatched += 1;
                continue;
            }
            match self.scrub_element(element, log) {
                TextProvenance::PhysicalConfirmed => stats.confirmed += 1,
                TextProvenance::PhysicalReplaced => stats.replaced += 1,
                _ => stats.unmatched += 1,
            }
        }
        for issue in issues {
            push_once(&mut page.issues, issue);
        }

        log::debug!(
            "Scrub: page {} confirmed {}, replaced {}, unmatched {}",
            page.page,
            stats.confirmed,
            stats.replaced,
            stats.unmatched
        );
        stats
    }

    /// Scrub every `Ok` page of a document. Running it again over the
    /// result writes no new change log entries.
    pub fn scrub_document(&self, doc: &mut Document, log: &mut ChangeLog) -> ScrubStats {
        let mut total = ScrubStats::default();
        for page in doc.pages.iter_mut().filter(|p| p.status == PageStatus::Ok) {
            let stats = self.scrub_page(page, log);
            total.confirmed += stats.confirmed;
            total.replaced += stats.replaced;
            total.unmatched += stats.unmatched;
        }
        total
    }
}

fn push_once(issues: &mut Vec<Issue>, issue: Issue) {
    if !issues.contains(&issue) {
        issues.push(issue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyph(text: &str, x0: f32, y0: f32) -> PhysicalChar {
        PhysicalChar::new(text, 0, BoundingBox::new(x0, y0, x0 + 6.0, y0 + 10.0))
    }

    fn word_chars(word: &str, x0: f32, y0: f32) -> Vec<PhysicalChar> {
        word.chars()
            .enumerate()
            .map(|(i, c)| glyph(&c.to_string(), x0 + i as f32 * 6.0, y0))
            .collect()
    }

    #[test]
    fn test_index_query_respects_page_and_cells() {
        let mut chars = word_chars("ab", 0.0, 0.0);
        chars.push(glyph("z", 120.0, 120.0));
        chars.push(PhysicalChar::new("p", 1, BoundingBox::new(0.0, 0.0, 6.0, 10.0)));
        let index = SpatialIndex::new(chars, 50.0);

        let hits = index.query(0, &BoundingBox::new(0.0, 0.0, 12.0, 10.0), 2.0);
        assert_eq!(hits.len(), 2);

        let far = index.query(0, &BoundingBox::new(100.0, 100.0, 140.0, 140.0), 2.0);
        assert_eq!(far.len(), 1);
        assert_eq!(far[0].text, "z");
    }

    #[test]
    fn test_huge_query_box_visits_only_indexed_buckets() {
        let mut chars = word_chars("ab", 0.0, 0.0);
        chars.push(glyph("z", 120.0, 120.0));
        let index = SpatialIndex::new(chars, 1.0);

        let all = index.query(0, &BoundingBox::new(-1e9, -1e9, 1e9, 1e9), 0.0);
        assert_eq!(all.len(), 3);

        let empty = SpatialIndex::new(Vec::new(), 1.0);
        assert!(empty.query(0, &BoundingBox::new(0.0, 0.0, 1e9, 1e9), 0.0).is_empty());
    }

    #[test]
    fn test_rescrub_does_not_repeat_issues() {
        let scrubber = Scrubber::new(Vec::new());
        let mut page = PageElements::new(0);
        page.elements
            .push(ExtractedElement::word("w1", "Total", 0, BoundingBox::new(0.0, 0.0, 30.0, 10.0)));
        let mut log = ChangeLog::new();

        scrubber.scrub_page(&mut page, &mut log);
        scrubber.scrub_page(&mut page, &mut log);

        assert_eq!(page.issues.len(), 1);
        assert_eq!(page.issues[0].kind, IssueKind::ExtractionUnavailable);
        assert!(log.is_empty());
    }

    #[test]
    fn test_replaces_ocr_text() {
        let scrubber = Scrubber::new(word_chars("Total", 0.0, 0.0));
        let mut el = ExtractedElement::word("w1", "T0tal", 0, BoundingBox::new(0.0, 0.0, 30.0, 10.0));
        let mut log = ChangeLog::new();

        let provenance = scrubber.scrub_element(&mut el, &mut log);

        assert_eq!(provenance, TextProvenance::PhysicalReplaced);
        assert_eq!(el.text(), "Total");
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].before, "T0tal");
        assert_eq!(log.entries()[0].after, "Total");
        assert_eq!(log.entries()[0].reason.as_str(), "physical_replacement");
    }

    #[test]
    fn test_second_run_adds_no_entries() {
        let scrubber = Scrubber::new(word_chars("Total", 0.0, 0.0));
        let mut page = PageElements::new(0);
        page.elements
            .push(ExtractedElement::word("w1", "Tota1", 0, BoundingBox::new(0.0, 0.0, 30.0, 10.0)));
        let mut log = ChangeLog::new();

        scrubber.scrub_page(&mut page, &mut log);
        assert_eq!(log.len(), 1);

        let stats = scrubber.scrub_page(&mut page, &mut log);
        assert_eq!(log.len(), 1);
        assert_eq!(stats.confirmed, 1);
        assert_eq!(page.elements[0].metadata.provenance, TextProvenance::PhysicalReplaced);
    }

    #[test]
    fn test_bold_layer_duplicates_collapse() {
        let mut chars = Vec::new();
        for (i, c) in "Hi".chars().enumerate() {
            let x = i as f32 * 6.0;
            chars.push(glyph(&c.to_string(), x, 0.0));
            chars.push(glyph(&c.to_string(), x + 0.5, 0.2));
        }
        let scrubber = Scrubber::new(chars);
        assert_eq!(
            scrubber.canonical_text(0, &BoundingBox::new(0.0, 0.0, 13.0, 10.0)).as_deref(),
            Some("Hi")
        );
    }

    #[test]
    fn test_word_gap_becomes_space() {
        let mut chars = word_chars("ab", 0.0, 0.0);
        chars.extend(word_chars("cd", 30.0, 0.0));
        let scrubber = Scrubber::new(chars);
        assert_eq!(
            scrubber.canonical_text(0, &BoundingBox::new(0.0, 0.0, 42.0, 10.0)).as_deref(),
            Some("ab cd")
        );
    }

    #[test]
    fn test_output_is_nfc() {
        let chars = vec![glyph("e", 0.0, 0.0), glyph("\u{301}", 6.0, 0.0)];
        let scrubber = Scrubber::new(chars);
        assert_eq!(
            scrubber.canonical_text(0, &BoundingBox::new(0.0, 0.0, 12.0, 10.0)).as_deref(),
            Some("\u{e9}")
        );
    }

    #[test]
    fn test_no_match_keeps_text() {
        let scrubber = Scrubber::new(word_chars("x", 500.0, 500.0));
        let mut el = ExtractedElement::word("w1", "kept", 0, BoundingBox::new(0.0, 0.0, 30.0, 10.0));
        let mut log = ChangeLog::new();

        assert_eq!(scrubber.scrub_element(&mut el, &mut log), TextProvenance::NoPhysicalMatch);
        assert_eq!(el.text(), "kept");
        assert!(log.is_empty());
    }

    #[test]
    fn test_page_without_glyphs_flags_unavailable() {
        let scrubber = Scrubber::new(Vec::new());
        let mut page = PageElements::new(0);
        page.elements
            .push(ExtractedElement::word("w1", "ocr", 0, BoundingBox::new(0.0, 0.0, 30.0, 10.0)));
        let mut log = ChangeLog::new();

        let stats = scrubber.scrub_page(&mut page, &mut log);

        assert_eq!(stats.unmatched, 1);
        assert_eq!(page.issues[0].kind, IssueKind::ExtractionUnavailable);
    }
}
