//! Box merging: consolidate raw character/word boxes into text boxes.
//!
//! Raw boxes are first grouped into lines, then lines are greedily merged
//! with any box closer than the merge threshold. Table regions are detected
//! beforehand and their contents are kept out of free-text merging.

use serde::{Deserialize, Serialize};

use super::table_detector::{DetectedTable, TableDetector};
use crate::detect::MergerVariant;
use crate::error::{Issue, IssueKind};
use crate::model::{cmp_f32, BoundingBox, ElementType, ExtractedElement, Table};

/// Box merger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxMergerConfig {
    /// Maximum vertical center delta for two boxes to share a line
    pub line_y_tolerance: f32,

    /// Maximum horizontal gap between neighbours on a line
    pub line_x_gap: f32,

    /// Boxes closer than this (on both axes) are merged
    pub merge_threshold: f32,

    /// A gap wider than this fraction of the line height becomes a space
    pub space_gap_ratio: f32,

    /// Fall back to text-alignment table detection when no rules are drawn
    pub detect_stream_tables: bool,
}

impl BoxMergerConfig {
    /// Preset for an origin variant.
    pub fn for_variant(variant: MergerVariant) -> Self {
        match variant {
            MergerVariant::VectorText => Self::default(),
            MergerVariant::TableHeavy => Self {
                detect_stream_tables: true,
                ..Self::default()
            },
            MergerVariant::Dtp => Self {
                line_y_tolerance: 6.0,
                line_x_gap: 12.0,
                merge_threshold: 3.0,
                space_gap_ratio: 0.2,
                detect_stream_tables: false,
            },
        }
    }

    /// Set the merge threshold.
    pub fn with_merge_threshold(mut self, threshold: f32) -> Self {
        self.merge_threshold = threshold;
        self
    }

    /// Set the line tolerances.
    pub fn with_line_tolerances(mut self, y_tolerance: f32, x_gap: f32) -> Self {
        self.line_y_tolerance = y_tolerance;
        self.line_x_gap = x_gap;
        self
    }
}

impl Default for BoxMergerConfig {
    fn default() -> Self {
        Self {
            line_y_tolerance: 10.0,
            line_x_gap: 20.0,
            merge_threshold: 5.0,
            space_gap_ratio: 0.25,
            detect_stream_tables: false,
        }
    }
}

/// Output of the box merger for one page.
#[derive(Debug, Clone, Default)]
pub struct BoxMergeOutput {
    /// Consolidated free-text boxes in reading order
    pub text_boxes: Vec<ExtractedElement>,

    /// Tables detected on the page
    pub tables: Vec<Table>,

    /// Regions whose text has been consumed (for purging)
    pub consumed: Vec<BoundingBox>,

    /// Problems found while merging
    pub issues: Vec<Issue>,
}

/// A run of boxes sharing a line.
#[derive(Debug, Clone)]
struct TextLine<'a> {
    members: Vec<&'a ExtractedElement>,
    bbox: BoundingBox,
}

impl<'a> TextLine<'a> {
    fn new(el: &'a ExtractedElement) -> Self {
        Self {
            members: vec![el],
            bbox: el.bbox,
        }
    }

    fn push(&mut self, el: &'a ExtractedElement) {
        self.bbox = self.bbox.union(&el.bbox);
        self.members.push(el);
    }

    /// Join member texts left to right, inserting spaces at wide gaps.
    fn text(&self, space_gap_ratio: f32) -> String {
        let mut members = self.members.clone();
        members.sort_by(|a, b| cmp_f32(a.bbox.x0, b.bbox.x0));

        let height = members.iter().map(|m| m.bbox.height()).fold(0.0, f32::max);
        let threshold = height * space_gap_ratio;
        let mut result = String::new();

        for (i, member) in members.iter().enumerate() {
            if i > 0 {
                let prev = members[i - 1];
                let gap = member.bbox.x0 - prev.bbox.x1;
                let boundary_space =
                    result.ends_with(char::is_whitespace) || member.text().starts_with(char::is_whitespace);
                if gap > threshold && !boundary_space {
                    result.push(' ');
                }
            }
            result.push_str(member.text());
        }

        result
    }
}

/// Consolidates raw boxes into text boxes and tables.
pub struct BoxMerger {
    config: BoxMergerConfig,
    detector: TableDetector,
}

impl BoxMerger {
    /// Create a merger with default configuration.
    pub fn new() -> Self {
        Self::with_config(BoxMergerConfig::default())
    }

    /// Create a merger for an origin variant.
    pub fn for_variant(variant: MergerVariant) -> Self {
        Self::with_config(BoxMergerConfig::for_variant(variant))
    }

    /// Create a merger with custom configuration.
    pub fn with_config(config: BoxMergerConfig) -> Self {
        Self {
            config,
            detector: TableDetector::new(),
        }
    }

    /// Access the configuration.
    pub fn config(&self) -> &BoxMergerConfig {
        &self.config
    }

    /// Merge the raw boxes of one page.
    ///
    /// `rules` are the drawn line/rect segments used for table detection.
    pub fn merge(&self, page: i32, raw: &[ExtractedElement], rules: &[BoundingBox]) -> BoxMergeOutput {
        let mut output = BoxMergeOutput::default();

        let mut valid: Vec<ExtractedElement> = Vec::with_capacity(raw.len());
        for el in raw {
            if el.validate() {
                valid.push(el.clone());
            } else {
                log::debug!("BoxMerger: excluding invalid element {} on page {}", el.id, page);
                output.issues.push(
                    Issue::new(IssueKind::InvalidBoundingBox, "excluded from box merging")
                        .on_page(page)
                        .for_item(el.id.clone()),
                );
            }
        }

        let mut detected = self.detector.detect_ruled(page, &valid, rules);
        if detected.is_empty() && self.config.detect_stream_tables && rules.is_empty() {
            detected = self.detector.detect_stream(page, &valid);
        }

        let free: Vec<&ExtractedElement> = valid
            .iter()
            .filter(|el| !inside_any_table(el, &detected))
            .collect();

        log::debug!(
            "BoxMerger: page {} has {} raw boxes, {} tables, {} free boxes",
            page,
            raw.len(),
            detected.len(),
            free.len()
        );

        let lines = self.group_into_lines(free);
        output.text_boxes = self.merge_nearby(lines);

        output.consumed = output
            .text_boxes
            .iter()
            .map(|b| b.bbox)
            .chain(detected.iter().map(|t| t.bbox))
            .collect();
        output.tables = detected.into_iter().map(|t| t.table).collect();

        output
    }

    /// Group boxes into lines.
    ///
    /// Two boxes share a line when their vertical centers are within
    /// `line_y_tolerance` and the horizontal gap is at most `line_x_gap`.
    fn group_into_lines<'a>(&self, mut boxes: Vec<&'a ExtractedElement>) -> Vec<TextLine<'a>> {
        boxes.sort_by(|a, b| {
            cmp_f32(a.bbox.center_y(), b.bbox.center_y()).then(cmp_f32(a.bbox.x0, b.bbox.x0))
        });

        let mut lines: Vec<TextLine<'a>> = Vec::new();
        for el in boxes {
            let target = lines.iter_mut().rev().find(|line| {
                (line.bbox.center_y() - el.bbox.center_y()).abs() <= self.config.line_y_tolerance
                    && line.bbox.h_gap(&el.bbox) <= self.config.line_x_gap
            });
            match target {
                Some(line) => line.push(el),
                None => lines.push(TextLine::new(el)),
            }
        }

        lines.sort_by(|a, b| cmp_f32(a.bbox.y0, b.bbox.y0).then(cmp_f32(a.bbox.x0, b.bbox.x0)));
        lines
    }

    /// Greedily merge lines closer than the merge threshold.
    ///
    /// Each unassigned line seeds a group and absorbs later lines near the
    /// group's current bounds in a single pass. A line skipped before the
    /// group grew towards it is not revisited, so this is not a transitive
    /// closure.
    fn merge_nearby(&self, lines: Vec<TextLine<'_>>) -> Vec<ExtractedElement> {
        let threshold = self.config.merge_threshold;
        let mut used = vec![false; lines.len()];
        let mut result = Vec::new();

        for i in 0..lines.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let mut group = vec![i];
            let mut bbox = lines[i].bbox;

            for j in (i + 1)..lines.len() {
                if used[j] {
                    continue;
                }
                let other = &lines[j].bbox;
                if bbox.h_gap(other).max(bbox.v_gap(other)) < threshold {
                    used[j] = true;
                    group.push(j);
                    bbox = bbox.union(other);
                }
            }

            result.push(self.build_box(&lines, &group, bbox));
        }

        result
    }

    fn build_box(&self, lines: &[TextLine<'_>], group: &[usize], bbox: BoundingBox) -> ExtractedElement {
        if group.len() == 1 && lines[group[0]].members.len() == 1 {
            return lines[group[0]].members[0].clone();
        }

        let mut ordered: Vec<&TextLine<'_>> = group.iter().map(|&i| &lines[i]).collect();
        ordered.sort_by(|a, b| cmp_f32(a.bbox.y0, b.bbox.y0).then(cmp_f32(a.bbox.x0, b.bbox.x0)));

        let text = ordered
            .iter()
            .map(|l| l.text(self.config.space_gap_ratio))
            .collect::<Vec<_>>()
            .join("\n");

        let mut members: Vec<&ExtractedElement> =
            ordered.iter().flat_map(|l| l.members.iter().copied()).collect();
        members.sort_by(|a, b| cmp_f32(a.bbox.y0, b.bbox.y0).then(cmp_f32(a.bbox.x0, b.bbox.x0)));

        let first = members[0];
        let confidence = members.iter().map(|m| m.confidence).fold(1.0, f32::min);
        let ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();

        ExtractedElement::new(
            merged_id(&ids),
            text,
            first.page,
            bbox,
            ElementType::TextBox,
            first.source,
        )
        .with_confidence(confidence)
        .with_merged_from(ids)
    }
}

impl Default for BoxMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Id for an element built from several inputs.
pub(crate) fn merged_id(ids: &[String]) -> String {
    match ids {
        [] => String::new(),
        [only] => only.clone(),
        [first, ..] => format!("{}~{}", first, ids.len()),
    }
}

fn inside_any_table(el: &ExtractedElement, tables: &[DetectedTable]) -> bool {
    let (cx, cy) = el.bbox.center();
    tables.iter().any(|t| t.bbox.contains_point(cx, cy, 0.0))
}
