//! Paragraph grouping for non-table text.

use serde::{Deserialize, Serialize};

use super::box_merger::merged_id;
use crate::model::{cmp_f32, BoundingBox, ElementType, ExtractedElement, Source};

/// Paragraph grouper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParagraphConfig {
    /// Maximum Y delta between blocks on the same line
    pub line_y_delta: f32,

    /// Inter-line gap above which a new paragraph starts
    pub paragraph_gap: f32,
}

impl Default for ParagraphConfig {
    fn default() -> Self {
        Self {
            line_y_delta: 5.0,
            paragraph_gap: 15.0,
        }
    }
}

/// Groups free-text blocks into paragraphs.
pub struct ParagraphGrouper {
    config: ParagraphConfig,
}

impl ParagraphGrouper {
    /// Create a grouper with default configuration.
    pub fn new() -> Self {
        Self::with_config(ParagraphConfig::default())
    }

    /// Create a grouper with custom configuration.
    pub fn with_config(config: ParagraphConfig) -> Self {
        Self { config }
    }

    /// Group blocks into paragraph elements.
    ///
    /// Blocks fully contained in any of `table_regions` are dropped. Blocks
    /// with invalid geometry are ignored. Output is in reading order, one
    /// element per paragraph.
    pub fn group(
        &self,
        blocks: &[ExtractedElement],
        table_regions: &[(i32, BoundingBox)],
    ) -> Vec<ExtractedElement> {
        let mut remaining: Vec<&ExtractedElement> = blocks
            .iter()
            .filter(|b| b.validate())
            .filter(|b| {
                !table_regions
                    .iter()
                    .any(|(page, region)| *page == b.page && region.contains(&b.bbox))
            })
            .collect();

        remaining.sort_by(|a, b| {
            a.page
                .cmp(&b.page)
                .then(cmp_f32(a.bbox.y0, b.bbox.y0))
                .then(cmp_f32(a.bbox.x0, b.bbox.x0))
        });

        let lines = self.group_into_lines(remaining);
        let paragraphs = self.group_into_paragraphs(lines);

        log::debug!(
            "ParagraphGrouper: {} blocks -> {} paragraphs",
            blocks.len(),
            paragraphs.len()
        );

        paragraphs.into_iter().map(build_paragraph).collect()
    }

    fn group_into_lines<'a>(&self, blocks: Vec<&'a ExtractedElement>) -> Vec<Vec<&'a ExtractedElement>> {
        let mut lines: Vec<Vec<&'a ExtractedElement>> = Vec::new();

        for block in blocks {
            let same_line = lines.last().is_some_and(|line| {
                line[0].page == block.page
                    && (line[0].bbox.y0 - block.bbox.y0).abs() <= self.config.line_y_delta
            });
            if same_line {
                if let Some(line) = lines.last_mut() {
                    line.push(block);
                }
            } else {
                lines.push(vec![block]);
            }
        }

        for line in &mut lines {
            line.sort_by(|a, b| cmp_f32(a.bbox.x0, b.bbox.x0));
        }
        lines
    }

    fn group_into_paragraphs<'a>(
        &self,
        lines: Vec<Vec<&'a ExtractedElement>>,
    ) -> Vec<Vec<Vec<&'a ExtractedElement>>> {
        let mut paragraphs: Vec<Vec<Vec<&'a ExtractedElement>>> = Vec::new();
        let mut prev_bottom: Option<(i32, f32)> = None;

        for line in lines {
            let page = line[0].page;
            let top = line.iter().map(|b| b.bbox.y0).fold(f32::MAX, f32::min);
            let bottom = line.iter().map(|b| b.bbox.y1).fold(f32::MIN, f32::max);

            let starts_new = match prev_bottom {
                Some((prev_page, prev)) => prev_page != page || top - prev > self.config.paragraph_gap,
                None => true,
            };

            if starts_new {
                paragraphs.push(vec![line]);
            } else if let Some(current) = paragraphs.last_mut() {
                current.push(line);
            }

            prev_bottom = Some((page, bottom));
        }

        paragraphs
    }
}

impl Default for ParagraphGrouper {
    fn default() -> Self {
        Self::new()
    }
}

fn build_paragraph(lines: Vec<Vec<&ExtractedElement>>) -> ExtractedElement {
    let members: Vec<&ExtractedElement> = lines.iter().flatten().copied().collect();
    let bbox = BoundingBox::union_all(members.iter().map(|m| &m.bbox))
        .unwrap_or(members[0].bbox);
    let text = lines
        .iter()
        .map(|line| {
            line.iter()
                .map(|b| b.text().trim())
                .filter(|t| !t.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let ids: Vec<String> = members.iter().map(|m| m.id.clone()).collect();
    let confidence = members.iter().map(|m| m.confidence).fold(1.0, f32::min);

    ExtractedElement::new(
        format!("para:{}", merged_id(&ids)),
        text,
        members[0].page,
        bbox,
        ElementType::Paragraph,
        Source::ParagraphGrouper,
    )
    .with_confidence(confidence)
    .with_merged_from(ids)
}
