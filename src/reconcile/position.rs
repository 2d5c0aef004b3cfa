//! Position merger: deduplicate blocks from several extraction sources.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Issue, IssueKind};
use crate::model::{cmp_f32, ExtractedElement, Source};

/// Maximum number of streams merged at once.
pub const MAX_STREAMS: usize = 3;

/// Position merger configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionMergeConfig {
    /// Overlap ratio (intersection / smaller area) above which blocks cluster
    pub overlap_threshold: f32,

    /// Maximum Y-center delta between clustered blocks
    pub max_center_delta: f32,
}

impl Default for PositionMergeConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.5,
            max_center_delta: 50.0,
        }
    }
}

/// A labeled stream of blocks from one source.
#[derive(Debug, Clone)]
pub struct BlockStream {
    /// Source label of the stream
    pub source: Source,

    /// Blocks in any order
    pub blocks: Vec<ExtractedElement>,

    /// Whether this stream is the final word over its feeders
    pub authoritative: bool,

    /// Streams this one was derived from
    pub feeders: Vec<Source>,
}

impl BlockStream {
    /// Create a plain stream.
    pub fn new(source: Source, blocks: Vec<ExtractedElement>) -> Self {
        Self {
            source,
            blocks,
            authoritative: false,
            feeders: Vec::new(),
        }
    }

    /// Mark the stream authoritative over `feeders`.
    pub fn authoritative_over(mut self, feeders: impl IntoIterator<Item = Source>) -> Self {
        self.authoritative = true;
        self.feeders = feeders.into_iter().collect();
        self
    }
}

/// Output of the position merger.
#[derive(Debug, Clone, Default)]
pub struct PositionMergeOutput {
    /// Winning blocks ordered by (page, y0, x0)
    pub blocks: Vec<ExtractedElement>,

    /// Blocks dropped as duplicates of a winner
    pub suppressed: usize,

    /// Streams excluded because an authoritative stream covered them
    pub excluded: Vec<Source>,

    /// Problems found while merging
    pub issues: Vec<Issue>,
}

/// Merges block streams into one position-ordered stream.
pub struct PositionMerger {
    config: PositionMergeConfig,
}

impl PositionMerger {
    /// Create a merger with default configuration.
    pub fn new() -> Self {
        Self::with_config(PositionMergeConfig::default())
    }

    /// Create a merger with custom configuration.
    pub fn with_config(config: PositionMergeConfig) -> Self {
        Self { config }
    }

    /// Merge up to [`MAX_STREAMS`] streams.
    pub fn merge(&self, mut streams: Vec<BlockStream>) -> PositionMergeOutput {
        let mut output = PositionMergeOutput::default();

        if streams.len() > MAX_STREAMS {
            log::warn!(
                "PositionMerger: {} streams given, ignoring all but the first {}",
                streams.len(),
                MAX_STREAMS
            );
            streams.truncate(MAX_STREAMS);
        }

        let excluded: HashSet<Source> = streams
            .iter()
            .filter(|s| s.authoritative && !s.blocks.is_empty())
            .flat_map(|s| s.feeders.iter().copied())
            .collect();

        let mut blocks: Vec<ExtractedElement> = Vec::new();
        for stream in streams {
            if excluded.contains(&stream.source) && !stream.authoritative {
                log::debug!(
                    "PositionMerger: dropping {} stream covered by an authoritative stream",
                    stream.source.label()
                );
                output.excluded.push(stream.source);
                continue;
            }
            for block in stream.blocks {
                if block.validate() {
                    blocks.push(block);
                } else {
                    output.issues.push(
                        Issue::new(IssueKind::InvalidBoundingBox, "excluded from position merge")
                            .on_page(block.page)
                            .for_item(block.id.clone()),
                    );
                }
            }
        }

        sort_reading_order(&mut blocks);
        let total = blocks.len();
        let clusters = self.cluster(&blocks);

        let mut winners: Vec<ExtractedElement> = clusters
            .into_iter()
            .filter_map(|cluster| pick_winner(&blocks, &cluster))
            .map(|i| blocks[i].clone())
            .collect();
        sort_reading_order(&mut winners);

        output.suppressed = total - winners.len();
        log::debug!(
            "PositionMerger: {} blocks -> {} winners ({} suppressed)",
            total,
            winners.len(),
            output.suppressed
        );
        output.blocks = winners;
        output
    }

    /// Assign each block to the first cluster holding an overlapping member.
    fn cluster(&self, blocks: &[ExtractedElement]) -> Vec<Vec<usize>> {
        let mut clusters: Vec<Vec<usize>> = Vec::new();

        for (i, block) in blocks.iter().enumerate() {
            let target = clusters.iter_mut().find(|cluster| {
                cluster.iter().any(|&j| self.duplicates(&blocks[j], block))
            });
            match target {
                Some(cluster) => cluster.push(i),
                None => clusters.push(vec![i]),
            }
        }

        clusters
    }

    fn duplicates(&self, a: &ExtractedElement, b: &ExtractedElement) -> bool {
        a.page == b.page
            && (a.bbox.center_y() - b.bbox.center_y()).abs() <= self.config.max_center_delta
            && a.bbox.overlap_ratio(&b.bbox) > self.config.overlap_threshold
    }
}

impl Default for PositionMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowest source priority wins, then highest confidence, then earliest.
fn pick_winner(blocks: &[ExtractedElement], cluster: &[usize]) -> Option<usize> {
    cluster.iter().copied().min_by(|&a, &b| {
        let (ba, bb) = (&blocks[a], &blocks[b]);
        ba.source
            .priority()
            .cmp(&bb.source.priority())
            .then(cmp_f32(bb.confidence, ba.confidence))
            .then(a.cmp(&b))
    })
}

fn sort_reading_order(blocks: &mut [ExtractedElement]) {
    blocks.sort_by(|a, b| {
        a.page
            .cmp(&b.page)
            .then(cmp_f32(a.bbox.y0, b.bbox.y0))
            .then(cmp_f32(a.bbox.x0, b.bbox.x0))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, ElementType};

    fn block(id: &str, source: Source, x0: f32, y0: f32, x1: f32, y1: f32) -> ExtractedElement {
        ExtractedElement::new(id, id, 0, BoundingBox::new(x0, y0, x1, y1), ElementType::TextBox, source)
    }

    #[test]
    fn test_paragraph_beats_ocr() {
        let paragraphs = BlockStream::new(
            Source::ParagraphGrouper,
            vec![block("para", Source::ParagraphGrouper, 0.0, 0.0, 100.0, 20.0)],
        );
        let ocr = BlockStream::new(
            Source::Ocr,
            vec![
                block("ocr-dup", Source::Ocr, 2.0, 1.0, 98.0, 19.0),
                block("ocr-only", Source::Ocr, 0.0, 200.0, 100.0, 220.0),
            ],
        );

        let output = PositionMerger::new().merge(vec![ocr, paragraphs]);

        let ids: Vec<&str> = output.blocks.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["para", "ocr-only"]);
        assert_eq!(output.suppressed, 1);
    }

    #[test]
    fn test_confidence_breaks_ties() {
        let low = block("low", Source::Ocr, 0.0, 0.0, 50.0, 10.0).with_confidence(0.4);
        let high = block("high", Source::Ocr, 1.0, 0.0, 50.0, 10.0).with_confidence(0.9);
        let output = PositionMerger::new().merge(vec![BlockStream::new(Source::Ocr, vec![low, high])]);
        assert_eq!(output.blocks.len(), 1);
        assert_eq!(output.blocks[0].id, "high");
    }

    #[test]
    fn test_authoritative_excludes_feeders() {
        let vision = BlockStream::new(
            Source::VisionAi,
            vec![block("v", Source::VisionAi, 0.0, 0.0, 50.0, 10.0)],
        )
        .authoritative_over([Source::Ocr]);
        let ocr = BlockStream::new(
            Source::Ocr,
            vec![block("o", Source::Ocr, 0.0, 300.0, 50.0, 310.0)],
        );

        let output = PositionMerger::new().merge(vec![vision, ocr]);

        assert_eq!(output.blocks.len(), 1);
        assert_eq!(output.blocks[0].id, "v");
        assert_eq!(output.excluded, vec![Source::Ocr]);
    }

    #[test]
    fn test_empty_authoritative_keeps_feeders() {
        let vision = BlockStream::new(Source::VisionAi, Vec::new()).authoritative_over([Source::Ocr]);
        let ocr = BlockStream::new(Source::Ocr, vec![block("o", Source::Ocr, 0.0, 0.0, 50.0, 10.0)]);

        let output = PositionMerger::new().merge(vec![vision, ocr]);
        assert_eq!(output.blocks.len(), 1);
        assert!(output.excluded.is_empty());
    }

    #[test]
    fn test_far_centers_do_not_cluster() {
        // Overlap ratio is 1.0 (small box inside a tall one) but centers are 90 apart
        let tall = block("tall", Source::Physical, 0.0, 0.0, 100.0, 200.0);
        let small = block("small", Source::Ocr, 10.0, 5.0, 50.0, 15.0);
        let output = PositionMerger::new().merge(vec![BlockStream::new(Source::Physical, vec![tall, small])]);
        assert_eq!(output.blocks.len(), 2);
    }

    #[test]
    fn test_invalid_blocks_reported() {
        let bad = block("bad", Source::Ocr, 10.0, 0.0, 5.0, 10.0);
        let output = PositionMerger::new().merge(vec![BlockStream::new(Source::Ocr, vec![bad])]);
        assert!(output.blocks.is_empty());
        assert_eq!(output.issues[0].kind, IssueKind::InvalidBoundingBox);
    }
}
