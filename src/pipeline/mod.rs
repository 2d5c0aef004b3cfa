//! End-to-end reconciliation of one or many documents.
//!
//! A [`Pipeline`] owns its options, the merge suggester and the domain
//! registry. Every document run builds its own spatial index, change log and
//! column maps, so documents never share mutable state and batches can run in
//! parallel.
//!
//! # Example
//!
//! ```ignore
//! use docweave::pipeline::{DocumentInput, PageInput, Pipeline};
//!
//! let pipeline = Pipeline::new();
//! let input = DocumentInput::new("doc-1").with_page(PageInput::new(0).with_tokens(tokens));
//! let result = pipeline.process_document(&input);
//! println!("{}", result.document.plain_text());
//! ```

mod options;
mod result;

pub use options::PipelineOptions;
pub use result::{PipelineResult, PipelineStats};

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::detect::OriginTag;
use crate::domain::{DomainContext, DomainRegistry};
use crate::error::Issue;
use crate::layout::{BoxMerger, BoxMergerConfig, MemoryCanvas, ParagraphGrouper, Purger};
use crate::model::{
    BoundingBox, Document, ExtractedElement, PageElements, PhysicalChar, Source,
    Table, TableResult,
};
use crate::package::Packager;
use crate::reconcile::{
    BlockStream, BoundedSuggester, ChainMerger, ChangeLog, MergeSuggester, NoopSuggester,
    PageImage, PositionMerger, Scrubber,
};
use crate::table::{GlobalColumnMap, HeaderEnricher, HeaderMap};

/// Column map and header layout produced upstream for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableLayout {
    /// Panel columns to global columns
    pub map: GlobalColumnMap,
    /// Declared header rows and columns
    pub header: HeaderMap,
}

impl TableLayout {
    /// Create a layout.
    pub fn new(map: GlobalColumnMap, header: HeaderMap) -> Self {
        Self { map, header }
    }
}

/// Everything the extraction back-ends produced for one page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PageInput {
    /// Page index (0-based)
    pub page: i32,

    /// Raw character or word boxes, in reading order
    pub tokens: Vec<ExtractedElement>,

    /// Drawn line and rectangle segments
    pub rules: Vec<BoundingBox>,

    /// Ground-truth glyphs from the physical text layer
    pub physical_chars: Vec<PhysicalChar>,

    /// Blocks read by OCR
    pub ocr_blocks: Vec<ExtractedElement>,

    /// Blocks transcribed by a vision model
    pub vision_blocks: Vec<ExtractedElement>,

    /// Tables recognized upstream, possibly split into panels
    pub tables: Vec<Table>,

    /// Rendered page handed to the suggester
    #[serde(skip)]
    pub image: Option<PageImage>,
}

impl PageInput {
    /// Create an empty page.
    pub fn new(page: i32) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    /// Set the raw tokens.
    pub fn with_tokens(mut self, tokens: Vec<ExtractedElement>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Set the drawn rules.
    pub fn with_rules(mut self, rules: Vec<BoundingBox>) -> Self {
        self.rules = rules;
        self
    }

    /// Set the physical glyphs.
    pub fn with_physical_chars(mut self, chars: Vec<PhysicalChar>) -> Self {
        self.physical_chars = chars;
        self
    }

    /// Set the OCR blocks.
    pub fn with_ocr_blocks(mut self, blocks: Vec<ExtractedElement>) -> Self {
        self.ocr_blocks = blocks;
        self
    }

    /// Set the vision blocks.
    pub fn with_vision_blocks(mut self, blocks: Vec<ExtractedElement>) -> Self {
        self.vision_blocks = blocks;
        self
    }

    /// Add an upstream table.
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    /// Set the page image.
    pub fn with_image(mut self, image: PageImage) -> Self {
        self.image = Some(image);
        self
    }

    /// Check if no back-end produced anything for the page.
    pub fn is_blank(&self) -> bool {
        self.tokens.is_empty()
            && self.ocr_blocks.is_empty()
            && self.vision_blocks.is_empty()
            && self.tables.is_empty()
    }
}

/// One document handed to the pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentInput {
    /// Document id
    pub id: String,

    /// Document title, also sniffed by domain handlers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Origin selecting the box merger variant
    pub origin: OriginTag,

    /// Pages in order
    pub pages: Vec<PageInput>,

    /// Upstream layouts keyed by table id
    pub layouts: BTreeMap<String, TableLayout>,
}

impl DocumentInput {
    /// Create an empty document input.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the origin tag.
    pub fn with_origin(mut self, origin: OriginTag) -> Self {
        self.origin = origin;
        self
    }

    /// Add a page.
    pub fn with_page(mut self, page: PageInput) -> Self {
        self.pages.push(page);
        self
    }

    /// Add an upstream layout for a table.
    pub fn with_layout(mut self, table_id: impl Into<String>, layout: TableLayout) -> Self {
        self.layouts.insert(table_id.into(), layout);
        self
    }
}

/// Runs every reconciliation stage over documents.
#[derive(Clone)]
pub struct Pipeline {
    options: PipelineOptions,
    suggester: Arc<dyn MergeSuggester>,
    registry: Arc<DomainRegistry>,
}

impl Pipeline {
    /// Create a pipeline with default options, no suggester and the
    /// built-in domain handlers.
    pub fn new() -> Self {
        Self::with_options(PipelineOptions::default())
    }

    /// Create a pipeline with custom options.
    pub fn with_options(options: PipelineOptions) -> Self {
        Self {
            options,
            suggester: Arc::new(NoopSuggester),
            registry: Arc::new(DomainRegistry::with_defaults()),
        }
    }

    /// Set the merge suggester.
    pub fn with_suggester(mut self, suggester: Arc<dyn MergeSuggester>) -> Self {
        self.suggester = suggester;
        self
    }

    /// Set the domain registry.
    pub fn with_registry(mut self, registry: DomainRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Access the options.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Access the domain registry.
    pub fn registry(&self) -> &DomainRegistry {
        &self.registry
    }

    /// Process one document. Never fails: problems surface as issues.
    pub fn process_document(&self, input: &DocumentInput) -> PipelineResult {
        let variant = input.origin.variant();
        log::debug!(
            "Pipeline: document {} ({} pages, variant {:?})",
            input.id,
            input.pages.len(),
            variant
        );

        let suggester = self.bounded_suggester();
        let box_config = self
            .options
            .box_merger
            .clone()
            .unwrap_or_else(|| BoxMergerConfig::for_variant(variant));
        let stages = Stages {
            box_merger: BoxMerger::with_config(box_config),
            purger: Purger::with_max_sweeps(self.options.max_purge_sweeps),
            chain: ChainMerger::with_config(self.options.chain_guard.clone()),
            grouper: ParagraphGrouper::with_config(self.options.paragraph.clone()),
            position: PositionMerger::with_config(self.options.position.clone()),
            suggester: suggester.as_ref(),
        };

        let chars: Vec<PhysicalChar> = input
            .pages
            .iter()
            .flat_map(|p| p.physical_chars.iter().cloned())
            .collect();
        let scrubber = Scrubber::with_config(chars, self.options.scrub.clone());

        let mut doc = Document::new(input.id.clone());
        doc.metadata.title = input.title.clone();
        doc.metadata.origin = input.origin.clone();
        doc.metadata.variant = variant;
        doc.metadata.processed_at = Some(Utc::now());

        let mut change_log = ChangeLog::new();
        let mut stats = PipelineStats::new();

        for page_input in &input.pages {
            let page = self.process_page(page_input, &stages, &mut stats);
            stats.record_page(page.status);
            doc.pages.push(page);
        }

        let scrub = scrubber.scrub_document(&mut doc, &mut change_log);
        stats.scrub_confirmed += scrub.confirmed;
        stats.scrub_replaced += scrub.replaced;
        stats.scrub_unmatched += scrub.unmatched;

        let mut issues: Vec<Issue> = doc.page_issues().cloned().collect();
        doc.tables = self.interpret_tables(&doc, input, &mut issues, &mut stats);

        let package = Packager::with_options(self.options.package.clone()).package(&doc);

        log::debug!(
            "Pipeline: document {} done ({} ok, {} skipped, {} failed, {} text changes, {} issues)",
            doc.id,
            stats.pages_ok,
            stats.pages_skipped,
            stats.pages_failed,
            change_log.len(),
            issues.len()
        );

        PipelineResult {
            document: doc,
            change_log,
            issues,
            package,
            stats,
        }
    }

    /// Process several documents; on the rayon pool when `parallel` is set.
    pub fn process_batch(&self, inputs: &[DocumentInput]) -> Vec<PipelineResult> {
        if self.options.parallel {
            inputs.par_iter().map(|input| self.process_document(input)).collect()
        } else {
            inputs.iter().map(|input| self.process_document(input)).collect()
        }
    }

    /// Process one document on the blocking pool.
    #[cfg(feature = "async")]
    pub async fn process_document_async(&self, input: DocumentInput) -> crate::Result<PipelineResult> {
        let pipeline = self.clone();
        tokio::task::spawn_blocking(move || pipeline.process_document(&input))
            .await
            .map_err(|e| crate::Error::Task(format!("Task join error: {}", e)))
    }

    fn bounded_suggester(&self) -> Arc<dyn MergeSuggester> {
        match self.options.suggester_timeout_ms {
            _ if self.suggester.is_noop() => self.suggester.clone(),
            0 => self.suggester.clone(),
            ms => Arc::new(BoundedSuggester::new(
                self.suggester.clone(),
                Duration::from_millis(ms),
            )),
        }
    }

    fn process_page(&self, input: &PageInput, stages: &Stages<'_>, stats: &mut PipelineStats) -> PageElements {
        if input.page < 0 {
            log::warn!("Pipeline: page index {} is negative, skipping", input.page);
            return PageElements::failed(input.page, format!("invalid page index {}", input.page));
        }
        if input.is_blank() {
            log::debug!("Pipeline: page {} has no content", input.page);
            return PageElements::blank(input.page, "no tokens, blocks or tables");
        }

        let mut page = PageElements::new(input.page);
        stats.token_count += input.tokens.len();

        let chain = stages
            .chain
            .run(input.page, &input.tokens, input.image.as_ref(), stages.suggester);
        stats.merges_applied += chain.applied;
        stats.merges_rejected += chain.rejected;
        if chain.degraded {
            stats.suggester_degraded += 1;
        }
        page.issues.extend(chain.issues);

        let boxes = stages.box_merger.merge(input.page, &chain.elements, &input.rules);
        stats.text_box_count += boxes.text_boxes.len();
        page.issues.extend(boxes.issues);

        let mut canvas = MemoryCanvas::new(input.physical_chars.clone());
        let (report, residual) = stages.purger.purge(input.page, &mut canvas, &boxes.consumed);
        stats.purge_sweeps += report.iterations;
        page.issues.extend(residual);
        page.residual_chars = canvas.into_chars();

        page.tables = boxes.tables;
        page.tables.extend(input.tables.iter().cloned());
        let regions: Vec<(i32, BoundingBox)> = page
            .tables
            .iter()
            .filter_map(|t| t.bbox().map(|b| (t.page, b)))
            .collect();

        let paragraphs = stages.grouper.group(&boxes.text_boxes, &regions);
        stats.paragraph_count += paragraphs.len();

        let outside = |blocks: &[ExtractedElement]| -> Vec<ExtractedElement> {
            blocks
                .iter()
                .filter(|b| !regions.iter().any(|(p, r)| *p == b.page && r.contains(&b.bbox)))
                .cloned()
                .collect()
        };
        let streams = [
            (Source::ParagraphGrouper, paragraphs),
            (Source::Ocr, outside(&input.ocr_blocks)),
            (Source::VisionAi, outside(&input.vision_blocks)),
        ];
        let streams: Vec<BlockStream> = streams
            .into_iter()
            .map(|(source, blocks)| {
                let stream = BlockStream::new(source, blocks);
                if self.options.authoritative_source == Some(source) {
                    stream.authoritative_over(self.options.feeders_of(source))
                } else {
                    stream
                }
            })
            .collect();

        let merged = stages.position.merge(streams);
        stats.duplicates_suppressed += merged.suppressed;
        page.issues.extend(merged.issues);
        page.elements = merged.blocks;

        page
    }

    fn interpret_tables(
        &self,
        doc: &Document,
        input: &DocumentInput,
        issues: &mut Vec<Issue>,
        stats: &mut PipelineStats,
    ) -> Vec<TableResult> {
        let enricher = HeaderEnricher::new();
        let title = input.title.as_deref();

        let mut results = Vec::new();
        for table in doc.raw_tables().filter(|t| !t.is_empty()) {
            let (map, header) = match input.layouts.get(&table.id) {
                Some(layout) => (layout.map.clone(), layout.header.clone()),
                None => {
                    let map = GlobalColumnMap::sequential(table);
                    let header = HeaderMap::from_table(table, &map);
                    (map, header)
                }
            };

            let mut enriched = enricher.enrich(table, &map, &header);
            issues.extend(enriched.issues.iter().cloned());
            if enriched.title.is_none() {
                enriched.title = title.map(str::to_string);
            }

            let mut ctx = DomainContext::for_table(doc.id.clone(), &enriched);
            if let Some(year) = self.options.reference_year {
                ctx = ctx.with_reference_year(year);
            }
            let (interpretation, mismatches) = self.registry.interpret(&enriched, &ctx);
            issues.extend(mismatches);

            stats.table_count += 1;
            if interpretation.handler().is_some() {
                stats.domain_tables += 1;
            }
            results.push(TableResult {
                enriched,
                interpretation,
            });
        }
        results
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

struct Stages<'a> {
    box_merger: BoxMerger,
    purger: Purger,
    chain: ChainMerger,
    grouper: ParagraphGrouper,
    position: PositionMerger,
    suggester: &'a dyn MergeSuggester,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IssueKind;
    use crate::model::{ElementType, PageStatus, TableCell, TablePanel};

    fn word(id: &str, text: &str, x0: f32, y0: f32, x1: f32, y1: f32) -> ExtractedElement {
        ExtractedElement::word(id, text, 0, BoundingBox::new(x0, y0, x1, y1))
    }

    fn glyphs(text: &str, x0: f32, y0: f32, width: f32, height: f32) -> Vec<PhysicalChar> {
        text.chars()
            .enumerate()
            .map(|(i, c)| {
                let x = x0 + i as f32 * width;
                PhysicalChar::new(c.to_string(), 0, BoundingBox::new(x, y0, x + width, y0 + height))
            })
            .collect()
    }

    #[test]
    fn test_blank_and_invalid_pages() {
        let input = DocumentInput::new("d")
            .with_page(PageInput::new(0))
            .with_page(PageInput::new(-1).with_tokens(vec![word("a", "A", 0.0, 0.0, 5.0, 5.0)]));
        let result = Pipeline::new().process_document(&input);

        assert_eq!(result.document.pages[0].status, PageStatus::BlankSkip);
        assert_eq!(result.document.pages[1].status, PageStatus::Error);
        assert_eq!(result.stats.pages_skipped, 1);
        assert_eq!(result.stats.pages_failed, 1);
        assert!(result.change_log.is_empty());
    }

    #[test]
    fn test_tokens_become_paragraph() {
        let tokens = vec![
            word("w1", "Hello", 10.0, 10.0, 40.0, 20.0),
            word("w2", "world", 45.0, 10.0, 75.0, 20.0),
        ];
        let input = DocumentInput::new("d").with_page(PageInput::new(0).with_tokens(tokens));
        let result = Pipeline::new().process_document(&input);

        let page = &result.document.pages[0];
        assert_eq!(page.status, PageStatus::Ok);
        assert_eq!(page.elements.len(), 1);
        assert_eq!(page.elements[0].kind, ElementType::Paragraph);
        assert!(page.elements[0].text().contains("Hello"));
        assert!(page.elements[0].text().contains("world"));
        assert!(result.issues_of(IssueKind::ExtractionUnavailable).count() == 1);
    }

    #[test]
    fn test_scrub_replaces_from_physical_layer() {
        let tokens = vec![word("w1", "He1lo", 10.0, 10.0, 60.0, 20.0)];
        let input = DocumentInput::new("d").with_page(
            PageInput::new(0)
                .with_tokens(tokens)
                .with_physical_chars(glyphs("Hello", 10.0, 10.0, 10.0, 10.0)),
        );
        let result = Pipeline::new().process_document(&input);

        let page = &result.document.pages[0];
        assert_eq!(page.elements[0].text(), "Hello");
        assert_eq!(result.change_log.len(), 1);
        assert_eq!(result.change_log.entries()[0].before, "He1lo");
        assert_eq!(result.stats.scrub_replaced, 1);
    }

    #[test]
    fn test_ocr_duplicate_suppressed() {
        let tokens = vec![word("w1", "Total", 10.0, 10.0, 60.0, 20.0)];
        let ocr = vec![ExtractedElement::new(
            "o1",
            "Tota1",
            0,
            BoundingBox::new(11.0, 10.0, 60.0, 20.0),
            ElementType::TextBox,
            Source::Ocr,
        )];
        let input = DocumentInput::new("d").with_page(PageInput::new(0).with_tokens(tokens).with_ocr_blocks(ocr));
        let result = Pipeline::new().process_document(&input);

        let page = &result.document.pages[0];
        assert_eq!(page.elements.len(), 1);
        assert_eq!(page.elements[0].source, Source::ParagraphGrouper);
        assert_eq!(result.stats.duplicates_suppressed, 1);
    }

    fn block(id: &str, text: &str, y0: f32, source: Source) -> ExtractedElement {
        ExtractedElement::new(
            id,
            text,
            0,
            BoundingBox::new(10.0, y0, 90.0, y0 + 10.0),
            ElementType::TextBox,
            source,
        )
    }

    fn three_stream_page() -> DocumentInput {
        let tokens = vec![word("w1", "Total", 10.0, 10.0, 60.0, 20.0)];
        DocumentInput::new("d").with_page(
            PageInput::new(0)
                .with_tokens(tokens)
                .with_ocr_blocks(vec![block("o1", "Notes", 100.0, Source::Ocr)])
                .with_vision_blocks(vec![block("v1", "Grand total", 200.0, Source::VisionAi)]),
        )
    }

    fn sources(result: &PipelineResult) -> Vec<Source> {
        result.document.pages[0].elements.iter().map(|e| e.source).collect()
    }

    #[test]
    fn test_authoritative_stream_excludes_only_its_feeders() {
        let options = PipelineOptions::new().with_authoritative_source(Source::VisionAi);
        let result = Pipeline::with_options(options).process_document(&three_stream_page());

        let sources = sources(&result);
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&Source::ParagraphGrouper));
        assert!(sources.contains(&Source::VisionAi));
        assert!(!sources.contains(&Source::Ocr));
    }

    #[test]
    fn test_configured_feeders_replace_default_table() {
        let options = PipelineOptions::new()
            .with_authoritative_source(Source::VisionAi)
            .with_authoritative_feeders(vec![Source::ParagraphGrouper]);
        let result = Pipeline::with_options(options).process_document(&three_stream_page());

        let sources = sources(&result);
        assert_eq!(sources.len(), 2);
        assert!(sources.contains(&Source::Ocr));
        assert!(sources.contains(&Source::VisionAi));
        assert!(!sources.contains(&Source::ParagraphGrouper));
    }

    #[test]
    fn test_without_authority_all_streams_survive() {
        let result = Pipeline::new().process_document(&three_stream_page());
        assert_eq!(sources(&result).len(), 3);
    }

    #[test]
    fn test_purge_leaves_unconsumed_glyphs_visible() {
        let tokens = vec![word("w1", "Hello", 10.0, 10.0, 60.0, 20.0)];
        let mut chars = glyphs("Hello", 10.0, 10.0, 10.0, 10.0);
        chars.extend(glyphs("Stray", 10.0, 300.0, 10.0, 10.0));
        let input = DocumentInput::new("d")
            .with_page(PageInput::new(0).with_tokens(tokens).with_physical_chars(chars));

        let result = Pipeline::new().process_document(&input);

        let residual: String = result.document.pages[0]
            .residual_chars
            .iter()
            .map(|c| c.text.as_str())
            .collect();
        assert_eq!(residual, "Stray");
        assert_eq!(result.issues_of(IssueKind::ResidualTextAfterRedactionCap).count(), 0);
        assert_eq!(result.document.pages[0].elements[0].text(), "Hello");
    }

    #[test]
    fn test_bad_upstream_layout_is_reported() {
        let b = BoundingBox::new(0.0, 0.0, 48.0, 18.0);
        let panel = TablePanel::new(0, BoundingBox::new(0.0, 0.0, 100.0, 40.0))
            .with_cell(TableCell::text("h", "Item", 0, b, 0, 0).header())
            .with_cell(TableCell::text("d", "Pen", 0, b, 1, 0));
        let layout = TableLayout::new(
            GlobalColumnMap::identity(0, 1),
            HeaderMap::new(u32::MAX / 2 + 1).with_header_row(0),
        );
        let input = DocumentInput::new("d")
            .with_page(PageInput::new(0).with_table(Table::new("t", 0).with_panel(panel)))
            .with_layout("t", layout);

        let result = Pipeline::new().process_document(&input);

        assert_eq!(result.document.tables[0].enriched.cols, 1);
        assert_eq!(result.issues_of(IssueKind::InvalidTableLayout).count(), 1);
    }

    #[test]
    fn test_batch_matches_sequential() {
        let inputs: Vec<DocumentInput> = (0..4)
            .map(|i| {
                DocumentInput::new(format!("d{}", i)).with_page(
                    PageInput::new(0).with_tokens(vec![word("w", &format!("doc {}", i), 0.0, 0.0, 40.0, 10.0)]),
                )
            })
            .collect();

        let parallel = Pipeline::new().process_batch(&inputs);
        let sequential = Pipeline::with_options(PipelineOptions::new().sequential()).process_batch(&inputs);

        assert_eq!(parallel.len(), 4);
        for (a, b) in parallel.iter().zip(&sequential) {
            assert_eq!(a.document.id, b.document.id);
            assert_eq!(a.document.plain_text(), b.document.plain_text());
        }
    }
}
