//! # docweave
//!
//! Reconciliation pipeline for geometry-tagged document text.
//!
//! Extraction back-ends (vector text layers, OCR, vision models) each see a
//! page differently. This library turns their fragmented, overlapping output
//! into one auditable representation: free-text paragraphs in reading order
//! and tables whose cells carry their header context.
//!
//! ## Quick Start
//!
//! ```no_run
//! use docweave::model::{BoundingBox, ExtractedElement};
//! use docweave::pipeline::{DocumentInput, PageInput, Pipeline};
//!
//! let tokens = vec![
//!     ExtractedElement::word("w1", "Hello", 0, BoundingBox::new(10.0, 10.0, 40.0, 20.0)),
//!     ExtractedElement::word("w2", "world", 0, BoundingBox::new(44.0, 10.0, 74.0, 20.0)),
//! ];
//! let input = DocumentInput::new("doc-1").with_page(PageInput::new(0).with_tokens(tokens));
//!
//! let result = Pipeline::new().process_document(&input);
//! println!("{}", result.document.plain_text());
//! println!("{} text changes", result.change_log.len());
//! ```
//!
//! ## Stages
//!
//! - **Box merging**: raw boxes into lines and text boxes, table detection,
//!   purge of consumed regions
//! - **Chain merging**: guarded application of suggested token merges
//! - **Paragraph grouping** and **position merging** across source streams
//! - **Scrub**: the only stage allowed to rewrite text, with a change log
//! - **Column mapping** and **header enrichment** for multi-panel tables
//! - **Domain handlers** reinterpreting enriched cells
//! - **Packaging** into relational, search and UI views

pub mod detect;
pub mod domain;
pub mod error;
pub mod layout;
pub mod model;
pub mod package;
pub mod pipeline;
pub mod reconcile;
pub mod table;

// Re-export commonly used types
pub use detect::{detect_variant, MergerVariant, OriginTag};
pub use domain::{DomainContext, DomainEntity, DomainHandler, DomainRegistry, DomainResult, Interpretation};
pub use error::{Error, Issue, IssueKind, Result, SuggestError};
pub use model::{
    BoundingBox, Document, ElementType, ExtractedElement, PageElements, PageStatus, PhysicalChar,
    Source, Table, TableCell, TablePanel, TextProvenance,
};
pub use package::{JsonFormat, Package, PackageOptions, Packager, ViewSelection};
pub use pipeline::{DocumentInput, PageInput, Pipeline, PipelineOptions, PipelineResult, TableLayout};
pub use reconcile::{ChangeLog, ChangeLogEntry, MergeGroup, MergeSuggester, PageImage};
pub use table::{EnrichedTable, GlobalColumnMap, HeaderMap};

use std::path::Path;

/// Process one document with default options.
///
/// # Example
///
/// ```no_run
/// use docweave::{process, DocumentInput};
///
/// let result = process(&DocumentInput::new("empty"));
/// assert!(result.document.pages.is_empty());
/// ```
pub fn process(input: &DocumentInput) -> PipelineResult {
    Pipeline::new().process_document(input)
}

/// Process one document described by a JSON file.
///
/// The file holds a serialized [`DocumentInput`]; page images are not part
/// of the JSON form.
pub fn process_json_file<P: AsRef<Path>>(path: P, options: PipelineOptions) -> Result<PipelineResult> {
    let json = std::fs::read_to_string(path)?;
    let input: DocumentInput = serde_json::from_str(&json)?;
    Ok(Pipeline::with_options(options).process_document(&input))
}

/// Process a document and render its packaged views to JSON.
pub fn to_json(input: &DocumentInput, format: JsonFormat) -> Result<String> {
    let result = process(input);
    result.package.to_json(format)
}
