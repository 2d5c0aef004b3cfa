//! Extracted elements and their provenance.

use serde::{Deserialize, Serialize};

use super::BoundingBox;

/// Kind of an extracted element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementType {
    /// A single glyph
    Char,
    /// A word or token
    Word,
    /// A consolidated text box
    TextBox,
    /// A grouped paragraph
    Paragraph,
    /// A table region
    Table,
    /// A table cell
    TableCell,
}

/// The extraction back-end or stage that produced an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Physical (vector) text extraction, ground truth when available
    Physical,
    /// Output of the paragraph grouper
    ParagraphGrouper,
    /// Vision model transcription
    VisionAi,
    /// Raw OCR output
    Ocr,
}

impl Source {
    /// Rank used by the position merger; lower wins.
    pub fn priority(&self) -> u8 {
        match self {
            Source::ParagraphGrouper => 0,
            Source::Physical => 1,
            Source::VisionAi => 2,
            Source::Ocr => 3,
        }
    }

    /// Streams this source is built from, excluded when it is authoritative.
    pub fn feeders(&self) -> &'static [Source] {
        match self {
            Source::ParagraphGrouper => &[Source::Physical, Source::Ocr],
            Source::VisionAi => &[Source::Ocr],
            Source::Physical | Source::Ocr => &[],
        }
    }

    /// Stable label used in logs and packaged views.
    pub fn label(&self) -> &'static str {
        match self {
            Source::Physical => "physical",
            Source::ParagraphGrouper => "paragraph",
            Source::VisionAi => "vision",
            Source::Ocr => "ocr",
        }
    }
}

/// How Scrub resolved the text of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextProvenance {
    /// Scrub has not looked at the element
    #[default]
    Unscrubbed,
    /// Physical characters matched and agreed with the original text
    PhysicalConfirmed,
    /// Physical characters replaced the original text
    PhysicalReplaced,
    /// No physical characters were found; original text kept
    NoPhysicalMatch,
}

/// Per-source transcriptions carried alongside the canonical text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaggedTexts {
    /// Text assembled from physical characters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub physical: Option<String>,
    /// Text reported by OCR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr: Option<String>,
    /// Text reported by a vision model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vision: Option<String>,
}

/// Typed metadata attached to an element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementMetadata {
    /// Ids of the elements this one was merged from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_from: Vec<String>,

    /// Text resolution status
    #[serde(default)]
    pub provenance: TextProvenance,

    /// Alternative transcriptions
    #[serde(default)]
    pub tagged: TaggedTexts,

    /// Data-quality flags raised while processing
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

/// A geometry-tagged piece of text.
///
/// Elements are never mutated by merging stages: a merge builds a new element
/// listing its inputs in `metadata.merged_from`. The text value can only be
/// rewritten by the scrub stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedElement {
    /// Stable identifier
    pub id: String,

    text: String,

    /// Page index (0-based)
    pub page: i32,

    /// Position on the page
    pub bbox: BoundingBox,

    /// Element kind
    #[serde(rename = "type")]
    pub kind: ElementType,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// Producing back-end or stage
    pub source: Source,

    /// Typed metadata
    #[serde(default)]
    pub metadata: ElementMetadata,
}

impl ExtractedElement {
    /// Create an element with full confidence and empty metadata.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        page: i32,
        bbox: BoundingBox,
        kind: ElementType,
        source: Source,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            page,
            bbox,
            kind,
            confidence: 1.0,
            source,
            metadata: ElementMetadata::default(),
        }
    }

    /// Create a word element from a physical extractor.
    pub fn word(id: impl Into<String>, text: impl Into<String>, page: i32, bbox: BoundingBox) -> Self {
        Self::new(id, text, page, bbox, ElementType::Word, Source::Physical)
    }

    /// Set confidence (clamped to [0, 1]) and return self.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set the source ids and return self.
    pub fn with_merged_from(mut self, ids: Vec<String>) -> Self {
        self.metadata.merged_from = ids;
        self
    }

    /// The canonical text value.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Check bbox and page validity.
    pub fn validate(&self) -> bool {
        self.bbox.is_valid() && self.page >= 0
    }

    /// Check whether the text is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Rewrite the text value. Restricted to the scrub stage.
    pub(crate) fn replace_text(&mut self, text: String) {
        self.text = text;
    }
}

/// A glyph from a physical (vector) text layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicalChar {
    /// Glyph text (usually one character)
    pub text: String,
    /// Glyph box
    pub bbox: BoundingBox,
    /// Page index
    pub page: i32,
}

impl PhysicalChar {
    /// Create a new physical glyph.
    pub fn new(text: impl Into<String>, page: i32, bbox: BoundingBox) -> Self {
        Self {
            text: text.into(),
            bbox,
            page,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let ok = ExtractedElement::word("a", "A", 0, BoundingBox::new(0.0, 0.0, 5.0, 5.0));
        assert!(ok.validate());

        let bad_page = ExtractedElement::word("b", "B", -1, BoundingBox::new(0.0, 0.0, 5.0, 5.0));
        assert!(!bad_page.validate());

        let bad_box = ExtractedElement::word("c", "C", 0, BoundingBox::new(5.0, 0.0, 5.0, 5.0));
        assert!(!bad_box.validate());
    }

    #[test]
    fn test_source_priority() {
        assert!(Source::ParagraphGrouper.priority() < Source::Ocr.priority());
        assert!(Source::Physical.priority() < Source::VisionAi.priority());
    }

    #[test]
    fn test_confidence_clamped() {
        let el = ExtractedElement::word("a", "A", 0, BoundingBox::new(0.0, 0.0, 1.0, 1.0))
            .with_confidence(1.7);
        assert_eq!(el.confidence, 1.0);
    }

    #[test]
    fn test_serializes_kind_as_type() {
        let el = ExtractedElement::word("a", "A", 0, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let json = serde_json::to_string(&el).unwrap();
        assert!(json.contains("\"type\":\"word\""));
        assert!(json.contains("\"text\":\"A\""));
    }
}
