//! Origin detection: choose the box-merger variant for a document.
//!
//! Different authoring tools leave very different text layers behind.
//! Spreadsheet and report generators emit ruled tables, desktop-publishing
//! tools emit positioned glyphs, and word processors emit words on lines.

use serde::{Deserialize, Serialize};

/// Box-merger strategy for an extraction origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergerVariant {
    /// Table-dominated output (spreadsheets, report writers)
    TableHeavy,
    /// Word-level vector text (word processors)
    #[default]
    VectorText,
    /// Glyph-level desktop-publishing output
    Dtp,
}

/// Origin tag supplied by the extraction back-end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginTag {
    /// MIME type of the source file
    #[serde(default)]
    pub mime_type: String,

    /// Producer / creator application string
    #[serde(default)]
    pub producer: String,
}

impl OriginTag {
    /// Create a new origin tag.
    pub fn new(mime_type: impl Into<String>, producer: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            producer: producer.into(),
        }
    }

    /// Detect the merger variant for this origin.
    pub fn variant(&self) -> MergerVariant {
        detect_variant(&self.mime_type, &self.producer)
    }
}

const TABLE_MIME_MARKERS: &[&str] = &[
    "spreadsheet",
    "excel",
    "ms-excel",
    "text/csv",
    "opendocument.spreadsheet",
];

const TABLE_PRODUCERS: &[&str] = &[
    "excel",
    "calc",
    "numbers",
    "crystal reports",
    "jasperreports",
    "reportlab",
    "sheets",
];

const DTP_PRODUCERS: &[&str] = &[
    "indesign",
    "quarkxpress",
    "illustrator",
    "scribus",
    "affinity publisher",
    "pagemaker",
    "framemaker",
];

/// Detect the merger variant from a MIME type and producer string.
///
/// The MIME type wins for spreadsheet formats; otherwise the producer string
/// decides. Unknown origins fall back to [`MergerVariant::VectorText`].
pub fn detect_variant(mime_type: &str, producer: &str) -> MergerVariant {
    let mime = mime_type.to_lowercase();
    let producer = producer.to_lowercase();

    if TABLE_MIME_MARKERS.iter().any(|m| mime.contains(m)) {
        return MergerVariant::TableHeavy;
    }

    if DTP_PRODUCERS.iter().any(|p| producer.contains(p)) {
        return MergerVariant::Dtp;
    }

    if TABLE_PRODUCERS.iter().any(|p| producer.contains(p)) {
        return MergerVariant::TableHeavy;
    }

    log::trace!(
        "detect_variant: no marker for mime={:?} producer={:?}, using vector text",
        mime,
        producer
    );
    MergerVariant::VectorText
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spreadsheet_mime() {
        let variant = detect_variant(
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "",
        );
        assert_eq!(variant, MergerVariant::TableHeavy);
    }

    #[test]
    fn test_dtp_producer() {
        let variant = detect_variant("application/pdf", "Adobe InDesign 18.2 (Macintosh)");
        assert_eq!(variant, MergerVariant::Dtp);
    }

    #[test]
    fn test_report_producer() {
        let tag = OriginTag::new("application/pdf", "Microsoft Excel for Microsoft 365");
        assert_eq!(tag.variant(), MergerVariant::TableHeavy);
    }

    #[test]
    fn test_unknown_defaults_to_vector_text() {
        assert_eq!(
            detect_variant("application/pdf", "Microsoft Word"),
            MergerVariant::VectorText
        );
        assert_eq!(detect_variant("", ""), MergerVariant::VectorText);
    }
}
