//! Page-level types.

use serde::{Deserialize, Serialize};

use super::{ExtractedElement, PhysicalChar, Table};
use crate::error::Issue;

/// Processing status of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Page processed normally
    #[default]
    Ok,
    /// Page skipped because it carries no content
    BlankSkip,
    /// Page could not be processed
    Error,
}

/// Everything extracted from one page during a document run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageElements {
    /// Page index (0-based)
    pub page: i32,

    /// Processing status
    pub status: PageStatus,

    /// Why the page was skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,

    /// Free-text blocks in reading order
    pub elements: Vec<ExtractedElement>,

    /// Tables found on the page
    pub tables: Vec<Table>,

    /// Physical glyphs still visible after consumed regions were purged
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub residual_chars: Vec<PhysicalChar>,

    /// Non-fatal problems raised while processing the page
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

impl PageElements {
    /// Create an empty page with `Ok` status.
    pub fn new(page: i32) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    /// Create a skipped blank page.
    pub fn blank(page: i32, reason: impl Into<String>) -> Self {
        Self {
            page,
            status: PageStatus::BlankSkip,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Create a failed page.
    pub fn failed(page: i32, reason: impl Into<String>) -> Self {
        Self {
            page,
            status: PageStatus::Error,
            skip_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Check if the page has no text blocks and no tables.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.tables.is_empty()
    }

    /// Plain text of the free-text blocks.
    pub fn plain_text(&self) -> String {
        self.elements
            .iter()
            .map(|e| e.text())
            .filter(|t| !t.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BoundingBox;

    #[test]
    fn test_page_new() {
        let page = PageElements::new(2);
        assert_eq!(page.page, 2);
        assert_eq!(page.status, PageStatus::Ok);
        assert!(page.is_empty());
    }

    #[test]
    fn test_blank_page() {
        let page = PageElements::blank(0, "no content");
        assert_eq!(page.status, PageStatus::BlankSkip);
        assert_eq!(page.skip_reason.as_deref(), Some("no content"));
    }

    #[test]
    fn test_plain_text_skips_blank_blocks() {
        let mut page = PageElements::new(0);
        let b = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        page.elements.push(ExtractedElement::word("a", "Hello", 0, b));
        page.elements.push(ExtractedElement::word("b", "  ", 0, b));
        page.elements.push(ExtractedElement::word("c", "World", 0, b));
        assert_eq!(page.plain_text(), "Hello\n\nWorld");
    }
}
