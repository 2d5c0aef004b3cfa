//! Document-level types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PageElements, Table};
use crate::detect::{MergerVariant, OriginTag};
use crate::domain::Interpretation;
use crate::error::Issue;
use crate::table::EnrichedTable;

/// A reconciled document: canonical pages plus interpreted tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier
    pub id: String,

    /// Document metadata
    pub metadata: Metadata,

    /// Pages in order
    pub pages: Vec<PageElements>,

    /// Reconciled tables in page order
    pub tables: Vec<TableResult>,
}

impl Document {
    /// Create an empty document.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Number of pages.
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Get a page by index (0-based).
    pub fn get_page(&self, page: i32) -> Option<&PageElements> {
        self.pages.iter().find(|p| p.page == page)
    }

    /// Check if the document has no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Iterate over the raw tables of every page.
    pub fn raw_tables(&self) -> impl Iterator<Item = &Table> {
        self.pages.iter().flat_map(|p| p.tables.iter())
    }

    /// Every issue raised on the document's pages.
    pub fn page_issues(&self) -> impl Iterator<Item = &Issue> {
        self.pages.iter().flat_map(|p| p.issues.iter())
    }

    /// Plain text of the free-text blocks of every page.
    pub fn plain_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| page.plain_text())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Origin of the document
    pub origin: OriginTag,

    /// Box merger variant chosen for the origin
    pub variant: MergerVariant,

    /// When the document was processed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
}

/// A table after column reconciliation and domain interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableResult {
    /// Reconciled table with header-enriched cells
    pub enriched: EnrichedTable,

    /// Domain or generic interpretation
    pub interpretation: Interpretation,
}

impl TableResult {
    /// Table id.
    pub fn id(&self) -> &str {
        &self.enriched.table_id
    }
}
