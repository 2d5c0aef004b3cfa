//! Search view: full text, header-inlined table text and header keywords.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::table_id;
use crate::model::Document;

/// Header-inlined text of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableText {
    /// Stable table id
    pub table_id: String,
    /// One line per data cell, `[col | row] text`
    pub text: String,
}

/// Search projection of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchView {
    /// Document id
    pub doc_id: String,

    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Free text of every page, in reading order
    pub full_text: String,

    /// Enriched text of every table
    pub table_text: Vec<TableText>,

    /// Header labels, de-duplicated case-insensitively
    pub header_keywords: Vec<String>,
}

impl SearchView {
    /// Everything searchable as one string.
    pub fn combined_text(&self) -> String {
        std::iter::once(self.full_text.as_str())
            .chain(self.table_text.iter().map(|t| t.text.as_str()))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub(super) fn build(doc: &Document) -> SearchView {
    let table_text = doc
        .tables
        .iter()
        .enumerate()
        .map(|(i, result)| TableText {
            table_id: table_id(&doc.id, i),
            text: result
                .enriched
                .data_cells()
                .filter(|c| !c.text.is_empty())
                .map(|c| c.enriched_text.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        })
        .collect();

    let mut seen: HashSet<String> = HashSet::new();
    let mut header_keywords = Vec::new();
    let labels = doc.tables.iter().flat_map(|result| {
        let table = &result.enriched;
        table
            .header_labels()
            .chain(table.data_cells().filter_map(|c| c.row_header.as_deref()))
    });
    for label in labels {
        let label = label.trim();
        if !label.is_empty() && seen.insert(label.to_lowercase()) {
            header_keywords.push(label.to_string());
        }
    }

    SearchView {
        doc_id: doc.id.clone(),
        title: doc.metadata.title.clone(),
        full_text: doc.plain_text(),
        table_text,
        header_keywords,
    }
}
