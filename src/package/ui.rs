//! UI view: page-grouped render model, table render model and anchor map.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{block_id, table_id};
use crate::model::{BoundingBox, Document, ElementType, PageStatus, Source};

/// A rendered free-text block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiBlock {
    /// Anchor id, a key of [`UiView::anchors`]
    pub anchor: String,
    /// Canonical text
    pub text: String,
    /// Position on the page
    pub bbox: BoundingBox,
    /// Element type
    pub kind: ElementType,
    /// Stream the block came from
    pub source: Source,
}

/// A page of the render model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiPage {
    /// Page index (0-based)
    pub page: i32,
    /// Processing status
    pub status: PageStatus,
    /// Free-text blocks in reading order
    pub blocks: Vec<UiBlock>,
    /// Anchors of the tables placed on this page
    pub tables: Vec<String>,
}

/// A rendered table cell.
///
/// A spanning cell sits in its top-left slot; the other slots it covers are
/// left empty and marked `covered`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiCell {
    /// Cell text
    pub text: String,
    /// Enriched text, when it adds header context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    /// Whether the cell is a header
    pub header: bool,
    /// Rows covered
    pub rowspan: u32,
    /// Columns covered
    pub colspan: u32,
    /// Whether the slot is covered by a spanning cell
    pub covered: bool,
}

impl Default for UiCell {
    fn default() -> Self {
        Self {
            text: String::new(),
            tooltip: None,
            header: false,
            rowspan: 1,
            colspan: 1,
            covered: false,
        }
    }
}

/// A table of the render model, as a dense grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiTable {
    /// Anchor id, a key of [`UiView::anchors`]
    pub anchor: String,
    /// Page the table sits on
    pub page: i32,
    /// Table title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Header label of every global column
    pub column_headers: Vec<String>,
    /// `rows[row][col]` over the global columns
    pub rows: Vec<Vec<UiCell>>,
    /// Domain handler that claimed the table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

/// What an anchor points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    /// A free-text block
    Block,
    /// A table
    Table,
}

/// Where an anchor lands on the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    /// What the anchor points at
    pub kind: AnchorKind,
    /// Page index
    pub page: i32,
    /// Region to highlight
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// UI projection of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiView {
    /// Document id
    pub doc_id: String,
    /// Pages in order
    pub pages: Vec<UiPage>,
    /// Tables in document order
    pub tables: Vec<UiTable>,
    /// Every block and table anchor
    pub anchors: BTreeMap<String, Anchor>,
}

pub(super) fn build(doc: &Document) -> UiView {
    let mut view = UiView {
        doc_id: doc.id.clone(),
        ..Default::default()
    };

    for page in &doc.pages {
        let blocks = page
            .elements
            .iter()
            .enumerate()
            .map(|(i, el)| {
                let anchor = block_id(&doc.id, page.page, i);
                view.anchors.insert(
                    anchor.clone(),
                    Anchor {
                        kind: AnchorKind::Block,
                        page: page.page,
                        bbox: Some(el.bbox),
                    },
                );
                UiBlock {
                    anchor,
                    text: el.text().to_string(),
                    bbox: el.bbox,
                    kind: el.kind,
                    source: el.source,
                }
            })
            .collect();

        view.pages.push(UiPage {
            page: page.page,
            status: page.status,
            blocks,
            tables: Vec::new(),
        });
    }

    for (i, result) in doc.tables.iter().enumerate() {
        let table = &result.enriched;
        let anchor = table_id(&doc.id, i);
        let bbox = doc
            .raw_tables()
            .find(|t| t.id == table.table_id)
            .and_then(|t| t.bbox());

        let mut rows = vec![vec![UiCell::default(); table.cols as usize]; table.rows as usize];
        for cell in &table.cells {
            let (row, col) = (cell.row as usize, cell.global_col as usize);
            let Some(slot) = rows.get_mut(row).and_then(|r| r.get_mut(col)) else {
                continue;
            };
            *slot = UiCell {
                text: cell.text.clone(),
                tooltip: (cell.enriched_text != cell.text).then(|| cell.enriched_text.clone()),
                header: cell.is_header,
                rowspan: cell.rowspan,
                colspan: cell.colspan,
                covered: false,
            };

            let row_end = row.saturating_add(cell.rowspan as usize).min(rows.len());
            for (r, covered_row) in rows.iter_mut().enumerate().take(row_end).skip(row) {
                let col_end = col.saturating_add(cell.colspan as usize).min(covered_row.len());
                for (c, slot) in covered_row.iter_mut().enumerate().take(col_end).skip(col) {
                    if (r, c) != (row, col) && slot.text.is_empty() {
                        slot.covered = true;
                    }
                }
            }
        }

        if let Some(page) = view.pages.iter_mut().find(|p| p.page == table.page) {
            page.tables.push(anchor.clone());
        }
        view.anchors.insert(
            anchor.clone(),
            Anchor {
                kind: AnchorKind::Table,
                page: table.page,
                bbox,
            },
        );
        view.tables.push(UiTable {
            anchor,
            page: table.page,
            title: table.title.clone(),
            column_headers: table.column_headers.clone(),
            rows,
            handler: result.interpretation.handler().map(str::to_string),
        });
    }

    view
}
