//! Flat relational view: documents, pages, blocks, tables and cells.

use serde::{Deserialize, Serialize};

use super::{block_id, cell_id, page_id, table_id};
use crate::model::{BoundingBox, Document, ElementType, PageStatus, Source, TextProvenance};

/// One document row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRow {
    /// Document id
    pub doc_id: String,
    /// Document title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// MIME type of the source file
    pub mime_type: String,
    /// Producer string of the source file
    pub producer: String,
    /// Number of pages
    pub page_count: u32,
    /// Number of reconciled tables
    pub table_count: usize,
}

/// One page row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRow {
    /// Page id
    pub page_id: String,
    /// Owning document
    pub doc_id: String,
    /// Page index (0-based)
    pub page: i32,
    /// Processing status
    pub status: PageStatus,
    /// Why the page was skipped or failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Number of free-text blocks
    pub block_count: usize,
    /// Number of issues raised on the page
    pub issue_count: usize,
}

/// One free-text block row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRow {
    /// Block id
    pub block_id: String,
    /// Owning page
    pub page_id: String,
    /// Id of the source element
    pub element_id: String,
    /// Reading-order position on the page
    pub position: usize,
    /// Element type
    pub kind: ElementType,
    /// Stream the block came from
    pub source: Source,
    /// Canonical text
    pub text: String,
    /// Position on the page
    pub bbox: BoundingBox,
    /// Extraction confidence
    pub confidence: f32,
    /// How the text was checked against the physical layer
    pub provenance: TextProvenance,
}

/// One table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRow {
    /// Table id
    pub table_id: String,
    /// Owning document
    pub doc_id: String,
    /// Page the table sits on
    pub page_id: String,
    /// Id of the upstream table
    pub source_table_id: String,
    /// Table title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Number of rows
    pub rows: u32,
    /// Number of global columns
    pub cols: u32,
    /// Domain handler that claimed the table
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

/// One table cell row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRow {
    /// Cell id, unique within the document
    pub cell_id: String,
    /// Owning table
    pub table_id: String,
    /// Id of the upstream cell
    pub source_cell_id: String,
    /// Row index
    pub row: u32,
    /// Global column index
    pub col: u32,
    /// Rows covered
    pub rowspan: u32,
    /// Global columns covered
    pub colspan: u32,
    /// Canonical cell text
    pub text: String,
    /// Column header labels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col_header: Option<String>,
    /// Row header labels
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_header: Option<String>,
    /// Whether the cell is a header
    pub is_header: bool,
}

/// Relational projection of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationalView {
    /// Document relation
    pub documents: Vec<DocumentRow>,
    /// Page relation
    pub pages: Vec<PageRow>,
    /// Free-text block relation
    pub blocks: Vec<BlockRow>,
    /// Table relation
    pub tables: Vec<TableRow>,
    /// Table cell relation
    pub cells: Vec<CellRow>,
}

impl RelationalView {
    /// Total number of rows across all relations.
    pub fn row_count(&self) -> usize {
        self.documents.len() + self.pages.len() + self.blocks.len() + self.tables.len() + self.cells.len()
    }
}

pub(super) fn build(doc: &Document) -> RelationalView {
    let mut view = RelationalView {
        documents: vec![DocumentRow {
            doc_id: doc.id.clone(),
            title: doc.metadata.title.clone(),
            mime_type: doc.metadata.origin.mime_type.clone(),
            producer: doc.metadata.origin.producer.clone(),
            page_count: doc.page_count(),
            table_count: doc.tables.len(),
        }],
        ..Default::default()
    };

    for page in &doc.pages {
        let pid = page_id(&doc.id, page.page);
        view.pages.push(PageRow {
            page_id: pid.clone(),
            doc_id: doc.id.clone(),
            page: page.page,
            status: page.status,
            skip_reason: page.skip_reason.clone(),
            block_count: page.elements.len(),
            issue_count: page.issues.len(),
        });

        for (i, el) in page.elements.iter().enumerate() {
            view.blocks.push(BlockRow {
                block_id: block_id(&doc.id, page.page, i),
                page_id: pid.clone(),
                element_id: el.id.clone(),
                position: i,
                kind: el.kind,
                source: el.source,
                text: el.text().to_string(),
                bbox: el.bbox,
                confidence: el.confidence,
                provenance: el.metadata.provenance,
            });
        }
    }

    for (i, result) in doc.tables.iter().enumerate() {
        let tid = table_id(&doc.id, i);
        let table = &result.enriched;
        view.tables.push(TableRow {
            table_id: tid.clone(),
            doc_id: doc.id.clone(),
            page_id: page_id(&doc.id, table.page),
            source_table_id: table.table_id.clone(),
            title: table.title.clone(),
            rows: table.rows,
            cols: table.cols,
            handler: result.interpretation.handler().map(str::to_string),
        });

        for (j, cell) in table.cells.iter().enumerate() {
            view.cells.push(CellRow {
                cell_id: cell_id(&tid, j),
                table_id: tid.clone(),
                source_cell_id: cell.cell_id.clone(),
                row: cell.row,
                col: cell.global_col,
                rowspan: cell.rowspan,
                colspan: cell.colspan,
                text: cell.text.clone(),
                col_header: cell.col_header.clone(),
                row_header: cell.row_header.clone(),
                is_header: cell.is_header,
            });
        }
    }

    view
}
