//! Table types.

use serde::{Deserialize, Serialize};

use super::{BoundingBox, ElementType, ExtractedElement, Source};

/// A table cell: an extracted element plus its grid position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    /// The underlying element (text, bbox, provenance)
    pub element: ExtractedElement,

    /// Row index (shared by every panel of a logical table)
    pub row: u32,

    /// Column index local to the owning panel
    pub col: u32,

    /// Whether the cell belongs to a header
    pub is_header: bool,

    /// Number of rows this cell spans
    pub rowspan: u32,

    /// Number of columns this cell spans
    pub colspan: u32,
}

impl TableCell {
    /// Create a 1x1 cell.
    pub fn new(element: ExtractedElement, row: u32, col: u32) -> Self {
        Self {
            element,
            row,
            col,
            is_header: false,
            rowspan: 1,
            colspan: 1,
        }
    }

    /// Build a cell element directly from text and geometry.
    pub fn text(
        id: impl Into<String>,
        text: impl Into<String>,
        page: i32,
        bbox: BoundingBox,
        row: u32,
        col: u32,
    ) -> Self {
        let element =
            ExtractedElement::new(id, text, page, bbox, ElementType::TableCell, Source::Physical);
        Self::new(element, row, col)
    }

    /// Mark as header and return self.
    pub fn header(mut self) -> Self {
        self.is_header = true;
        self
    }

    /// Set colspan and return self.
    pub fn colspan(mut self, span: u32) -> Self {
        self.colspan = span.max(1);
        self
    }

    /// Set rowspan and return self.
    pub fn rowspan(mut self, span: u32) -> Self {
        self.rowspan = span.max(1);
        self
    }

    /// Cell id.
    pub fn id(&self) -> &str {
        &self.element.id
    }

    /// Cell text.
    pub fn text_value(&self) -> &str {
        self.element.text()
    }

    /// Check if the cell is empty.
    pub fn is_empty(&self) -> bool {
        self.element.is_blank()
    }
}

/// One independently recognized sub-region of a logical table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePanel {
    /// Panel identifier, unique within its table
    pub panel_id: u32,

    /// Panel region
    pub bbox: BoundingBox,

    /// Cells with panel-local column numbers
    pub cells: Vec<TableCell>,
}

impl TablePanel {
    /// Create an empty panel.
    pub fn new(panel_id: u32, bbox: BoundingBox) -> Self {
        Self {
            panel_id,
            bbox,
            cells: Vec::new(),
        }
    }

    /// Add a cell and return self.
    pub fn with_cell(mut self, cell: TableCell) -> Self {
        self.cells.push(cell);
        self
    }

    /// Number of local columns.
    pub fn column_count(&self) -> u32 {
        self.cells
            .iter()
            .map(|c| c.col.saturating_add(c.colspan))
            .max()
            .unwrap_or(0)
    }

    /// Number of rows.
    pub fn row_count(&self) -> u32 {
        self.cells
            .iter()
            .map(|c| c.row.saturating_add(c.rowspan))
            .max()
            .unwrap_or(0)
    }
}

/// A logical table made of one or more panels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table identifier
    pub id: String,

    /// Page index
    pub page: i32,

    /// Caption or title, used for domain detection
    pub title: Option<String>,

    /// Panels of the table
    pub panels: Vec<TablePanel>,
}

impl Table {
    /// Create an empty table.
    pub fn new(id: impl Into<String>, page: i32) -> Self {
        Self {
            id: id.into(),
            page,
            title: None,
            panels: Vec::new(),
        }
    }

    /// Set the title and return self.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add a panel and return self.
    pub fn with_panel(mut self, panel: TablePanel) -> Self {
        self.panels.push(panel);
        self
    }

    /// Union of all panel regions.
    pub fn bbox(&self) -> Option<BoundingBox> {
        BoundingBox::union_all(self.panels.iter().map(|p| &p.bbox))
    }

    /// Iterate over `(panel_id, cell)` pairs.
    pub fn cells(&self) -> impl Iterator<Item = (u32, &TableCell)> {
        self.panels
            .iter()
            .flat_map(|p| p.cells.iter().map(move |c| (p.panel_id, c)))
    }

    /// Mutable access to every cell element.
    pub(crate) fn cell_elements_mut(&mut self) -> impl Iterator<Item = &mut ExtractedElement> {
        self.panels
            .iter_mut()
            .flat_map(|p| p.cells.iter_mut().map(|c| &mut c.element))
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.panels.iter().map(|p| p.cells.len()).sum()
    }

    /// Number of rows across panels.
    pub fn row_count(&self) -> u32 {
        self.panels.iter().map(|p| p.row_count()).max().unwrap_or(0)
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.cell_count() == 0
    }

    /// Check if the table has merged cells.
    pub fn has_merged_cells(&self) -> bool {
        self.cells().any(|(_, c)| c.rowspan > 1 || c.colspan > 1)
    }
}
