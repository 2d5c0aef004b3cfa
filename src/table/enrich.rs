//! Header enrichment: nearest-fill of header gaps and per-cell header
//! context.

use serde::{Deserialize, Serialize};

use super::column_map::{DenseGrid, GlobalColumnMap, HeaderMap};
use crate::error::Issue;
use crate::model::Table;

/// A table cell annotated with its header context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCell {
    /// Id of the source cell
    pub cell_id: String,

    /// Panel the cell came from
    pub panel: u32,

    /// Row index
    pub row: u32,

    /// Column in the reconciled table
    pub global_col: u32,

    /// Rows covered by the cell
    #[serde(default = "one")]
    pub rowspan: u32,

    /// Global columns covered by the cell
    #[serde(default = "one")]
    pub colspan: u32,

    /// Canonical cell text
    pub text: String,

    /// Column header labels, space-joined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col_header: Option<String>,

    /// Row header labels, space-joined
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_header: Option<String>,

    /// Display text with headers inlined; never written back to the cell
    pub enriched_text: String,

    /// Whether the cell sits in a header row or header column
    pub is_header: bool,
}

/// A table reconciled into global columns with enriched cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedTable {
    /// Table id
    pub table_id: String,

    /// Page index
    pub page: i32,

    /// Table title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Number of rows
    pub rows: u32,

    /// Number of global columns
    pub cols: u32,

    /// Column header label of every global column (empty when none)
    pub column_headers: Vec<String>,

    /// Cells in (row, global column) order
    pub cells: Vec<EnrichedCell>,

    /// Ids of cells that had no global column
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmapped: Vec<String>,

    /// Problems with the upstream layout
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

fn one() -> u32 {
    1
}

impl EnrichedTable {
    /// Data cells (not headers).
    pub fn data_cells(&self) -> impl Iterator<Item = &EnrichedCell> {
        self.cells.iter().filter(|c| !c.is_header)
    }

    /// Header labels with blanks removed.
    pub fn header_labels(&self) -> impl Iterator<Item = &str> {
        self.column_headers
            .iter()
            .map(String::as_str)
            .filter(|h| !h.is_empty())
    }
}

/// Fill blank header-row slots from the nearest non-blank slot of the same
/// panel in the same row. Ties go left. Slots with no panel stay blank.
pub fn fill_header_rows(grid: &mut DenseGrid, header: &HeaderMap) {
    for &row in &header.global_col_header_rows {
        let snapshot: Vec<(Option<u32>, String)> = (0..grid.cols())
            .map(|c| {
                grid.slot(row, c)
                    .map(|s| (s.panel, s.text.clone()))
                    .unwrap_or_default()
            })
            .collect();

        for col in 0..grid.cols() {
            let (panel, text) = &snapshot[col as usize];
            let Some(panel) = *panel else {
                continue;
            };
            if !text.trim().is_empty() {
                continue;
            }
            let source = nearest(col, grid.cols(), |c| {
                let (p, t) = &snapshot[c as usize];
                *p == Some(panel) && !t.trim().is_empty()
            });
            if let (Some(src), Some(slot)) = (source, grid.slot_mut(row, col)) {
                slot.text = snapshot[src as usize].1.clone();
                slot.filled = true;
            }
        }
    }
}

/// Fill blank header-column slots from the nearest non-blank data row in
/// the same column, across panels. Ties go up. Header rows are skipped.
pub fn fill_header_cols(grid: &mut DenseGrid, header: &HeaderMap) {
    for &col in &header.global_row_header_cols {
        let snapshot: Vec<String> = (0..grid.rows()).map(|r| grid.text(r, col).to_string()).collect();
        let usable = |r: u32| !header.is_header_row(r) && !snapshot[r as usize].trim().is_empty();

        for row in 0..grid.rows() {
            if header.is_header_row(row) || !snapshot[row as usize].trim().is_empty() {
                continue;
            }
            let source = nearest(row, grid.rows(), &usable);
            if let (Some(src), Some(slot)) = (source, grid.slot_mut(row, col)) {
                slot.text = snapshot[src as usize].clone();
                slot.filled = true;
            }
        }
    }
}

/// Closest index to `at` in `0..len` accepted by `ok`, lower index first on ties.
fn nearest(at: u32, len: u32, ok: impl Fn(u32) -> bool) -> Option<u32> {
    for d in 1..len {
        if let Some(lower) = at.checked_sub(d) {
            if ok(lower) {
                return Some(lower);
            }
        }
        if let Some(upper) = at.checked_add(d).filter(|&u| u < len) {
            if ok(upper) {
                return Some(upper);
            }
        }
    }
    None
}

/// Distinct non-blank values in order of first appearance, space-joined.
fn join_distinct<'a>(values: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut seen: Vec<&str> = Vec::new();
    for value in values.map(str::trim).filter(|v| !v.is_empty()) {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    if seen.is_empty() {
        None
    } else {
        Some(seen.join(" "))
    }
}

/// Compose the display text of a cell.
pub fn compose_enriched_text(col_header: Option<&str>, row_header: Option<&str>, text: &str) -> String {
    match (col_header, row_header) {
        (Some(c), Some(r)) => format!("[{} | {}] {}", c, r, text),
        (Some(c), None) => format!("[{}] {}", c, text),
        (None, Some(r)) => format!("[{}] {}", r, text),
        (None, None) => text.to_string(),
    }
}

/// Attaches header context to the cells of multi-panel tables.
#[derive(Debug, Clone, Default)]
pub struct HeaderEnricher;

impl HeaderEnricher {
    /// Create an enricher.
    pub fn new() -> Self {
        Self
    }

    /// Reconcile `table` through `map` and enrich its cells.
    pub fn enrich(&self, table: &Table, map: &GlobalColumnMap, header: &HeaderMap) -> EnrichedTable {
        let mut grid = DenseGrid::project(table, map, header);
        fill_header_rows(&mut grid, header);
        fill_header_cols(&mut grid, header);

        let column_headers: Vec<String> = (0..grid.cols())
            .map(|c| {
                join_distinct(header.global_col_header_rows.iter().map(|&r| grid.text(r, c)))
                    .unwrap_or_default()
            })
            .collect();

        let mut cells = Vec::with_capacity(table.cell_count());
        for (panel, cell) in table.cells() {
            let Some(global_col) = map.global_col(panel, cell.col) else {
                continue;
            };
            let is_header = cell.is_header
                || header.is_header_row(cell.row)
                || header.is_header_col(global_col);
            let text = cell.text_value().trim().to_string();

            let (col_header, row_header) = if is_header {
                (None, None)
            } else {
                let col_header = column_headers
                    .get(global_col as usize)
                    .filter(|h| !h.is_empty())
                    .cloned();
                let row_header = join_distinct(
                    header
                        .global_row_header_cols
                        .iter()
                        .map(|&c| grid.text(cell.row, c)),
                );
                (col_header, row_header)
            };

            let enriched_text = compose_enriched_text(col_header.as_deref(), row_header.as_deref(), &text);
            let last_col = cell.col.saturating_add(cell.colspan.saturating_sub(1));
            let colspan = map
                .global_col(panel, last_col)
                .filter(|&g| g >= global_col)
                .map_or(cell.colspan, |g| (g - global_col).saturating_add(1));
            cells.push(EnrichedCell {
                cell_id: cell.id().to_string(),
                panel,
                row: cell.row,
                global_col,
                rowspan: cell.rowspan,
                colspan,
                text,
                col_header,
                row_header,
                enriched_text,
                is_header,
            });
        }
        cells.sort_by_key(|c| (c.row, c.global_col));

        if !grid.unmapped().is_empty() {
            log::warn!(
                "HeaderEnricher: {} cells of table {} have no global column",
                grid.unmapped().len(),
                table.id
            );
        }

        EnrichedTable {
            table_id: table.id.clone(),
            page: table.page,
            title: table.title.clone(),
            rows: grid.rows(),
            cols: grid.cols(),
            column_headers,
            cells,
            unmapped: grid.unmapped().to_vec(),
            issues: grid.issue().cloned().into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BoundingBox, TableCell, TablePanel};

    fn bbox() -> BoundingBox {
        BoundingBox::new(0.0, 0.0, 10.0, 10.0)
    }

    fn cell(id: &str, text: &str, row: u32, col: u32) -> TableCell {
        TableCell::text(id, text, 0, bbox(), row, col)
    }

    #[test]
    fn test_two_panel_enrichment() {
        let left = TablePanel::new(1, bbox())
            .with_cell(cell("l-h0", "2/4", 0, 0).header())
            .with_cell(cell("l-h4", "", 0, 4).header())
            .with_cell(cell("l-r3", "72", 3, 4));
        let right = TablePanel::new(2, bbox())
            .with_cell(cell("r-h0", "2/11", 0, 0).header())
            .with_cell(cell("r-d3", "Alice", 3, 0));
        let table = Table::new("t", 0).with_panel(left).with_panel(right);

        let map = GlobalColumnMap::new().with(1, 0, 0).with(1, 4, 4).with(2, 0, 5);
        let header = HeaderMap::new(6).with_header_row(0).with_header_col(4);

        let enriched = HeaderEnricher::new().enrich(&table, &map, &header);

        let data = enriched.cells.iter().find(|c| c.cell_id == "r-d3").unwrap();
        assert_eq!(data.global_col, 5);
        assert_eq!(data.col_header.as_deref(), Some("2/11"));
        assert_eq!(data.row_header.as_deref(), Some("72"));
        assert_eq!(data.enriched_text, "[2/11 | 72] Alice");
        assert_eq!(data.text, "Alice");
    }

    #[test]
    fn test_nearest_fill_stays_inside_panel() {
        // Panel A owns global 0..=3 with only a blank header; panel B owns 4 with "X"
        let a = TablePanel::new(0, bbox())
            .with_cell(cell("a0", "", 0, 0).header())
            .with_cell(cell("a3", "", 0, 3).header())
            .with_cell(cell("a-d", "1", 1, 3));
        let b = TablePanel::new(1, bbox())
            .with_cell(cell("b0", "X", 0, 0).header())
            .with_cell(cell("b-d", "2", 1, 0));
        let table = Table::new("t", 0).with_panel(a).with_panel(b);
        let map = GlobalColumnMap::identity(0, 4).with(1, 0, 4);
        let header = HeaderMap::new(5).with_header_row(0);

        let mut grid = DenseGrid::project(&table, &map, &header);
        fill_header_rows(&mut grid, &header);

        assert_eq!(grid.text(0, 3), "");
        assert_eq!(grid.text(0, 4), "X");
    }

    #[test]
    fn test_nearest_fill_prefers_left_on_tie() {
        let panel = TablePanel::new(0, bbox())
            .with_cell(cell("h0", "Left", 0, 0).header())
            .with_cell(cell("h1", "", 0, 1).header())
            .with_cell(cell("h2", "Right", 0, 2).header())
            .with_cell(cell("h3", "", 0, 3).header())
            .with_cell(cell("d", "v", 1, 1));
        let table = Table::new("t", 0).with_panel(panel);
        let map = GlobalColumnMap::identity(0, 4);
        let header = HeaderMap::new(4).with_header_row(0);

        let enriched = HeaderEnricher::new().enrich(&table, &map, &header);

        assert_eq!(enriched.column_headers, vec!["Left", "Left", "Right", "Right"]);
        let d = enriched.cells.iter().find(|c| c.cell_id == "d").unwrap();
        assert_eq!(d.enriched_text, "[Left] v");
    }

    #[test]
    fn test_row_header_fills_down_and_dedups() {
        let panel = TablePanel::new(0, bbox())
            .with_cell(cell("h0", "Team", 0, 0).header())
            .with_cell(cell("h1", "Team", 0, 1).header())
            .with_cell(cell("h2", "Score", 0, 2).header())
            .with_cell(cell("r1a", "Red", 1, 0))
            .with_cell(cell("r1b", "Red", 1, 1))
            .with_cell(cell("r1c", "3", 1, 2))
            .with_cell(cell("r2c", "5", 2, 2));
        let table = Table::new("t", 0).with_panel(panel);
        let map = GlobalColumnMap::identity(0, 3);
        let header = HeaderMap::new(3)
            .with_header_row(0)
            .with_header_col(0)
            .with_header_col(1);

        let enriched = HeaderEnricher::new().enrich(&table, &map, &header);

        let r1 = enriched.cells.iter().find(|c| c.cell_id == "r1c").unwrap();
        assert_eq!(r1.row_header.as_deref(), Some("Red"));
        let r2 = enriched.cells.iter().find(|c| c.cell_id == "r2c").unwrap();
        assert_eq!(r2.row_header.as_deref(), Some("Red"));
        assert_eq!(r2.col_header.as_deref(), Some("Score"));
        assert_eq!(enriched.data_cells().count(), 2);
    }

    #[test]
    fn test_enrichment_leaves_cells_untouched() {
        let panel = TablePanel::new(0, bbox())
            .with_cell(cell("h", "Name", 0, 0).header())
            .with_cell(cell("d", "Bob", 1, 0));
        let table = Table::new("t", 0).with_panel(panel);
        let before = table.clone();

        let map = GlobalColumnMap::identity(0, 1);
        let header = HeaderMap::from_table(&table, &map);
        let enriched = HeaderEnricher::new().enrich(&table, &map, &header);

        assert_eq!(table, before);
        assert_eq!(enriched.cells[1].enriched_text, "[Name] Bob");
    }

    #[test]
    fn test_spanning_header_labels_every_covered_column() {
        let panel = TablePanel::new(0, bbox())
            .with_cell(cell("q1", "Q1", 0, 0).colspan(2).header())
            .with_cell(cell("q2", "Q2", 0, 2).header())
            .with_cell(cell("a", "10", 1, 0))
            .with_cell(cell("b", "20", 1, 1))
            .with_cell(cell("c", "30", 1, 2));
        let table = Table::new("t", 0).with_panel(panel);
        let map = GlobalColumnMap::identity(0, 3);
        let header = HeaderMap::from_table(&table, &map);

        let enriched = HeaderEnricher::new().enrich(&table, &map, &header);

        assert_eq!(enriched.column_headers, vec!["Q1", "Q1", "Q2"]);
        let q1 = enriched.cells.iter().find(|c| c.cell_id == "q1").unwrap();
        assert_eq!(q1.colspan, 2);
        assert!(q1.is_header);
        let b = enriched.cells.iter().find(|c| c.cell_id == "b").unwrap();
        assert_eq!(b.enriched_text, "[Q1] 20");
        let c = enriched.cells.iter().find(|c| c.cell_id == "c").unwrap();
        assert_eq!(c.enriched_text, "[Q2] 30");
        assert!(enriched.issues.is_empty());
    }

    #[test]
    fn test_bad_header_width_becomes_issue() {
        let panel = TablePanel::new(0, bbox())
            .with_cell(cell("h", "Name", 0, 0).header())
            .with_cell(cell("d", "Bob", 1, 0));
        let table = Table::new("t", 0).with_panel(panel);
        let map = GlobalColumnMap::identity(0, 1);
        let header = HeaderMap::new(u32::MAX).with_header_row(0);

        let enriched = HeaderEnricher::new().enrich(&table, &map, &header);

        assert_eq!(enriched.cols, 1);
        assert_eq!(enriched.issues.len(), 1);
        assert_eq!(enriched.issues[0].kind, crate::error::IssueKind::InvalidTableLayout);
        assert_eq!(enriched.cells[1].enriched_text, "[Name] Bob");
    }
}
