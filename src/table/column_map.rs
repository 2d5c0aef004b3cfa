//! Global column map, header map and the dense projected grid.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Issue, IssueKind};
use crate::model::{Table, TableCell};

/// Largest number of slots a projected grid may hold.
pub const MAX_GRID_SLOTS: usize = 1 << 22;

/// One `(panel, local column) -> global column` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Panel id
    pub panel: u32,
    /// Column index local to the panel
    pub local_col: u32,
    /// Column index in the reconciled table
    pub global_col: u32,
}

/// Maps panel-local columns into one table-wide coordinate space.
///
/// Built upstream by layout analysis and only read here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ColumnMapping>", into = "Vec<ColumnMapping>")]
pub struct GlobalColumnMap {
    entries: BTreeMap<(u32, u32), u32>,
}

impl GlobalColumnMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map one panel's `columns` onto global columns `0..columns`.
    pub fn identity(panel: u32, columns: u32) -> Self {
        (0..columns).fold(Self::new(), |map, c| map.with(panel, c, c))
    }

    /// Lay the panels of a table side by side in panel order.
    pub fn sequential(table: &Table) -> Self {
        let mut map = Self::new();
        let mut offset = 0;
        for panel in &table.panels {
            let columns = panel.column_count();
            for c in 0..columns {
                map.insert(panel.panel_id, c, offset + c);
            }
            offset += columns;
        }
        map
    }

    /// Add an entry and return self.
    pub fn with(mut self, panel: u32, local_col: u32, global_col: u32) -> Self {
        self.insert(panel, local_col, global_col);
        self
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, panel: u32, local_col: u32, global_col: u32) {
        self.entries.insert((panel, local_col), global_col);
    }

    /// Look up the global column of a panel-local column.
    pub fn global_col(&self, panel: u32, local_col: u32) -> Option<u32> {
        self.entries.get(&(panel, local_col)).copied()
    }

    /// The panel owning a global column, if exactly one panel maps to it.
    pub fn panel_of_global(&self, global_col: u32) -> Option<u32> {
        let mut owners = self
            .entries
            .iter()
            .filter(|&(_, &g)| g == global_col)
            .map(|(&(panel, _), _)| panel);
        let first = owners.next()?;
        if owners.all(|p| p == first) {
            Some(first)
        } else {
            None
        }
    }

    /// Number of global columns covered (highest index + 1).
    pub fn global_col_count(&self) -> u32 {
        self.entries.values().max().map_or(0, |&g| g.saturating_add(1))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<ColumnMapping>> for GlobalColumnMap {
    fn from(mappings: Vec<ColumnMapping>) -> Self {
        let entries = mappings
            .into_iter()
            .map(|m| ((m.panel, m.local_col), m.global_col))
            .collect();
        Self { entries }
    }
}

impl From<GlobalColumnMap> for Vec<ColumnMapping> {
    fn from(map: GlobalColumnMap) -> Self {
        map.entries
            .into_iter()
            .map(|((panel, local_col), global_col)| ColumnMapping {
                panel,
                local_col,
                global_col,
            })
            .collect()
    }
}

/// Which global rows and columns carry headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMap {
    /// Rows holding column headers
    pub global_col_header_rows: BTreeSet<u32>,

    /// Global columns holding row headers
    pub global_row_header_cols: BTreeSet<u32>,

    /// Width of the reconciled table
    pub global_col_count: u32,
}

impl HeaderMap {
    /// Create a header map for a table `global_col_count` columns wide.
    pub fn new(global_col_count: u32) -> Self {
        Self {
            global_col_count,
            ..Self::default()
        }
    }

    /// Declare a column-header row and return self.
    pub fn with_header_row(mut self, row: u32) -> Self {
        self.global_col_header_rows.insert(row);
        self
    }

    /// Declare a row-header column and return self.
    pub fn with_header_col(mut self, col: u32) -> Self {
        self.global_row_header_cols.insert(col);
        self
    }

    /// Derive header rows from the cells flagged as headers.
    pub fn from_table(table: &Table, map: &GlobalColumnMap) -> Self {
        let mut header = Self::new(map.global_col_count());
        let rows = table.row_count().min(MAX_GRID_SLOTS as u32);
        for (_, cell) in table.cells().filter(|(_, c)| c.is_header) {
            for r in cell.row..cell.row.saturating_add(cell.rowspan).min(rows) {
                header.global_col_header_rows.insert(r);
            }
        }
        header
    }

    /// Check if a row carries column headers.
    pub fn is_header_row(&self, row: u32) -> bool {
        self.global_col_header_rows.contains(&row)
    }

    /// Check if a column carries row headers.
    pub fn is_header_col(&self, col: u32) -> bool {
        self.global_row_header_cols.contains(&col)
    }
}

/// One slot of the dense grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridSlot {
    /// Id of the cell projected here
    pub cell_id: Option<String>,

    /// Panel owning the slot
    pub panel: Option<u32>,

    /// Text value (cell text, or filled header text)
    pub text: String,

    /// Whether `text` was copied from a neighbour
    pub filled: bool,
}

impl GridSlot {
    /// Check if the slot has no text.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// A rows x global-columns grid with every cell projected through the map.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseGrid {
    rows: u32,
    cols: u32,
    slots: Vec<GridSlot>,
    unmapped: Vec<String>,
    issue: Option<Issue>,
}

impl DenseGrid {
    /// Project every cell of `table` through `map`.
    ///
    /// Spanning cells fill every slot they cover. Slots with no cell take
    /// their panel from the map when a single panel owns the column.
    ///
    /// A declared width past the mapped columns and the widest cell is
    /// clamped to them. A grid larger than [`MAX_GRID_SLOTS`] is left empty.
    /// Both cases are reported through [`DenseGrid::issue`].
    pub fn project(table: &Table, map: &GlobalColumnMap, header: &HeaderMap) -> Self {
        let mut rows = table.row_count();
        let extent = table
            .cells()
            .filter_map(|(panel, cell)| {
                map.global_col(panel, cell.col)
                    .map(|g| g.saturating_add(cell.colspan))
            })
            .max()
            .unwrap_or(0);
        let bound = map.global_col_count().max(extent);

        let mut issue = None;
        let mut cols = header.global_col_count.max(map.global_col_count());
        if cols > bound {
            log::warn!(
                "DenseGrid: table {} declares {} columns but only {} are used, clamping",
                table.id,
                cols,
                bound
            );
            issue = Some(layout_issue(
                table,
                format!("declared width {} clamped to {} columns", cols, bound),
            ));
            cols = bound;
        }

        let size = (rows as usize)
            .checked_mul(cols as usize)
            .filter(|&n| n <= MAX_GRID_SLOTS);
        let size = match size {
            Some(n) => n,
            None => {
                log::warn!(
                    "DenseGrid: table {} needs a {}x{} grid, leaving it empty",
                    table.id,
                    rows,
                    cols
                );
                issue = Some(layout_issue(
                    table,
                    format!("{}x{} grid exceeds {} slots", rows, cols, MAX_GRID_SLOTS),
                ));
                rows = 0;
                cols = 0;
                0
            }
        };

        let mut grid = Self {
            rows,
            cols,
            slots: vec![GridSlot::default(); size],
            unmapped: Vec::new(),
            issue,
        };

        for c in 0..cols {
            let owner = map.panel_of_global(c);
            for r in 0..rows {
                if let Some(slot) = grid.slot_mut(r, c) {
                    slot.panel = owner;
                }
            }
        }

        for (panel, cell) in table.cells() {
            match map.global_col(panel, cell.col) {
                Some(g) => grid.place(panel, cell, g, map),
                None => {
                    log::debug!(
                        "DenseGrid: cell {} (panel {}, col {}) has no global column",
                        cell.id(),
                        panel,
                        cell.col
                    );
                    grid.unmapped.push(cell.id().to_string());
                }
            }
        }

        grid
    }

    fn place(&mut self, panel: u32, cell: &TableCell, global: u32, map: &GlobalColumnMap) {
        let row_end = cell.row.saturating_add(cell.rowspan).min(self.rows);
        for dc in 0..cell.colspan.min(self.cols) {
            let g = map
                .global_col(panel, cell.col.saturating_add(dc))
                .unwrap_or(global.saturating_add(dc));
            for r in cell.row..row_end {
                if let Some(slot) = self.slot_mut(r, g) {
                    slot.cell_id = Some(cell.id().to_string());
                    slot.panel = Some(panel);
                    slot.text = cell.text_value().trim().to_string();
                }
            }
        }
    }

    /// Number of rows.
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// Number of global columns.
    pub fn cols(&self) -> u32 {
        self.cols
    }

    /// Ids of cells that had no global column.
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    /// Layout problem found while projecting, if any.
    pub fn issue(&self) -> Option<&Issue> {
        self.issue.as_ref()
    }

    fn index(&self, row: u32, col: u32) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row as usize * self.cols as usize + col as usize)
    }

    /// Slot at `(row, col)`.
    pub fn slot(&self, row: u32, col: u32) -> Option<&GridSlot> {
        self.index(row, col).and_then(|i| self.slots.get(i))
    }

    pub(crate) fn slot_mut(&mut self, row: u32, col: u32) -> Option<&mut GridSlot> {
        let i = self.index(row, col)?;
        self.slots.get_mut(i)
    }

    /// Text at `(row, col)`, empty when out of range.
    pub fn text(&self, row: u32, col: u32) -> &str {
        self.slot(row, col).map_or("", |s| s.text.as_str())
    }
}

fn layout_issue(table: &Table, message: String) -> Issue {
    Issue::new(IssueKind::InvalidTableLayout, message)
        .on_page(table.page)
        .for_item(table.id.clone())
}
