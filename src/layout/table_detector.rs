//! Table region detection.
//!
//! Two strategies are available. Ruled detection reads the line and
//! rectangle segments drawn on the page and builds a grid from them. Stream
//! detection, used when a page has no rules, looks for text that lines up in
//! columns across consecutive rows.

use std::collections::{HashMap, HashSet};

use crate::model::{cmp_f32, BoundingBox, ExtractedElement, Table, TableCell, TablePanel};

/// A detected table region with its content.
#[derive(Debug, Clone)]
pub struct DetectedTable {
    /// Region covered by the table
    pub bbox: BoundingBox,
    /// Column boundaries (X coordinates, left to right)
    pub columns: Vec<f32>,
    /// Ids of the elements placed into cells
    pub member_ids: Vec<String>,
    /// The table as a single-panel model
    pub table: Table,
}

/// Table detector configuration.
#[derive(Debug, Clone)]
pub struct TableDetectorConfig {
    /// Minimum number of rows to consider as table
    pub min_rows: usize,
    /// Minimum number of columns to consider as table
    pub min_columns: usize,
    /// Maximum number of columns (above this, likely word-level splitting)
    pub max_columns: usize,
    /// Distance under which two rule segments are considered connected
    pub rule_tolerance: f32,
    /// Maximum thickness of a segment treated as a line rather than a box
    pub rule_thickness: f32,
    /// Y tolerance for grouping elements into rows (fraction of height)
    pub y_tolerance_factor: f32,
    /// Minimum column alignment ratio (0.0-1.0)
    pub min_alignment_ratio: f32,
    /// Minimum gap between columns
    pub min_column_gap: f32,
}

impl Default for TableDetectorConfig {
    fn default() -> Self {
        Self {
            min_rows: 2,
            min_columns: 2,
            max_columns: 12,
            rule_tolerance: 2.0,
            rule_thickness: 3.0,
            y_tolerance_factor: 0.4,
            min_alignment_ratio: 0.3,
            min_column_gap: 15.0,
        }
    }
}

/// Detects tables in a page's elements.
pub struct TableDetector {
    config: TableDetectorConfig,
}

impl TableDetector {
    /// Create a new table detector with default configuration.
    pub fn new() -> Self {
        Self {
            config: TableDetectorConfig::default(),
        }
    }

    /// Create a new table detector with custom configuration.
    pub fn with_config(config: TableDetectorConfig) -> Self {
        Self { config }
    }

    /// Detect ruled tables from line/rect segments.
    pub fn detect_ruled(
        &self,
        page: i32,
        elements: &[ExtractedElement],
        rules: &[BoundingBox],
    ) -> Vec<DetectedTable> {
        let (horizontal, vertical) = self.split_rules(rules);
        if horizontal.len() < self.config.min_rows + 1
            || vertical.len() < self.config.min_columns + 1
        {
            log::debug!(
                "TableDetector: not enough rules ({} horizontal, {} vertical)",
                horizontal.len(),
                vertical.len()
            );
            return vec![];
        }

        let segments: Vec<(BoundingBox, bool)> = horizontal
            .iter()
            .map(|b| (*b, true))
            .chain(vertical.iter().map(|b| (*b, false)))
            .collect();

        let mut tables = Vec::new();
        for cluster in self.cluster_segments(&segments) {
            let xs = dedup_positions(
                cluster
                    .iter()
                    .filter(|&&i| !segments[i].1)
                    .map(|&i| segments[i].0.center_x())
                    .collect(),
                self.config.rule_tolerance,
            );
            let ys = dedup_positions(
                cluster
                    .iter()
                    .filter(|&&i| segments[i].1)
                    .map(|&i| segments[i].0.center_y())
                    .collect(),
                self.config.rule_tolerance,
            );

            if xs.len() < self.config.min_columns + 1 || ys.len() < self.config.min_rows + 1 {
                continue;
            }

            let table_id = format!("p{}-t{}", page, tables.len());
            tables.push(self.build_grid(&table_id, page, elements, &xs, &ys));
        }

        log::debug!("TableDetector: {} ruled tables on page {}", tables.len(), page);
        tables
    }

    /// Detect tables from text alignment alone.
    pub fn detect_stream(&self, page: i32, elements: &[ExtractedElement]) -> Vec<DetectedTable> {
        if elements.len() < self.config.min_rows * self.config.min_columns {
            return vec![];
        }

        let rows = self.group_into_rows(elements);
        if rows.len() < self.config.min_rows {
            return vec![];
        }

        let columns = self.detect_columns(&rows);
        if columns.len() < self.config.min_columns {
            log::debug!(
                "TableDetector: not enough columns ({} < {})",
                columns.len(),
                self.config.min_columns
            );
            return vec![];
        }

        let mut tables = Vec::new();
        for (start, end) in self.find_table_regions(&rows, &columns) {
            let region_rows = &rows[start..=end];
            let region_columns = self.detect_columns(region_rows);

            if region_columns.len() < self.config.min_columns {
                continue;
            }
            if region_columns.len() > self.config.max_columns {
                log::debug!(
                    "TableDetector: skipping region, too many columns ({} > {})",
                    region_columns.len(),
                    self.config.max_columns
                );
                continue;
            }
            if self.is_list_pattern(region_rows, &region_columns) {
                log::debug!("TableDetector: skipping region, detected as list pattern");
                continue;
            }

            let table_id = format!("p{}-t{}", page, tables.len());
            tables.push(self.build_stream_table(&table_id, page, region_rows, region_columns));
        }

        log::debug!("TableDetector: {} stream tables on page {}", tables.len(), page);
        tables
    }

    fn split_rules(&self, rules: &[BoundingBox]) -> (Vec<BoundingBox>, Vec<BoundingBox>) {
        let t = self.config.rule_thickness;
        let mut horizontal = Vec::new();
        let mut vertical = Vec::new();

        for rule in rules {
            let (w, h) = (rule.width().max(0.0), rule.height().max(0.0));
            if h <= t && w > t {
                horizontal.push(*rule);
            } else if w <= t && h > t {
                vertical.push(*rule);
            } else if w > t && h > t {
                // Rectangle: contributes its four edges
                horizontal.push(BoundingBox::new(rule.x0, rule.y0, rule.x1, rule.y0));
                horizontal.push(BoundingBox::new(rule.x0, rule.y1, rule.x1, rule.y1));
                vertical.push(BoundingBox::new(rule.x0, rule.y0, rule.x0, rule.y1));
                vertical.push(BoundingBox::new(rule.x1, rule.y0, rule.x1, rule.y1));
            }
        }

        (horizontal, vertical)
    }

    /// Group touching segments into connected clusters.
    fn cluster_segments(&self, segments: &[(BoundingBox, bool)]) -> Vec<Vec<usize>> {
        let tol = self.config.rule_tolerance;
        let mut parent: Vec<usize> = (0..segments.len()).collect();

        fn find(parent: &mut [usize], x: usize) -> usize {
            let mut root = x;
            while parent[root] != root {
                root = parent[root];
            }
            let mut cur = x;
            while parent[cur] != root {
                let next = parent[cur];
                parent[cur] = root;
                cur = next;
            }
            root
        }

        for i in 0..segments.len() {
            for j in (i + 1)..segments.len() {
                let a = segments[i].0;
                let b = segments[j].0;
                if a.h_gap(&b) <= tol && a.v_gap(&b) <= tol {
                    let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                    if ri != rj {
                        parent[rj] = ri;
                    }
                }
            }
        }

        let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..segments.len() {
            let root = find(&mut parent, i);
            clusters.entry(root).or_default().push(i);
        }

        let mut clusters: Vec<Vec<usize>> = clusters.into_values().collect();
        clusters.sort_by_key(|c| c[0]);
        clusters
    }

    fn build_grid(
        &self,
        table_id: &str,
        page: i32,
        elements: &[ExtractedElement],
        xs: &[f32],
        ys: &[f32],
    ) -> DetectedTable {
        let bbox = BoundingBox::new(xs[0], ys[0], xs[xs.len() - 1], ys[ys.len() - 1]);
        let mut slots: HashMap<(usize, usize), Vec<&ExtractedElement>> = HashMap::new();

        for el in elements {
            let (cx, cy) = el.bbox.center();
            if !bbox.contains_point(cx, cy, 0.0) {
                continue;
            }
            let col = interval_index(xs, cx);
            let row = interval_index(ys, cy);
            slots.entry((row, col)).or_default().push(el);
        }

        let mut panel = TablePanel::new(0, bbox);
        let mut member_ids = Vec::new();

        for row in 0..ys.len() - 1 {
            for col in 0..xs.len() - 1 {
                let cell_box = BoundingBox::new(xs[col], ys[row], xs[col + 1], ys[row + 1]);
                let members = slots.remove(&(row, col)).unwrap_or_default();
                let cell = make_cell(table_id, page, cell_box, row, col, members, &mut member_ids);
                panel.cells.push(cell);
            }
        }

        DetectedTable {
            bbox,
            columns: xs[..xs.len() - 1].to_vec(),
            member_ids,
            table: Table::new(table_id, page).with_panel(panel),
        }
    }

    /// Group elements into rows by vertical center.
    fn group_into_rows(&self, elements: &[ExtractedElement]) -> Vec<TableRowData> {
        let mut sorted: Vec<&ExtractedElement> = elements.iter().collect();
        sorted.sort_by(|a, b| {
            cmp_f32(a.bbox.center_y(), b.bbox.center_y()).then(cmp_f32(a.bbox.x0, b.bbox.x0))
        });

        let mut rows: Vec<TableRowData> = Vec::new();
        let mut current: Vec<ExtractedElement> = Vec::new();
        let mut current_y: Option<f32> = None;

        for el in sorted {
            let y_tolerance = el.bbox.height() * self.config.y_tolerance_factor;
            match current_y {
                Some(y) if (el.bbox.center_y() - y).abs() <= y_tolerance => {
                    current.push(el.clone());
                }
                _ => {
                    if !current.is_empty() {
                        rows.push(TableRowData::new(std::mem::take(&mut current)));
                    }
                    current_y = Some(el.bbox.center_y());
                    current.push(el.clone());
                }
            }
        }

        if !current.is_empty() {
            rows.push(TableRowData::new(current));
        }

        rows
    }

    /// Detect column boundaries from left edges shared by several rows.
    fn detect_columns(&self, rows: &[TableRowData]) -> Vec<f32> {
        let multi_rows: Vec<&TableRowData> = rows.iter().filter(|r| r.elements.len() >= 2).collect();
        let candidates: Vec<&TableRowData> = if multi_rows.len() >= self.config.min_rows {
            multi_rows
        } else {
            rows.iter().collect()
        };

        let mut edge_counts: HashMap<i32, usize> = HashMap::new();
        let bucket_size = 5.0;

        for row in &candidates {
            let buckets: HashSet<i32> = row
                .elements
                .iter()
                .map(|e| (e.bbox.x0 / bucket_size).round() as i32)
                .collect();
            for bucket in buckets {
                *edge_counts.entry(bucket).or_insert(0) += 1;
            }
        }

        let min_occurrences =
            ((candidates.len() as f32 * self.config.min_alignment_ratio) as usize).max(2);

        let mut edges: Vec<f32> = edge_counts
            .iter()
            .filter(|(_, count)| **count >= min_occurrences)
            .map(|(bucket, _)| *bucket as f32 * bucket_size)
            .collect();
        edges.sort_by(|a, b| cmp_f32(*a, *b));

        let mut merged: Vec<f32> = Vec::new();
        for edge in edges {
            match merged.last() {
                Some(last) if edge - last < self.config.min_column_gap => {}
                _ => merged.push(edge),
            }
        }
        merged
    }

    /// Find contiguous row ranges whose elements align with the columns.
    fn find_table_regions(&self, rows: &[TableRowData], columns: &[f32]) -> Vec<(usize, usize)> {
        let mut regions = Vec::new();
        let mut start: Option<usize> = None;

        for (i, row) in rows.iter().enumerate() {
            let aligned = row.elements.len() >= 2
                && alignment_score(row, columns) >= self.config.min_alignment_ratio;
            match (aligned, start) {
                (true, None) => start = Some(i),
                (false, Some(s)) => {
                    if i - s >= self.config.min_rows {
                        regions.push((s, i - 1));
                    }
                    start = None;
                }
                _ => {}
            }
        }

        if let Some(s) = start {
            if rows.len() - s >= self.config.min_rows {
                regions.push((s, rows.len() - 1));
            }
        }

        regions
    }

    fn build_stream_table(
        &self,
        table_id: &str,
        page: i32,
        rows: &[TableRowData],
        columns: Vec<f32>,
    ) -> DetectedTable {
        let all: Vec<&BoundingBox> = rows
            .iter()
            .flat_map(|r| r.elements.iter().map(|e| &e.bbox))
            .collect();
        let bbox = BoundingBox::union_all(all).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0));

        let mut panel = TablePanel::new(0, bbox);
        let mut member_ids = Vec::new();

        for (row_idx, row) in rows.iter().enumerate() {
            let mut by_col: Vec<Vec<&ExtractedElement>> = vec![Vec::new(); columns.len()];
            for el in &row.elements {
                let col = find_column_for_x(el.bbox.x0, &columns, bbox.x1);
                by_col[col].push(el);
            }

            for (col_idx, members) in by_col.into_iter().enumerate() {
                let x0 = columns[col_idx];
                let x1 = columns.get(col_idx + 1).copied().unwrap_or(bbox.x1);
                let cell_box = BoundingBox::new(x0, row.top, x1.max(x0 + 1.0), row.bottom);
                let cell = make_cell(table_id, page, cell_box, row_idx, col_idx, members, &mut member_ids);
                panel.cells.push(cell);
            }
        }

        DetectedTable {
            bbox,
            columns,
            member_ids,
            table: Table::new(table_id, page).with_panel(panel),
        }
    }

    /// Check if detected rows actually represent a numbered or bulleted list.
    fn is_list_pattern(&self, rows: &[TableRowData], columns: &[f32]) -> bool {
        if columns.len() < 2 || rows.is_empty() {
            return false;
        }

        let mut bullet_count = 0;
        let mut number_count = 0;
        for row in rows {
            if let Some(first) = row.elements.first() {
                let text = first.text().trim();
                if is_bullet_marker(text) {
                    bullet_count += 1;
                } else if is_number_marker(text) {
                    number_count += 1;
                }
            }
        }

        let bullet_ratio = bullet_count as f32 / rows.len() as f32;
        let total_ratio = (bullet_count + number_count) as f32 / rows.len() as f32;

        bullet_ratio >= 0.5 || (columns.len() == 2 && total_ratio >= 0.5)
    }
}

impl Default for TableDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// A row of elements in a stream table.
#[derive(Debug, Clone)]
struct TableRowData {
    top: f32,
    bottom: f32,
    elements: Vec<ExtractedElement>,
}

impl TableRowData {
    fn new(mut elements: Vec<ExtractedElement>) -> Self {
        elements.sort_by(|a, b| cmp_f32(a.bbox.x0, b.bbox.x0));
        let top = elements.iter().map(|e| e.bbox.y0).fold(f32::MAX, f32::min);
        let bottom = elements.iter().map(|e| e.bbox.y1).fold(f32::MIN, f32::max);
        Self {
            top,
            bottom,
            elements,
        }
    }
}

fn make_cell(
    table_id: &str,
    page: i32,
    cell_box: BoundingBox,
    row: usize,
    col: usize,
    mut members: Vec<&ExtractedElement>,
    member_ids: &mut Vec<String>,
) -> TableCell {
    members.sort_by(|a, b| cmp_f32(a.bbox.y0, b.bbox.y0).then(cmp_f32(a.bbox.x0, b.bbox.x0)));
    let text = members
        .iter()
        .map(|e| e.text().trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let ids: Vec<String> = members.iter().map(|e| e.id.clone()).collect();
    member_ids.extend(ids.iter().cloned());

    let mut cell = TableCell::text(
        format!("{}:r{}c{}", table_id, row, col),
        text,
        page,
        cell_box,
        row as u32,
        col as u32,
    );
    cell.element.metadata.merged_from = ids;
    if row == 0 {
        cell = cell.header();
    }
    cell
}

/// Collapse positions closer than `tolerance` into their first occurrence.
fn dedup_positions(mut positions: Vec<f32>, tolerance: f32) -> Vec<f32> {
    positions.sort_by(|a, b| cmp_f32(*a, *b));
    let mut out: Vec<f32> = Vec::new();
    for p in positions {
        match out.last() {
            Some(last) if p - last <= tolerance => {}
            _ => out.push(p),
        }
    }
    out
}

/// Index `i` with `bounds[i] <= v < bounds[i + 1]`, clamped to the last interval.
fn interval_index(bounds: &[f32], v: f32) -> usize {
    let last = bounds.len().saturating_sub(2);
    bounds
        .windows(2)
        .position(|w| v >= w[0] && v < w[1])
        .unwrap_or(last)
}

fn alignment_score(row: &TableRowData, columns: &[f32]) -> f32 {
    if row.elements.is_empty() || columns.is_empty() {
        return 0.0;
    }
    let tolerance = 5.0;
    let aligned = row
        .elements
        .iter()
        .filter(|e| columns.iter().any(|c| (e.bbox.x0 - c).abs() <= tolerance))
        .count();
    aligned as f32 / row.elements.len() as f32
}

/// Find which column an X position belongs to.
fn find_column_for_x(x: f32, columns: &[f32], right_x: f32) -> usize {
    for (i, &start) in columns.iter().enumerate() {
        let end = columns.get(i + 1).copied().unwrap_or(right_x + 100.0);
        if x >= start - 10.0 && x < end - 10.0 {
            return i;
        }
    }

    columns
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| cmp_f32((x - **a).abs(), (x - **b).abs()))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Check if text is a bullet marker.
fn is_bullet_marker(text: &str) -> bool {
    matches!(
        text.trim(),
        "-" | "–" | "—" | "•" | "·" | "*" | "○" | "▪" | "◦" | "▸" | "►" | "■" | "●" | "□" | "◆" | "▶"
    )
}

/// Check if text is a number-style list marker (1., 2), a., etc.).
fn is_number_marker(text: &str) -> bool {
    let cleaned: String = text.trim().chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return false;
    }

    if let Some(pos) = cleaned.find(|c: char| !c.is_ascii_digit()) {
        let (prefix, suffix) = cleaned.split_at(pos);
        if !prefix.is_empty() && (suffix == "." || suffix == ")") {
            return true;
        }
    }

    let chars: Vec<char> = cleaned.chars().collect();
    chars.len() == 2 && chars[0].is_alphabetic() && (chars[1] == '.' || chars[1] == ')')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(id: &str, text: &str, x: f32, y: f32) -> ExtractedElement {
        let w = text.chars().count() as f32 * 6.0;
        ExtractedElement::word(id, text, 0, BoundingBox::new(x, y, x + w, y + 10.0))
    }

    fn hline(y: f32, x0: f32, x1: f32) -> BoundingBox {
        BoundingBox::new(x0, y, x1, y + 0.5)
    }

    fn vline(x: f32, y0: f32, y1: f32) -> BoundingBox {
        BoundingBox::new(x, y0, x + 0.5, y1)
    }

    #[test]
    fn test_ruled_grid() {
        let rules = vec![
            hline(0.0, 0.0, 200.0),
            hline(20.0, 0.0, 200.0),
            hline(40.0, 0.0, 200.0),
            vline(0.0, 0.0, 40.0),
            vline(100.0, 0.0, 40.0),
            vline(200.0, 0.0, 40.0),
        ];
        let elements = vec![
            word("a", "Name", 5.0, 5.0),
            word("b", "Score", 105.0, 5.0),
            word("c", "Alice", 5.0, 25.0),
            word("d", "90", 105.0, 25.0),
            word("out", "Footer", 5.0, 80.0),
        ];

        let tables = TableDetector::new().detect_ruled(0, &elements, &rules);
        assert_eq!(tables.len(), 1);

        let table = &tables[0].table;
        assert_eq!(table.cell_count(), 4);
        assert_eq!(tables[0].member_ids.len(), 4);
        assert!(!tables[0].member_ids.contains(&"out".to_string()));

        let texts: Vec<&str> = table.cells().map(|(_, c)| c.text_value()).collect();
        assert_eq!(texts, vec!["Name", "Score", "Alice", "90"]);
        assert!(table.cells().filter(|(_, c)| c.is_header).count() == 2);
    }

    #[test]
    fn test_ruled_needs_grid() {
        let rules = vec![hline(0.0, 0.0, 200.0), hline(20.0, 0.0, 200.0)];
        let tables = TableDetector::new().detect_ruled(0, &[], &rules);
        assert!(tables.is_empty());
    }

    #[test]
    fn test_stream_simple_table() {
        let elements = vec![
            word("1", "Name", 10.0, 100.0),
            word("2", "Age", 80.0, 100.0),
            word("3", "Alice", 10.0, 115.0),
            word("4", "30", 80.0, 115.0),
            word("5", "Bob", 10.0, 130.0),
            word("6", "25", 80.0, 130.0),
        ];

        let tables = TableDetector::new().detect_stream(0, &elements);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].columns.len(), 2);
        assert_eq!(tables[0].table.row_count(), 3);
    }

    #[test]
    fn test_stream_single_column_is_not_table() {
        let elements = vec![
            word("1", "Line 1", 10.0, 100.0),
            word("2", "Line 2", 10.0, 115.0),
            word("3", "Line 3", 10.0, 130.0),
        ];
        assert!(TableDetector::new().detect_stream(0, &elements).is_empty());
    }

    #[test]
    fn test_bullet_list_not_table() {
        let elements = vec![
            word("1", "-", 50.0, 100.0),
            word("2", "Management", 80.0, 100.0),
            word("3", "-", 50.0, 115.0),
            word("4", "Firmware", 80.0, 115.0),
            word("5", "-", 50.0, 130.0),
            word("6", "Interfaces", 80.0, 130.0),
        ];
        assert!(TableDetector::new().detect_stream(0, &elements).is_empty());
    }

    #[test]
    fn test_markers() {
        assert!(is_number_marker("1."));
        assert!(is_number_marker("12)"));
        assert!(is_number_marker("a."));
        assert!(is_bullet_marker("•"));
        assert!(!is_number_marker("Name"));
        assert!(!is_bullet_marker("Alice"));
    }
}
