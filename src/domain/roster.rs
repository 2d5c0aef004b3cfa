//! Rosters and shift schedules: date rows against slot columns, with
//! assigned names in the cells.

use super::normalize::{
    canonical_date, dedup_and_sort, split_leading_flags, split_names, split_parenthetical, Denylist,
};
use super::{DisplayGrid, DomainContext, DomainEntity, DomainHandler, DomainResult};
use crate::table::EnrichedCell;

const KEYWORDS: &[&str] = &["schedule", "shift", "roster", "timetable", "duty", "当番", "勤務"];

/// Turns roster tables into `(name, date, slot)` assignments.
#[derive(Debug, Clone, Default)]
pub struct RosterHandler {
    denylist: Denylist,
}

impl RosterHandler {
    /// Create a handler with the default denylist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom denylist.
    pub fn with_denylist(denylist: Denylist) -> Self {
        Self { denylist }
    }

    fn assignments(&self, cell: &EnrichedCell, ctx: &DomainContext) -> Vec<DomainEntity> {
        let Some(date) = cell
            .row_header
            .as_deref()
            .and_then(|h| canonical_date(h, ctx.reference_year))
        else {
            return Vec::new();
        };
        let slot = cell
            .col_header
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !self.denylist.is_denied(s))
            .map(str::to_string);

        split_names(&cell.text)
            .into_iter()
            .filter(|n| !self.denylist.is_denied(n))
            .filter_map(|raw| {
                let (name, annotation) = split_parenthetical(&raw);
                let (flags, entity) = split_leading_flags(&name);
                if entity.is_empty() {
                    return None;
                }
                Some(DomainEntity {
                    entity,
                    header1: date.clone(),
                    header2: slot.clone(),
                    value: raw.clone(),
                    date: Some(date.clone()),
                    flags,
                    annotation,
                    cell_id: cell.cell_id.clone(),
                })
            })
            .collect()
    }
}

impl DomainHandler for RosterHandler {
    fn name(&self) -> &str {
        "roster"
    }

    fn detect(&self, title: &str, ctx: &DomainContext) -> bool {
        ctx.mentions(title, KEYWORDS)
    }

    fn process(&self, cells: &[EnrichedCell], ctx: &DomainContext) -> Option<DomainResult> {
        let records: Vec<DomainEntity> = cells
            .iter()
            .filter(|c| !c.is_header)
            .flat_map(|c| self.assignments(c, ctx))
            .collect();
        if records.is_empty() {
            return None;
        }

        let records = dedup_and_sort(records);
        let grid = DisplayGrid::from_records(
            &records,
            |r| r.header1.clone(),
            |r| r.header2.clone().unwrap_or_default(),
            |r| r.entity.clone(),
        );

        Some(DomainResult {
            handler: self.name().to_string(),
            records,
            grid,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(id: &str, row: &str, col: &str, text: &str) -> EnrichedCell {
        EnrichedCell {
            cell_id: id.into(),
            panel: 0,
            row: 1,
            global_col: 1,
            rowspan: 1,
            colspan: 1,
            text: text.into(),
            col_header: Some(col.into()),
            row_header: Some(row.into()),
            enriched_text: String::new(),
            is_header: false,
        }
    }

    #[test]
    fn test_assignments_split_and_normalize() {
        let cells = vec![
            data("a", "3/5 (Tue)", "Morning", "Ann, ◎Ben (sub)"),
            data("b", "3/5 (Tue)", "Evening", "Cy"),
            data("c", "3/6", "Morning", "Ann"),
        ];

        let result = RosterHandler::new()
            .process(&cells, &DomainContext::default())
            .unwrap();

        assert_eq!(result.records.len(), 4);
        let ben = result.records.iter().find(|r| r.entity == "Ben").unwrap();
        assert_eq!(ben.flags, vec!["◎"]);
        assert_eq!(ben.annotation.as_deref(), Some("sub"));
        assert_eq!(ben.date.as_deref(), Some("--03-05"));
        assert_eq!(ben.header2.as_deref(), Some("Morning"));

        assert_eq!(result.grid.row_axis, vec!["--03-05", "--03-06"]);
        assert_eq!(result.grid.get("--03-05", "Morning"), Some("Ann, Ben"));
    }

    #[test]
    fn test_rows_without_dates_are_ignored() {
        let cells = vec![data("a", "Notes", "Morning", "Ann")];
        assert!(RosterHandler::new()
            .process(&cells, &DomainContext::default())
            .is_none());
    }
}
