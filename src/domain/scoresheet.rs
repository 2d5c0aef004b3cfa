//! Score sheets: entity rows against date (or round) columns.

use super::normalize::{
    canonical_date, dedup_and_sort, split_leading_flags, split_parenthetical, Denylist,
};
use super::{DisplayGrid, DomainContext, DomainEntity, DomainHandler, DomainResult};
use crate::table::EnrichedCell;

const KEYWORDS: &[&str] = &["score", "result", "standings", "grade", "points", "成績", "得点"];

/// Turns score tables into `(entity, column) -> score` records.
#[derive(Debug, Clone, Default)]
pub struct ScoreSheetHandler {
    denylist: Denylist,
}

impl ScoreSheetHandler {
    /// Create a handler with the default denylist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom denylist.
    pub fn with_denylist(denylist: Denylist) -> Self {
        Self { denylist }
    }

    fn record(&self, cell: &EnrichedCell, ctx: &DomainContext) -> Option<DomainEntity> {
        let row_header = cell.row_header.as_deref()?;
        let col_header = cell.col_header.as_deref()?;
        if self.denylist.is_denied(row_header)
            || self.denylist.is_denied(col_header)
            || self.denylist.is_denied(&cell.text)
        {
            return None;
        }

        let (name, annotation) = split_parenthetical(row_header);
        let (flags, entity) = split_leading_flags(&name);
        let (value, value_note) = split_parenthetical(&cell.text);
        let date = canonical_date(col_header, ctx.reference_year);

        Some(DomainEntity {
            entity,
            header1: date.clone().unwrap_or_else(|| col_header.trim().to_string()),
            header2: None,
            value,
            date,
            flags,
            annotation: annotation.or(value_note),
            cell_id: cell.cell_id.clone(),
        })
    }
}

impl DomainHandler for ScoreSheetHandler {
    fn name(&self) -> &str {
        "scoresheet"
    }

    fn detect(&self, title: &str, ctx: &DomainContext) -> bool {
        ctx.mentions(title, KEYWORDS)
    }

    fn process(&self, cells: &[EnrichedCell], ctx: &DomainContext) -> Option<DomainResult> {
        let records: Vec<DomainEntity> = cells
            .iter()
            .filter(|c| !c.is_header)
            .filter_map(|c| self.record(c, ctx))
            .collect();
        if records.is_empty() {
            return None;
        }

        let records = dedup_and_sort(records);
        let grid = DisplayGrid::from_records(
            &records,
            |r| r.entity.clone(),
            |r| r.header1.clone(),
            |r| r.value.clone(),
        );

        Some(DomainResult {
            handler: self.name().to_string(),
            records,
            grid,
        })
    }
}
