//! Pluggable domain interpretation of enriched tables.
//!
//! A [`DomainRegistry`] holds handlers in priority order. The first handler
//! that claims a table and produces a result wins; tables nobody claims pass
//! through in their generic enriched form.
//!
//! # Example
//!
//! ```ignore
//! use docweave::domain::{DomainContext, DomainRegistry};
//!
//! let registry = DomainRegistry::with_defaults();
//! let ctx = DomainContext::for_table("doc-1", &enriched);
//! let (interpretation, issues) = registry.interpret(&enriched, &ctx);
//! ```

mod normalize;
mod roster;
mod scoresheet;

pub use normalize::{
    canonical_date, dedup_and_sort, split_leading_flags, split_names, split_parenthetical, Denylist,
};
pub use roster::RosterHandler;
pub use scoresheet::ScoreSheetHandler;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Issue, IssueKind};
use crate::table::{EnrichedCell, EnrichedTable};

/// What a handler knows about the table it is looking at.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainContext {
    /// Document id
    pub doc_id: String,

    /// Table id
    pub table_id: String,

    /// Page of the table
    pub page: i32,

    /// Column header labels of the table
    pub headers: Vec<String>,

    /// Year applied to dates printed without one
    pub reference_year: Option<i32>,
}

impl DomainContext {
    /// Build a context for an enriched table.
    pub fn for_table(doc_id: impl Into<String>, table: &EnrichedTable) -> Self {
        Self {
            doc_id: doc_id.into(),
            table_id: table.table_id.clone(),
            page: table.page,
            headers: table.header_labels().map(str::to_string).collect(),
            reference_year: None,
        }
    }

    /// Set the reference year and return self.
    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = Some(year);
        self
    }

    /// Check if the title or any header contains one of `keywords`
    /// (case-insensitive).
    pub fn mentions(&self, title: &str, keywords: &[&str]) -> bool {
        let haystacks = std::iter::once(title).chain(self.headers.iter().map(String::as_str));
        haystacks
            .map(str::to_lowercase)
            .any(|h| keywords.iter().any(|k| h.contains(k)))
    }
}

/// A normalized domain record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntity {
    /// Entity name (person, team, item)
    pub entity: String,

    /// Primary header (usually a canonical date)
    pub header1: String,

    /// Secondary header, if the domain has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header2: Option<String>,

    /// Value recorded for the triple
    pub value: String,

    /// Canonical date (`YYYY-MM-DD` or `--MM-DD`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    /// Leading flag glyphs split off the name
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,

    /// Parenthetical annotation split off the name or value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,

    /// Source cell id
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cell_id: String,
}

impl DomainEntity {
    /// Create a record.
    pub fn new(entity: impl Into<String>, header1: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            header1: header1.into(),
            value: value.into(),
            ..Self::default()
        }
    }
}

/// Dense grid keyed on a domain's own two axes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayGrid {
    /// Row axis labels
    pub row_axis: Vec<String>,

    /// Column axis labels
    pub col_axis: Vec<String>,

    /// `cells[row][col]`; `None` where no record exists
    pub cells: Vec<Vec<Option<String>>>,
}

impl DisplayGrid {
    /// Build a grid from records. Axis labels are sorted; several values
    /// landing in one slot are joined with ", ".
    pub fn from_records<R, C, V>(records: &[DomainEntity], row: R, col: C, value: V) -> Self
    where
        R: Fn(&DomainEntity) -> String,
        C: Fn(&DomainEntity) -> String,
        V: Fn(&DomainEntity) -> String,
    {
        let mut slots: BTreeMap<(String, String), Vec<String>> = BTreeMap::new();
        for record in records {
            slots.entry((row(record), col(record))).or_default().push(value(record));
        }

        let mut row_axis: Vec<String> = slots.keys().map(|(r, _)| r.clone()).collect();
        row_axis.dedup();
        let mut col_axis: Vec<String> = slots.keys().map(|(_, c)| c.clone()).collect();
        col_axis.sort();
        col_axis.dedup();

        let cells = row_axis
            .iter()
            .map(|r| {
                col_axis
                    .iter()
                    .map(|c| slots.get(&(r.clone(), c.clone())).map(|v| v.join(", ")))
                    .collect()
            })
            .collect();

        Self {
            row_axis,
            col_axis,
            cells,
        }
    }

    /// Value at `(row_label, col_label)`.
    pub fn get(&self, row: &str, col: &str) -> Option<&str> {
        let r = self.row_axis.iter().position(|l| l == row)?;
        let c = self.col_axis.iter().position(|l| l == col)?;
        self.cells.get(r)?.get(c)?.as_deref()
    }
}

/// Output of a domain handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainResult {
    /// Handler name
    pub handler: String,

    /// Flat, de-duplicated, sorted records
    pub records: Vec<DomainEntity>,

    /// Display grid
    pub grid: DisplayGrid,
}

/// Strategy that reinterprets enriched cells into domain records.
pub trait DomainHandler: Send + Sync {
    /// Handler name.
    fn name(&self) -> &str;

    /// Keyword sniff on the table title and context.
    fn detect(&self, title: &str, ctx: &DomainContext) -> bool;

    /// Reinterpret cells. `None` means the handler cannot make sense of them.
    fn process(&self, cells: &[EnrichedCell], ctx: &DomainContext) -> Option<DomainResult>;
}

/// How a table was interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interpretation {
    /// A handler claimed the table.
    Domain(DomainResult),
    /// No handler claimed the table; cells pass through.
    Generic {
        /// Enriched cells
        cells: Vec<EnrichedCell>,
    },
}

impl Interpretation {
    /// Name of the claiming handler, if any.
    pub fn handler(&self) -> Option<&str> {
        match self {
            Interpretation::Domain(result) => Some(&result.handler),
            Interpretation::Generic { .. } => None,
        }
    }
}

/// Ordered collection of domain handlers.
#[derive(Clone)]
pub struct DomainRegistry {
    handlers: Vec<Arc<dyn DomainHandler>>,
}

impl DomainRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Create a registry with the built-in handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ScoreSheetHandler::new()));
        registry.register(Arc::new(RosterHandler::new()));
        registry
    }

    /// Append a handler at the lowest priority.
    pub fn register(&mut self, handler: Arc<dyn DomainHandler>) {
        self.handlers.push(handler);
    }

    /// Handler names in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Number of handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Try handlers in order.
    ///
    /// A handler that claims the table but returns nothing is recorded as a
    /// mismatch and the next handler is tried.
    pub fn interpret(&self, table: &EnrichedTable, ctx: &DomainContext) -> (Interpretation, Vec<Issue>) {
        let title = table.title.as_deref().unwrap_or("");
        let mut issues = Vec::new();

        for handler in &self.handlers {
            if !handler.detect(title, ctx) {
                continue;
            }
            match handler.process(&table.cells, ctx) {
                Some(result) => {
                    log::debug!(
                        "DomainRegistry: table {} claimed by {} ({} records)",
                        table.table_id,
                        handler.name(),
                        result.records.len()
                    );
                    return (Interpretation::Domain(result), issues);
                }
                None => {
                    log::warn!(
                        "DomainRegistry: {} claimed table {} but produced nothing",
                        handler.name(),
                        table.table_id
                    );
                    issues.push(
                        Issue::new(
                            IssueKind::DomainHandlerMismatch,
                            format!("handler '{}' claimed the table but returned no result", handler.name()),
                        )
                        .on_page(table.page)
                        .for_item(table.table_id.clone()),
                    );
                }
            }
        }

        (
            Interpretation::Generic {
                cells: table.cells.clone(),
            },
            issues,
        )
    }
}

impl Default for DomainRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
