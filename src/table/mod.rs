//! Multi-panel table reconciliation and header enrichment.

mod column_map;
mod enrich;

pub use column_map::{ColumnMapping, DenseGrid, GlobalColumnMap, GridSlot, HeaderMap};
pub use enrich::{
    compose_enriched_text, fill_header_cols, fill_header_rows, EnrichedCell, EnrichedTable,
    HeaderEnricher,
};
