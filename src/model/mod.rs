//! Document model types.
//!
//! Geometry-tagged elements, tables made of panels, per-page collections and
//! the reconciled document. Every stage of the pipeline reads and produces
//! these types.

mod document;
mod element;
mod geometry;
mod page;
mod table;

pub use document::{Document, Metadata, TableResult};
pub use element::{
    ElementMetadata, ElementType, ExtractedElement, PhysicalChar, Source, TaggedTexts,
    TextProvenance,
};
pub use geometry::BoundingBox;
pub(crate) use geometry::cmp_f32;
pub use page::{PageElements, PageStatus};
pub use table::{Table, TableCell, TablePanel};
