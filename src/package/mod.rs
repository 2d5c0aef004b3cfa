//! Read-only packaging of a reconciled document into output views.
//!
//! Each view is an independent pure function of the same [`Document`]:
//! requesting a subset of views never changes the content of the others.
//!
//! # Example
//!
//! ```ignore
//! use docweave::package::{Packager, PackageOptions, ViewSelection};
//!
//! let packager = Packager::with_options(PackageOptions::new().with_views(ViewSelection::search_only()));
//! let package = packager.package(&document);
//! println!("{}", package.search.unwrap().full_text);
//! ```

mod json;
mod relational;
mod search;
mod ui;

pub use json::{to_json, JsonFormat};
pub use relational::{BlockRow, CellRow, DocumentRow, PageRow, RelationalView, TableRow};
pub use search::{SearchView, TableText};
pub use ui::{Anchor, AnchorKind, UiBlock, UiCell, UiPage, UiTable, UiView};

use serde::{Deserialize, Serialize};

use crate::model::Document;

/// Which views to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSelection {
    /// Flat relational rows
    pub relational: bool,
    /// Search documents
    pub search: bool,
    /// UI render model
    pub ui: bool,
}

impl ViewSelection {
    /// Every view.
    pub fn all() -> Self {
        Self {
            relational: true,
            search: true,
            ui: true,
        }
    }

    /// No view.
    pub fn none() -> Self {
        Self {
            relational: false,
            search: false,
            ui: false,
        }
    }

    /// Only the search view.
    pub fn search_only() -> Self {
        Self {
            search: true,
            ..Self::none()
        }
    }

    /// Only the relational view.
    pub fn relational_only() -> Self {
        Self {
            relational: true,
            ..Self::none()
        }
    }

    /// Only the UI view.
    pub fn ui_only() -> Self {
        Self {
            ui: true,
            ..Self::none()
        }
    }
}

impl Default for ViewSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// Packaging options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageOptions {
    /// Views to build
    pub views: ViewSelection,

    /// JSON layout used by [`Package::to_json`]
    pub json_format: JsonFormat,
}

impl PackageOptions {
    /// Create default options (all views, pretty JSON).
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the view selection.
    pub fn with_views(mut self, views: ViewSelection) -> Self {
        self.views = views;
        self
    }

    /// Set the JSON format.
    pub fn with_json_format(mut self, format: JsonFormat) -> Self {
        self.json_format = format;
        self
    }
}

/// The packaged views of one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    /// Relational view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relational: Option<RelationalView>,

    /// Search view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<SearchView>,

    /// UI view
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui: Option<UiView>,
}

impl Package {
    /// Render to JSON.
    pub fn to_json(&self, format: JsonFormat) -> crate::Result<String> {
        to_json(self, format)
    }
}

/// Projects documents into views.
#[derive(Debug, Clone, Default)]
pub struct Packager {
    options: PackageOptions,
}

impl Packager {
    /// Create a packager building every view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a packager with options.
    pub fn with_options(options: PackageOptions) -> Self {
        Self { options }
    }

    /// Access the options.
    pub fn options(&self) -> &PackageOptions {
        &self.options
    }

    /// Build the selected views.
    pub fn package(&self, doc: &Document) -> Package {
        let views = self.options.views;
        let package = Package {
            relational: views.relational.then(|| relational::build(doc)),
            search: views.search.then(|| search::build(doc)),
            ui: views.ui.then(|| ui::build(doc)),
        };
        log::debug!(
            "Packager: document {} packaged (relational: {}, search: {}, ui: {})",
            doc.id,
            views.relational,
            views.search,
            views.ui
        );
        package
    }
}

/// Stable id of a page.
pub fn page_id(doc_id: &str, page: i32) -> String {
    format!("{}:p{}", doc_id, page)
}

/// Stable id of a free-text block.
pub fn block_id(doc_id: &str, page: i32, index: usize) -> String {
    format!("{}:b{}", page_id(doc_id, page), index)
}

/// Stable id of a table.
pub fn table_id(doc_id: &str, index: usize) -> String {
    format!("{}:t{}", doc_id, index)
}

/// Stable id of a table cell, by its position in the table's cell list.
pub fn cell_id(table_id: &str, index: usize) -> String {
    format!("{}:c{}", table_id, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_selection() {
        assert_eq!(ViewSelection::default(), ViewSelection::all());
        let search = ViewSelection::search_only();
        assert!(search.search && !search.relational && !search.ui);
    }

    #[test]
    fn test_stable_ids() {
        assert_eq!(page_id("doc", 2), "doc:p2");
        assert_eq!(block_id("doc", 2, 0), "doc:p2:b0");
        assert_eq!(cell_id(&table_id("doc", 1), 7), "doc:t1:c7");
    }

    #[test]
    fn test_empty_selection_builds_nothing() {
        let packager = Packager::with_options(PackageOptions::new().with_views(ViewSelection::none()));
        let package = packager.package(&Document::new("d"));
        assert_eq!(package, Package::default());
    }
}
