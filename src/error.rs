//! Error types for the docweave library.
//!
//! Stage-level problems never abort a document. They are recorded as
//! [`Issue`] values and surfaced alongside the result; [`Error`] is reserved
//! for caller-facing failures such as loading configuration or serializing
//! packaged views.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for docweave operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned to callers.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration values are out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Packaging a view failed.
    #[error("Packaging error: {0}")]
    Package(String),

    /// A background task did not complete.
    #[error("Task error: {0}")]
    Task(String),
}

/// Errors reported by a merge suggester.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SuggestError {
    /// The suggester ran and failed.
    #[error("suggester failed: {0}")]
    Failed(String),

    /// The suggester did not answer in time.
    #[error("suggester timed out after {0} ms")]
    Timeout(u64),

    /// The suggester needs a page image and none was supplied.
    #[error("suggester requires page image context")]
    ImageRequired,

    /// The worker running the suggester went away.
    #[error("suggester worker disconnected")]
    Disconnected,
}

/// Category of a non-fatal problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// No physical or vision tokens for a region; best available source used
    ExtractionUnavailable,
    /// A candidate merge failed the geometry guard
    MergeRejected,
    /// An element has a degenerate box or a negative page
    InvalidBoundingBox,
    /// A domain handler claimed a table but produced nothing
    DomainHandlerMismatch,
    /// Purge left visible text after the sweep cap
    ResidualTextAfterRedactionCap,
    /// Upstream table layout is out of range and was clamped
    InvalidTableLayout,
}

/// A non-fatal problem recorded during processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Category
    pub kind: IssueKind,

    /// Page the issue belongs to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i32>,

    /// Element, group or table concerned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,

    /// Human readable detail
    pub message: String,
}

impl Issue {
    /// Create an issue with a message.
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            page: None,
            item_id: None,
            message: message.into(),
        }
    }

    /// Attach a page and return self.
    pub fn on_page(mut self, page: i32) -> Self {
        self.page = Some(page);
        self
    }

    /// Attach an item id and return self.
    pub fn for_item(mut self, id: impl Into<String>) -> Self {
        self.item_id = Some(id.into());
        self
    }
}
