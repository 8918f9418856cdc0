//! # Query Value Objects
//!
//! Pagination requests and responses shared by the composite-key, rich
//! query and history listings.

use crate::domain::fields::{is_truthy, lint_param, text_of};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Page size used when the caller does not supply one.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Pagination metadata returned by the host for a paged query.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMetadata {
    /// Number of records in this page.
    pub fetched_records_count: u32,
    /// Opaque cursor for the next page. Empty when there is none.
    pub bookmark: String,
}

/// Partial composite key listing request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompositeKeyQuery {
    /// Composite key namespace, e.g. `platformno~datatype~businessid`.
    pub object_type: Option<String>,
    /// Leading key attributes, unsanitized.
    pub object_keys: Option<Vec<Value>>,
    /// Requested page size. `None` or zero selects the default.
    pub page_size: Option<u32>,
    /// Cursor from a previous page.
    pub bookmark: Option<String>,
}

/// Rich (selector) query listing request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RichQuery {
    /// JSON query document; must contain a `selector`.
    pub query_string: String,
    /// Requested page size. `None` or zero selects the default.
    pub page_size: Option<u32>,
    /// Cursor from a previous page.
    pub bookmark: Option<String>,
}

impl RichQuery {
    /// Build a request from an already-assembled query document.
    pub fn from_document(query: &Value, page_size: Option<u32>, bookmark: Option<String>) -> Self {
        Self {
            query_string: query.to_string(),
            page_size,
            bookmark,
        }
    }
}

/// Drained listing result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PagedStates {
    /// Parsed JSON documents in encounter order.
    pub items: Vec<Value>,
    /// `items.len()`.
    pub count: usize,
    /// Page metadata. Absent for unpaginated history listings.
    #[serde(rename = "metadata", skip_serializing_if = "Option::is_none", default)]
    pub pagination_metadata: Option<QueryMetadata>,
}

impl PagedStates {
    /// Wrap drained items.
    #[must_use]
    pub fn new(items: Vec<Value>, pagination_metadata: Option<QueryMetadata>) -> Self {
        Self {
            count: items.len(),
            items,
            pagination_metadata,
        }
    }
}

/// Resolve a requested page size against the configured default.
#[must_use]
pub fn effective_page_size(requested: Option<u32>, default: u32) -> u32 {
    match requested {
        Some(size) if size > 0 => size,
        _ => default,
    }
}

/// Page size from a raw contract argument. Anything but a positive
/// integer selects the default.
#[must_use]
pub fn page_size_param(raw: &str) -> Option<u32> {
    lint_param(raw)
        .as_u64()
        .and_then(|size| u32::try_from(size).ok())
        .filter(|size| *size > 0)
}

/// Bookmark from a raw contract argument. Falsy input means the first page.
#[must_use]
pub fn bookmark_param(raw: &str) -> Option<String> {
    let value = lint_param(raw);
    if is_truthy(&value) {
        text_of(&value)
    } else {
        None
    }
}
