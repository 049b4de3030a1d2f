//! Listing pagination
//!
//! Pages are 1-indexed and hold [`PAGE_SIZE`] records. Requested pages outside
//! `[1, total_pages]` are clamped.

use serde::{Deserialize, Serialize};

/// Records per listing page
pub const PAGE_SIZE: i64 = 100;

/// `?page=` query parameter
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
}

/// Resolved page window plus metadata returned to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageWindow {
    pub page: i64,
    pub total_pages: i64,
    pub total: i64,
    #[serde(skip)]
    pub offset: i64,
    #[serde(skip)]
    pub limit: i64,
}

impl PageWindow {
    /// Clamp the requested page against the record count
    pub fn resolve(total: i64, requested_page: Option<i64>) -> Self {
        let total = total.max(0);
        let total_pages = (total + PAGE_SIZE - 1) / PAGE_SIZE;
        let page = requested_page.unwrap_or(1).clamp(1, total_pages.max(1));

        Self {
            page,
            total_pages,
            total,
            offset: (page - 1) * PAGE_SIZE,
            limit: PAGE_SIZE,
        }
    }
}
