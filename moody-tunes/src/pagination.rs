//! Pagination utilities
//!
//! Page size is a runtime setting (`playlist_page_size`), so unlike a fixed
//! constant it is passed in by the caller.

use serde::Serialize;

/// Pagination metadata calculated from total results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Total number of pages (0 when there are no results)
    pub total_pages: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
    pub page_size: i64,
}

impl Pagination {
    /// Whether first/last links should be rendered
    pub fn spans_multiple_pages(&self) -> bool {
        self.total_pages > 1
    }
}

/// Calculate pagination metadata from total results and requested page
///
/// The page is clamped into `[1, total_pages]`.
///
/// ```
/// use moody_tunes::pagination::calculate_pagination;
///
/// let p = calculate_pagination(40, 2, 15);
/// assert_eq!(p.page, 2);
/// assert_eq!(p.total_pages, 3);
/// assert_eq!(p.offset, 15);
/// ```
pub fn calculate_pagination(total_results: i64, requested_page: i64, page_size: i64) -> Pagination {
    let page_size = page_size.max(1);
    let total_pages = (total_results.max(0) + page_size - 1) / page_size;
    let page = requested_page.max(1).min(total_pages.max(1));
    let offset = (page - 1) * page_size;

    Pagination {
        page,
        total_pages,
        offset,
        page_size,
    }
}
