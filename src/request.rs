//! Request URL construction for paginated fetches

use crate::types::Cursor;

/// Build the fully-encoded URL for one page request.
///
/// Appends the query parameters `orderby`, `take`, and `skip` to the
/// endpoint, percent-encoding the ordering clause. Pure and deterministic;
/// no parameter is ever dropped.
#[must_use]
pub fn build_page_url(base_url: &str, endpoint: &str, order_by: &str, cursor: Cursor) -> String {
    format!(
        "{base_url}{endpoint}?orderby={}&take={}&skip={}",
        urlencoding::encode(order_by),
        cursor.page_size,
        cursor.offset,
    )
}
