//! Content/count query split for paged reads.

use crate::paging::page::{Page, PageRequest};
use crate::query::SelectSpec;
use crate::repo::exec;
use crate::repo::RepoResult;
use log::debug;
use rusqlite::{Connection, Row};

/// Runs `content` bounded by the request window and resolves the total with
/// `count` when the content alone cannot tell it.
///
/// The request's sort is appended to `content`'s ordering. `count` is used
/// as given, so it may count a narrower column than the content selects.
pub fn fetch_page<T, F>(
    conn: &Connection,
    content: &SelectSpec,
    count: &SelectSpec,
    request: &PageRequest,
    map: F,
) -> RepoResult<Page<T>>
where
    F: FnMut(&Row<'_>) -> RepoResult<T>,
{
    let mut windowed = content.clone();
    if let Some(sort) = request.sort() {
        windowed = windowed.order_by(sort);
    }
    let windowed = windowed.window(u64::from(request.size()), request.offset());

    let items = exec::select(conn, &windowed, map)?;
    let total = resolve_total(request, items.len(), || exec::count(conn, count))?;
    Ok(Page::new(items, request, total))
}

/// A partial page ends the result set, so its total is known without
/// counting. An empty page past the first still needs the count.
fn resolve_total<C>(request: &PageRequest, content_len: usize, count: C) -> RepoResult<u64>
where
    C: FnOnce() -> RepoResult<u64>,
{
    let len = content_len as u64;
    let size = u64::from(request.size());
    if len < size && (request.offset() == 0 || len > 0) {
        debug!(
            "event=page_count module=paging status=skipped page={} size={} total={}",
            request.page(),
            request.size(),
            request.offset() + len
        );
        return Ok(request.offset() + len);
    }
    count()
}

#[cfg(test)]
mod tests {
    use super::resolve_total;
    use crate::paging::page::PageRequest;
    use crate::repo::RepoResult;
    use std::cell::Cell;

    fn counted(total: u64, calls: &Cell<u32>) -> impl FnOnce() -> RepoResult<u64> + '_ {
        move || {
            calls.set(calls.get() + 1);
            Ok(total)
        }
    }

    #[test]
    fn full_page_runs_count_query() {
        let calls = Cell::new(0);
        let request = PageRequest::of(0, 3).unwrap();
        let total = resolve_total(&request, 3, counted(5, &calls)).unwrap();
        assert_eq!(total, 5);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn partial_first_page_skips_count_query() {
        let calls = Cell::new(0);
        let request = PageRequest::of(0, 10).unwrap();
        let total = resolve_total(&request, 4, counted(99, &calls)).unwrap();
        assert_eq!(total, 4);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn partial_later_page_derives_total_from_offset() {
        let calls = Cell::new(0);
        let request = PageRequest::of(1, 3).unwrap();
        let total = resolve_total(&request, 2, counted(99, &calls)).unwrap();
        assert_eq!(total, 5);
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn empty_page_past_the_end_runs_count_query() {
        let calls = Cell::new(0);
        let request = PageRequest::of(4, 3).unwrap();
        let total = resolve_total(&request, 0, counted(5, &calls)).unwrap();
        assert_eq!(total, 5);
        assert_eq!(calls.get(), 1);
    }
}
