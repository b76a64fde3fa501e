//! Page request and page result shapes.

use crate::query::{QueryCompositionError, Sort};
use serde::Serialize;

/// Zero-based page index, positive page size, optional sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Option<Sort>,
}

impl PageRequest {
    /// # Errors
    /// - `QueryCompositionError` when `size` is zero.
    pub fn of(page: u32, size: u32) -> Result<Self, QueryCompositionError> {
        if size == 0 {
            return Err(QueryCompositionError::new("page request with size 0"));
        }
        Ok(Self {
            page,
            size,
            sort: None,
        })
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> Option<Sort> {
        self.sort
    }

    /// Rows skipped before this page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..*self
        }
    }
}

/// One page of results plus totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    /// Zero-based page index.
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let total_pages = total_elements.div_ceil(u64::from(request.size()));
        Self {
            content,
            number: request.page(),
            size: request.size(),
            total_elements,
            total_pages,
            has_next: u64::from(request.page()) + 1 < total_pages,
        }
    }

    pub fn number_of_elements(&self) -> usize {
        self.content.len()
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    pub fn is_first(&self) -> bool {
        !self.has_previous()
    }

    pub fn is_last(&self) -> bool {
        !self.has_next
    }

    /// Converts the content while keeping the page metadata.
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            content: self.content.into_iter().map(f).collect(),
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
            total_pages: self.total_pages,
            has_next: self.has_next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Page, PageRequest};

    #[test]
    fn zero_size_is_rejected() {
        assert!(PageRequest::of(0, 0).is_err());
    }

    #[test]
    fn totals_round_up_and_flag_next_page() {
        let request = PageRequest::of(0, 3).unwrap();
        let first = Page::new(vec![1, 2, 3], &request, 5);
        assert_eq!(first.total_pages, 2);
        assert!(first.has_next);
        assert!(first.is_first());

        let last = Page::new(vec![4, 5], &request.next(), 5);
        assert_eq!(last.number, 1);
        assert!(!last.has_next);
        assert!(last.has_previous());
    }

    #[test]
    fn empty_result_has_no_pages() {
        let page = Page::<u8>::new(Vec::new(), &PageRequest::of(0, 10).unwrap(), 0);
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next);
    }

    #[test]
    fn map_keeps_metadata() {
        let page = Page::new(vec![1, 2], &PageRequest::of(2, 2).unwrap(), 6);
        let mapped = page.map(|value| value.to_string());
        assert_eq!(mapped.content, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(mapped.total_elements, 6);
        assert_eq!(mapped.number, 2);
        assert!(!mapped.has_next);
    }
}
