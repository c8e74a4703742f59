//! Pagination request and result types.
//!
//! This module provides [`Pageable`], the caller's page request (0-based page index, page
//! size and [`Sort`]), and [`Page`], the result envelope carrying one page of content plus the
//! metadata derived from the total element count.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::page::{Page, Pageable};
//!
//! let pageable = Pageable::new(1, 10);
//! assert_eq!(pageable.offset(), 10);
//!
//! let page = Page::new(vec!["k", "l"], 12, Some(&pageable));
//! assert_eq!(page.total_pages, 2);
//! assert!(page.last);
//! ```

use serde::{Deserialize, Serialize};

use crate::sort::Sort;

/// A page request: which page to fetch, how large pages are, and how to order them.
///
/// Pages are 0-indexed. Both fields are unsigned, so a negative page or size is rejected
/// when the request is deserialized rather than clamped.
///
/// Every field defaults individually, so a request bound from a query string such as
/// `?page=2&sort=name,desc` keeps the default size of 20.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Pageable {
    /// The page index (0-based).
    pub page: u64,
    /// Number of elements per page.
    pub size: u64,
    /// Order in which elements are paged.
    pub sort: Sort,
}

impl Pageable {
    /// Page size used by [`Pageable::default`].
    pub const DEFAULT_SIZE: u64 = 20;

    /// Creates an unsorted page request.
    pub fn new(page: u64, size: u64) -> Self {
        Self { page, size, sort: Sort::default() }
    }

    /// Sets the sort of this page request.
    pub fn with_sort(mut self, sort: impl Into<Sort>) -> Self {
        self.sort = sort.into();
        self
    }

    /// Number of elements to skip to reach this page (`page * size`, saturating).
    pub fn offset(&self) -> u64 {
        self.page.saturating_mul(self.size)
    }

    /// Pages a vector of items according to this request.
    ///
    /// The returned page holds the slice of `items` that falls on this page, with the total
    /// taken from the full vector.
    ///
    /// ```ignore
    /// let items: Vec<i32> = (1..=25).collect();
    /// let page = Pageable::new(1, 10).paginate(items);
    ///
    /// assert_eq!(page.content, (11..=20).collect::<Vec<_>>());
    /// assert_eq!(page.total_pages, 3);
    /// ```
    pub fn paginate<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as u64;
        let content = items
            .into_iter()
            .skip(usize::try_from(self.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(self.size).unwrap_or(usize::MAX))
            .collect();

        Page::new(content, total, Some(self))
    }
}

impl Default for Pageable {
    fn default() -> Self {
        Self::new(0, Self::DEFAULT_SIZE)
    }
}

/// A single page of results.
///
/// Built once per query from the page's content, the total number of matching elements and
/// the [`Pageable`] that requested it. The metadata is derived at construction and never
/// recomputed.
///
/// Serialized with camelCase field names:
/// `number, size, content, first, last, totalPages, totalElements, empty, numberOfElements`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// The page index (0-based).
    pub number: u64,
    /// The requested page size.
    pub size: u64,
    /// The elements of this page.
    pub content: Vec<T>,
    /// Whether this is the first page.
    pub first: bool,
    /// Whether this is the last page.
    pub last: bool,
    /// Total number of pages. `0` when the requested size is `0`.
    pub total_pages: u64,
    /// Total number of elements across all pages.
    pub total_elements: u64,
    /// Whether this page has no content.
    pub empty: bool,
    /// Number of elements on this page.
    pub number_of_elements: usize,
    /// Sort of the request this page answers, carried over to neighbouring page requests.
    #[serde(skip)]
    pub sort: Sort,
}

impl<T> Page<T> {
    /// Creates a page from its content, the total element count, and the request.
    ///
    /// A missing request is treated as [`Pageable::default`]. A page is first when its index
    /// is `0` or nothing matched at all, and last when no further page exists.
    pub fn new(content: Vec<T>, total: u64, pageable: Option<&Pageable>) -> Self {
        let default;
        let pageable = match pageable {
            Some(pageable) => pageable,
            None => {
                default = Pageable::default();
                &default
            }
        };

        let total_pages = total_pages(total, pageable.size);

        Self {
            number: pageable.page,
            size: pageable.size,
            first: pageable.page == 0 || total == 0,
            last: pageable.page.saturating_add(1) >= total_pages,
            total_pages,
            total_elements: total,
            empty: content.is_empty(),
            number_of_elements: content.len(),
            content,
            sort: pageable.sort.clone(),
        }
    }

    /// Creates an empty first page for the default request.
    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, None)
    }

    /// Transforms every element of this page, keeping all metadata unchanged.
    pub fn map<N, F>(self, transform: F) -> Page<N>
    where
        F: FnMut(T) -> N,
    {
        Page {
            number: self.number,
            size: self.size,
            content: self.content.into_iter().map(transform).collect(),
            first: self.first,
            last: self.last,
            total_pages: self.total_pages,
            total_elements: self.total_elements,
            empty: self.empty,
            number_of_elements: self.number_of_elements,
            sort: self.sort,
        }
    }

    /// Whether a page follows this one.
    pub fn has_next(&self) -> bool {
        !self.last
    }

    /// Whether a page precedes this one.
    pub fn has_previous(&self) -> bool {
        self.number > 0
    }

    /// Returns the request for the following page, if there is one, with the same sort.
    pub fn next_pageable(&self) -> Option<Pageable> {
        self.has_next()
            .then(|| Pageable::new(self.number + 1, self.size).with_sort(self.sort.clone()))
    }

    /// Returns the request for the preceding page, if there is one, with the same sort.
    pub fn previous_pageable(&self) -> Option<Pageable> {
        self.has_previous()
            .then(|| Pageable::new(self.number - 1, self.size).with_sort(self.sort.clone()))
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::empty()
    }
}

fn total_pages(total: u64, size: u64) -> u64 {
    if size == 0 {
        return 0;
    }
    total.div_ceil(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::Order;

    #[test]
    fn default_pageable_is_first_page_of_twenty() {
        let pageable = Pageable::default();
        assert_eq!(pageable.page, 0);
        assert_eq!(pageable.size, 20);
        assert!(pageable.sort.is_unsorted());
    }

    #[test]
    fn offset_is_page_times_size() {
        for page in 1..5 {
            for size in 1..5 {
                assert_eq!(Pageable::new(page, size).offset(), page * size);
            }
        }
        assert_eq!(Pageable::new(u64::MAX, 2).offset(), u64::MAX);
    }

    #[test]
    fn total_pages_is_ceiling_of_total_over_size() {
        for size in 1..7u64 {
            for total in 0..30u64 {
                let page = Page::<()>::new(Vec::new(), total, Some(&Pageable::new(0, size)));
                assert_eq!(page.total_pages, total.div_ceil(size));
            }
        }
    }

    #[test]
    fn zero_size_yields_zero_pages() {
        let page = Page::<()>::new(Vec::new(), 42, Some(&Pageable::new(0, 0)));
        assert_eq!(page.total_pages, 0);
        assert!(page.first);
        assert!(page.last);
    }

    #[test]
    fn empty_total_is_first_and_last() {
        for index in 0..3 {
            let page = Page::<u8>::new(Vec::new(), 0, Some(&Pageable::new(index, 10)));
            assert!(page.first);
            assert!(page.last);
            assert!(page.empty);
            assert_eq!(page.total_pages, 0);
        }
    }

    #[test]
    fn first_and_last_follow_page_index() {
        let first = Page::new(vec![1, 2], 5, Some(&Pageable::new(0, 2)));
        assert!(first.first && !first.last);
        assert!(first.has_next() && !first.has_previous());

        let middle = Page::new(vec![3, 4], 5, Some(&Pageable::new(1, 2)));
        assert!(!middle.first && !middle.last);

        let last = Page::new(vec![5], 5, Some(&Pageable::new(2, 2)));
        assert!(!last.first && last.last);
        assert_eq!(last.number_of_elements, 1);
        assert_eq!(last.next_pageable(), None);
        assert_eq!(last.previous_pageable(), Some(Pageable::new(1, 2)));
    }

    #[test]
    fn neighbouring_requests_keep_the_sort() {
        let pageable = Pageable::new(1, 2).with_sort("age,desc");
        let page = Page::new(vec![3, 4], 5, Some(&pageable));

        let next = page.next_pageable().unwrap();
        assert_eq!(next.page, 2);
        assert_eq!(next.sort.orders(), vec![Order::desc("age")]);

        let previous = page.map(|value| value * 10).previous_pageable().unwrap();
        assert_eq!(previous.page, 0);
        assert_eq!(previous.sort.orders(), vec![Order::desc("age")]);
    }

    #[test]
    fn missing_pageable_uses_default() {
        let page = Page::new(vec!["a"], 1, None);
        assert_eq!(page.number, 0);
        assert_eq!(page.size, Pageable::DEFAULT_SIZE);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn empty_page_matches_default_request() {
        let page = Page::<String>::empty();
        assert_eq!(page, Page::new(Vec::new(), 0, Some(&Pageable::default())));
        assert!(page.empty && page.first && page.last);
    }

    #[test]
    fn map_preserves_metadata() {
        let page = Page::new(vec![1, 2, 3], 9, Some(&Pageable::new(1, 3)));
        let mapped = page.clone().map(|value| value.to_string());

        assert_eq!(mapped.content, vec!["1", "2", "3"]);
        assert_eq!(mapped.number, page.number);
        assert_eq!(mapped.size, page.size);
        assert_eq!(mapped.total_pages, page.total_pages);
        assert_eq!(mapped.total_elements, page.total_elements);
        assert_eq!(mapped.first, page.first);
        assert_eq!(mapped.last, page.last);
        assert_eq!(mapped.empty, page.empty);
        assert_eq!(mapped.number_of_elements, page.number_of_elements);

        assert_eq!(page.clone().map(|value| value), page);
    }

    #[test]
    fn paginate_slices_items() {
        let items = (1..=25).collect::<Vec<_>>();

        let page = Pageable::new(1, 10).paginate(items.clone());
        assert_eq!(page.content, (11..=20).collect::<Vec<_>>());
        assert_eq!(page.total_elements, 25);
        assert_eq!(page.total_pages, 3);

        let beyond = Pageable::new(5, 10).paginate(items);
        assert!(beyond.empty);
        assert!(beyond.last);
    }

    #[test]
    fn serializes_with_camel_case_fields() {
        let page = Page::new(vec![1], 1, Some(&Pageable::new(0, 10)));
        let value = serde_json::to_value(&page).unwrap();

        for field in [
            "number",
            "size",
            "content",
            "first",
            "last",
            "totalPages",
            "totalElements",
            "empty",
            "numberOfElements",
        ] {
            assert!(value.get(field).is_some(), "missing {field}");
        }
    }

    #[test]
    fn pageable_binds_from_partial_input() {
        let pageable: Pageable = serde_json::from_str(r#"{"page":2,"sort":"name,desc"}"#).unwrap();
        assert_eq!(pageable.page, 2);
        assert_eq!(pageable.size, Pageable::DEFAULT_SIZE);
        assert_eq!(pageable.sort.orders(), vec![Order::desc("name")]);

        assert!(serde_json::from_str::<Pageable>(r#"{"page":-1}"#).is_err());
    }
}
