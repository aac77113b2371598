//! Pagination arithmetic for listing pages.

/// Everything a template needs to render pagination controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// 1-based page being shown.
    pub current_page: i64,
    /// Total number of pages (0 when there are no items).
    pub total_pages: i64,
    /// Page after this one (meaningful when `has_next`).
    pub next_page: i64,
    /// Page before this one (meaningful when `has_prev`).
    pub prev_page: i64,
    /// Whether a later page exists.
    pub has_next: bool,
    /// Whether an earlier page exists.
    pub has_prev: bool,
}

impl Pagination {
    /// Compute pagination for `total` items at `page_size` per page.
    ///
    /// `page` is clamped to at least 1.
    #[must_use]
    pub fn new(total: i64, page: i64, page_size: i64) -> Self {
        let page = page.max(1);
        let total_pages = (total + page_size - 1) / page_size;

        Self {
            current_page: page,
            total_pages,
            next_page: page + 1,
            prev_page: page - 1,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_of_page_size() {
        let p = Pagination::new(100, 1, 50);
        assert_eq!(p.total_pages, 2);
        assert!(p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn partial_last_page_rounds_up() {
        let p = Pagination::new(101, 3, 50);
        assert_eq!(p.total_pages, 3);
        assert!(!p.has_next);
        assert!(p.has_prev);
        assert_eq!(p.prev_page, 2);
    }

    #[test]
    fn empty_listing_has_no_pages() {
        let p = Pagination::new(0, 1, 50);
        assert_eq!(p.total_pages, 0);
        assert!(!p.has_next);
        assert!(!p.has_prev);
    }

    #[test]
    fn page_is_clamped_to_one() {
        let p = Pagination::new(10, 0, 50);
        assert_eq!(p.current_page, 1);
        let p = Pagination::new(10, -3, 50);
        assert_eq!(p.current_page, 1);
    }

    #[test]
    fn middle_page_has_both_directions() {
        let p = Pagination::new(150, 2, 50);
        assert!(p.has_next);
        assert!(p.has_prev);
        assert_eq!(p.next_page, 3);
        assert_eq!(p.prev_page, 1);
    }
}
