//! Pagination arithmetic and the page envelope.

use serde::{Deserialize, Serialize};

use crate::error::{OrmError, OrmResult};

/// Requested page, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageRequest {
    pub page_num: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page_num: i64, page_size: i64) -> Self {
        Self { page_num, page_size }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page_num: 1,
            page_size: 10,
        }
    }
}

/// The clamped window a page request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub total: i64,
    pub page_size: i64,
    pub page_num: i64,
    pub total_pages: i64,
    pub offset: i64,
}

impl PageWindow {
    /// Clamp `page_num` into `[1, max(total_pages, 1)]` and compute the offset.
    pub fn compute(total: i64, page_num: i64, page_size: i64) -> OrmResult<Self> {
        if page_size <= 0 {
            return Err(OrmError::invalid_argument(format!(
                "page_size must be >= 1, got {page_size}"
            )));
        }
        let total = total.max(0);
        let total_pages = if total == 0 {
            0
        } else {
            (total - 1) / page_size + 1
        };
        let page_num = page_num.clamp(1, total_pages.max(1));
        let offset = (page_num - 1).checked_mul(page_size).ok_or_else(|| {
            OrmError::invalid_argument(format!(
                "page {page_num} of size {page_size} is out of range"
            ))
        })?;
        Ok(Self {
            total,
            page_size,
            page_num,
            total_pages,
            offset,
        })
    }

    /// Attach the fetched records.
    pub fn into_page<T>(self, records: Vec<T>) -> Page<T> {
        Page {
            total: self.total,
            page_size: self.page_size,
            page_num: self.page_num,
            total_pages: self.total_pages,
            records,
        }
    }
}

/// One page of results plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub total: i64,
    pub page_size: i64,
    pub page_num: i64,
    pub total_pages: i64,
    pub records: Vec<T>,
}

impl<T> Page<T> {
    /// Convert the records, keeping the metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            page_size: self.page_size,
            page_num: self.page_num,
            total_pages: self.total_pages,
            records: self.records.into_iter().map(f).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_past_the_end() {
        let w = PageWindow::compute(25, 999, 10).unwrap();
        assert_eq!(w.total_pages, 3);
        assert_eq!(w.page_num, 3);
        assert_eq!(w.offset, 20);
    }

    #[test]
    fn clamps_page_below_one() {
        let w = PageWindow::compute(25, -4, 10).unwrap();
        assert_eq!(w.page_num, 1);
        assert_eq!(w.offset, 0);
    }

    #[test]
    fn empty_result_has_zero_pages_and_page_one() {
        let w = PageWindow::compute(0, 7, 10).unwrap();
        assert_eq!(w.total_pages, 0);
        assert_eq!(w.page_num, 1);
        assert_eq!(w.offset, 0);
    }

    #[test]
    fn exact_multiple() {
        let w = PageWindow::compute(30, 3, 10).unwrap();
        assert_eq!(w.total_pages, 3);
        assert_eq!(w.offset, 20);
    }

    #[test]
    fn huge_page_size_does_not_overflow() {
        let w = PageWindow::compute(2, 1, i64::MAX).unwrap();
        assert_eq!(w.total_pages, 1);
        assert_eq!(w.page_num, 1);
        assert_eq!(w.offset, 0);

        let w = PageWindow::compute(i64::MAX, i64::MAX, 2).unwrap();
        assert_eq!(w.total_pages, i64::MAX / 2 + 1);
        assert_eq!(w.page_num, w.total_pages);
        assert_eq!(w.offset, i64::MAX - 1);
    }

    #[test]
    fn rejects_non_positive_page_size() {
        assert!(matches!(
            PageWindow::compute(10, 1, 0),
            Err(OrmError::InvalidArgument(_))
        ));
        assert!(PageWindow::compute(10, 1, -3).is_err());
    }

    #[test]
    fn default_request() {
        assert_eq!(PageRequest::default(), PageRequest::new(1, 10));
        let req: PageRequest = serde_json::from_str(r#"{"page_num": 4}"#).unwrap();
        assert_eq!(req, PageRequest::new(4, 10));
    }

    #[test]
    fn page_map_and_serialize() {
        let page = PageWindow::compute(3, 1, 10).unwrap().into_page(vec![1, 2, 3]);
        let page = page.map(|n| n * 10);
        assert_eq!(page.records, [10, 20, 30]);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "total": 3, "page_size": 10, "page_num": 1, "total_pages": 1,
                "records": [10, 20, 30]
            })
        );
    }
}
