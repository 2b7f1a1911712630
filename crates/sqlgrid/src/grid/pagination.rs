use serde::Serialize;

use crate::error::{Error, ErrorKind, Result};
use crate::ql::Condition;

pub const DEFAULT_LIMIT: i64 = 15;

/// Page window of a table render. `limit == -1` means everything on one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub limit: i64,
    pub current_page: i64,
    pub total_pages: i64,
    pub total: i64,
    /// Previous page, 0 on the first.
    pub prev: i64,
    /// Next page, 0 on the last.
    pub next: i64,
}

impl Pagination {
    pub fn new(total: i64, limit: Option<i64>, page: Option<i64>) -> Result<Self> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 || limit < -1 {
            return Err(Error::new(
                ErrorKind::InvalidParam,
                format!("limit must be positive or -1, got {limit}"),
            ));
        }
        let total = total.max(0);
        let total_pages = if limit == -1 || total == 0 {
            1
        } else {
            (total + limit - 1) / limit
        };
        let current_page = page.unwrap_or(1).clamp(1, total_pages.max(1));
        Ok(Self {
            limit,
            current_page,
            total_pages,
            total,
            prev: if current_page > 1 { current_page - 1 } else { 0 },
            next: if current_page < total_pages { current_page + 1 } else { 0 },
        })
    }

    pub fn unbounded(&self) -> bool {
        self.limit == -1
    }

    pub fn offset(&self) -> i64 {
        if self.unbounded() {
            0
        } else {
            (self.current_page - 1) * self.limit
        }
    }

    /// Add `LIMIT/OFFSET` unless unbounded.
    pub fn apply(&self, condition: &mut Condition) {
        if self.unbounded() {
            return;
        }
        condition.limit(self.limit.unsigned_abs());
        condition.offset(self.offset().unsigned_abs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn second_page_of_sixteen() {
        let page = Pagination::new(16, Some(5), Some(2)).unwrap();
        assert_eq!(
            page,
            Pagination {
                limit: 5,
                current_page: 2,
                total_pages: 4,
                total: 16,
                prev: 1,
                next: 3,
            }
        );
        assert_eq!(page.offset(), 5);

        let mut condition = Condition::new();
        page.apply(&mut condition);
        assert_eq!(condition.render('"').unwrap().0, " LIMIT 5 OFFSET 5");
    }

    #[test]
    fn pages_are_clamped() {
        let page = Pagination::new(16, Some(5), Some(99)).unwrap();
        assert_eq!((page.current_page, page.next, page.prev), (4, 0, 3));
        let page = Pagination::new(16, Some(5), Some(-3)).unwrap();
        assert_eq!((page.current_page, page.prev), (1, 0));
        let empty = Pagination::new(0, None, Some(3)).unwrap();
        assert_eq!((empty.limit, empty.total_pages, empty.current_page), (15, 1, 1));
    }

    #[test]
    fn unbounded_adds_no_window() {
        let page = Pagination::new(40, Some(-1), Some(2)).unwrap();
        assert_eq!((page.total_pages, page.current_page), (1, 1));
        let mut condition = Condition::new();
        page.apply(&mut condition);
        assert_eq!(condition.render('"').unwrap().0, "");
    }

    #[test]
    fn invalid_limits() {
        for limit in [0, -2] {
            let err = Pagination::new(10, Some(limit), None).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParam);
        }
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(Pagination::new(16, Some(5), Some(2)).unwrap()).unwrap();
        assert_eq!(json["currentPage"], 2);
        assert_eq!(json["totalPages"], 4);
    }
}
