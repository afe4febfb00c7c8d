/// Page-number pagination shared by list endpoints
use serde::{Deserialize, Serialize};

/// `?page=&limit=` query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PageQuery {
    /// Resolve against a default and a maximum page size
    pub fn resolve(&self, default_limit: i64, max_limit: i64) -> Page {
        Page {
            page: self.page.unwrap_or(1).max(1),
            limit: self.limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }
}

/// A resolved page request (1-based)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn info(&self, total: i64) -> PageInfo {
        PageInfo {
            page: self.page,
            limit: self.limit,
            total,
            has_more: self.offset() + self.limit < total,
        }
    }
}

/// Pagination block returned alongside list results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_clamps() {
        let page = PageQuery { page: Some(0), limit: Some(500) }.resolve(20, 50);
        assert_eq!(page, Page { page: 1, limit: 50 });

        let page = PageQuery::default().resolve(20, 50);
        assert_eq!(page, Page { page: 1, limit: 20 });
    }

    #[test]
    fn test_has_more() {
        let page = Page { page: 2, limit: 10 };
        assert_eq!(page.offset(), 10);
        assert!(page.info(21).has_more);
        assert!(!page.info(20).has_more);
    }
}
