//! Paging, sorting and search parameters shared by every dialect.

use serde_json::Value;
use std::collections::HashMap;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Mongo sort order value.
    pub fn signum(&self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Normalized list request. `page >= 1`, `limit` in `[1, 100]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub search: Option<String>,
    pub sort: Option<SortSpec>,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search: None,
            sort: None,
        }
    }
}

impl PageRequest {
    /// Build from raw values. Out-of-range or unparsable `page` becomes 1; `limit` outside `[1, 100]` becomes 10.
    pub fn new(page: Option<&str>, limit: Option<&str>, search: Option<&str>, sort: Option<&str>, order: Option<&str>) -> Self {
        let page = page
            .and_then(|p| p.trim().parse::<i64>().ok())
            .filter(|p| *p >= 1)
            .map(|p| p.min(u32::MAX as i64) as u32)
            .unwrap_or(1);
        let limit = limit
            .and_then(|l| l.trim().parse::<i64>().ok())
            .filter(|l| (1..=MAX_PAGE_SIZE as i64).contains(l))
            .map(|l| l as u32)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let search = search.map(str::trim).filter(|s| !s.is_empty()).map(String::from);
        let sort = sort.map(str::trim).filter(|s| !s.is_empty()).map(|field| SortSpec {
            field: field.to_string(),
            direction: match order.map(|o| o.trim().to_lowercase()) {
                Some(ref o) if o == "desc" => SortDirection::Desc,
                _ => SortDirection::Asc,
            },
        });
        PageRequest { page, limit, search, sort }
    }

    /// From query string params `page`, `limit`, `search`, `sort`, `order`.
    pub fn from_params(params: &HashMap<String, String>) -> Self {
        Self::new(
            params.get("page").map(String::as_str),
            params.get("limit").map(String::as_str),
            params.get("search").map(String::as_str),
            params.get("sort").map(String::as_str),
            params.get("order").map(String::as_str),
        )
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// One page of rows plus the unpaginated count of rows matching the same filter.
#[derive(Clone, Debug, Default)]
pub struct Page {
    pub rows: Vec<Value>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_page_and_limit() {
        let p = PageRequest::new(Some("0"), Some("500"), None, None, None);
        assert_eq!((p.page, p.limit), (1, 10));
        let p = PageRequest::new(Some("-3"), Some("0"), None, None, None);
        assert_eq!((p.page, p.limit), (1, 10));
        let p = PageRequest::new(Some("abc"), Some("x"), None, None, None);
        assert_eq!((p.page, p.limit), (1, 10));
        let p = PageRequest::new(Some("3"), Some("100"), None, None, None);
        assert_eq!((p.page, p.limit), (3, 100));
        let p = PageRequest::new(None, Some("1"), None, None, None);
        assert_eq!((p.page, p.limit), (1, 1));
    }

    #[test]
    fn offset_is_page_minus_one_times_limit() {
        let p = PageRequest::new(Some("4"), Some("25"), None, None, None);
        assert_eq!(p.offset(), 75);
        assert_eq!(PageRequest::default().offset(), 0);
    }

    #[test]
    fn sort_defaults_to_ascending_and_blank_is_unsorted() {
        let p = PageRequest::new(None, None, Some("  "), Some("name"), Some("DESC"));
        assert_eq!(p.search, None);
        assert_eq!(p.sort.unwrap().direction, SortDirection::Desc);
        let p = PageRequest::new(None, None, None, Some("name"), Some("sideways"));
        assert_eq!(p.sort.unwrap().direction, SortDirection::Asc);
        let p = PageRequest::new(None, None, None, Some(""), Some("desc"));
        assert!(p.sort.is_none());
    }
}
