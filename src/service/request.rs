//! List request parameters, pagination math, and the page envelope.

use crate::filter::FieldFilter;
use crate::store::OrderBy;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;

static SORT_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(-)?\s*([a-z_][a-z0-9_]*)(?:\s+(asc|desc))?\s*$").expect("sort entry pattern")
});

/// Parse `field`, `field asc|desc` or `-field`. `None` for anything else.
pub fn parse_sort_entry(entry: &str) -> Option<OrderBy> {
    let caps = SORT_ENTRY.captures(entry)?;
    let column = caps.get(2)?.as_str().to_string();
    let descending = match caps.get(3) {
        Some(dir) => dir.as_str().eq_ignore_ascii_case("desc"),
        None => caps.get(1).is_some(),
    };
    Some(if descending {
        OrderBy::desc(column)
    } else {
        OrderBy::asc(column)
    })
}

/// Parameters of a paginated list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListRequest {
    /// Free-text match against the display column.
    pub query: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    /// Raw sort entries, applied in order.
    pub sort: Vec<String>,
    /// Active filters by field wire name.
    pub filters: HashMap<String, FieldFilter>,
    /// Selector target type names to embed in each item.
    pub preload: Vec<String>,
}

impl ListRequest {
    /// Read transport parameters: `query`, `page`, `pageSize`, `sort`, `preload`, and
    /// `<field>-operator` / `<field>-value` / `<field>-value2`. Unparseable numbers count as absent;
    /// filters without an operator are dropped.
    pub fn from_params<I, K, V>(params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut request = ListRequest::default();
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                "query" => request.query = Some(value.to_string()).filter(|q| !q.trim().is_empty()),
                "page" => request.page = value.trim().parse().ok(),
                "pageSize" => request.page_size = value.trim().parse().ok(),
                "sort" => request.sort.extend(split_list(value)),
                "preload" => request.preload.extend(split_list(value)),
                _ => {
                    if let Some(field) = key.strip_suffix("-operator") {
                        request.filter_mut(field).operator = value.trim().to_string();
                    } else if let Some(field) = key.strip_suffix("-value2") {
                        request.filter_mut(field).value2 = Some(value.to_string());
                    } else if let Some(field) = key.strip_suffix("-value") {
                        request.filter_mut(field).value = value.to_string();
                    }
                }
            }
        }
        request.filters.retain(|_, f| !f.operator.is_empty());
        request
    }

    fn filter_mut(&mut self, field: &str) -> &mut FieldFilter {
        self.filters.entry(field.to_string()).or_default()
    }

    pub fn with_filter(mut self, field: impl Into<String>, filter: FieldFilter) -> Self {
        self.filters.insert(field.into(), filter);
        self
    }
}

fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Largest OFFSET PostgreSQL accepts.
pub const MAX_OFFSET: u64 = i64::MAX as u64;

/// 1-indexed page window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    /// Page below 1 becomes 1; size below 1 becomes `default_size`; size is capped at `max_size`.
    pub fn new(page: Option<i64>, page_size: Option<i64>, default_size: u64, max_size: u64) -> Self {
        let page = page.filter(|p| *p >= 1).map(|p| p as u64).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s >= 1)
            .map(|s| s as u64)
            .unwrap_or(default_size)
            .min(max_size)
            .max(1);
        Pagination { page, page_size }
    }

    /// Row offset, capped at the largest value a bigint OFFSET accepts.
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size).min(MAX_OFFSET)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.page_size)
    }
}

/// One page of a list.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<R> {
    pub total: u64,
    pub current_page: u64,
    pub total_pages: u64,
    pub items: Vec<R>,
    pub server_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SortDirection;

    #[test]
    fn pagination_math() {
        let p = Pagination::new(Some(1), Some(20), 20, 1000);
        assert_eq!(p.offset(), 0);
        assert_eq!(p.total_pages(45), 3);
        let p = Pagination::new(Some(3), Some(20), 20, 1000);
        assert_eq!(p.offset(), 40);
        assert_eq!(p.total_pages(0), 0);
    }

    #[test]
    fn huge_pages_keep_the_offset_in_bigint_range() {
        let p = Pagination::new(Some(i64::MAX), Some(20), 20, 1000);
        assert_eq!(p.page, i64::MAX as u64);
        assert_eq!(p.offset(), MAX_OFFSET);
        assert_eq!(p.total_pages(3), 1);
    }

    #[test]
    fn pagination_defaults_and_clamps() {
        assert_eq!(Pagination::new(None, None, 20, 1000), Pagination { page: 1, page_size: 20 });
        assert_eq!(Pagination::new(Some(0), Some(-5), 20, 1000), Pagination { page: 1, page_size: 20 });
        assert_eq!(Pagination::new(Some(2), Some(5000), 20, 1000).page_size, 1000);
    }

    #[test]
    fn sort_entries() {
        assert_eq!(parse_sort_entry("name"), Some(OrderBy::asc("name")));
        assert_eq!(parse_sort_entry(" created_at DESC "), Some(OrderBy::desc("created_at")));
        assert_eq!(parse_sort_entry("-port"), Some(OrderBy::desc("port")));
        assert_eq!(parse_sort_entry("-port asc").map(|o| o.direction), Some(SortDirection::Asc));
        assert_eq!(parse_sort_entry("name; DROP TABLE users"), None);
        assert_eq!(parse_sort_entry("name sideways"), None);
    }

    #[test]
    fn params_build_filters() {
        let request = ListRequest::from_params([
            ("query", "ada"),
            ("page", "2"),
            ("pageSize", "abc"),
            ("sort", "name, -id"),
            ("port-operator", "between"),
            ("port-value", "1"),
            ("port-value2", "10"),
            ("name-value", "orphan"),
            ("preload", "User"),
        ]);
        assert_eq!(request.query.as_deref(), Some("ada"));
        assert_eq!(request.page, Some(2));
        assert_eq!(request.page_size, None);
        assert_eq!(request.sort, vec!["name", "-id"]);
        assert_eq!(request.preload, vec!["User"]);
        assert_eq!(request.filters.len(), 1);
        assert_eq!(request.filters["port"], FieldFilter::between("1", "10"));
    }
}
