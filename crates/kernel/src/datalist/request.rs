//! Query-string access for list requests.
//!
//! `filter` and `value` are parallel lists matched by key. All of
//! `filter=a`, `filter=a&filter=b`, `filter[]=a` and `filter[3]=a` are
//! accepted; un-keyed entries take the next free key after the largest one
//! seen so far.

use std::collections::BTreeMap;
use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::Serialize;

/// Keyed list built from repeated or bracketed query keys.
#[derive(Debug, Clone, Default)]
struct KeyedList {
    entries: BTreeMap<usize, String>,
}

impl KeyedList {
    fn push(&mut self, key: Option<usize>, value: String) {
        let key = key.unwrap_or_else(|| {
            self.entries
                .last_key_value()
                .map_or(0, |(k, _)| k.saturating_add(1))
        });
        self.entries.insert(key, value);
    }
}

/// Split `name`, `name[]` and `name[3]` into the base name and optional key.
///
/// Returns `None` for a bracketed suffix that is not a plain index.
fn split_key(raw: &str) -> Option<(&str, Option<usize>)> {
    let Some(open) = raw.find('[') else {
        return Some((raw, None));
    };
    let inner = raw[open..].strip_prefix('[')?.strip_suffix(']')?;
    let base = &raw[..open];
    if inner.is_empty() {
        Some((base, None))
    } else {
        inner.parse().ok().map(|index| (base, Some(index)))
    }
}

/// Parsed list request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListRequest {
    /// Requested filter aliases, in key order.
    pub filters: Vec<String>,
    /// Filter values aligned with `filters`; a missing value is empty.
    pub values: Vec<String>,
    pub sort: Option<String>,
    pub order: Option<String>,
    /// Raw page value; invalid numbers are treated as absent.
    pub page: Option<u32>,
    /// Raw page size value; invalid numbers are treated as absent.
    pub max: Option<u32>,
    /// `csv` key present, whatever its value.
    pub csv: bool,
    /// Every pair as received, used to rebuild paging links.
    #[serde(skip)]
    pairs: Vec<(String, String)>,
}

impl ListRequest {
    /// Parse a raw (still percent-encoded) query string.
    pub fn from_query(query: Option<&str>) -> Self {
        let pairs: Vec<(String, String)> = url::form_urlencoded::parse(
            query.unwrap_or_default().as_bytes(),
        )
        .into_owned()
        .collect();

        let mut filters = KeyedList::default();
        let mut values = KeyedList::default();
        let mut request = ListRequest::default();

        for (key, value) in &pairs {
            let Some((name, index)) = split_key(key) else {
                continue;
            };
            match name {
                "filter" => filters.push(index, value.clone()),
                "value" => values.push(index, value.clone()),
                "sort" => request.sort = Some(value.clone()),
                "order" => request.order = Some(value.clone()),
                "page" => request.page = value.trim().parse().ok(),
                "max" => request.max = value.trim().parse().ok(),
                "csv" => request.csv = true,
                _ => {}
            }
        }

        for (key, alias) in filters.entries {
            request
                .values
                .push(values.entries.get(&key).cloned().unwrap_or_default());
            request.filters.push(alias);
        }
        request.pairs = pairs;
        request
    }

    /// Query string for the same request on another page, keeping every
    /// other parameter (filters, sort, page size) as received.
    pub fn page_query(&self, page: u32) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.pairs {
            if key != "page" && key != "csv" {
                out.append_pair(key, value);
            }
        }
        out.append_pair("page", &page.to_string());
        out.finish()
    }

    /// Query string that toggles sorting on `column`.
    ///
    /// Sorting an already-ascending column flips it to descending; anything
    /// else starts ascending. Paging restarts at the first page.
    pub fn sort_query(&self, column: &str) -> String {
        let order = if self.sort.as_deref() == Some(column) && self.order.as_deref() != Some("desc")
        {
            "desc"
        } else {
            "asc"
        };

        let mut out = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.pairs {
            if !matches!(key.as_str(), "sort" | "order" | "page" | "csv") {
                out.append_pair(key, value);
            }
        }
        out.append_pair("sort", column);
        out.append_pair("order", order);
        out.finish()
    }

    /// Query string that exports the current filters and sort as CSV.
    pub fn csv_query(&self) -> String {
        let mut out = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.pairs {
            if !matches!(key.as_str(), "page" | "max" | "csv") {
                out.append_pair(key, value);
            }
        }
        out.append_pair("csv", "1");
        out.finish()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for ListRequest {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ListRequest::from_query(parts.uri.query()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn scalar_filter() {
        let r = ListRequest::from_query(Some("filter=name&value=ann"));
        assert_eq!(r.filters, vec!["name"]);
        assert_eq!(r.values, vec!["ann"]);
    }

    #[test]
    fn repeated_and_bracketed_filters() {
        let r = ListRequest::from_query(Some(
            "filter[]=name&value[]=ann&filter[]=total&value[]=%3E10",
        ));
        assert_eq!(r.filters, vec!["name", "total"]);
        assert_eq!(r.values, vec!["ann", ">10"]);

        let r = ListRequest::from_query(Some("filter=a&filter=b&value=1&value=2"));
        assert_eq!(r.filters, vec!["a", "b"]);
        assert_eq!(r.values, vec!["1", "2"]);
    }

    #[test]
    fn indexed_filters_pair_by_key() {
        let r = ListRequest::from_query(Some("filter[1]=b&filter[0]=a&value[1]=2"));
        assert_eq!(r.filters, vec!["a", "b"]);
        assert_eq!(r.values, vec!["", "2"]);
    }

    #[test]
    fn paging_and_sort_values() {
        let r = ListRequest::from_query(Some("sort=name&order=desc&page=3&max=20"));
        assert_eq!(r.sort.as_deref(), Some("name"));
        assert_eq!(r.order.as_deref(), Some("desc"));
        assert_eq!(r.page, Some(3));
        assert_eq!(r.max, Some(20));
        assert!(!r.csv);
    }

    #[test]
    fn invalid_numbers_are_absent() {
        let r = ListRequest::from_query(Some("page=abc&max=-5"));
        assert_eq!(r.page, None);
        assert_eq!(r.max, None);
    }

    #[test]
    fn csv_presence_only() {
        assert!(ListRequest::from_query(Some("csv")).csv);
        assert!(ListRequest::from_query(Some("csv=0")).csv);
        assert!(!ListRequest::from_query(None).csv);
    }

    #[test]
    fn page_query_keeps_filters() {
        let r = ListRequest::from_query(Some("filter=name&value=a%20b&page=2"));
        assert_eq!(r.page_query(3), "filter=name&value=a+b&page=3");
    }

    #[test]
    fn sort_query_toggles() {
        let r = ListRequest::from_query(Some("sort=name&order=asc&page=4"));
        assert_eq!(r.sort_query("name"), "sort=name&order=desc");
        assert_eq!(r.sort_query("total"), "sort=total&order=asc");
    }

    #[test]
    fn csv_query_drops_paging() {
        let r = ListRequest::from_query(Some("sort=name&page=2&max=10"));
        assert_eq!(r.csv_query(), "sort=name&csv=1");
    }

    #[test]
    fn malformed_brackets_ignored() {
        let r = ListRequest::from_query(Some("filter[x]=a&filter[=b&filter=c"));
        assert_eq!(r.filters, vec!["c"]);
    }
}
