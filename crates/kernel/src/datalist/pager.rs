//! Pagination over list queries.
//!
//! A `PagerAdapter` answers two questions: how many rows match, and which
//! rows fall in a window. The default adapter runs the list query through a
//! `RowSource`, deriving its count statement from a `CountStrategy`.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::query::ListQuery;
use super::source::RowSource;
use super::types::Row;

/// Page size used when neither the options nor the request set one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Hard ceiling for the page size, whatever the request asks for.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Rewrites a clone of the list query into its count form.
pub type CountFn = Arc<dyn Fn(&mut ListQuery) + Send + Sync>;

/// How the total row count is derived from the list query.
#[derive(Clone, Default)]
pub enum CountStrategy {
    /// Replace the select list with `COUNT(*)`.
    ///
    /// On a GROUP BY query this yields one count per group and only the
    /// first is read, so the total is the size of the first group. Use
    /// [`CountStrategy::Wrapped`] for grouped lists.
    #[default]
    Naive,
    /// Count the rows of the whole query wrapped as a subquery.
    Wrapped,
    /// Caller-supplied rewrite.
    Custom(CountFn),
}

impl fmt::Debug for CountStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountStrategy::Naive => f.write_str("Naive"),
            CountStrategy::Wrapped => f.write_str("Wrapped"),
            CountStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl CountStrategy {
    /// Wrap a closure as a custom strategy.
    pub fn custom(rewrite: impl Fn(&mut ListQuery) + Send + Sync + 'static) -> Self {
        CountStrategy::Custom(Arc::new(rewrite))
    }

    /// Parse a configured strategy name (`naive` or `wrapped`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "naive" => Some(CountStrategy::Naive),
            "wrapped" => Some(CountStrategy::Wrapped),
            _ => None,
        }
    }

    /// Derive the count query. The list query itself is left untouched.
    pub fn count_query(&self, query: &ListQuery) -> ListQuery {
        match self {
            CountStrategy::Naive => {
                if query.is_grouped() {
                    debug!("naive count on a grouped query returns the first group's size");
                }
                let mut count = query.clone();
                count.select(["COUNT(*)"]).reset_order_by();
                count
            }
            CountStrategy::Wrapped => {
                let mut inner = query.clone();
                inner.reset_order_by();
                let mut count = ListQuery::new();
                count.select(["COUNT(*)"]).from_subquery(inner, "origin");
                count
            }
            CountStrategy::Custom(rewrite) => {
                let mut count = query.clone();
                rewrite(&mut count);
                count
            }
        }
    }
}

/// Count + window access used by the pager.
#[async_trait]
pub trait PagerAdapter: Send + Sync {
    /// Total number of rows.
    async fn total(&self) -> Result<u64>;

    /// Rows `offset .. offset + length`.
    async fn slice(&self, offset: u64, length: u64) -> Result<Vec<Row>>;
}

/// Adapter over a `ListQuery` executed by a `RowSource`.
pub struct QueryAdapter {
    query: ListQuery,
    source: Arc<dyn RowSource>,
    count: CountStrategy,
}

impl QueryAdapter {
    pub fn new(query: ListQuery, source: Arc<dyn RowSource>, count: CountStrategy) -> Self {
        Self {
            query,
            source,
            count,
        }
    }
}

#[async_trait]
impl PagerAdapter for QueryAdapter {
    async fn total(&self) -> Result<u64> {
        let stmt = self
            .count
            .count_query(&self.query)
            .build(self.source.dialect())
            .context("failed to render count query")?;
        self.source.count(&stmt).await
    }

    async fn slice(&self, offset: u64, length: u64) -> Result<Vec<Row>> {
        let stmt = self
            .query
            .build_window(self.source.dialect(), length, offset)
            .context("failed to render list query")?;
        self.source.fetch(&stmt).await
    }
}

/// Builds the pager adapter for a list request.
pub trait PagerAdapterFactory: Send + Sync {
    fn new_adapter(
        &self,
        query: ListQuery,
        source: Arc<dyn RowSource>,
        count: CountStrategy,
    ) -> Box<dyn PagerAdapter>;
}

/// Factory producing `QueryAdapter`s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPagerAdapterFactory;

impl PagerAdapterFactory for DefaultPagerAdapterFactory {
    fn new_adapter(
        &self,
        query: ListQuery,
        source: Arc<dyn RowSource>,
        count: CountStrategy,
    ) -> Box<dyn PagerAdapter> {
        Box::new(QueryAdapter::new(query, source, count))
    }
}

/// Requested page and page size, already clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-indexed page number.
    pub page: u32,
    /// Rows per page, between 1 and the ceiling.
    pub per_page: u32,
}

impl PageRequest {
    /// Clamp raw request values.
    ///
    /// A missing or zero page becomes 1. A missing or zero size falls back to
    /// `default_size`; anything above `ceiling` is capped.
    pub fn new(page: Option<u32>, max: Option<u32>, default_size: u32, ceiling: u32) -> Self {
        let ceiling = ceiling.max(1);
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let requested = max.filter(|m| *m > 0).unwrap_or(default_size).max(1);

        let per_page = if requested > ceiling {
            warn!(requested, max = ceiling, "clamping page size to maximum");
            ceiling
        } else {
            requested
        };

        Self { page, per_page }
    }

    /// Row offset of the first item on the page.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results plus paging metadata.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    /// Rows on this page.
    pub items: Vec<Row>,

    /// Total count (before paging).
    pub total: u64,

    /// Current page number (1-indexed).
    pub page: u32,

    /// Items per page.
    pub per_page: u32,

    /// Total number of pages, at least 1.
    pub total_pages: u32,

    /// Whether there's a next page.
    pub has_next: bool,

    /// Whether there's a previous page.
    pub has_prev: bool,
}

impl Page {
    /// Create a page with paging calculations.
    pub fn new(items: Vec<Row>, total: u64, page: u32, per_page: u32) -> Self {
        let total_pages = if per_page > 0 {
            u32::try_from(total.div_ceil(u64::from(per_page))).unwrap_or(u32::MAX)
        } else {
            1
        }
        .max(1);

        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
            has_next: page < total_pages,
            has_prev: page > 1,
        }
    }

    /// Whether the requested page lies past the last one.
    pub fn is_out_of_range(&self) -> bool {
        self.page > self.total_pages
    }
}

/// Runs an adapter for a page request.
pub struct Pager;

impl Pager {
    /// Fetch the requested page.
    ///
    /// A page past the end yields no items but still reports the true total;
    /// the adapter is not asked for a slice in that case.
    pub async fn paginate(adapter: &dyn PagerAdapter, request: PageRequest) -> Result<Page> {
        let total = adapter.total().await?;
        let offset = request.offset();

        let items = if offset < total {
            adapter
                .slice(offset, u64::from(request.per_page))
                .await?
        } else {
            debug!(page = request.page, total, "requested page is past the last row");
            Vec::new()
        };

        Ok(Page::new(items, total, request.page, request.per_page))
    }
}
