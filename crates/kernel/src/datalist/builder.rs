//! List response builder.
//!
//! Ties the pieces together for one request: resolve columns, apply filters
//! and sort, then either stream CSV or paginate and render the list template.

use std::fmt;
use std::sync::Arc;

use axum::response::{Html, IntoResponse, Response};
use serde::Serialize;
use tracing::debug;

use super::columns::ColumnMap;
use super::csv_export::csv_response;
use super::filter::apply_filters;
use super::pager::{
    CountStrategy, DEFAULT_PAGE_SIZE, DefaultPagerAdapterFactory, MAX_PAGE_SIZE, Page,
    PageRequest, Pager, PagerAdapterFactory,
};
use super::query::ListQuery;
use super::request::ListRequest;
use super::sort::apply_sort;
use super::source::{RowSource, RowStream};
use super::types::{AppliedFilters, SortState};
use crate::error::AppError;
use crate::theme::PageRenderer;

/// Default list template.
pub const DEFAULT_LIST_TEMPLATE: &str = "datalist/list.html";

/// How many page links to show on each side of the current page.
const PAGE_LINK_RADIUS: u32 = 3;

/// Per-screen list configuration. Built once, shared across requests.
#[derive(Clone)]
pub struct ListOptions {
    title: String,
    template: String,
    sort_enabled: bool,
    filter_enabled: bool,
    template_options: serde_json::Map<String, serde_json::Value>,
    page_size: u32,
    max_page_size: u32,
    count: CountStrategy,
    adapter_factory: Arc<dyn PagerAdapterFactory>,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            title: String::new(),
            template: DEFAULT_LIST_TEMPLATE.to_string(),
            sort_enabled: true,
            filter_enabled: true,
            template_options: serde_json::Map::new(),
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            count: CountStrategy::default(),
            adapter_factory: Arc::new(DefaultPagerAdapterFactory),
        }
    }
}

impl fmt::Debug for ListOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListOptions")
            .field("title", &self.title)
            .field("template", &self.template)
            .field("sort_enabled", &self.sort_enabled)
            .field("filter_enabled", &self.filter_enabled)
            .field("page_size", &self.page_size)
            .field("max_page_size", &self.max_page_size)
            .field("count", &self.count)
            .finish_non_exhaustive()
    }
}

impl ListOptions {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Ignore `sort`/`order` request values.
    pub fn disable_sort(mut self) -> Self {
        self.sort_enabled = false;
        self
    }

    /// Ignore `filter`/`value` request values.
    pub fn disable_filter(mut self) -> Self {
        self.filter_enabled = false;
        self
    }

    /// Extra template variables; they override built-in context keys.
    pub fn with_template_options(
        mut self,
        options: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        self.template_options = options;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.template_options.insert(key.into(), value);
        self
    }

    /// Page size used when the request has no `max`.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Ceiling for request-supplied page sizes.
    pub fn with_max_page_size(mut self, max_page_size: u32) -> Self {
        self.max_page_size = max_page_size.max(1);
        self
    }

    pub fn with_count_strategy(mut self, count: CountStrategy) -> Self {
        self.count = count;
        self
    }

    /// Count with `COUNT(*)` over the whole query as a subquery.
    pub fn use_wrapped_count(self) -> Self {
        self.with_count_strategy(CountStrategy::Wrapped)
    }

    pub fn with_adapter_factory(mut self, factory: Arc<dyn PagerAdapterFactory>) -> Self {
        self.adapter_factory = factory;
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn sort_enabled(&self) -> bool {
        self.sort_enabled
    }

    pub fn filter_enabled(&self) -> bool {
        self.filter_enabled
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn count_strategy(&self) -> &CountStrategy {
        &self.count
    }
}

/// Rendered list page or CSV download.
pub enum ListResponse {
    Page(Html<String>),
    Csv(RowStream),
}

impl fmt::Debug for ListResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListResponse::Page(_) => f.write_str("ListResponse::Page"),
            ListResponse::Csv(_) => f.write_str("ListResponse::Csv"),
        }
    }
}

impl IntoResponse for ListResponse {
    fn into_response(self) -> Response {
        match self {
            ListResponse::Page(html) => html.into_response(),
            ListResponse::Csv(rows) => csv_response(rows),
        }
    }
}

/// One numbered page link.
#[derive(Debug, Clone, Serialize)]
pub struct PageLink {
    pub number: u32,
    pub link: String,
    pub current: bool,
}

/// Pager section of the template context.
#[derive(Debug, Clone, Serialize)]
pub struct PagerView {
    #[serde(flatten)]
    pub page: Page,
    pub first_link: String,
    pub last_link: String,
    pub prev_link: Option<String>,
    pub next_link: Option<String>,
    pub pages: Vec<PageLink>,
}

impl PagerView {
    fn new(page: Page, request: &ListRequest) -> Self {
        let link = |n: u32| format!("?{}", request.page_query(n));

        let last = page.total_pages;
        let start = page.page.saturating_sub(PAGE_LINK_RADIUS).max(1);
        let end = page.page.saturating_add(PAGE_LINK_RADIUS).min(last);
        let pages = (start..=end)
            .map(|number| PageLink {
                number,
                link: link(number),
                current: number == page.page,
            })
            .collect();

        Self {
            first_link: link(1),
            last_link: link(last),
            prev_link: page.has_prev.then(|| link(page.page - 1)),
            next_link: page.has_next.then(|| link(page.page + 1)),
            pages,
            page,
        }
    }
}

/// One table column in the template context.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnView {
    /// Row key and public alias.
    pub name: String,
    /// Alias is in the column map and sorting is enabled.
    pub sortable: bool,
    /// Alias is in the column map and filtering is enabled.
    pub filterable: bool,
    /// Link that toggles sorting on this column.
    pub sort_link: Option<String>,
    /// Current direction when the list is sorted by this column.
    pub sorted: Option<&'static str>,
    /// Applied filter value, if any.
    pub filter_value: Option<String>,
}

/// Template context for a list page.
#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub title: String,
    pub pager: PagerView,
    pub columns: Vec<ColumnView>,
    pub applied_filters: AppliedFilters,
    pub sort: Option<SortState>,
    pub sort_enabled: bool,
    pub filter_enabled: bool,
    pub csv_link: String,
}

impl ListView {
    fn new(
        options: &ListOptions,
        request: &ListRequest,
        columns: &ColumnMap,
        applied_filters: AppliedFilters,
        sort: Option<SortState>,
        page: Page,
    ) -> Self {
        // Header follows the rows when there are any, the select list otherwise
        let names: Vec<String> = match page.items.first() {
            Some(row) => row.keys().cloned().collect(),
            None => columns.aliases().map(str::to_string).collect(),
        };

        let column_views = names
            .into_iter()
            .map(|name| {
                let known = columns.contains(&name);
                let sortable = known && options.sort_enabled;
                ColumnView {
                    sortable,
                    filterable: known && options.filter_enabled,
                    sort_link: sortable.then(|| format!("?{}", request.sort_query(&name))),
                    sorted: sort
                        .as_ref()
                        .filter(|s| s.column == name)
                        .map(|s| s.direction.as_param()),
                    filter_value: applied_filters.get(&name).map(str::to_string),
                    name,
                }
            })
            .collect();

        Self {
            title: options.title.clone(),
            pager: PagerView::new(page, request),
            columns: column_views,
            applied_filters,
            sort,
            sort_enabled: options.sort_enabled,
            filter_enabled: options.filter_enabled,
            csv_link: format!("?{}", request.csv_query()),
        }
    }

    /// Tera context with the extra template options merged over the view.
    pub fn into_context(
        self,
        options: &ListOptions,
    ) -> Result<tera::Context, tera::Error> {
        let mut context = tera::Context::from_serialize(&self)?;
        for (key, value) in &options.template_options {
            context.insert(key.as_str(), value);
        }
        Ok(context)
    }
}

/// Build the list response for one request.
///
/// The query is consumed: filters and sort are applied to it in place
/// before it is handed to the CSV exporter or the pager adapter.
pub async fn build_list(
    options: &ListOptions,
    request: &ListRequest,
    mut query: ListQuery,
    source: Arc<dyn RowSource>,
    renderer: &dyn PageRenderer,
) -> Result<ListResponse, AppError> {
    let columns = ColumnMap::from_query(&query);

    let applied_filters = if options.filter_enabled {
        apply_filters(&mut query, &columns, &request.filters, &request.values)
    } else {
        AppliedFilters::new()
    };

    let sort = if options.sort_enabled {
        apply_sort(
            &mut query,
            &columns,
            request.sort.as_deref(),
            request.order.as_deref(),
        )
    } else {
        None
    };

    if request.csv {
        let stmt = query.build(source.dialect())?;
        debug!(title = %options.title, "streaming list as csv");
        return Ok(ListResponse::Csv(source.stream(stmt)));
    }

    let page_request = PageRequest::new(
        request.page,
        request.max,
        options.page_size,
        options.max_page_size,
    );
    let adapter = options
        .adapter_factory
        .new_adapter(query, source, options.count.clone());
    let page = Pager::paginate(adapter.as_ref(), page_request).await?;

    let context = ListView::new(options, request, &columns, applied_filters, sort, page)
        .into_context(options)?;
    let html = renderer.render(&options.template, &context)?;

    Ok(ListResponse::Page(Html(html)))
}
