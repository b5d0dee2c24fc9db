//! Filterable, sortable, paginated list screens over a SQL query.
//!
//! A request flows through the pieces in this order:
//!
//! 1. `columns` derives the alias whitelist from the query's select list
//! 2. `filter` turns `filter`/`value` pairs into WHERE or HAVING predicates
//! 3. `sort` replaces ORDER BY with one whitelisted column
//! 4. `csv_export` streams the result, or `pager` fetches one page
//! 5. `builder` renders the page through a `PageRenderer`

pub mod builder;
pub mod columns;
pub mod csv_export;
pub mod filter;
pub mod pager;
pub mod query;
pub mod request;
pub mod sort;
pub mod source;
pub mod types;

pub use builder::{ListOptions, ListResponse, ListView, build_list};
pub use columns::{ColumnMap, is_aggregate, is_text_expression};
pub use csv_export::{CSV_FLUSH_ROWS, csv_chunks, csv_response};
pub use filter::{FilterOperator, ParsedPredicate, apply_filters, parse_filter_value};
pub use pager::{
    CountStrategy, DefaultPagerAdapterFactory, Page, PageRequest, Pager, PagerAdapter,
    PagerAdapterFactory, QueryAdapter,
};
pub use query::{FromSource, Join, JoinKind, ListQuery, QueryError, SqlDialect, SqlStatement};
pub use request::ListRequest;
pub use sort::apply_sort;
pub use source::{PgRowSource, RowSource, RowStream, SqliteRowSource};
pub use types::{AppliedFilters, ParamValue, Row, SortDirection, SortState};
