//! Whitelisted single-column sorting.

use tracing::debug;

use super::columns::ColumnMap;
use super::query::ListQuery;
use super::types::{SortDirection, SortState};

/// Apply `sort`/`order` request values to the query.
///
/// Without a sort alias, or with one outside the column map, the query keeps
/// its own ordering. Otherwise ORDER BY is replaced by the resolved
/// expression; any `order` other than `desc` sorts ascending.
pub fn apply_sort(
    query: &mut ListQuery,
    columns: &ColumnMap,
    sort: Option<&str>,
    order: Option<&str>,
) -> Option<SortState> {
    let alias = sort?;
    let Some(expr) = columns.resolve(alias) else {
        debug!(column = %alias, "ignoring sort on unknown column");
        return None;
    };

    let direction = SortDirection::parse_lenient(order);
    query.order_by(expr, direction);

    Some(SortState {
        column: alias.to_string(),
        direction,
    })
}
