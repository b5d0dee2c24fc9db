//! Filter value parsing and predicate application.
//!
//! A raw filter value may carry an operator prefix (`>10`, `<=5`, `!=*foo*`,
//! `=""`). Prefixes are matched by an ordered rule list, first match wins;
//! values without a recognised prefix become substring LIKE filters.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::columns::{ColumnMap, is_aggregate, is_text_expression};
use super::query::ListQuery;
use super::types::{AppliedFilters, ParamValue};

/// Prefix for generated parameter names.
const PARAM_PREFIX: &str = "filter_value_";

/// Comparison operators a filter value can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Pattern match (default).
    Like,
    /// Negated pattern match.
    NotLike,
    /// Exact match.
    Equals,
    /// Not equal.
    NotEquals,
    /// Greater than.
    GreaterThan,
    /// Greater than or equal.
    GreaterOrEqual,
    /// Less than.
    LessThan,
    /// Less than or equal.
    LessOrEqual,
}

impl FilterOperator {
    /// SQL operator token.
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOperator::Like => "LIKE",
            FilterOperator::NotLike => "NOT LIKE",
            FilterOperator::Equals => "=",
            FilterOperator::NotEquals => "!=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterOrEqual => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessOrEqual => "<=",
        }
    }

    fn is_pattern(self) -> bool {
        matches!(self, FilterOperator::Like | FilterOperator::NotLike)
    }
}

/// Operator and cleaned value parsed from a raw filter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPredicate {
    pub operator: FilterOperator,
    /// Value to bind, with LIKE wildcards already applied.
    pub value: String,
    /// `=`/`!=` against an empty value also matches NULL / NOT NULL.
    pub null_equivalent: bool,
}

/// One prefix rule: pattern, resulting operator, capture group holding the value.
struct OperatorRule {
    pattern: Regex,
    operator: FilterOperator,
    value_group: usize,
    /// `""` and `''` mean the empty string.
    empty_quotes: bool,
}

/// Prefix rules in priority order. `>` must not swallow `>=`, `<` must not
/// swallow `<=` or `<>`, and `!=*` must be tried before `!=`.
///
/// # Panics
///
/// Panics if a hard-coded regex literal is invalid (impossible in practice).
#[allow(clippy::expect_used)]
static OPERATOR_RULES: LazyLock<Vec<OperatorRule>> = LazyLock::new(|| {
    let rule = |pattern: &str, operator, value_group, empty_quotes| OperatorRule {
        pattern: Regex::new(pattern).expect("valid regex literal"),
        operator,
        value_group,
        empty_quotes,
    };

    vec![
        rule(r"^> *([^=].*)$", FilterOperator::GreaterThan, 1, false),
        rule(r"^>= *(.*)$", FilterOperator::GreaterOrEqual, 1, false),
        rule(r"^< *([^=>].*)$", FilterOperator::LessThan, 1, false),
        rule(r"^<= *(.*)$", FilterOperator::LessOrEqual, 1, false),
        rule(r"^==? *(.*)$", FilterOperator::Equals, 1, true),
        rule(r"^(!=|<>)\* *(.*)$", FilterOperator::NotLike, 2, false),
        rule(r"^(!=|<>) *(.*)$", FilterOperator::NotEquals, 2, true),
    ]
});

/// Parse a raw filter value into an operator and a bindable value.
pub fn parse_filter_value(raw: &str) -> ParsedPredicate {
    let (operator, mut value) = OPERATOR_RULES
        .iter()
        .find_map(|rule| {
            let captures = rule.pattern.captures(raw)?;
            let mut value = captures
                .get(rule.value_group)
                .map_or("", |m| m.as_str())
                .to_string();
            if rule.empty_quotes && (value == "\"\"" || value == "''") {
                value.clear();
            }
            Some((rule.operator, value))
        })
        .unwrap_or_else(|| (FilterOperator::Like, raw.to_string()));

    if operator.is_pattern() {
        value = if value.contains('*') {
            value.replace('*', "%")
        } else {
            format!("%{value}%")
        };
    }

    let null_equivalent = value.is_empty()
        && matches!(
            operator,
            FilterOperator::Equals | FilterOperator::NotEquals
        );

    ParsedPredicate {
        operator,
        value,
        null_equivalent,
    }
}

impl ParsedPredicate {
    /// Value to bind. Pattern values stay text; other non-empty values bind
    /// as numbers when they parse as one so numeric columns compare
    /// numerically on every backend. Text-cast columns override this in
    /// [`apply_filters`].
    pub fn bind_value(&self) -> ParamValue {
        if self.operator.is_pattern() || self.value.is_empty() {
            return ParamValue::Text(self.value.clone());
        }
        if let Ok(i) = self.value.parse::<i64>() {
            return ParamValue::Int(i);
        }
        match self.value.parse::<f64>() {
            Ok(f) if f.is_finite() => ParamValue::Float(f),
            _ => ParamValue::Text(self.value.clone()),
        }
    }
}

/// Predicate SQL for one column, referencing `:param`.
pub fn predicate_sql(expr: &str, predicate: &ParsedPredicate, param: &str) -> String {
    let base = format!("({expr} {} :{param})", predicate.operator.as_sql());

    if !predicate.null_equivalent {
        return base;
    }

    match predicate.operator {
        FilterOperator::Equals => format!("{base} OR ({expr} IS NULL)"),
        FilterOperator::NotEquals => format!("{base} OR ({expr} IS NOT NULL)"),
        _ => base,
    }
}

/// Whether a raw value is worth filtering on. `"0"` counts as a value.
fn is_meaningful(value: &str) -> bool {
    !value.is_empty()
}

/// Pair parallel `filter`/`value` lists and keep whitelisted, non-empty entries.
///
/// A later duplicate alias replaces the earlier value. A missing value at an
/// index is treated as empty.
pub fn collect_filters(
    columns: &ColumnMap,
    aliases: &[String],
    values: &[String],
) -> AppliedFilters {
    let mut filters = AppliedFilters::new();

    for (i, alias) in aliases.iter().enumerate() {
        if !columns.contains(alias) {
            continue;
        }
        let value = values.get(i).map(String::as_str).unwrap_or_default();
        filters.insert(alias.as_str(), value);
    }

    filters.retain(|_, value| is_meaningful(value));
    filters
}

/// Apply filters to the query and return the ones actually applied.
///
/// Aliases outside the column map and empty values are silently ignored.
/// Aggregate expressions are filtered in HAVING, everything else in WHERE.
pub fn apply_filters(
    query: &mut ListQuery,
    columns: &ColumnMap,
    aliases: &[String],
    values: &[String],
) -> AppliedFilters {
    let filters = collect_filters(columns, aliases, values);

    for (index, (alias, raw)) in filters.iter().enumerate() {
        let Some(expr) = columns.resolve(alias) else {
            continue;
        };

        let predicate = parse_filter_value(raw);
        let param = format!("{PARAM_PREFIX}{index}");
        let sql = predicate_sql(expr, &predicate, &param);

        if is_aggregate(expr) {
            query.and_having(sql);
        } else {
            query.and_where(sql);
        }
        let value = if is_text_expression(expr) {
            ParamValue::Text(predicate.value.clone())
        } else {
            predicate.bind_value()
        };
        query.set_parameter(&param, value);

        debug!(
            column = %alias,
            operator = predicate.operator.as_sql(),
            having = is_aggregate(expr),
            "applied list filter"
        );
    }

    filters
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::datalist::types::ParamValue;

    fn parsed(raw: &str) -> (FilterOperator, String) {
        let p = parse_filter_value(raw);
        (p.operator, p.value)
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn greater_than_does_not_swallow_greater_equal() {
        assert_eq!(parsed(">10"), (FilterOperator::GreaterThan, "10".into()));
        assert_eq!(parsed(">=10"), (FilterOperator::GreaterOrEqual, "10".into()));
        assert_eq!(parsed("> 10"), (FilterOperator::GreaterThan, "10".into()));
        assert_eq!(parsed(">= 10"), (FilterOperator::GreaterOrEqual, "10".into()));
    }

    #[test]
    fn less_than_does_not_swallow_less_equal_or_not_equal() {
        assert_eq!(parsed("<5"), (FilterOperator::LessThan, "5".into()));
        assert_eq!(parsed("<=5"), (FilterOperator::LessOrEqual, "5".into()));
        assert_eq!(parsed("<>5"), (FilterOperator::NotEquals, "5".into()));
    }

    #[test]
    fn equals_single_and_double() {
        assert_eq!(parsed("=abc"), (FilterOperator::Equals, "abc".into()));
        assert_eq!(parsed("==abc"), (FilterOperator::Equals, "abc".into()));
        assert_eq!(parsed("= abc"), (FilterOperator::Equals, "abc".into()));
    }

    #[test]
    fn empty_quotes_normalize_to_empty() {
        let p = parse_filter_value("=\"\"");
        assert_eq!(p.operator, FilterOperator::Equals);
        assert_eq!(p.value, "");
        assert!(p.null_equivalent);

        let p = parse_filter_value("!=''");
        assert_eq!(p.operator, FilterOperator::NotEquals);
        assert_eq!(p.value, "");
        assert!(p.null_equivalent);
    }

    #[test]
    fn bare_equals_is_null_equivalent() {
        let p = parse_filter_value("=");
        assert_eq!(p.operator, FilterOperator::Equals);
        assert!(p.null_equivalent);
    }

    #[test]
    fn zero_is_not_null_equivalent() {
        let p = parse_filter_value("=0");
        assert_eq!(p.value, "0");
        assert!(!p.null_equivalent);
    }

    #[test]
    fn not_like_before_not_equals() {
        assert_eq!(parsed("!=**foo*"), (FilterOperator::NotLike, "%foo%".into()));
        assert_eq!(parsed("!=*foo*"), (FilterOperator::NotLike, "foo%".into()));
        assert_eq!(parsed("<>*foo"), (FilterOperator::NotLike, "%foo%".into()));
        assert_eq!(parsed("!=foo"), (FilterOperator::NotEquals, "foo".into()));
    }

    #[test]
    fn not_like_without_star_is_wrapped() {
        assert_eq!(parsed("!=* foo"), (FilterOperator::NotLike, "%foo%".into()));
    }

    #[test]
    fn like_explicit_and_implicit_wildcards_match() {
        assert_eq!(parsed("*abc*"), (FilterOperator::Like, "%abc%".into()));
        assert_eq!(parsed("abc"), (FilterOperator::Like, "%abc%".into()));
        assert_eq!(parsed("abc*"), (FilterOperator::Like, "abc%".into()));
    }

    #[test]
    fn malformed_prefix_falls_through_to_like() {
        assert_eq!(parsed(">"), (FilterOperator::Like, "%>%".into()));
        assert_eq!(parsed("<"), (FilterOperator::Like, "%<%".into()));
        assert_eq!(parsed("!x"), (FilterOperator::Like, "%!x%".into()));
    }

    #[test]
    fn predicate_sql_plain() {
        let p = parse_filter_value(">10");
        assert_eq!(predicate_sql("o.total", &p, "p0"), "(o.total > :p0)");
    }

    #[test]
    fn predicate_sql_null_equivalence() {
        let p = parse_filter_value("=\"\"");
        assert_eq!(
            predicate_sql("u.email", &p, "p0"),
            "(u.email = :p0) OR (u.email IS NULL)"
        );

        let p = parse_filter_value("!=");
        assert_eq!(
            predicate_sql("u.email", &p, "p1"),
            "(u.email != :p1) OR (u.email IS NOT NULL)"
        );
    }

    #[test]
    fn collect_drops_unknown_and_empty_keeps_zero() {
        let columns = ColumnMap::from_select(&["u.name AS name", "u.active AS active", "id"]);
        let filters = collect_filters(
            &columns,
            &strings(&["name", "bogus", "active", "id"]),
            &strings(&["ann", "x", "0", ""]),
        );

        let entries: Vec<_> = filters.iter().collect();
        assert_eq!(entries, vec![("name", "ann"), ("active", "0")]);
    }

    #[test]
    fn collect_missing_value_is_dropped() {
        let columns = ColumnMap::from_select(&["name", "email"]);
        let filters = collect_filters(&columns, &strings(&["name", "email"]), &strings(&["a"]));
        assert_eq!(filters.len(), 1);
        assert!(filters.contains("name"));
    }

    #[test]
    fn unknown_alias_never_mutates_query() {
        let columns = ColumnMap::from_select(&["u.name AS name"]);
        let mut query = ListQuery::new();
        query.select(["u.name AS name"]).from_as("users", "u");

        let applied = apply_filters(&mut query, &columns, &strings(&["u.password"]), &strings(&["x"]));

        assert!(applied.is_empty());
        assert!(query.where_parts().is_empty());
        assert!(query.having_parts().is_empty());
        assert_eq!(query.parameters().count(), 0);
    }

    #[test]
    fn where_versus_having() {
        let select = ["u.name AS name", "COUNT(o.id) AS orders"];
        let columns = ColumnMap::from_select(&select);
        let mut query = ListQuery::new();
        query.select(select).from_as("users", "u");

        let applied = apply_filters(
            &mut query,
            &columns,
            &strings(&["name", "orders"]),
            &strings(&["ann", ">2"]),
        );

        assert_eq!(applied.len(), 2);
        assert_eq!(query.where_parts(), &["(u.name LIKE :filter_value_0)".to_string()]);
        assert_eq!(
            query.having_parts(),
            &["(COUNT(o.id) > :filter_value_1)".to_string()]
        );
        assert_eq!(
            query.parameter("filter_value_0"),
            Some(&ParamValue::Text("%ann%".to_string()))
        );
        assert_eq!(
            query.parameter("filter_value_1"),
            Some(&ParamValue::Int(2))
        );
    }

    #[test]
    fn bind_value_typing() {
        assert_eq!(parse_filter_value(">10").bind_value(), ParamValue::Int(10));
        assert_eq!(parse_filter_value("<=2.5").bind_value(), ParamValue::Float(2.5));
        assert_eq!(
            parse_filter_value("=ann").bind_value(),
            ParamValue::Text("ann".to_string())
        );
        assert_eq!(
            parse_filter_value("42").bind_value(),
            ParamValue::Text("%42%".to_string())
        );
        assert_eq!(
            parse_filter_value("=''").bind_value(),
            ParamValue::Text(String::new())
        );
        assert_eq!(
            parse_filter_value("=nan").bind_value(),
            ParamValue::Text("nan".to_string())
        );
    }

    #[test]
    fn text_cast_columns_bind_numbers_as_text() {
        let select = ["u.id AS id", "u.code::text AS code", "CAST(u.zip as TEXT) AS zip"];
        let columns = ColumnMap::from_select(&select);
        let mut query = ListQuery::new();
        query.select(select).from_as("users", "u");

        apply_filters(
            &mut query,
            &columns,
            &strings(&["id", "code", "zip"]),
            &strings(&["=123", "=123", "!=2.5"]),
        );

        assert_eq!(query.parameter("filter_value_0"), Some(&ParamValue::Int(123)));
        assert_eq!(
            query.parameter("filter_value_1"),
            Some(&ParamValue::Text("123".to_string()))
        );
        assert_eq!(
            query.parameter("filter_value_2"),
            Some(&ParamValue::Text("2.5".to_string()))
        );
    }

    #[test]
    fn placeholder_counter_skips_dropped_entries() {
        let columns = ColumnMap::from_select(&["a", "b", "c"]);
        let mut query = ListQuery::new();
        query.select(["a", "b", "c"]).from("t");

        apply_filters(
            &mut query,
            &columns,
            &strings(&["a", "b", "c"]),
            &strings(&["1", "", "3"]),
        );

        assert_eq!(
            query.where_parts(),
            &[
                "(a LIKE :filter_value_0)".to_string(),
                "(c LIKE :filter_value_1)".to_string()
            ]
        );
    }
}
