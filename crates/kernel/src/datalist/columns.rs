//! Column alias resolution and aggregate classification.
//!
//! The column map is the whitelist for filtering and sorting: a request may
//! only reference aliases that appear in the query's own select list.

use std::sync::LazyLock;

use regex::Regex;

use super::query::ListQuery;

/// Grouping functions that force a predicate into HAVING.
const AGGREGATE_FUNCTIONS: &[&str] = &["COUNT", "GROUP_CONCAT", "MAX", "MIN", "SUM"];

/// Trailing `::text`, `::varchar(n)` or `CAST(.. as TEXT)` on an expression.
#[allow(clippy::expect_used)]
static TEXT_CAST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(::\s*(text|varchar|character varying)(\s*\(\s*\d+\s*\))?|\bas\s+(text|varchar|char|character varying)(\s*\(\s*\d+\s*\))?\s*\))\s*$",
    )
    .expect("valid regex literal")
});

/// Public alias → underlying select expression.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    entries: Vec<(String, String)>,
}

impl ColumnMap {
    /// Derive the map from a select list.
    ///
    /// `expr AS alias` maps `alias → expr` with single quotes stripped from
    /// the alias. Anything else, including expressions with more than one
    /// ` AS ` token, maps to itself.
    pub fn from_select<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut map = Self::default();

        for part in parts {
            let part = part.as_ref();
            let pieces: Vec<&str> = part.split(" AS ").collect();

            if let [expr, alias] = pieces.as_slice() {
                map.insert(alias.replace('\'', ""), (*expr).to_string());
            } else {
                map.insert(part.to_string(), part.to_string());
            }
        }

        map
    }

    /// Snapshot of a query's current select list.
    pub fn from_query(query: &ListQuery) -> Self {
        Self::from_select(query.select_parts())
    }

    fn insert(&mut self, alias: String, expr: String) {
        if let Some(entry) = self.entries.iter_mut().find(|(a, _)| *a == alias) {
            entry.1 = expr;
        } else {
            self.entries.push((alias, expr));
        }
    }

    /// Expression behind an alias.
    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, e)| e.as_str())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.resolve(alias).is_some()
    }

    /// Aliases in select-list order.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(a, _)| a.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, e)| (a.as_str(), e.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Whether an expression is an aggregate and must be filtered in HAVING.
///
/// True when the text before the first `(` is a known grouping function, or
/// when a grouping function call appears anywhere in the expression. An
/// expression whose first `(` is at position 0 (or that has none) is never
/// aggregate.
pub fn is_aggregate(expr: &str) -> bool {
    let Some(paren) = expr.find('(') else {
        return false;
    };
    if paren < 1 {
        return false;
    }

    let function = &expr[..paren];
    if AGGREGATE_FUNCTIONS.contains(&function) {
        return true;
    }

    AGGREGATE_FUNCTIONS
        .iter()
        .any(|f| expr.contains(&format!("{f}(")))
}

/// Whether an expression is explicitly cast to a text type.
///
/// Filters on such columns bind their value as text, so `=123` compares
/// against the string `'123'` instead of an integer parameter that
/// Postgres would refuse to compare with text.
pub fn is_text_expression(expr: &str) -> bool {
    TEXT_CAST.is_match(expr.trim())
}
