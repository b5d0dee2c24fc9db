//! Mutable SELECT builder for list screens.
//!
//! `ListQuery` keeps its parts as raw SQL fragments (select expressions,
//! predicates, group/order expressions) so the filter and sort appliers can
//! inspect and extend them. Predicates reference bound values by name
//! (`:name`); values are never interpolated into the SQL text. At build time
//! the fragments are assembled with SeaQuery and every named reference is
//! rewritten to a numbered placeholder for the target dialect.

use sea_query::{Alias, Expr, Order, PostgresQueryBuilder, Query, SelectStatement, SqliteQueryBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{ParamValue, SortDirection};

/// Errors raised while rendering a list query.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("parameter `{0}` is referenced but not bound")]
    UnboundParameter(String),
}

/// SQL dialect used when rendering placeholders and identifiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Postgres,
    Sqlite,
}

impl SqlDialect {
    /// Placeholder for the n-th (1-based) bound value.
    fn placeholder(self, n: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${n}"),
            SqlDialect::Sqlite => format!("?{n}"),
        }
    }
}

/// SQL join types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
    Right,
}

impl From<JoinKind> for sea_query::JoinType {
    fn from(kind: JoinKind) -> Self {
        match kind {
            JoinKind::Inner => sea_query::JoinType::InnerJoin,
            JoinKind::Left => sea_query::JoinType::LeftJoin,
            JoinKind::Right => sea_query::JoinType::RightJoin,
        }
    }
}

/// Join clause.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Join {
    /// Join type.
    #[serde(default)]
    pub kind: JoinKind,
    /// Joined table.
    pub table: String,
    /// Table alias.
    pub alias: Option<String>,
    /// Join condition as a raw SQL fragment.
    pub on: String,
}

/// FROM source: a table or an aliased subquery.
#[derive(Debug, Clone)]
pub enum FromSource {
    Table { name: String, alias: Option<String> },
    Subquery { query: Box<ListQuery>, alias: String },
}

/// Rendered statement plus its bound values in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub values: Vec<ParamValue>,
}

/// Mutable query builder supplied per request.
///
/// Not safe for concurrent mutation; one instance per request.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    select: Vec<String>,
    from: Option<FromSource>,
    joins: Vec<Join>,
    predicates: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<(String, SortDirection)>,
    params: Vec<(String, ParamValue)>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the select list.
    pub fn select<I, S>(&mut self, parts: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = parts.into_iter().map(Into::into).collect();
        self
    }

    /// Append one select expression.
    pub fn add_select(&mut self, part: impl Into<String>) -> &mut Self {
        self.select.push(part.into());
        self
    }

    /// Select expressions in order.
    pub fn select_parts(&self) -> &[String] {
        &self.select
    }

    /// Select from a table. `schema.table` names are split on the dot.
    pub fn from(&mut self, table: impl Into<String>) -> &mut Self {
        self.from = Some(FromSource::Table {
            name: table.into(),
            alias: None,
        });
        self
    }

    /// Select from an aliased table.
    pub fn from_as(&mut self, table: impl Into<String>, alias: impl Into<String>) -> &mut Self {
        self.from = Some(FromSource::Table {
            name: table.into(),
            alias: Some(alias.into()),
        });
        self
    }

    /// Select from an aliased subquery.
    pub fn from_subquery(&mut self, query: ListQuery, alias: impl Into<String>) -> &mut Self {
        self.from = Some(FromSource::Subquery {
            query: Box::new(query),
            alias: alias.into(),
        });
        self
    }

    pub fn from_source(&self) -> Option<&FromSource> {
        self.from.as_ref()
    }

    /// Add a join clause.
    pub fn join(&mut self, join: Join) -> &mut Self {
        self.joins.push(join);
        self
    }

    /// Add a LEFT JOIN.
    pub fn left_join(
        &mut self,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: impl Into<String>,
    ) -> &mut Self {
        self.join(Join {
            kind: JoinKind::Left,
            table: table.into(),
            alias: Some(alias.into()),
            on: on.into(),
        })
    }

    /// Add an INNER JOIN.
    pub fn inner_join(
        &mut self,
        table: impl Into<String>,
        alias: impl Into<String>,
        on: impl Into<String>,
    ) -> &mut Self {
        self.join(Join {
            kind: JoinKind::Inner,
            table: table.into(),
            alias: Some(alias.into()),
            on: on.into(),
        })
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    /// AND a predicate onto the WHERE clause.
    pub fn and_where(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.predicates.push(predicate.into());
        self
    }

    pub fn where_parts(&self) -> &[String] {
        &self.predicates
    }

    /// Append a GROUP BY expression.
    pub fn group_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn group_by_parts(&self) -> &[String] {
        &self.group_by
    }

    /// Whether the query groups rows (a plain COUNT(*) would count groups wrong).
    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty()
    }

    /// AND a predicate onto the HAVING clause.
    pub fn and_having(&mut self, predicate: impl Into<String>) -> &mut Self {
        self.having.push(predicate.into());
        self
    }

    pub fn having_parts(&self) -> &[String] {
        &self.having
    }

    /// Replace ORDER BY with a single expression.
    pub fn order_by(&mut self, expr: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.order_by = vec![(expr.into(), direction)];
        self
    }

    /// Append an ORDER BY expression.
    pub fn add_order_by(&mut self, expr: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.order_by.push((expr.into(), direction));
        self
    }

    /// Drop every ORDER BY expression.
    pub fn reset_order_by(&mut self) -> &mut Self {
        self.order_by.clear();
        self
    }

    pub fn order_by_parts(&self) -> &[(String, SortDirection)] {
        &self.order_by
    }

    /// Bind a value to a named parameter. A leading `:` is ignored.
    pub fn set_parameter(&mut self, name: &str, value: impl Into<ParamValue>) -> &mut Self {
        let name = name.trim_start_matches(':').to_string();
        let value = value.into();
        if let Some(entry) = self.params.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.params.push((name, value));
        }
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParamValue> {
        let name = name.trim_start_matches(':');
        self.params.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Clear every query part, including bound parameters.
    pub fn reset(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// Render the full statement.
    pub fn build(&self, dialect: SqlDialect) -> Result<SqlStatement, QueryError> {
        let mut collector = ParamCollector::new(dialect);
        let stmt = self.to_select(&mut collector)?;
        Ok(collector.finish(render(&stmt, dialect)))
    }

    /// Render the statement restricted to a LIMIT/OFFSET window.
    pub fn build_window(
        &self,
        dialect: SqlDialect,
        limit: u64,
        offset: u64,
    ) -> Result<SqlStatement, QueryError> {
        let mut collector = ParamCollector::new(dialect);
        let mut stmt = self.to_select(&mut collector)?;
        stmt.limit(limit);
        stmt.offset(offset);
        Ok(collector.finish(render(&stmt, dialect)))
    }

    fn to_select(&self, collector: &mut ParamCollector) -> Result<SelectStatement, QueryError> {
        let mut stmt = Query::select();

        if self.select.is_empty() {
            stmt.expr(Expr::cust("*"));
        } else {
            for part in &self.select {
                stmt.expr(Expr::cust(part.as_str()));
            }
        }

        match &self.from {
            Some(FromSource::Table { name, alias }) => {
                let table = table_ref(name);
                match alias {
                    Some(alias) => {
                        stmt.from_as(table, Alias::new(alias));
                    }
                    None => {
                        stmt.from(table);
                    }
                }
            }
            Some(FromSource::Subquery { query, alias }) => {
                let inner = query.to_select(collector)?;
                stmt.from_subquery(inner, Alias::new(alias));
            }
            None => {}
        }

        for join in &self.joins {
            let on = Expr::cust(self.bind_named(&join.on, collector)?);
            match &join.alias {
                Some(alias) => {
                    stmt.join_as(join.kind.into(), table_ref(&join.table), Alias::new(alias), on);
                }
                None => {
                    stmt.join(join.kind.into(), table_ref(&join.table), on);
                }
            }
        }

        for predicate in &self.predicates {
            let sql = self.bind_named(predicate, collector)?;
            stmt.and_where(Expr::cust(format!("({sql})")));
        }

        if !self.group_by.is_empty() {
            stmt.add_group_by(self.group_by.iter().map(|g| Expr::cust(g.as_str())));
        }

        for predicate in &self.having {
            let sql = self.bind_named(predicate, collector)?;
            stmt.and_having(Expr::cust(format!("({sql})")));
        }

        for (expr, direction) in &self.order_by {
            let order = match direction {
                SortDirection::Asc => Order::Asc,
                SortDirection::Desc => Order::Desc,
            };
            stmt.order_by_expr(Expr::cust(expr.as_str()), order);
        }

        Ok(stmt)
    }

    /// Rewrite `:name` references to numbered placeholders, collecting values.
    fn bind_named(&self, sql: &str, collector: &mut ParamCollector) -> Result<String, QueryError> {
        rewrite_named_params(sql, |name| {
            let value = self
                .parameter(name)
                .ok_or_else(|| QueryError::UnboundParameter(name.to_string()))?;
            Ok(collector.push(value.clone()))
        })
    }
}

/// Table reference, splitting `schema.table`.
fn table_ref(name: &str) -> sea_query::TableRef {
    use sea_query::IntoTableRef;
    match name.split_once('.') {
        Some((schema, table)) => (Alias::new(schema), Alias::new(table)).into_table_ref(),
        None => Alias::new(name).into_table_ref(),
    }
}

fn render(stmt: &SelectStatement, dialect: SqlDialect) -> String {
    match dialect {
        SqlDialect::Postgres => stmt.to_string(PostgresQueryBuilder),
        SqlDialect::Sqlite => stmt.to_string(SqliteQueryBuilder),
    }
}

/// Collects bound values in placeholder order.
struct ParamCollector {
    dialect: SqlDialect,
    values: Vec<ParamValue>,
}

impl ParamCollector {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            values: Vec::new(),
        }
    }

    fn push(&mut self, value: ParamValue) -> String {
        self.values.push(value);
        self.dialect.placeholder(self.values.len())
    }

    fn finish(self, sql: String) -> SqlStatement {
        SqlStatement {
            sql,
            values: self.values,
        }
    }
}

/// Replace every `:name` outside quoted text with the resolver's output.
///
/// `::` casts are left alone.
fn rewrite_named_params(
    sql: &str,
    mut resolve: impl FnMut(&str) -> Result<String, QueryError>,
) -> Result<String, QueryError> {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match c {
            '\'' | '"' => {
                quote = Some(c);
                out.push(c);
                i += 1;
            }
            ':' if starts_param(&chars, i) => {
                let start = i + 1;
                let mut end = start;
                while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_')
                {
                    end += 1;
                }
                let name: String = chars[start..end].iter().collect();
                out.push_str(&resolve(&name)?);
                i = end;
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    Ok(out)
}

fn starts_param(chars: &[char], i: usize) -> bool {
    let after_colon = i > 0 && chars[i - 1] == ':';
    let next_is_ident = chars
        .get(i + 1)
        .is_some_and(|c| c.is_ascii_alphabetic() || *c == '_');
    !after_colon && next_is_ident
}
