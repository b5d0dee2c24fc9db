//! Shared datalist types.
//!
//! - Row: one result row as an ordered JSON object
//! - ParamValue: a value bound to a named query parameter
//! - SortDirection / SortState: ORDER BY direction and applied sort
//! - AppliedFilters: the filters that survived validation, in request order

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One result row. Column order follows the select list.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Value bound to a named query parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// SQL NULL.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Text value.
    Text(String),
}

impl ParamValue {
    /// Text representation, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse a request value. Anything other than `desc` is ascending.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value {
            Some("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }

    /// SQL keyword.
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Request value (`asc` / `desc`).
    pub fn as_param(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort applied to a list query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortState {
    /// Public column alias.
    pub column: String,
    /// Applied direction.
    pub direction: SortDirection,
}

/// Filters actually applied to a list query, keyed by column alias.
///
/// Insertion order is preserved; re-inserting an alias replaces the value
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedFilters {
    entries: Vec<(String, String)>,
}

impl AppliedFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the raw value for an alias.
    pub fn insert(&mut self, alias: impl Into<String>, value: impl Into<String>) {
        let alias = alias.into();
        let value = value.into();
        if let Some(entry) = self.entries.iter_mut().find(|(a, _)| *a == alias) {
            entry.1 = value;
        } else {
            self.entries.push((alias, value));
        }
    }

    /// Keep only entries matching the predicate.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|(alias, value)| keep(alias, value));
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(a, _)| a == alias)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(a, v)| (a.as_str(), v.as_str()))
    }
}

impl Serialize for AppliedFilters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (alias, value) in &self.entries {
            map.serialize_entry(alias, value)?;
        }
        map.end()
    }
}
