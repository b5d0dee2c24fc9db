//! Declarative list screens loaded from TOML.
//!
//! ```toml
//! [[screen]]
//! slug = "orders"
//! title = "Orders by customer"
//! select = ["o.customer AS customer", "COUNT(o.id) AS orders", "SUM(o.total) AS total"]
//! from = "orders"
//! alias = "o"
//! group_by = ["o.customer"]
//! count = "wrapped"
//!
//! [[screen.joins]]
//! kind = "left"
//! table = "customers"
//! alias = "c"
//! on = "c.name = o.customer"
//! ```
//!
//! Filter values that look like numbers bind as numbers. On Postgres a text
//! column filtered with `=123` needs an explicit cast in the select list
//! (`c.code::text AS code`, or `CAST(c.code as TEXT) AS code` with a
//! lowercase `as` so the alias split still applies); the value then binds
//! as text.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::datalist::{CountStrategy, Join, ListOptions, ListQuery, SortDirection};

/// Count strategy name in the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CountMode {
    #[default]
    Naive,
    Wrapped,
}

impl From<CountMode> for CountStrategy {
    fn from(mode: CountMode) -> Self {
        match mode {
            CountMode::Naive => CountStrategy::Naive,
            CountMode::Wrapped => CountStrategy::Wrapped,
        }
    }
}

fn enabled() -> bool {
    true
}

/// One list screen.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenDefinition {
    /// URL segment under `/lists/`.
    pub slug: String,
    pub title: String,
    /// Select expressions, `expr AS alias` to expose a column under an alias.
    pub select: Vec<String>,
    /// Table, optionally `schema.table`.
    pub from: String,
    pub alias: Option<String>,
    #[serde(default)]
    pub joins: Vec<Join>,
    /// Fixed predicates, always applied.
    #[serde(default, rename = "where")]
    pub predicates: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Default ordering expression.
    pub order_by: Option<String>,
    #[serde(default)]
    pub order: SortDirection,
    #[serde(default)]
    pub count: CountMode,
    /// Rows per page.
    pub limit: Option<u32>,
    pub template: Option<String>,
    #[serde(default = "enabled")]
    pub sort_enabled: bool,
    #[serde(default = "enabled")]
    pub filter_enabled: bool,
}

impl ScreenDefinition {
    /// Fresh query for one request.
    pub fn query(&self) -> ListQuery {
        let mut query = ListQuery::new();
        query.select(self.select.iter().cloned());

        match &self.alias {
            Some(alias) => query.from_as(self.from.clone(), alias.clone()),
            None => query.from(self.from.clone()),
        };

        for join in &self.joins {
            query.join(join.clone());
        }
        for predicate in &self.predicates {
            query.and_where(predicate.clone());
        }
        for expr in &self.group_by {
            query.group_by(expr.clone());
        }
        if let Some(expr) = &self.order_by {
            query.order_by(expr.clone(), self.order);
        }

        query
    }

    /// List options for this screen on top of the deployment page sizes.
    pub fn options(&self, default_page_size: u32, max_page_size: u32) -> ListOptions {
        let mut options = ListOptions::new(self.title.clone())
            .with_page_size(self.limit.unwrap_or(default_page_size))
            .with_max_page_size(max_page_size)
            .with_count_strategy(self.count.into());

        if let Some(template) = &self.template {
            options = options.with_template(template.clone());
        }
        if !self.sort_enabled {
            options = options.disable_sort();
        }
        if !self.filter_enabled {
            options = options.disable_filter();
        }
        options
    }

    pub fn path(&self) -> String {
        format!("/lists/{}", self.slug)
    }
}

/// All configured screens, in file order.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenCatalog {
    #[serde(default, rename = "screen")]
    screens: Vec<ScreenDefinition>,
}

fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}

impl ScreenCatalog {
    /// Parse and validate catalog text.
    pub fn parse(text: &str) -> Result<Self> {
        let catalog: ScreenCatalog = toml::from_str(text).context("invalid screen catalog")?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Load a catalog file. A missing file yields an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "screen catalog not found, serving no lists");
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let catalog =
            Self::parse(&text).with_context(|| format!("failed to load {}", path.display()))?;

        info!(path = %path.display(), screens = catalog.len(), "loaded screen catalog");
        Ok(catalog)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for screen in &self.screens {
            if !valid_slug(&screen.slug) {
                bail!("screen slug `{}` must be lowercase letters, digits, - or _", screen.slug);
            }
            if !seen.insert(screen.slug.as_str()) {
                bail!("duplicate screen slug `{}`", screen.slug);
            }
            if screen.select.is_empty() {
                bail!("screen `{}` selects no columns", screen.slug);
            }
            if screen.from.trim().is_empty() {
                bail!("screen `{}` has no table", screen.slug);
            }
        }
        Ok(())
    }

    pub fn get(&self, slug: &str) -> Option<&ScreenDefinition> {
        self.screens.iter().find(|s| s.slug == slug)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScreenDefinition> {
        self.screens.iter()
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }
}
