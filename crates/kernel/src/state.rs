//! Application state shared across all handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::datalist::RowSource;
use crate::db::{self, DbPool};
use crate::screens::ScreenCatalog;
use crate::theme::{SharedTemplateEngine, TemplateEngine};

/// Shared application state.
///
/// Wrapped in Arc internally so Clone is cheap.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    db: DbPool,
    source: Arc<dyn RowSource>,
    templates: SharedTemplateEngine,
    screens: ScreenCatalog,
    default_page_size: u32,
    max_page_size: u32,
}

impl AppState {
    /// Connect to the database and load templates and the screen catalog.
    pub async fn new(config: &Config) -> Result<Self> {
        let db = db::create_pool(config)
            .await
            .context("failed to create database pool")?;
        info!(backend = db.backend(), "database pool created");

        let templates = TemplateEngine::new(config.templates_dir.as_deref())
            .context("failed to load templates")?;
        let screens =
            ScreenCatalog::load(&config.screens_file).context("failed to load screen catalog")?;

        Ok(Self::from_parts(
            db,
            Arc::new(templates),
            screens,
            config.default_page_size,
            config.max_page_size,
        ))
    }

    /// Assemble state from already-built parts.
    pub fn from_parts(
        db: DbPool,
        templates: SharedTemplateEngine,
        screens: ScreenCatalog,
        default_page_size: u32,
        max_page_size: u32,
    ) -> Self {
        let source = db.row_source();
        Self {
            inner: Arc::new(AppStateInner {
                db,
                source,
                templates,
                screens,
                default_page_size,
                max_page_size,
            }),
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.inner.db
    }

    /// Row source for list queries.
    pub fn source(&self) -> Arc<dyn RowSource> {
        Arc::clone(&self.inner.source)
    }

    pub fn templates(&self) -> &TemplateEngine {
        &self.inner.templates
    }

    pub fn screens(&self) -> &ScreenCatalog {
        &self.inner.screens
    }

    pub fn default_page_size(&self) -> u32 {
        self.inner.default_page_size
    }

    pub fn max_page_size(&self) -> u32 {
        self.inner.max_page_size
    }

    pub async fn db_healthy(&self) -> bool {
        db::check_health(&self.inner.db).await
    }
}
