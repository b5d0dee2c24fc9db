//! Configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::datalist::pager::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port (default: 3000).
    pub port: u16,

    /// Database connection URL (`postgres://...` or `sqlite:...`).
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// Directory whose templates override the built-in ones.
    pub templates_dir: Option<PathBuf>,

    /// List screen catalog (default: ./screens.toml).
    pub screens_file: PathBuf,

    /// Rows per page when neither the screen nor the request sets one (default: 100).
    pub default_page_size: u32,

    /// Ceiling for request-supplied page sizes (default: 1000).
    pub max_page_size: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("PORT must be a valid u16")?;

        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let templates_dir = env::var("TEMPLATES_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let screens_file = env::var("SCREENS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./screens.toml"));

        let default_page_size: u32 = env::var("DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .context("DEFAULT_PAGE_SIZE must be a valid u32")?;

        let max_page_size: u32 = env::var("MAX_PAGE_SIZE")
            .unwrap_or_else(|_| MAX_PAGE_SIZE.to_string())
            .parse()
            .context("MAX_PAGE_SIZE must be a valid u32")?;

        if default_page_size == 0 || max_page_size == 0 {
            anyhow::bail!("DEFAULT_PAGE_SIZE and MAX_PAGE_SIZE must be at least 1");
        }

        Ok(Self {
            port,
            database_url,
            database_max_connections,
            templates_dir,
            screens_file,
            default_page_size,
            max_page_size,
        })
    }
}
