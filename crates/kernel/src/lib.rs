//! Tabula kernel library
//!
//! Filterable, sortable, paginated list screens over SQL queries, with CSV
//! export and a generic create/update/delete workflow. The `tabula` binary
//! serves list screens declared in a TOML catalog.

pub mod config;
pub mod crud;
pub mod datalist;
pub mod db;
pub mod error;
pub mod events;
pub mod routes;
pub mod screens;
pub mod state;
pub mod theme;
