//! Generic create/update/delete workflow for list-backed resources.
//!
//! A resource is a `CrudConfig` (names, paths, templates, flags) plus an
//! `EntityStore` (loading, form binding, event building). `crud_router`
//! mounts the list, create, update and delete routes for it.

mod config;
mod routes;
mod store;

pub use config::{CrudAction, CrudConfig, DEFAULT_CRUD_LIMIT, route_prefix};
pub use routes::{CrudResource, REFERRER_FIELD, crud_router};
pub use store::{
    AccessPolicy, AllowAll, EntityStore, FieldKind, FormData, FormErrors, FormField, to_json,
};
