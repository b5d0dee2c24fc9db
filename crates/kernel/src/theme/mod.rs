//! Template rendering.
//!
//! Tera templates compiled into the binary, with optional per-deployment
//! overrides loaded from a directory.

mod engine;

pub use engine::{PageRenderer, SharedTemplateEngine, TemplateEngine};
