//! Template engine with Tera templates and built-in fallbacks.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tera::Tera;
use tracing::debug;

/// Templates compiled into the binary. A template of the same name in the
/// override directory replaces the built-in one.
const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    (
        "datalist/list.html",
        include_str!("../../templates/datalist/list.html"),
    ),
    (
        "datalist/index.html",
        include_str!("../../templates/datalist/index.html"),
    ),
    ("crud/form.html", include_str!("../../templates/crud/form.html")),
    (
        "crud/delete_button.html",
        include_str!("../../templates/crud/delete_button.html"),
    ),
];

/// Renders a named template with a context.
///
/// The list builder and CRUD handlers only depend on this seam, so tests can
/// swap in a renderer that records contexts instead of producing HTML.
pub trait PageRenderer: Send + Sync {
    fn render(&self, template: &str, context: &tera::Context) -> Result<String, tera::Error>;
}

/// Tera-backed template engine.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    /// Built-in templates, optionally overridden from a directory.
    pub fn new(override_dir: Option<&Path>) -> Result<Self> {
        let mut tera = match override_dir {
            Some(dir) => {
                let pattern = dir.join("**/*.html");
                let pattern_str = pattern
                    .to_str()
                    .context("invalid template directory path")?;
                Tera::new(pattern_str).context("failed to initialize Tera templates")?
            }
            None => Tera::default(),
        };

        let builtin = Self::builtin_tera()?;
        // extend() never overwrites, so overrides loaded first win
        tera.extend(&builtin)
            .context("failed to merge built-in templates")?;
        Self::register_filters(&mut tera);

        let template_names: Vec<_> = tera.get_template_names().collect();
        debug!(count = template_names.len(), "loaded templates");

        Ok(Self { tera })
    }

    /// Only the built-in templates.
    pub fn builtin() -> Result<Self> {
        Self::new(None)
    }

    fn builtin_tera() -> Result<Tera> {
        let mut tera = Tera::default();
        tera.add_raw_templates(BUILTIN_TEMPLATES.iter().copied())
            .context("failed to compile built-in templates")?;
        Ok(tera)
    }

    /// Register custom Tera filters.
    fn register_filters(tera: &mut Tera) {
        // Display form of a list cell
        tera.register_filter(
            "cell",
            |value: &tera::Value, _args: &HashMap<String, tera::Value>| {
                let text = match value {
                    tera::Value::Null => String::new(),
                    tera::Value::String(s) => s.clone(),
                    tera::Value::Bool(true) => "yes".to_string(),
                    tera::Value::Bool(false) => "no".to_string(),
                    other => other.to_string(),
                };
                Ok(tera::Value::String(text))
            },
        );
    }

    /// Get the underlying Tera instance.
    pub fn tera(&self) -> &Tera {
        &self.tera
    }

    /// Add or replace a template at runtime.
    pub fn add_template(&mut self, name: &str, source: &str) -> Result<()> {
        self.tera
            .add_raw_template(name, source)
            .with_context(|| format!("failed to compile template {name}"))
    }
}

impl PageRenderer for TemplateEngine {
    fn render(&self, template: &str, context: &tera::Context) -> Result<String, tera::Error> {
        self.tera.render(template, context)
    }
}

impl std::fmt::Debug for TemplateEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateEngine")
            .field("template_count", &self.tera.get_template_names().count())
            .finish()
    }
}

/// Wrap TemplateEngine in Arc for sharing across handlers.
pub type SharedTemplateEngine = Arc<TemplateEngine>;
