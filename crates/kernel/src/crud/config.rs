//! Static configuration of one CRUD resource.

use serde::Serialize;

use crate::datalist::ListOptions;

/// Default number of rows per list page.
pub const DEFAULT_CRUD_LIMIT: u32 = 25;

/// Action checked against the access policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrudAction {
    Create,
    Update,
    Delete,
}

impl CrudAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CrudAction::Create => "CREATE",
            CrudAction::Update => "UPDATE",
            CrudAction::Delete => "DELETE",
        }
    }
}

/// Snake-case route prefix for a CamelCase entity type: `BlogPost` → `blog_post`.
pub fn route_prefix(entity_type: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    for c in entity_type.chars() {
        if c.is_uppercase() || words.is_empty() {
            words.push(String::new());
        }
        if let Some(word) = words.last_mut() {
            word.extend(c.to_lowercase());
        }
    }
    words.retain(|w| !w.is_empty());
    words.join("_")
}

/// Configuration of a CRUD resource, built once at startup.
#[derive(Debug, Clone)]
pub struct CrudConfig {
    entity_type: String,
    display_name: String,
    base_path: String,
    list_template: String,
    form_template: String,
    limit: u32,
    deletable: bool,
    ajax_button: Option<String>,
    list_options: ListOptions,
}

impl CrudConfig {
    /// `entity_type` is the CamelCase type name; `base_path` is the list URL.
    pub fn new(
        entity_type: impl Into<String>,
        display_name: impl Into<String>,
        base_path: impl Into<String>,
    ) -> Self {
        let display_name = display_name.into();
        let base_path = base_path.into().trim_end_matches('/').to_string();
        Self {
            entity_type: entity_type.into(),
            list_options: ListOptions::new(display_name.clone()),
            display_name,
            base_path,
            list_template: crate::datalist::builder::DEFAULT_LIST_TEMPLATE.to_string(),
            form_template: "crud/form.html".to_string(),
            limit: DEFAULT_CRUD_LIMIT,
            deletable: false,
            ajax_button: None,
        }
    }

    pub fn with_list_template(mut self, template: impl Into<String>) -> Self {
        self.list_template = template.into();
        self
    }

    pub fn with_form_template(mut self, template: impl Into<String>) -> Self {
        self.form_template = template.into();
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn deletable(mut self, deletable: bool) -> Self {
        self.deletable = deletable;
        self
    }

    /// Label for the submit button of an ajax-submitted form.
    pub fn with_ajax_button(mut self, label: impl Into<String>) -> Self {
        self.ajax_button = Some(label.into());
        self
    }

    /// Extra list configuration (count strategy, disabled sort, options...).
    /// Title, template, page size and create link are always set from this
    /// config when the list options are resolved.
    pub fn with_list_options(mut self, options: ListOptions) -> Self {
        self.list_options = options;
        self
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn form_template(&self) -> &str {
        &self.form_template
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn is_deletable(&self) -> bool {
        self.deletable
    }

    pub fn ajax_button(&self) -> Option<&str> {
        self.ajax_button.as_deref()
    }

    /// Route name for an action: `list`, `create`, `update` or `delete`.
    pub fn route_name(&self, action: &str) -> String {
        format!("{}_{action}", route_prefix(&self.entity_type))
    }

    pub fn list_path(&self) -> String {
        if self.base_path.is_empty() {
            "/".to_string()
        } else {
            self.base_path.clone()
        }
    }

    pub fn create_path(&self) -> String {
        format!("{}/create", self.base_path)
    }

    pub fn update_path(&self, id: i64) -> String {
        format!("{}/{id}/update", self.base_path)
    }

    pub fn delete_path(&self, id: i64) -> String {
        format!("{}/{id}/delete", self.base_path)
    }

    /// Headline of the form page.
    pub fn headline(&self, creating: bool) -> String {
        let verb = if creating { "create" } else { "edit" };
        format!("{} {verb}", self.display_name)
    }

    /// Template variable holding the entity: `BlogPost` → `blogPost`.
    pub fn entity_var(&self) -> String {
        let mut chars = self.entity_type.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => "entity".to_string(),
        }
    }

    /// List options resolved against this config.
    pub fn resolved_list_options(&self) -> ListOptions {
        self.list_options
            .clone()
            .with_title(self.display_name.clone())
            .with_template(self.list_template.clone())
            .with_page_size(self.limit)
            .with_option("create_path", serde_json::json!(self.create_path()))
            .with_option("create_route", serde_json::json!(self.route_name("create")))
    }
}
