//! Entity access for CRUD resources.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use super::config::CrudAction;
use crate::datalist::{ListQuery, ListRequest};
use crate::events::DomainEvent;

/// Submitted form values by field name.
pub type FormData = HashMap<String, String>;

/// Input widget for a form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Textarea,
    Number,
    Email,
    Date,
    Checkbox,
    Hidden,
}

/// One field of an entity form, with the value to pre-fill.
#[derive(Debug, Clone, Serialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub value: serde_json::Value,
}

impl FormField {
    pub fn new(name: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind,
            required: false,
            value: serde_json::Value::Null,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = value;
        self
    }
}

/// Validation messages for a rejected form.
pub type FormErrors = Vec<String>;

/// Loads entities and binds forms for one CRUD resource.
///
/// Persisting is left to event listeners: the CRUD handlers apply the form to
/// the entity and then dispatch the events built here.
#[async_trait]
pub trait EntityStore: Send + Sync + 'static {
    type Entity: Serialize + Clone + Send + Sync + 'static;

    /// Fresh entity for the create form.
    fn new_entity(&self) -> Self::Entity;

    async fn find(&self, id: i64) -> Result<Option<Self::Entity>>;

    /// Query backing the list page.
    fn list_query(&self, request: &ListRequest) -> ListQuery;

    fn form_fields(&self, entity: &Self::Entity, creating: bool) -> Vec<FormField>;

    /// Validate submitted values and bind them onto the entity.
    fn apply_form(
        &self,
        entity: &mut Self::Entity,
        form: &FormData,
        creating: bool,
    ) -> Result<(), FormErrors>;

    fn entity_id(&self, entity: &Self::Entity) -> Option<i64>;

    fn created_events(&self, entity_type: &str, entity: &Self::Entity) -> Vec<DomainEvent> {
        vec![DomainEvent::change_intended(entity_type, to_json(entity), true)]
    }

    fn updated_events(&self, entity_type: &str, entity: &Self::Entity) -> Vec<DomainEvent> {
        vec![DomainEvent::change_intended(entity_type, to_json(entity), false)]
    }

    fn delete_events(&self, entity_type: &str, entity: &Self::Entity) -> Vec<DomainEvent> {
        vec![DomainEvent::removal_intended(entity_type, to_json(entity))]
    }
}

/// Event payload form of an entity; unserializable entities become null.
pub fn to_json<E: Serialize>(entity: &E) -> serde_json::Value {
    serde_json::to_value(entity).unwrap_or(serde_json::Value::Null)
}

/// Grants or denies CRUD actions on an entity.
pub trait AccessPolicy<E>: Send + Sync {
    fn check(&self, action: CrudAction, entity: &E) -> bool;
}

/// Policy that grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl<E> AccessPolicy<E> for AllowAll {
    fn check(&self, _action: CrudAction, _entity: &E) -> bool {
        true
    }
}
