//! HTTP handlers for a CRUD resource.
//!
//! - `GET  {base}`              list page (filter/sort/pager/CSV)
//! - `GET  {base}/create`       empty form
//! - `POST {base}/create`       validate, dispatch created events, redirect
//! - `GET  {base}/{id}/update`  pre-filled form
//! - `POST {base}/{id}/update`  validate, dispatch updated events, redirect
//! - `POST {base}/{id}/delete`  dispatch removal events, redirect

use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use tracing::{debug, info};

use super::config::{CrudAction, CrudConfig};
use super::store::{AccessPolicy, AllowAll, EntityStore, FormData, FormErrors, to_json};
use crate::datalist::{ListOptions, ListRequest, RowSource, build_list};
use crate::error::{AppError, AppResult};
use crate::events::{DomainEvent, EventService};
use crate::theme::PageRenderer;

/// Hidden form field carrying the page to return to.
pub const REFERRER_FIELD: &str = "__referrer";

/// Everything the CRUD handlers of one resource need.
pub struct CrudResource<S: EntityStore> {
    config: CrudConfig,
    list_options: ListOptions,
    store: S,
    policy: Arc<dyn AccessPolicy<S::Entity>>,
    events: Arc<EventService>,
    source: Arc<dyn RowSource>,
    renderer: Arc<dyn PageRenderer>,
}

impl<S: EntityStore> CrudResource<S> {
    pub fn new(
        config: CrudConfig,
        store: S,
        events: Arc<EventService>,
        source: Arc<dyn RowSource>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self {
            list_options: config.resolved_list_options(),
            config,
            store,
            policy: Arc::new(AllowAll),
            events,
            source,
            renderer,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy<S::Entity>>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &CrudConfig {
        &self.config
    }

    fn authorize(&self, action: CrudAction, entity: &S::Entity) -> AppResult<()> {
        if self.policy.check(action, entity) {
            Ok(())
        } else {
            debug!(
                entity_type = %self.config.entity_type(),
                action = action.as_str(),
                "access denied"
            );
            Err(AppError::Forbidden)
        }
    }

    async fn load(&self, id: &str) -> AppResult<S::Entity> {
        let id = parse_id(id)?;
        self.store.find(id).await?.ok_or(AppError::NotFound)
    }

    fn list_redirect(&self) -> Response {
        Redirect::to(&self.config.list_path()).into_response()
    }

    /// Render the create/edit form.
    fn render_form(
        &self,
        entity: &S::Entity,
        creating: bool,
        referrer: Option<&str>,
        errors: &FormErrors,
    ) -> AppResult<Response> {
        let entity_json = to_json(entity);
        let id = self.store.entity_id(entity);
        let delete_button = !creating && self.config.is_deletable();

        let mut context = tera::Context::new();
        context.insert("title", &self.config.headline(creating));
        context.insert("headline", &self.config.headline(creating));
        context.insert("list_path", &self.config.list_path());
        context.insert("list_route", &self.config.route_name("list"));
        context.insert("ajax_button", &self.config.ajax_button());
        context.insert("delete_button", &delete_button);
        if let (true, Some(id)) = (delete_button, id) {
            context.insert("delete_path", &self.config.delete_path(id));
        }
        context.insert("fields", &self.store.form_fields(entity, creating));
        context.insert("errors", errors);
        context.insert("referrer", &referrer.unwrap_or_default());
        context.insert("entity", &entity_json);
        context.insert(self.config.entity_var().as_str(), &entity_json);

        let html = self
            .renderer
            .render(self.config.form_template(), &context)?;
        Ok(Html(html).into_response())
    }

    /// Bind a submitted form and dispatch the resulting events.
    async fn submit(
        &self,
        mut entity: S::Entity,
        creating: bool,
        form: FormData,
    ) -> AppResult<Response> {
        if let Err(errors) = self.store.apply_form(&mut entity, &form, creating) {
            debug!(
                entity_type = %self.config.entity_type(),
                errors = errors.len(),
                "form rejected"
            );
            let referrer = form.get(REFERRER_FIELD).map(String::as_str);
            return self.render_form(&entity, creating, referrer, &errors);
        }

        let entity_type = self.config.entity_type();
        let events = if creating {
            self.store.created_events(entity_type, &entity)
        } else {
            self.store.updated_events(entity_type, &entity)
        };
        self.dispatch(&events).await;

        Ok(redirect_after_submit(&form).unwrap_or_else(|| self.list_redirect()))
    }

    async fn dispatch(&self, events: &[DomainEvent]) {
        let completed = self.events.dispatch_all(events).await;
        info!(
            entity_type = %self.config.entity_type(),
            events = events.len(),
            completed,
            "dispatched entity events"
        );
    }
}

/// Ids are digits only; anything else is a missing page.
fn parse_id(raw: &str) -> AppResult<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::NotFound);
    }
    raw.parse().map_err(|_| AppError::NotFound)
}

/// Base used to resolve relative referrers.
const REDIRECT_BASE: &str = "http://tabula.invalid/";

/// Same-site redirect target from a referrer value.
///
/// Relative paths are resolved against a fixed base and dropped if that
/// moves them to another host, which catches `//host` and `/\host`.
/// Absolute URLs are reduced to their path and query so a forged
/// referrer cannot send the user off-site.
fn redirect_target(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let url = match url::Url::parse(raw) {
        Ok(absolute) => absolute,
        Err(_) if raw.starts_with('/') => {
            let base = url::Url::parse(REDIRECT_BASE).ok()?;
            let joined = base.join(raw).ok()?;
            if joined.origin() != base.origin() {
                return None;
            }
            joined
        }
        Err(_) => return None,
    };

    let mut target = url.path().to_string();
    if !target.starts_with('/') || target.starts_with("//") || target.contains('\\') {
        return None;
    }
    if let Some(query) = url.query() {
        target.push('?');
        target.push_str(query);
    }
    Some(target)
}

fn redirect_after_submit(form: &FormData) -> Option<Response> {
    let target = redirect_target(form.get(REFERRER_FIELD)?)?;
    Some(Redirect::to(&target).into_response())
}

fn referer_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::REFERER).and_then(|v| v.to_str().ok())
}

async fn list<S: EntityStore>(
    State(resource): State<Arc<CrudResource<S>>>,
    request: ListRequest,
) -> AppResult<Response> {
    let query = resource.store.list_query(&request);
    let response = build_list(
        &resource.list_options,
        &request,
        query,
        Arc::clone(&resource.source),
        resource.renderer.as_ref(),
    )
    .await?;
    Ok(response.into_response())
}

async fn create_form<S: EntityStore>(
    State(resource): State<Arc<CrudResource<S>>>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let entity = resource.store.new_entity();
    resource.authorize(CrudAction::Create, &entity)?;
    resource.render_form(&entity, true, referer_header(&headers), &Vec::new())
}

async fn create_submit<S: EntityStore>(
    State(resource): State<Arc<CrudResource<S>>>,
    Form(form): Form<FormData>,
) -> AppResult<Response> {
    let entity = resource.store.new_entity();
    resource.authorize(CrudAction::Create, &entity)?;
    resource.submit(entity, true, form).await
}

async fn update_form<S: EntityStore>(
    State(resource): State<Arc<CrudResource<S>>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let entity = resource.load(&id).await?;
    resource.authorize(CrudAction::Update, &entity)?;
    resource.render_form(&entity, false, referer_header(&headers), &Vec::new())
}

async fn update_submit<S: EntityStore>(
    State(resource): State<Arc<CrudResource<S>>>,
    Path(id): Path<String>,
    Form(form): Form<FormData>,
) -> AppResult<Response> {
    let entity = resource.load(&id).await?;
    resource.authorize(CrudAction::Update, &entity)?;
    resource.submit(entity, false, form).await
}

async fn delete<S: EntityStore>(
    State(resource): State<Arc<CrudResource<S>>>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let entity = resource.load(&id).await?;
    resource.authorize(CrudAction::Delete, &entity)?;

    if !resource.config.is_deletable() {
        debug!(entity_type = %resource.config.entity_type(), "delete on non-deletable resource");
        return Ok(resource.list_redirect());
    }

    let events = resource
        .store
        .delete_events(resource.config.entity_type(), &entity);
    resource.dispatch(&events).await;

    Ok(resource.list_redirect())
}

/// Router serving one CRUD resource under its base path.
pub fn crud_router<S: EntityStore>(resource: CrudResource<S>) -> Router {
    let base = resource.config.base_path().to_string();
    let list_path = resource.config.list_path();
    debug!(
        entity_type = %resource.config.entity_type(),
        base = %list_path,
        "mounting crud routes"
    );

    Router::new()
        .route(&list_path, get(list::<S>))
        .route(
            &format!("{base}/create"),
            get(create_form::<S>).post(create_submit::<S>),
        )
        .route(
            &format!("{base}/{{id}}/update"),
            get(update_form::<S>).post(update_submit::<S>),
        )
        .route(&format!("{base}/{{id}}/delete"), post(delete::<S>))
        .with_state(Arc::new(resource))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_digits_only() {
        assert_eq!(parse_id("42").ok(), Some(42));
        assert!(parse_id("4a").is_err());
        assert!(parse_id("-1").is_err());
        assert!(parse_id("").is_err());
        assert!(parse_id("99999999999999999999").is_err());
    }

    #[test]
    fn redirect_targets_stay_on_site() {
        assert_eq!(redirect_target("/posts?page=2").as_deref(), Some("/posts?page=2"));
        assert_eq!(
            redirect_target("https://evil.example/steal?x=1").as_deref(),
            Some("/steal?x=1")
        );
        assert_eq!(redirect_target("//evil.example/x"), None);
        assert_eq!(redirect_target(""), None);
        assert_eq!(redirect_target("not a url"), None);
    }

    #[test]
    fn backslash_referrers_cannot_leave_the_site() {
        assert_eq!(redirect_target("/\\evil.example/steal"), None);
        assert_eq!(redirect_target("\\\\evil.example/steal"), None);
        assert_eq!(redirect_target("/\\/evil.example"), None);
        assert_eq!(redirect_target("https://evil.example//evil.example/x"), None);
        assert_eq!(redirect_target("javascript:alert(1)"), None);
        assert_eq!(
            redirect_target("/posts/1/edit").as_deref(),
            Some("/posts/1/edit")
        );
    }
}
