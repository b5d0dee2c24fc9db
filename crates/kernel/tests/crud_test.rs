#![allow(clippy::unwrap_used, clippy::expect_used)]
//! CRUD workflow tests: a `posts` resource persisted by event listeners.

mod common;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde::Serialize;
use sqlx::SqlitePool;
use tower::ServiceExt;

use common::{body_string, get, location, post_form};
use tabula_kernel::crud::{
    AccessPolicy, CrudAction, CrudConfig, CrudResource, EntityStore, FieldKind, FormData,
    FormErrors, FormField, crud_router,
};
use tabula_kernel::datalist::{ListQuery, ListRequest, RowSource, SortDirection, SqliteRowSource};
use tabula_kernel::events::{DomainEvent, EventListener, EventService, Propagation};
use tabula_kernel::theme::{PageRenderer, TemplateEngine};
use tabula_test_utils::assert::{contains, not_contains};

#[derive(Debug, Clone, Serialize)]
struct Post {
    id: Option<i64>,
    title: String,
    published: bool,
}

struct PostStore {
    pool: SqlitePool,
}

#[async_trait]
impl EntityStore for PostStore {
    type Entity = Post;

    fn new_entity(&self) -> Post {
        Post {
            id: None,
            title: String::new(),
            published: false,
        }
    }

    async fn find(&self, id: i64) -> anyhow::Result<Option<Post>> {
        let row: Option<(i64, String, bool)> =
            sqlx::query_as("SELECT id, title, published FROM posts WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id, title, published)| Post {
            id: Some(id),
            title,
            published,
        }))
    }

    fn list_query(&self, _request: &ListRequest) -> ListQuery {
        let mut query = ListQuery::new();
        query
            .select([
                "p.id AS id",
                "p.title AS title",
                "'<a href=\"/posts/' || p.id || '/update\">edit</a>' AS action",
            ])
            .from_as("posts", "p")
            .order_by("p.id", SortDirection::Asc);
        query
    }

    fn form_fields(&self, entity: &Post, _creating: bool) -> Vec<FormField> {
        vec![
            FormField::new("title", "Title", FieldKind::Text)
                .required()
                .with_value(serde_json::json!(entity.title)),
            FormField::new("published", "Published", FieldKind::Checkbox)
                .with_value(serde_json::json!(entity.published)),
        ]
    }

    fn apply_form(
        &self,
        entity: &mut Post,
        form: &FormData,
        _creating: bool,
    ) -> Result<(), FormErrors> {
        let title = form.get("title").map_or("", |t| t.trim());
        if title.is_empty() {
            return Err(vec!["Title is required.".to_string()]);
        }
        entity.title = title.to_string();
        entity.published = form.contains_key("published");
        Ok(())
    }

    fn entity_id(&self, entity: &Post) -> Option<i64> {
        entity.id
    }
}

/// Writes post events to the database.
struct PersistPosts {
    pool: SqlitePool,
}

#[async_trait]
impl EventListener for PersistPosts {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<Propagation> {
        let entity = event.entity();
        let title = entity["title"].as_str().unwrap_or_default();
        let published = entity["published"].as_bool().unwrap_or(false);

        match event {
            DomainEvent::EntityChangeIntended { created: true, .. } => {
                sqlx::query("INSERT INTO posts (title, published) VALUES (?1, ?2)")
                    .bind(title)
                    .bind(published)
                    .execute(&self.pool)
                    .await?;
            }
            DomainEvent::EntityChangeIntended { created: false, .. } => {
                sqlx::query("UPDATE posts SET title = ?1, published = ?2 WHERE id = ?3")
                    .bind(title)
                    .bind(published)
                    .bind(entity["id"].as_i64())
                    .execute(&self.pool)
                    .await?;
            }
            DomainEvent::EntityRemovalIntended { .. } => {
                sqlx::query("DELETE FROM posts WHERE id = ?1")
                    .bind(entity["id"].as_i64())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(Propagation::Continue)
    }
}

/// Records event names, optionally stopping propagation.
struct Recorder {
    seen: Arc<Mutex<Vec<String>>>,
    answer: Propagation,
}

#[async_trait]
impl EventListener for Recorder {
    async fn handle(&self, event: &DomainEvent) -> anyhow::Result<Propagation> {
        self.seen.lock().unwrap().push(event.name().to_string());
        Ok(self.answer)
    }
}

struct NoDelete;

impl AccessPolicy<Post> for NoDelete {
    fn check(&self, action: CrudAction, _entity: &Post) -> bool {
        action != CrudAction::Delete
    }
}

struct TestCrud {
    router: Router,
    pool: SqlitePool,
    seen: Arc<Mutex<Vec<String>>>,
}

impl TestCrud {
    async fn titles(&self) -> Vec<String> {
        sqlx::query_scalar("SELECT title FROM posts ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .unwrap()
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

struct Setup {
    config: CrudConfig,
    policy: Option<Arc<dyn AccessPolicy<Post>>>,
    gate: Propagation,
}

impl Setup {
    fn new() -> Self {
        Self {
            config: CrudConfig::new("Post", "Post", "/posts"),
            policy: None,
            gate: Propagation::Continue,
        }
    }

    fn deletable(mut self) -> Self {
        self.config = self.config.deletable(true);
        self
    }

    fn policy(mut self, policy: Arc<dyn AccessPolicy<Post>>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// A listener ahead of the persister that stops every event.
    fn stop_events(mut self) -> Self {
        self.gate = Propagation::Stop;
        self
    }

    async fn build(self) -> TestCrud {
        let pool = tabula_test_utils::memory_pool().await;
        sqlx::query(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY AUTOINCREMENT, title TEXT NOT NULL, published INTEGER NOT NULL DEFAULT 0)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO posts (title, published) VALUES ('First post', 1), ('Second post', 0)")
            .execute(&pool)
            .await
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut events = EventService::new();
        for name in [DomainEvent::CHANGE_INTENDED, DomainEvent::REMOVAL_INTENDED] {
            events.subscribe(
                name,
                -10,
                Arc::new(Recorder {
                    seen: Arc::clone(&seen),
                    answer: self.gate,
                }),
            );
            events.subscribe(name, 0, Arc::new(PersistPosts { pool: pool.clone() }));
        }

        let source: Arc<dyn RowSource> = Arc::new(SqliteRowSource::new(pool.clone()));
        let renderer: Arc<dyn PageRenderer> = Arc::new(TemplateEngine::builtin().unwrap());
        let mut resource = CrudResource::new(
            self.config,
            PostStore { pool: pool.clone() },
            Arc::new(events),
            source,
            renderer,
        );
        if let Some(policy) = self.policy {
            resource = resource.with_policy(policy);
        }

        TestCrud {
            router: crud_router(resource),
            pool,
            seen,
        }
    }
}

// =============================================================================
// List
// =============================================================================

#[tokio::test]
async fn list_shows_rows_and_create_link() {
    let app = Setup::new().build().await;

    let response = get(&app.router, "/posts").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    contains(&body, "First post");
    contains(&body, "Second post");
    // Action markup is rendered unescaped, other values are escaped
    contains(&body, "<a href=\"/posts/1/update\">edit</a>");
    contains(&body, "&#x2F;posts&#x2F;create");
}

#[tokio::test]
async fn list_filters_through_query_string() {
    let app = Setup::new().build().await;

    let body = body_string(get(&app.router, "/posts?filter=title&value=second").await).await;
    contains(&body, "Second post");
    not_contains(&body, "First post");
}

// =============================================================================
// Create
// =============================================================================

#[tokio::test]
async fn create_form_is_empty() {
    let app = Setup::new().deletable().build().await;

    let response = get(&app.router, "/posts/create").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    contains(&body, "Post create");
    contains(&body, "name=\"title\"");
    not_contains(&body, "class=\"delete\"");
}

#[tokio::test]
async fn create_form_carries_referer() {
    let app = Setup::new().build().await;

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/posts/create")
                .header(header::REFERER, "/posts?page=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = body_string(response).await;
    contains(&body, "name=\"__referrer\" value=\"&#x2F;posts?page=2\"");
}

#[tokio::test]
async fn create_submit_dispatches_and_redirects_to_list() {
    let app = Setup::new().build().await;

    let response = post_form(&app.router, "/posts/create", "title=Third+post&published=1").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts");

    assert_eq!(app.seen(), vec![DomainEvent::CHANGE_INTENDED]);
    assert_eq!(app.titles().await, vec!["First post", "Second post", "Third post"]);
}

#[tokio::test]
async fn create_submit_returns_to_referrer() {
    let app = Setup::new().build().await;

    let response = post_form(
        &app.router,
        "/posts/create",
        "title=Third&__referrer=%2Fposts%3Fpage%3D2",
    )
    .await;
    assert_eq!(location(&response), "/posts?page=2");

    let response = post_form(
        &app.router,
        "/posts/create",
        "title=Fourth&__referrer=https%3A%2F%2Fevil.example%2Fphish",
    )
    .await;
    assert_eq!(location(&response), "/phish");
}

#[tokio::test]
async fn invalid_form_is_shown_again() {
    let app = Setup::new().build().await;

    let response = post_form(&app.router, "/posts/create", "title=+++").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    contains(&body, "Title is required.");
    assert!(app.seen().is_empty());
    assert_eq!(app.titles().await.len(), 2);
}

#[tokio::test]
async fn stopped_event_skips_persisting() {
    let app = Setup::new().stop_events().build().await;

    let response = post_form(&app.router, "/posts/create", "title=Third").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    assert_eq!(app.seen(), vec![DomainEvent::CHANGE_INTENDED]);
    assert_eq!(app.titles().await.len(), 2);
}

// =============================================================================
// Update
// =============================================================================

#[tokio::test]
async fn update_form_is_prefilled() {
    let app = Setup::new().deletable().build().await;

    let response = get(&app.router, "/posts/1/update").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_string(response).await;
    contains(&body, "Post edit");
    contains(&body, "value=\"First post\"");
    contains(&body, " checked");
    contains(&body, "action=\"&#x2F;posts&#x2F;1&#x2F;delete\"");
}

#[tokio::test]
async fn update_form_hides_delete_when_not_deletable() {
    let app = Setup::new().build().await;

    let body = body_string(get(&app.router, "/posts/1/update").await).await;
    not_contains(&body, "class=\"delete\"");
}

#[tokio::test]
async fn update_unknown_or_malformed_id_is_not_found() {
    let app = Setup::new().build().await;

    assert_eq!(
        get(&app.router, "/posts/99/update").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        get(&app.router, "/posts/abc/update").await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        post_form(&app.router, "/posts/-1/update", "title=x").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn update_submit_changes_row() {
    let app = Setup::new().build().await;

    let response = post_form(&app.router, "/posts/2/update", "title=Renamed").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts");

    assert_eq!(app.titles().await, vec!["First post", "Renamed"]);
}

// =============================================================================
// Delete
// =============================================================================

#[tokio::test]
async fn delete_removes_row() {
    let app = Setup::new().deletable().build().await;

    let response = post_form(&app.router, "/posts/1/delete", "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/posts");

    assert_eq!(app.seen(), vec![DomainEvent::REMOVAL_INTENDED]);
    assert_eq!(app.titles().await, vec!["Second post"]);
}

#[tokio::test]
async fn delete_on_non_deletable_resource_only_redirects() {
    let app = Setup::new().build().await;

    let response = post_form(&app.router, "/posts/1/delete", "").await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    assert!(app.seen().is_empty());
    assert_eq!(app.titles().await.len(), 2);
}

#[tokio::test]
async fn delete_of_missing_entity_is_not_found() {
    let app = Setup::new().deletable().build().await;

    let response = post_form(&app.router, "/posts/42/delete", "").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn policy_can_forbid_delete() {
    let app = Setup::new().deletable().policy(Arc::new(NoDelete)).build().await;

    let response = post_form(&app.router, "/posts/1/delete", "").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.titles().await.len(), 2);

    // Other actions are still allowed
    let response = get(&app.router, "/posts/1/update").await;
    assert_eq!(response.status(), StatusCode::OK);
}
