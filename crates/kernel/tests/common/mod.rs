#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Common helpers for kernel integration tests.
//!
//! Every test opens its own in-memory SQLite database through
//! `tabula-test-utils`, so tests share no state and need no server.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, header};
use axum::response::Response;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use tower::ServiceExt;

use tabula_kernel::datalist::{ListQuery, RowSource, SqliteRowSource};
use tabula_kernel::theme::PageRenderer;

/// Row source over the default orders fixture.
pub async fn orders_source() -> (SqlitePool, Arc<dyn RowSource>) {
    let pool = tabula_test_utils::orders_pool().await;
    let source: Arc<dyn RowSource> = Arc::new(SqliteRowSource::new(pool.clone()));
    (pool, source)
}

/// Ungrouped order list: one row per order.
pub fn orders_query() -> ListQuery {
    let mut query = ListQuery::new();
    query
        .select([
            "o.id AS id",
            "o.customer AS customer",
            "o.status AS status",
            "o.total AS total",
        ])
        .from_as("orders", "o");
    query
}

/// Orders grouped by customer: three rows.
pub fn customers_query() -> ListQuery {
    let mut query = ListQuery::new();
    query
        .select([
            "o.customer AS customer",
            "COUNT(o.id) AS orders",
            "SUM(o.total) AS spent",
        ])
        .from_as("orders", "o")
        .group_by("o.customer");
    query
}

/// Renderer that records every template context and returns the template name.
#[derive(Default)]
pub struct RecordingRenderer {
    calls: Mutex<Vec<(String, serde_json::Value)>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context of the most recent render, as JSON.
    pub fn last_context(&self) -> serde_json::Value {
        let calls = self.calls.lock().unwrap();
        calls.last().expect("nothing was rendered").1.clone()
    }

    pub fn last_template(&self) -> String {
        let calls = self.calls.lock().unwrap();
        calls.last().expect("nothing was rendered").0.clone()
    }

    pub fn render_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PageRenderer for RecordingRenderer {
    fn render(&self, template: &str, context: &tera::Context) -> Result<String, tera::Error> {
        self.calls
            .lock()
            .unwrap()
            .push((template.to_string(), context.clone().into_json()));
        Ok(template.to_string())
    }
}

/// Values of one column across the rendered page items.
pub fn column_values(context: &serde_json::Value, column: &str) -> Vec<serde_json::Value> {
    context["pager"]["items"]
        .as_array()
        .expect("items array")
        .iter()
        .map(|row| row[column].clone())
        .collect()
}

/// Send a GET request through a router.
pub async fn get(router: &Router, uri: &str) -> Response {
    router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Send a url-encoded form POST through a router.
pub async fn post_form(router: &Router, uri: &str, body: &str) -> Response {
    router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

/// Collect a response body as a string.
pub async fn body_string(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Location header of a redirect.
pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .unwrap()
        .to_string()
}
