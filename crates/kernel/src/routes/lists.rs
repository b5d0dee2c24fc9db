//! Declarative list screens.
//!
//! - `GET /lists`         index of configured screens
//! - `GET /lists/{slug}`  one screen: filter, sort, pager, CSV

use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::datalist::{ListRequest, build_list};
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::theme::PageRenderer;

#[derive(Serialize)]
struct ScreenLink {
    title: String,
    path: String,
}

async fn index(State(state): State<AppState>) -> AppResult<Html<String>> {
    let screens: Vec<ScreenLink> = state
        .screens()
        .iter()
        .map(|s| ScreenLink {
            title: s.title.clone(),
            path: s.path(),
        })
        .collect();

    let mut context = tera::Context::new();
    context.insert("title", "Lists");
    context.insert("screens", &screens);

    let html = state.templates().render("datalist/index.html", &context)?;
    Ok(Html(html))
}

async fn screen(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    request: ListRequest,
) -> AppResult<Response> {
    let screen = state.screens().get(&slug).ok_or(AppError::NotFound)?;
    let options = screen.options(state.default_page_size(), state.max_page_size());

    let response = build_list(
        &options,
        &request,
        screen.query(),
        state.source(),
        state.templates(),
    )
    .await?;

    Ok(response.into_response())
}

/// Create the list screen router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lists", get(index))
        .route("/lists/{slug}", get(screen))
}
