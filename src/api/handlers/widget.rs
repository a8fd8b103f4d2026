use crate::AppState;
use crate::api::error::AppError;
use crate::widget::render::{RenderContext, render_page};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{Html, IntoResponse},
};
use serde::Deserialize;
use uuid::Uuid;

const BRIDGE_SCRIPT: &str = include_str!("../../../assets/uppy-bridge.js");

#[derive(Deserialize)]
pub struct WidgetQuery {
    pub session: Option<String>,
}

pub async fn bridge_script() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "text/javascript; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        BRIDGE_SCRIPT,
    )
}

#[utoipa::path(
    get,
    path = "/widgets/{input_id}",
    params(
        ("input_id" = String, Path, description = "Registered widget input ID"),
        ("session" = Option<String>, Query, description = "Session to publish into; generated when absent")
    ),
    responses(
        (status = 200, description = "HTML page hosting the widget", body = String, content_type = "text/html"),
        (status = 404, description = "No widget registered under this id")
    ),
    tag = "widgets"
)]
pub async fn widget_page(
    State(state): State<AppState>,
    Path(input_id): Path<String>,
    Query(query): Query<WidgetQuery>,
) -> Result<Html<String>, AppError> {
    let config = state
        .widgets
        .get(&input_id)
        .ok_or_else(|| AppError::NotFound(format!("No widget '{}'", input_id)))?;

    let session_id = query
        .session
        .filter(|s| {
            !s.is_empty()
                && s.len() <= 128
                && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        })
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let ctx = RenderContext::new(&state.config.asset_base_url, &session_id, &input_id);
    Ok(Html(render_page("File upload", config, &ctx)))
}
