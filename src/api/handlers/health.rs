use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub upload_dir: String,
    pub storage: String,
    pub active_inputs: usize,
    pub input_types: Vec<String>,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let upload_dir = state.materializer.upload_dir();
    let storage_status = match tokio::fs::metadata(upload_dir).await {
        Ok(meta) if meta.is_dir() && !meta.permissions().readonly() => "writable",
        Ok(_) => "read-only",
        Err(_) => "missing",
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        upload_dir: upload_dir.display().to_string(),
        storage: storage_status.to_string(),
        active_inputs: state.sessions.len(),
        input_types: state
            .handlers
            .input_types()
            .into_iter()
            .map(str::to_string)
            .collect(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
