use crate::AppState;
use crate::api::error::AppError;
use crate::models::FileTable;
use crate::services::registry::UPPY_FILES;
use crate::services::session::ResetCommand;
use crate::widget::is_valid_input_id;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// `{type, value}` envelope sent by the bridge script.
#[derive(Deserialize, ToSchema)]
pub struct InputUpdate {
    #[serde(rename = "type")]
    pub input_type: String,
    #[schema(value_type = crate::models::RawBatch)]
    pub value: Value,
}

#[derive(Deserialize)]
pub struct ResetQuery {
    pub purge: Option<bool>,
}

#[derive(Serialize, ToSchema)]
pub struct EndSessionResponse {
    pub session_id: String,
    pub deleted_files: usize,
}

fn check_ids(session_id: &str, input_id: Option<&str>) -> Result<(), AppError> {
    let session_ok = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !session_ok {
        return Err(AppError::BadRequest(format!(
            "Invalid session id '{}'",
            session_id
        )));
    }
    if let Some(input_id) = input_id
        && !is_valid_input_id(input_id)
    {
        return Err(AppError::BadRequest(format!(
            "Invalid input id '{}'",
            input_id
        )));
    }
    Ok(())
}

/// Accepts the `{type, value}` envelope or a bare `uppy.files` value.
fn split_envelope(body: Value) -> (String, Value) {
    let is_envelope = body.get("type").is_some_and(Value::is_string) && body.get("value").is_some();
    if is_envelope && let Ok(update) = serde_json::from_value::<InputUpdate>(body.clone()) {
        return (update.input_type, update.value);
    }
    (UPPY_FILES.to_string(), body)
}

#[utoipa::path(
    post,
    path = "/sessions/{session_id}/inputs/{input_id}",
    request_body = InputUpdate,
    params(
        ("session_id" = String, Path, description = "Session ID"),
        ("input_id" = String, Path, description = "Input ID")
    ),
    responses(
        (status = 200, description = "Batch materialized", body = FileTable),
        (status = 400, description = "Payload is not a batch")
    ),
    tag = "inputs"
)]
pub async fn publish_value(
    State(state): State<AppState>,
    Path((session_id, input_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Json<FileTable>, AppError> {
    check_ids(&session_id, Some(&input_id))?;

    let (input_type, value) = split_envelope(body);
    let batch = state.handlers.parse(&input_type, value)?;
    tracing::info!(
        "Received batch {} for {}/{} with {} file(s)",
        batch.id,
        session_id,
        input_id,
        batch.len()
    );

    let table = state.materializer.materialize(&batch).await;
    state.sessions.publish(&session_id, &input_id, table.clone());

    Ok(Json(table))
}

#[utoipa::path(
    get,
    path = "/sessions/{session_id}/inputs/{input_id}",
    params(
        ("session_id" = String, Path, description = "Session ID"),
        ("input_id" = String, Path, description = "Input ID")
    ),
    responses(
        (status = 200, description = "Current value, zero rows when empty", body = FileTable)
    ),
    tag = "inputs"
)]
pub async fn get_value(
    State(state): State<AppState>,
    Path((session_id, input_id)): Path<(String, String)>,
) -> Result<Json<FileTable>, AppError> {
    check_ids(&session_id, Some(&input_id))?;
    Ok(Json(state.sessions.value(&session_id, &input_id)))
}

#[utoipa::path(
    post,
    path = "/sessions/{session_id}/inputs/{input_id}/reset",
    params(
        ("session_id" = String, Path, description = "Session ID"),
        ("input_id" = String, Path, description = "Input ID"),
        ("purge" = Option<bool>, Query, description = "Also delete the materialized files")
    ),
    responses(
        (status = 200, description = "Value cleared", body = ResetCommand)
    ),
    tag = "inputs"
)]
pub async fn reset_input(
    State(state): State<AppState>,
    Path((session_id, input_id)): Path<(String, String)>,
    Query(query): Query<ResetQuery>,
) -> Result<Json<ResetCommand>, AppError> {
    check_ids(&session_id, Some(&input_id))?;
    let command = state
        .sessions
        .reset(&session_id, &input_id, query.purge.unwrap_or(false))
        .await;
    Ok(Json(command))
}

#[utoipa::path(
    delete,
    path = "/sessions/{session_id}",
    params(
        ("session_id" = String, Path, description = "Session ID")
    ),
    responses(
        (status = 200, description = "Session ended", body = EndSessionResponse)
    ),
    tag = "inputs"
)]
pub async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<EndSessionResponse>, AppError> {
    check_ids(&session_id, None)?;
    let deleted_files = state.sessions.end_session(&session_id).await;
    Ok(Json(EndSessionResponse {
        session_id,
        deleted_files,
    }))
}
