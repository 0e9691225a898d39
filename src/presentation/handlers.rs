// HTTP request handlers
use crate::application::lab_service::{IngestOutcome, SensorSummary};
use crate::application::notes::validate_key;
use crate::application::tutor::{Quiz, TutorContext};
use crate::domain::fault::FaultConfig;
use crate::domain::filter::FilterConfig;
use crate::domain::telemetry::{ChannelEvent, ChannelSnapshot, DeviceStatus, PushMessage, SourceMode};
use crate::infrastructure::chunked_json::stream_from_events;
use crate::infrastructure::csv_export::csv_response;
use crate::presentation::app_state::AppState;
use crate::presentation::error::ApiError;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct CalibrationRequest {
    pub offset: f64,
}

#[derive(Debug, Deserialize)]
pub struct SourceRequest {
    pub mode: SourceMode,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizRequest {
    pub sensor_name: String,
    pub sensor_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    pub sensor_name: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    pub page: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Deserialize)]
pub struct NoteBody {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub key: String,
    pub content: String,
}

/// Unwraps a JSON body, rendering rejections in the API error shape.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

fn accepts_brotli(headers: &HeaderMap) -> bool {
    headers
        .get("accept-encoding")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("br"))
        .unwrap_or(false)
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn list_sensors(State(state): State<Arc<AppState>>) -> Json<Vec<SensorSummary>> {
    Json(state.lab.list_sensors().await)
}

/// Mount a sensor channel. Mounting twice returns the existing channel.
pub async fn mount_channel(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ChannelSnapshot>> {
    let channel = state.lab.mount(&id).await?;
    Ok(Json(channel.snapshot().await))
}

pub async fn unmount_channel(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusCode> {
    state.lab.unmount(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_channel(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ChannelSnapshot>> {
    let channel = state.lab.channel(&id).await?;
    Ok(Json(channel.snapshot().await))
}

pub async fn set_fault(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FaultConfig>, JsonRejection>,
) -> ApiResult<Json<ChannelSnapshot>> {
    let config = body(payload)?;
    let channel = state.lab.channel(&id).await?;
    tracing::info!(sensor = %id, mode = ?config.mode, "fault selected");
    channel.set_fault(config).await;
    Ok(Json(channel.snapshot().await))
}

pub async fn set_filter(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<FilterConfig>, JsonRejection>,
) -> ApiResult<Json<ChannelSnapshot>> {
    let config = body(payload)?;
    let channel = state.lab.channel(&id).await?;
    channel.set_filter(config).await;
    Ok(Json(channel.snapshot().await))
}

pub async fn set_calibration(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CalibrationRequest>, JsonRejection>,
) -> ApiResult<Json<ChannelSnapshot>> {
    let request = body(payload)?;
    let channel = state.lab.channel(&id).await?;
    channel.set_calibration(request.offset).await;
    Ok(Json(channel.snapshot().await))
}

pub async fn set_source(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SourceRequest>, JsonRejection>,
) -> ApiResult<Json<ChannelSnapshot>> {
    let request = body(payload)?;
    let channel = state.lab.channel(&id).await?;
    channel.set_source(request.mode).await;
    Ok(Json(channel.snapshot().await))
}

/// Stream live channel events (progressive loading)
pub async fn stream_channel(
    Path(id): Path<String>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let compress = accepts_brotli(&headers);
    let channel = state.lab.channel(&id).await?;

    // Subscribe before snapshotting so nothing published in between is lost.
    let rx = channel.subscribe();
    let initial = ChannelEvent::Snapshot(channel.snapshot().await);
    Ok(stream_from_events(rx, Some(initial), compress).await)
}

pub async fn export_csv(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    let channel = state.lab.channel(&id).await?;
    let csv = channel.export_csv().await;
    csv_response(&format!("{}-data.csv", id), csv)
        .map_err(|_| ApiError::internal("failed to build csv response"))
}

pub async fn explain_channel(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<ExplainResponse>> {
    let channel = state.lab.channel(&id).await?;
    let snapshot = channel.snapshot().await;
    let context = TutorContext::from_snapshot(&channel.spec().name, &snapshot);
    let explanation = state.tutor.explain(&context).await;
    Ok(Json(ExplainResponse { explanation }))
}

pub async fn ingest(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PushMessage>, JsonRejection>,
) -> ApiResult<Json<IngestOutcome>> {
    let message = body(payload)?;
    Ok(Json(state.lab.ingest(message).await))
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceStatus>> {
    Json(state.lab.devices().await)
}

pub async fn tutor_quiz(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QuizRequest>, JsonRejection>,
) -> ApiResult<Json<Quiz>> {
    let request = body(payload)?;
    let page = match &request.sensor_id {
        Some(id) => format!("sensors/{}", id),
        None => "quiz".to_string(),
    };
    let mut context = TutorContext::new(page, request.sensor_name);
    if let Some(id) = request.sensor_id {
        context = context.with_sensor_id(id);
    }
    Ok(Json(state.tutor.quiz(&context).await))
}

pub async fn tutor_explain(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExplainRequest>, JsonRejection>,
) -> ApiResult<Json<ExplainResponse>> {
    let request = body(payload)?;
    let page = request.page.unwrap_or_else(|| "home".to_string());
    let mut context = TutorContext::new(page, request.sensor_name);
    match request.data {
        Some(serde_json::Value::String(text)) => context = context.with_data(text),
        Some(serde_json::Value::Null) | None => {}
        Some(other) => context = context.with_data(other.to_string()),
    }
    let explanation = state.tutor.explain(&context).await;
    Ok(Json(ExplainResponse { explanation }))
}

pub async fn list_notes(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.notes.keys().await?))
}

pub async fn get_note(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<NoteResponse>> {
    match state.notes.get(&key).await? {
        Some(content) => Ok(Json(NoteResponse { key, content })),
        None => Err(ApiError::not_found(format!("note {} not found", key))),
    }
}

pub async fn put_note(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NoteBody>, JsonRejection>,
) -> ApiResult<Json<NoteResponse>> {
    validate_key(&key)?;
    let note = body(payload)?;
    state.notes.put(&key, note.content.clone()).await?;
    Ok(Json(NoteResponse {
        key,
        content: note.content,
    }))
}

pub async fn delete_note(
    Path(key): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<StatusCode> {
    if state.notes.delete(&key).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("note {} not found", key)))
    }
}
