// Route table
use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    delete_note, explain_channel, export_csv, get_channel, get_note, health_check, ingest, list_devices,
    list_notes, list_sensors, mount_channel, put_note, set_calibration, set_fault, set_filter, set_source,
    stream_channel, tutor_explain, tutor_quiz, unmount_channel,
};

pub fn create_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/sensors", get(list_sensors))
        .route(
            "/channels/:id",
            get(get_channel).put(mount_channel).delete(unmount_channel),
        )
        .route("/channels/:id/fault", put(set_fault))
        .route("/channels/:id/filter", put(set_filter))
        .route("/channels/:id/calibration", put(set_calibration))
        .route("/channels/:id/source", put(set_source))
        .route("/channels/:id/export.csv", get(export_csv))
        .route("/channels/:id/explain", post(explain_channel))
        .route("/ingest", post(ingest))
        .route("/devices", get(list_devices))
        .route("/tutor/quiz", post(tutor_quiz))
        .route("/tutor/explain", post(tutor_explain))
        .route("/notes", get(list_notes))
        .route("/notes/:key", get(get_note).put(put_note).delete(delete_note))
        .layer(CompressionLayer::new());

    // Stream frames are compressed individually, so the stream stays outside
    // the compression layer.
    let streaming = Router::new().route("/channels/:id/stream", get(stream_channel));

    Router::new()
        .route("/healthz", get(health_check))
        .merge(api)
        .merge(streaming)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
