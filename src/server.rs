use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::emotion::EmotionLabel;
use crate::error::BridgeError;
use crate::event_store::{Event, EventStore};
use crate::openai::{EmotionClassifier, SpeechSynthesizer};

/// Shared by every handler for the lifetime of the process.
pub struct AppState {
    pub store: Arc<EventStore>,
    pub classifier: Arc<dyn EmotionClassifier>,
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
    pub index_path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub serial_connected: bool,
}

/// Any handler failure. Always rendered as `500 {"error": ...}`.
#[derive(Debug)]
pub struct ApiError(BridgeError);

impl From<BridgeError> for ApiError {
    fn from(e: BridgeError) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for BridgeError {
    fn from(rejection: JsonRejection) -> Self {
        BridgeError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct EstadoResponse {
    last_event: Option<Event>,
}

#[derive(Debug, Deserialize)]
pub struct EventosQuery {
    since: Option<u64>,
}

#[derive(Debug, Serialize)]
struct EventosResponse {
    events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    image: String,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    emotion: EmotionLabel,
}

#[derive(Debug, Deserialize)]
pub struct SpeakRequest {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    started_at: String,
    uptime_seconds: i64,
    events: usize,
    serial_connected: bool,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/estado", get(estado))
        .route("/eventos", get(eventos))
        .route("/predict", post(predict))
        .route("/speak", post(speak))
        .route("/health", get(health))
        .with_state(state)
}

async fn index(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    match tokio::fs::read_to_string(&state.index_path).await {
        Ok(page) => Ok(Html(page).into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("Index page {:?} not found", state.index_path);
            Ok((StatusCode::NOT_FOUND, "index page not found").into_response())
        }
        Err(e) => Err(BridgeError::from(e).into()),
    }
}

async fn estado(State(state): State<Arc<AppState>>) -> Json<EstadoResponse> {
    let last_event = state.store.latest().await.map(|event| (*event).clone());
    Json(EstadoResponse { last_event })
}

async fn eventos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventosQuery>,
) -> Json<EventosResponse> {
    let events = state
        .store
        .since(query.since.unwrap_or(0))
        .await
        .into_iter()
        .map(|event| (*event).clone())
        .collect();
    Json(EventosResponse { events })
}

async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let result = classify_snapshot(&state, payload).await;
    if let Err(ref e) = result {
        error!("Prediction failed: {}", e);
    }
    let emotion = result?;
    info!("Predicted emotion: {}", emotion);
    Ok(Json(PredictResponse { emotion }))
}

async fn classify_snapshot(
    state: &AppState,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<EmotionLabel, BridgeError> {
    let Json(request) = payload?;

    let encoded = request
        .image
        .split(',')
        .nth(1)
        .ok_or_else(|| BridgeError::BadRequest("image must be a base64 data URL".to_string()))?;
    let image = STANDARD
        .decode(encoded)
        .map_err(|e| BridgeError::BadRequest(format!("invalid base64 image: {}", e)))?;

    let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(&image));
    let raw = state.classifier.classify(&data_url).await?;

    let label = EmotionLabel::from_model_output(&raw);
    if label == EmotionLabel::Desconocida {
        warn!("Vision model answered outside the label set: {:?}", raw);
    }
    Ok(label)
}

async fn speak(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SpeakRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let result = synthesize_speech(&state, payload).await;
    if let Err(ref e) = result {
        error!("Speech synthesis failed: {}", e);
    }
    let audio = result?;

    Ok((
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CONTENT_DISPOSITION, "inline; filename=\"voz.mp3\""),
        ],
        audio,
    )
        .into_response())
}

async fn synthesize_speech(
    state: &AppState,
    payload: Result<Json<SpeakRequest>, JsonRejection>,
) -> Result<Bytes, BridgeError> {
    let Json(request) = payload?;
    state.synthesizer.synthesize(&request.text).await
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at.to_rfc3339(),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        events: state.store.len().await,
        serial_connected: state.serial_connected,
    })
}
