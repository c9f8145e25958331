//! API HTTP que expone el pipeline a la capa de presentación.
//!
//! Los handlers sólo validan la entrada, despachan al pipeline/chat y
//! traducen errores al contrato `{error, details?, status?}`. Toda la
//! política de fallos vive en el pipeline, no aquí.

use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::{
    app_state::{AppState, Session, Status},
    chat,
    enrich,
    gateway::GatewayError,
    models::{ChatMessage, ChatRole, ContextSource, Modality, Reconstruction, TextInterpretation, Transcription},
    pipeline,
};

// Las grabaciones de audio pueden superar con holgura el límite por defecto.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct AnalyzeTextPayload {
    text: String,
}

#[derive(Deserialize)]
pub struct ContextPayload {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
}

#[derive(Deserialize)]
pub struct ChatPayload {
    message: String,
    #[serde(default)]
    context: Option<String>,
    #[serde(default, rename = "analysisType")]
    analysis_type: Option<Modality>,
}

#[derive(Serialize)]
pub struct TextAnalysisResponse {
    data: TextInterpretation,
    sources: Vec<ContextSource>,
}

#[derive(Serialize)]
pub struct AudioAnalysisResponse {
    transcription: Transcription,
    reconstruction: Reconstruction,
    sources: Vec<ContextSource>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    success: bool,
    response: String,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/analyze/text", post(analyze_text_handler))
        .route("/api/analyze/audio", post(analyze_audio_handler))
        .route("/api/analyze/image", post(analyze_image_handler))
        .route("/api/context", post(context_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/history", get(chat_history_handler))
        .route("/api/status", get(status_handler))
        .route("/api/env-check", get(env_check_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(app_state)
}

// --- Handlers de análisis ---

#[axum::debug_handler]
async fn analyze_text_handler(
    State(state): State<AppState>,
    Json(payload): Json<AnalyzeTextPayload>,
) -> Result<Json<TextAnalysisResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(bad_request("No se ha proporcionado ningún texto para analizar"));
    }

    reset_session(&state);

    let analysis = pipeline::run_text(&state.gateway, &state.status, payload.text.clone())
        .await
        .map_err(pipeline_error)?;

    {
        let mut session = state.session.lock().unwrap();
        session.modality = Some(Modality::Text);
        session.grounding = Some(chat::text_grounding(&payload.text, &analysis.interpretation));
    }

    Ok(Json(TextAnalysisResponse {
        data: analysis.interpretation,
        sources: analysis.sources,
    }))
}

#[axum::debug_handler]
async fn analyze_audio_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AudioAnalysisResponse>, ApiError> {
    let upload = read_upload(multipart, &["audio", "file"])
        .await?
        .ok_or_else(|| bad_request("No se ha proporcionado ningún fichero de audio"))?;

    reset_session(&state);

    let analysis = pipeline::run_audio(
        &state.gateway,
        &state.status,
        upload.bytes,
        upload.mime_type,
        upload.filename,
    )
    .await
    .map_err(pipeline_error)?;

    {
        let mut session = state.session.lock().unwrap();
        session.modality = Some(Modality::Audio);
        session.grounding = Some(chat::audio_grounding(
            &analysis.transcription,
            &analysis.reconstruction,
        ));
    }

    Ok(Json(AudioAnalysisResponse {
        transcription: analysis.transcription,
        reconstruction: analysis.reconstruction,
        sources: analysis.sources,
    }))
}

#[axum::debug_handler]
async fn analyze_image_handler(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let upload = read_upload(multipart, &["image", "file"])
        .await?
        .ok_or_else(|| bad_request("No se ha proporcionado ninguna imagen"))?;

    reset_session(&state);

    let report = pipeline::run_image(
        &state.gateway,
        &state.status,
        upload.bytes,
        upload.mime_type,
        upload.filename,
    )
    .await
    .map_err(pipeline_error)?;

    {
        let mut session = state.session.lock().unwrap();
        session.modality = Some(Modality::Image);
        session.grounding = Some(chat::image_grounding(&report));
    }

    Ok(Json(json!({ "success": true, "analysis": report })))
}

// --- Enriquecimiento y chat ---

#[axum::debug_handler]
async fn context_handler(
    State(state): State<AppState>,
    Json(payload): Json<ContextPayload>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.topics.is_empty() && payload.entities.is_empty() {
        return Err(bad_request("No se han proporcionado temas ni entidades"));
    }

    let sources = enrich::enrich(&state.gateway, &payload.topics, &payload.entities)
        .await
        .map_err(|e| gateway_error(&e))?;

    Ok(Json(json!({ "sources": sources })))
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatResponse>, ApiError> {
    // Pregunta vacía: rechazada antes de tocar el gateway.
    if payload.message.trim().is_empty() {
        return Err(bad_request("No se ha proporcionado ningún mensaje"));
    }

    let (grounding, modality) = {
        let session = state.session.lock().unwrap();
        let grounding = payload
            .context
            .clone()
            .filter(|c| !c.trim().is_empty())
            .or_else(|| session.grounding.clone())
            .unwrap_or_default();
        (grounding, payload.analysis_type.or(session.modality))
    };

    {
        let mut session = state.session.lock().unwrap();
        session.chat.push(ChatMessage::new(ChatRole::User, payload.message.clone()));
    }

    // Un fallo del gateway queda aislado al turno: mensaje sintético de
    // disculpa, sin tocar el estado del pipeline ni los resultados previos.
    let (success, answer) = match chat::ask(&state.gateway, &payload.message, &grounding, modality).await {
        Ok(answer) => (true, answer),
        Err(e) => {
            warn!("Fallo del gateway en un turno de chat: {e}");
            (false, chat::FALLBACK_ANSWER.to_string())
        }
    };

    {
        let mut session = state.session.lock().unwrap();
        session.chat.push(ChatMessage::new(ChatRole::Assistant, answer.clone()));
    }

    Ok(Json(ChatResponse {
        success,
        response: answer,
    }))
}

#[axum::debug_handler]
async fn chat_history_handler(State(state): State<AppState>) -> Json<Vec<ChatMessage>> {
    Json(state.session.lock().unwrap().chat.clone())
}

// --- Estado y utilidades ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap().clone())
}

#[axum::debug_handler]
async fn env_check_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "gemini_api_key_configured": !state.config.gemini_api_key.trim().is_empty(),
        "flash_model": state.config.gemini_flash_model,
        "reasoning_model": state.config.gemini_reasoning_model,
    }))
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state.shutdown_sender.lock().unwrap().take() {
        let _ = sender.send(());
    }
    StatusCode::OK
}

// --- Utilidades internas ---

struct Upload {
    bytes: Vec<u8>,
    mime_type: Option<String>,
    filename: String,
}

/// Extrae el primer campo de fichero con uno de los nombres esperados.
async fn read_upload(mut multipart: Multipart, field_names: &[&str]) -> Result<Option<Upload>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("No se pudo leer el formulario multipart: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        if !field_names.contains(&name.as_str()) {
            continue;
        }

        let mime_type = field.content_type().map(str::to_string);
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "artefacto".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request(format!("No se pudo leer el fichero subido: {e}")))?
            .to_vec();

        return Ok(Some(Upload {
            bytes,
            mime_type,
            filename,
        }));
    }

    Ok(None)
}

/// Al empezar una ejecución nueva se descarta la sesión anterior entera
/// (grounding y conversación incluidos).
fn reset_session(state: &AppState) {
    *state.session.lock().unwrap() = Session::default();
}

fn bad_request(message: impl Into<String>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message.into() })))
}

fn gateway_error(err: &GatewayError) -> ApiError {
    match err {
        GatewayError::Transport { status, body } => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            Json(json!({
                "error": "La API de Gemini devolvió un error",
                "details": body,
                "status": status,
            })),
        ),
        GatewayError::Request(e) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({
                "error": "No se pudo contactar con la API de Gemini",
                "details": e.to_string(),
            })),
        ),
    }
}

/// Traduce un fallo del pipeline al contrato de error de la API.
fn pipeline_error(err: anyhow::Error) -> ApiError {
    if let Some(gateway_err) = err.downcast_ref::<GatewayError>() {
        return gateway_error(gateway_err);
    }
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
}
