//! Estado compartido del servidor: configuración, cliente Gemini, estado
//! observable del pipeline y la sesión de análisis en curso.

use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::{
    config::AppConfig,
    gateway::GeminiClient,
    models::{ChatMessage, Modality, PipelineState},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub gateway: GeminiClient,
    pub status: Arc<Mutex<Status>>,
    pub session: Arc<Mutex<Session>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

/// Estado observable del pipeline: posición en la secuencia de etapas,
/// progreso monótono dentro de una ejecución y un mensaje legible.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Status {
    pub state: PipelineState,
    pub progress: u8,
    pub message: String,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            state: PipelineState::Idle,
            progress: 0,
            message: "Servidor listo.".to_string(),
        }
    }
}

/// Publica una transición de estado del pipeline.
pub fn publish(status: &Arc<Mutex<Status>>, state: PipelineState, progress: u8, message: impl Into<String>) {
    let mut status = status.lock().unwrap();
    status.state = state;
    status.progress = progress;
    status.message = message.into();
}

/// Sesión de análisis: el grounding del último análisis completado y la
/// conversación de seguimiento asociada. Se descarta entera al enviar un
/// artefacto nuevo.
#[derive(Debug, Default)]
pub struct Session {
    pub modality: Option<Modality>,
    pub grounding: Option<String>,
    pub chat: Vec<ChatMessage>,
}
