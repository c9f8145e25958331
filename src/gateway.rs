//! Cliente HTTP hacia la API generativa de Gemini.
//!
//! El gateway es deliberadamente tonto: una petición saliente por llamada,
//! sin reintentos (reintentar contra un backend de pago ante fallos ambiguos
//! no se hace de forma automática) y sin estado entre invocaciones. Devuelve
//! el texto del primer candidato tal cual, o cadena vacía si el backend no
//! devolvió candidatos; esa cadena vacía la trata el parser, no el gateway.

use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Error del gateway. `Transport` conserva el estado HTTP y el cuerpo crudo
/// que devolvió el backend para poder exponerlos al cliente.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("la API de Gemini devolvió un error ({status}): {body}")]
    Transport { status: u16, body: String },

    #[error("fallo de red hacia la API de Gemini: {0}")]
    Request(#[from] reqwest::Error),
}

impl GatewayError {
    /// Estado HTTP asociado, si el backend llegó a responder.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Transport { status, .. } => Some(*status),
            GatewayError::Request(e) => e.status().map(|s| s.as_u16()),
        }
    }
}

/// Nivel de modelo a usar: rápido para transcripción/contexto/chat/imagen,
/// de razonamiento para la reconstrucción profunda.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    Flash,
    Reasoning,
}

/// Parámetros de generación (sólo se envían si la etapa los fija).
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

/// Carga binaria embebida en la petición (audio o imagen en base64).
#[derive(Debug, Clone)]
pub struct InlinePayload {
    pub mime_type: String,
    pub data: String,
}

impl InlinePayload {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }
}

/// Petición al backend: instrucción, carga opcional y configuración opcional.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub tier: ModelTier,
    pub instruction: String,
    pub payload: Option<InlinePayload>,
    pub generation: Option<GenerationConfig>,
}

impl GenerateRequest {
    pub fn text(tier: ModelTier, instruction: impl Into<String>) -> Self {
        Self {
            tier,
            instruction: instruction.into(),
            payload: None,
            generation: None,
        }
    }

    pub fn with_payload(mut self, payload: InlinePayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_generation(mut self, generation: GenerationConfig) -> Self {
        self.generation = Some(generation);
        self
    }
}

/// Abstracción del backend generativo. El pipeline trabaja contra este trait
/// para poder ejecutarse en tests con un backend guionizado.
#[allow(async_fn_in_trait)]
pub trait GenerativeBackend {
    async fn generate(&self, request: GenerateRequest) -> Result<String, GatewayError>;
}

/// Cliente real contra `generativelanguage.googleapis.com`.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    flash_model: String,
    reasoning_model: String,
}

impl GeminiClient {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.gateway_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            api_key: cfg.gemini_api_key.clone(),
            flash_model: cfg.gemini_flash_model.clone(),
            reasoning_model: cfg.gemini_reasoning_model.clone(),
        })
    }

    fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Flash => &self.flash_model,
            ModelTier::Reasoning => &self.reasoning_model,
        }
    }
}

impl GenerativeBackend for GeminiClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String, GatewayError> {
        let model = self.model_for(request.tier);
        let url = format!("{GEMINI_ENDPOINT}/{model}:generateContent?key={}", self.api_key);

        let mut parts = vec![json!({ "text": request.instruction })];
        if let Some(payload) = &request.payload {
            parts.push(json!({
                "inline_data": {
                    "mime_type": payload.mime_type,
                    "data": payload.data,
                }
            }));
        }

        let mut body = json!({ "contents": [{ "parts": parts }] });
        if let Some(generation) = &request.generation {
            body["generationConfig"] = json!(generation);
        }

        debug!("Llamada a Gemini ({}), payload embebido: {}", model, request.payload.is_some());

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(GatewayError::Transport {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        Ok(extract_first_text(parsed))
    }
}

// --- Forma mínima de la respuesta de Gemini ---

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// Primer texto del primer candidato; cadena vacía si no hay candidatos.
fn extract_first_text(response: GenerateResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .and_then(|c| c.parts.into_iter().next())
        .map(|p| p.text)
        .unwrap_or_default()
}

#[cfg(test)]
pub mod testing {
    //! Backend guionizado para los tests del pipeline: devuelve respuestas
    //! en orden y registra cada petición recibida.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct ScriptedBackend {
        requests: Mutex<Vec<GenerateRequest>>,
        script: Mutex<VecDeque<Result<String, (u16, String)>>>,
    }

    impl ScriptedBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(self, text: &str) -> Self {
            self.script.lock().unwrap().push_back(Ok(text.to_string()));
            self
        }

        pub fn fail(self, status: u16, body: &str) -> Self {
            self.script
                .lock()
                .unwrap()
                .push_back(Err((status, body.to_string())));
            self
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, index: usize) -> GenerateRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    impl GenerativeBackend for ScriptedBackend {
        async fn generate(&self, request: GenerateRequest) -> Result<String, GatewayError> {
            self.requests.lock().unwrap().push(request);
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(text)) => Ok(text),
                Some(Err((status, body))) => Err(GatewayError::Transport { status, body }),
                // Guion agotado: se comporta como un backend sin candidatos.
                None => Ok(String::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_first_text_takes_first_candidate_first_part() {
        let raw = r#"{
            "candidates": [
                { "content": { "parts": [ { "text": "hola" }, { "text": "mundo" } ] } },
                { "content": { "parts": [ { "text": "otro" } ] } }
            ]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(extract_first_text(parsed), "hola");
    }

    #[test]
    fn extract_first_text_is_empty_without_candidates() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_first_text(parsed), "");
    }

    #[test]
    fn inline_payload_encodes_base64() {
        let payload = InlinePayload::from_bytes("audio/mpeg", b"abc");
        assert_eq!(payload.mime_type, "audio/mpeg");
        assert_eq!(payload.data, "YWJj");
    }

    #[test]
    fn transport_error_keeps_status_and_body() {
        let err = GatewayError::Transport {
            status: 500,
            body: "boom".to_string(),
        };
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("boom"));
    }
}
