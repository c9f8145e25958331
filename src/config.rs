//! Carga y gestión de configuración de la aplicación (Gemini + servidor).

use std::env;

use anyhow::{anyhow, Result};

/// Configuración completa de la aplicación.
///
/// La credencial de Gemini es una precondición de arranque: si falta, el
/// proceso no llega a servir peticiones (no se descubre perezosamente).
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub gemini_api_key: String,
    pub server_addr: String,

    pub gemini_flash_model: String,
    pub gemini_reasoning_model: String,
    pub gateway_timeout_secs: u64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let gemini_api_key = env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("Falta GEMINI_API_KEY en el entorno"))?;
        if gemini_api_key.trim().is_empty() {
            return Err(anyhow!("GEMINI_API_KEY está vacía"));
        }

        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3322".to_string());

        let gemini_flash_model = env::var("GEMINI_FLASH_MODEL")
            .unwrap_or_else(|_| "gemini-2.0-flash-exp".to_string());
        let gemini_reasoning_model =
            env::var("GEMINI_REASONING_MODEL").unwrap_or_else(|_| "gemini-2.5-pro".to_string());

        let gateway_timeout_secs = env::var("GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        Ok(Self {
            gemini_api_key,
            server_addr,
            gemini_flash_model,
            gemini_reasoning_model,
            gateway_timeout_secs,
        })
    }
}
