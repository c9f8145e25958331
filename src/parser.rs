//! Parser de respuestas del modelo.
//!
//! Tres contratos, elegidos por cada etapa del pipeline:
//!  1. Secciones delimitadas `===NOMBRE===`: nunca falla, una sección ausente
//!     produce el valor vacío por defecto.
//!  2. JSON embebido (con o sin bloque de código cercado): un fallo de parseo
//!     degrada a fuentes de contexto sintéticas deterministas.
//!  3. JSON estricto (informe de imagen): un fallo de parseo se propaga como
//!     error duro con el texto ofensivo adjunto, porque el informe no tiene
//!     resultado parcial útil.

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;

use crate::models::{ContextSource, Reconstruction};

/// Extrae el contenido de una sección `===NOMBRE===` hasta el siguiente
/// marcador o el final del texto. Sección ausente => cadena vacía.
pub fn extract_section(text: &str, name: &str) -> String {
    let marker = format!("==={name}===");
    let Some(start) = text.find(&marker) else {
        return String::new();
    };
    let rest = &text[start + marker.len()..];
    let end = rest.find("\n===").unwrap_or(rest.len());
    rest[..end].trim().to_string()
}

/// Versión lista de `extract_section`: una entrada por línea, recortada,
/// descartando líneas vacías.
pub fn extract_section_list(text: &str, name: &str) -> Vec<String> {
    extract_section(text, name)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parsea la respuesta por secciones de la etapa de reconstrucción de audio.
pub fn parse_reconstruction(text: &str) -> Reconstruction {
    Reconstruction {
        reconstructed_text: extract_section(text, "RECONSTRUCTED TEXT"),
        key_topics: extract_section_list(text, "KEY THEMES"),
        entities: extract_section_list(text, "IMPORTANT ENTITIES"),
        context_notes: extract_section(text, "CONTEXTUAL INSIGHTS"),
        communication_style: extract_section(text, "COMMUNICATION STYLE"),
        sentiment_analysis: extract_section(text, "SENTIMENT ANALYSIS"),
        action_items: extract_section(text, "ACTION ITEMS"),
    }
}

/// Quita el bloque de código cercado (con o sin etiqueta de lenguaje) si
/// existe; en caso contrario devuelve el texto recortado tal cual.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after = &trimmed[start + 3..];
    let body = after.strip_prefix("json").unwrap_or(after);
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// JSON embebido tolerante: primero busca un bloque cercado, si no lo hay
/// intenta parsear el texto completo. El que llama decide el fallback.
pub fn parse_embedded_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(strip_code_fences(text))
}

/// JSON estricto: misma estrategia de cercado, pero el fallo se propaga
/// adjuntando la respuesta cruda del modelo.
pub fn parse_strict_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(strip_code_fences(text))
        .map_err(|e| anyhow!("No se pudo parsear la respuesta del modelo ({e}). Respuesta cruda: {text}"))
}

/// Fuentes sintéticas deterministas a partir de los términos de la petición
/// original: título "About {término}", URL marcador y puntuación descendente
/// desde 0.8 en pasos de 0.1.
pub fn fallback_sources(terms: &[String]) -> Vec<ContextSource> {
    terms
        .iter()
        .enumerate()
        .map(|(index, term)| ContextSource {
            title: format!("About {term}"),
            url: "#".to_string(),
            snippet: format!("Context and information about {term}"),
            score: (8 - index as i64) as f64 / 10.0,
            credibility: None,
            relevance_reason: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "===RECONSTRUCTED TEXT===\nHello, you are so lame.\n\n===KEY THEMES===\nInternet slang\n\nCasual mockery\n===IMPORTANT ENTITIES===\nAIM (messaging platform)\n===SENTIMENT ANALYSIS===\nPlayful teasing";

    #[test]
    fn extract_section_stops_at_next_marker() {
        assert_eq!(extract_section(SAMPLE, "RECONSTRUCTED TEXT"), "Hello, you are so lame.");
        assert_eq!(extract_section(SAMPLE, "SENTIMENT ANALYSIS"), "Playful teasing");
    }

    #[test]
    fn missing_section_yields_empty_default() {
        assert_eq!(extract_section(SAMPLE, "ACTION ITEMS"), "");
        assert!(extract_section_list(SAMPLE, "ACTION ITEMS").is_empty());
    }

    #[test]
    fn section_list_drops_blank_lines() {
        let topics = extract_section_list(SAMPLE, "KEY THEMES");
        assert_eq!(topics, vec!["Internet slang", "Casual mockery"]);
    }

    #[test]
    fn parse_reconstruction_fills_defaults_for_missing_sections() {
        let reconstruction = parse_reconstruction(SAMPLE);
        assert_eq!(reconstruction.reconstructed_text, "Hello, you are so lame.");
        assert_eq!(reconstruction.entities, vec!["AIM (messaging platform)"]);
        assert_eq!(reconstruction.action_items, "");
        assert_eq!(reconstruction.context_notes, "");
    }

    #[test]
    fn parse_reconstruction_is_idempotent() {
        assert_eq!(parse_reconstruction(SAMPLE), parse_reconstruction(SAMPLE));
    }

    #[test]
    fn embedded_json_accepts_fenced_block_with_tag() {
        let text = "```json\n[{\"a\": 1}]\n```";
        let value: serde_json::Value = parse_embedded_json(text).unwrap();
        assert_eq!(value[0]["a"], 1);
    }

    #[test]
    fn embedded_json_accepts_fenced_block_without_tag() {
        let text = "```\n{\"a\": 2}\n```";
        let value: serde_json::Value = parse_embedded_json(text).unwrap();
        assert_eq!(value["a"], 2);
    }

    #[test]
    fn embedded_json_accepts_raw_text() {
        let value: serde_json::Value = parse_embedded_json("  {\"a\": 3}  ").unwrap();
        assert_eq!(value["a"], 3);
    }

    #[test]
    fn strict_json_error_carries_raw_response() {
        let err = parse_strict_json::<serde_json::Value>("esto no es JSON").unwrap_err();
        assert!(err.to_string().contains("esto no es JSON"));
    }

    #[test]
    fn fallback_sources_follow_the_documented_law() {
        let terms = vec!["Topic A".to_string(), "Topic B".to_string()];
        let sources = fallback_sources(&terms);

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "About Topic A");
        assert_eq!(sources[0].url, "#");
        assert_eq!(sources[0].score, 0.8);
        assert_eq!(sources[1].title, "About Topic B");
        assert_eq!(sources[1].score, 0.7);
        assert!(sources[0].credibility.is_none());
    }
}
