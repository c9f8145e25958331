//! Enriquecimiento de contexto: a partir de los temas y entidades extraídos
//! por la interpretación, una única llamada al modelo sintetiza material de
//! referencia plausible (no hay búsqueda web real: las URLs son marcadores).
//!
//! Es una etapa best-effort por contrato: un fallo de parseo degrada a
//! fuentes sintéticas deterministas y nunca tumba el pipeline. Un fallo de
//! transporte sí se propaga, porque indica que el backend está caído.

use serde::Deserialize;
use tracing::warn;

use crate::gateway::{GatewayError, GenerateRequest, GenerativeBackend, ModelTier};
use crate::models::ContextSource;
use crate::parser;

/// Sólo los primeros 5 términos participan en la instrucción.
pub const MAX_SEARCH_TERMS: usize = 5;

/// Forma laxa de cada fuente tal y como la devuelve el modelo.
#[derive(Debug, Deserialize)]
struct RawSource {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    relevance_score: Option<f64>,
    #[serde(default)]
    credibility: Option<f64>,
    #[serde(default)]
    relevance_reason: Option<String>,
}

/// Combina temas y entidades (en ese orden) y trunca a `MAX_SEARCH_TERMS`.
pub fn search_terms(topics: &[String], entities: &[String]) -> Vec<String> {
    topics
        .iter()
        .chain(entities.iter())
        .take(MAX_SEARCH_TERMS)
        .cloned()
        .collect()
}

fn build_instruction(terms: &[String]) -> String {
    format!(
        r#"Act as a research specialist. Given the following topics and entities from a transcription, provide 4-6 highly relevant and insightful contextual sources.

Topics and Entities: {}

For each topic/entity, provide:
1. An engaging title that captures the essence
2. A comprehensive 3-4 sentence explanation with key insights
3. Clear relevance to understanding the transcription context
4. Any interesting connections or implications

Format your response as a JSON array with objects containing: title, snippet, relevance_score (0-1)

Example format:
[
  {{
    "title": "Understanding [Topic]: Key Insights and Implications",
    "snippet": "Detailed explanation with insights...",
    "relevance_score": 0.95
  }}
]

Provide ONLY the JSON array, no additional text."#,
        terms.join(", ")
    )
}

/// Sintetiza fuentes de contexto para los términos dados.
///
/// El número de fuentes lo controla el modelo (nominalmente 4-6) y se acepta
/// tal cual, sin validar ni recortar puntuaciones. Con una lista de términos
/// vacía no se llama al gateway.
pub async fn enrich<G: GenerativeBackend>(
    gateway: &G,
    topics: &[String],
    entities: &[String],
) -> Result<Vec<ContextSource>, GatewayError> {
    let terms = search_terms(topics, entities);
    if terms.is_empty() {
        return Ok(Vec::new());
    }

    let request = GenerateRequest::text(ModelTier::Flash, build_instruction(&terms));
    let response = gateway.generate(request).await?;

    match parser::parse_embedded_json::<Vec<RawSource>>(&response) {
        Ok(raw_sources) => Ok(raw_sources
            .into_iter()
            .enumerate()
            .map(|(index, raw)| ContextSource {
                title: raw.title.unwrap_or_else(|| format!("Context {}", index + 1)),
                url: "#".to_string(),
                snippet: raw.snippet.unwrap_or_default(),
                score: raw.relevance_score.unwrap_or(0.8),
                credibility: raw.credibility,
                relevance_reason: raw.relevance_reason,
            })
            .collect()),
        Err(e) => {
            warn!("No se pudo parsear la respuesta de contexto ({e}). Se generan fuentes de respaldo.");
            Ok(parser::fallback_sources(&terms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedBackend;

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn uses_only_the_first_five_terms_in_order() {
        let backend = ScriptedBackend::new().reply("[]");
        let topics = terms(&["t1", "t2", "t3", "t4"]);
        let entities = terms(&["e1", "e2", "e3"]);

        enrich(&backend, &topics, &entities).await.unwrap();

        assert_eq!(backend.request_count(), 1);
        let instruction = backend.request(0).instruction;
        assert!(instruction.contains("t1, t2, t3, t4, e1"));
        assert!(!instruction.contains("e2"));
    }

    #[tokio::test]
    async fn model_sources_are_accepted_as_is() {
        let backend = ScriptedBackend::new().reply(
            r#"```json
[
  {"title": "Understanding AIM", "snippet": "Instant messaging history.", "relevance_score": 0.95},
  {"snippet": "sin título", "relevance_score": 1.7}
]
```"#,
        );

        let sources = enrich(&backend, &terms(&["AIM"]), &[]).await.unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "Understanding AIM");
        assert_eq!(sources[0].url, "#");
        // Puntuación fuera de rango: se acepta sin recortar.
        assert_eq!(sources[1].score, 1.7);
        assert_eq!(sources[1].title, "Context 2");
    }

    #[tokio::test]
    async fn malformed_json_degrades_to_fallback_sources() {
        let backend = ScriptedBackend::new().reply("I cannot produce JSON today.");
        let topics = terms(&["Topic A", "Topic B"]);

        let sources = enrich(&backend, &topics, &[]).await.unwrap();

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].title, "About Topic A");
        assert_eq!(sources[0].score, 0.8);
        assert_eq!(sources[1].title, "About Topic B");
        assert_eq!(sources[1].score, 0.7);
    }

    #[tokio::test]
    async fn transport_failure_is_propagated() {
        let backend = ScriptedBackend::new().fail(503, "unavailable");
        let err = enrich(&backend, &terms(&["x"]), &[]).await.unwrap_err();
        assert_eq!(err.status(), Some(503));
    }

    #[tokio::test]
    async fn empty_terms_skip_the_gateway_call() {
        let backend = ScriptedBackend::new();
        let sources = enrich(&backend, &[], &[]).await.unwrap();
        assert!(sources.is_empty());
        assert_eq!(backend.request_count(), 0);
    }
}
