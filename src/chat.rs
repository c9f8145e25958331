//! Conversación de seguimiento sobre un análisis completado.
//!
//! Cada turno es independiente: se reenvía el resumen completo del análisis
//! (el "grounding") junto con la última pregunta; los turnos anteriores no
//! viajan al modelo. Todo el estado conversacional vive en la sesión del
//! servidor, nunca en este módulo.

use crate::gateway::{GatewayError, GenerateRequest, GenerativeBackend, ModelTier};
use crate::models::{ArtifactReport, Modality, Reconstruction, TextInterpretation, Transcription};

/// Respuesta sintética del asistente cuando el gateway falla en un turno.
/// El fallo queda aislado al turno: no invalida el análisis ni el chat.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I encountered an error while processing your request. Please try again.";

fn or_not_available(value: &str) -> &str {
    if value.trim().is_empty() {
        "Not available"
    } else {
        value
    }
}

/// Resumen aplanado de una interpretación de texto, para usar como grounding.
pub fn text_grounding(original_text: &str, interpretation: &TextInterpretation) -> String {
    let key_terms = interpretation
        .key_terms
        .iter()
        .map(|term| format!("{} → {}", term.original, term.expanded))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Text Analysis Context:\n\
         Original Text: {}\n\
         Reconstructed Text: {}\n\
         Confidence: {}%\n\
         Era: {}\n\
         Community: {}\n\
         Key Terms: {}\n\
         Reasoning: {}",
        or_not_available(original_text),
        or_not_available(&interpretation.most_likely),
        interpretation.confidence,
        or_not_available(&interpretation.era),
        or_not_available(&interpretation.community),
        or_not_available(&key_terms),
        or_not_available(&interpretation.reasoning),
    )
}

/// Resumen aplanado de un análisis de audio (transcripción + reconstrucción).
pub fn audio_grounding(transcription: &Transcription, reconstruction: &Reconstruction) -> String {
    format!(
        "Audio Analysis Context:\n\
         Original Transcription: {}\n\
         Reconstructed Text: {}\n\
         Key Topics: {}\n\
         Important Entities: {}\n\
         Context Notes: {}\n\
         Communication Style: {}\n\
         Sentiment Analysis: {}\n\
         Action Items: {}",
        or_not_available(&transcription.transcription),
        or_not_available(&reconstruction.reconstructed_text),
        or_not_available(&reconstruction.key_topics.join(", ")),
        or_not_available(&reconstruction.entities.join(", ")),
        or_not_available(&reconstruction.context_notes),
        or_not_available(&reconstruction.communication_style),
        or_not_available(&reconstruction.sentiment_analysis),
        or_not_available(&reconstruction.action_items),
    )
}

/// Resumen aplanado del informe arqueológico de una imagen.
pub fn image_grounding(report: &ArtifactReport) -> String {
    format!(
        "Image Analysis Context:\n\
         Era: {} ({})\n\
         Platform: {} ({})\n\
         Design: {}, {}, {}\n\
         Cultural Context: {}\n\
         Technical Details: {}\n\
         Authenticity: {}\n\
         Significance: {}/10 - {}",
        report.era.period,
        report.era.year_range,
        report.platform.name,
        report.platform.kind,
        report.design.color_scheme,
        report.design.typography,
        report.design.layout_style,
        report.cultural.historical_context,
        report.technical.technology_stack.join(", "),
        report.authenticity.assessment,
        report.significance.rating,
        report.significance.explanation,
    )
}

fn build_prompt(message: &str, grounding: &str, modality: Option<Modality>) -> String {
    let context = if grounding.trim().is_empty() {
        "No specific context provided."
    } else {
        grounding
    };

    let (role_line, focus_line) = match modality {
        Some(Modality::Audio) => (
            "You are an AI assistant helping users understand their audio analysis results.",
            "Please provide a clear, concise, and helpful response about the audio analysis. \
             Focus on the transcription, reconstructed text, key topics, entities, and other audio-specific insights.",
        ),
        Some(Modality::Text) => (
            "You are an AI assistant helping users understand their text analysis results.",
            "Please provide a clear, concise, and helpful response about the text analysis. \
             Focus on the reconstructed text, era, community, key terms, and other text-specific insights.",
        ),
        Some(Modality::Image) => (
            "You are an AI assistant helping users understand their image analysis results.",
            "Please provide a clear, concise, and helpful response about the image analysis. \
             Focus on the era, platform, design elements, cultural context, and other image-specific insights.",
        ),
        None => (
            "You are an AI assistant helping users with their analysis results.",
            "Please provide a clear, concise, and helpful response.",
        ),
    };

    format!(
        "{role_line}\n\
         Use the following context to answer the user's question accurately and helpfully:\n\n\
         {context}\n\n\
         User's question: {message}\n\n\
         {focus_line}"
    )
}

/// Envía un turno de chat al gateway. Sin memoria entre turnos: el modelo
/// sólo ve el grounding y la pregunta actual.
pub async fn ask<G: GenerativeBackend>(
    gateway: &G,
    message: &str,
    grounding: &str,
    modality: Option<Modality>,
) -> Result<String, GatewayError> {
    let prompt = build_prompt(message, grounding, modality);
    gateway
        .generate(GenerateRequest::text(ModelTier::Flash, prompt))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::ScriptedBackend;
    use crate::models::{Alternative, KeyTerm};

    fn sample_interpretation() -> TextInterpretation {
        TextInterpretation {
            most_likely: "Hello, you are so lame. Age, sex, location?".to_string(),
            confidence: 87.0,
            alternatives: vec![Alternative {
                text: "Laughing out loud, you are so lame.".to_string(),
                confidence: 64.0,
            }],
            era: "Early 2000s".to_string(),
            community: "AIM / IRC chat rooms".to_string(),
            key_terms: vec![KeyTerm {
                original: "asl".to_string(),
                expanded: "age, sex, location".to_string(),
                meaning: "Standard opening question in anonymous chats".to_string(),
            }],
            reasoning: "Classic instant-messaging abbreviations.".to_string(),
        }
    }

    #[test]
    fn text_grounding_flattens_every_field() {
        let grounding = text_grounding("lol ur so lame. asl?", &sample_interpretation());
        assert!(grounding.contains("Original Text: lol ur so lame. asl?"));
        assert!(grounding.contains("Confidence: 87%"));
        assert!(grounding.contains("asl → age, sex, location"));
        assert!(grounding.contains("Era: Early 2000s"));
    }

    #[test]
    fn empty_fields_render_as_not_available() {
        let reconstruction = Reconstruction::default();
        let transcription = Transcription {
            transcription: "hey man".to_string(),
            file_name: "voz.mp3".to_string(),
            file_size: 10,
            mime_type: "audio/mpeg".to_string(),
        };
        let grounding = audio_grounding(&transcription, &reconstruction);
        assert!(grounding.contains("Original Transcription: hey man"));
        assert!(grounding.contains("Action Items: Not available"));
    }

    #[tokio::test]
    async fn ask_injects_grounding_and_modality_focus() {
        let backend = ScriptedBackend::new().reply("It is from the AIM era.");
        let grounding = text_grounding("lol", &sample_interpretation());

        let answer = ask(&backend, "What era is this from?", &grounding, Some(Modality::Text))
            .await
            .unwrap();

        assert_eq!(answer, "It is from the AIM era.");
        let prompt = backend.request(0).instruction;
        assert!(prompt.contains("text analysis results"));
        assert!(prompt.contains("User's question: What era is this from?"));
        assert!(prompt.contains("Original Text: lol"));
    }

    #[tokio::test]
    async fn consecutive_turns_resend_identical_grounding() {
        let backend = ScriptedBackend::new().reply("first").reply("second");
        let grounding = text_grounding("lol", &sample_interpretation());

        ask(&backend, "q1", &grounding, Some(Modality::Text)).await.unwrap();
        ask(&backend, "q2", &grounding, Some(Modality::Text)).await.unwrap();

        let first = backend.request(0).instruction;
        let second = backend.request(1).instruction;
        // Mismo grounding literal en ambos turnos; la primera respuesta no viaja.
        assert!(second.contains("Original Text: lol"));
        assert!(!second.contains("first"));
        let strip = |s: &str| s.replace("q1", "").replace("q2", "");
        assert_eq!(strip(&first), strip(&second));
    }

    #[tokio::test]
    async fn missing_grounding_uses_placeholder_context() {
        let backend = ScriptedBackend::new().reply("ok");
        ask(&backend, "hola", "", None).await.unwrap();
        assert!(backend.request(0).instruction.contains("No specific context provided."));
    }
}
