//! Modelos de dominio: artefactos, interpretaciones por modalidad,
//! fuentes de contexto y mensajes de chat.
//!
//! Todos son tipos-valor planos (escalares, strings y listas), serializados
//! en camelCase porque es el contrato que espera el frontend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Modalidad del artefacto analizado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
    Image,
}

/// Estado del pipeline de análisis. Las transiciones sólo avanzan;
/// `Failed`/`Complete` vuelven a `Idle` al enviar un artefacto nuevo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Ingesting,
    Interpreting,
    Enriching,
    Complete,
    Failed,
}

/// Fichero binario aceptado por la ingesta (audio o imagen).
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub filename: String,
}

/// Artefacto crudo tal y como lo entrega la capa de presentación.
/// Inmutable una vez aceptado por la ingesta.
#[derive(Debug, Clone)]
pub enum Artifact {
    Text(String),
    Audio(MediaFile),
    Image(MediaFile),
}

// --- Modalidad texto ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyTerm {
    pub original: String,
    pub expanded: String,
    pub meaning: String,
}

/// Interpretación de un fragmento de texto: reconstrucción más probable,
/// alternativas, época y comunidad de origen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextInterpretation {
    pub most_likely: String,
    pub confidence: f32,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
    #[serde(default)]
    pub era: String,
    #[serde(default)]
    pub community: String,
    #[serde(default)]
    pub key_terms: Vec<KeyTerm>,
    #[serde(default)]
    pub reasoning: String,
}

// --- Modalidad audio ---

/// Primer resultado del pipeline de audio: la transcripción literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transcription {
    pub transcription: String,
    pub file_name: String,
    pub file_size: u64,
    pub mime_type: String,
}

/// Segundo resultado: reconstrucción y análisis de la transcripción.
/// Las secciones ausentes en la respuesta del modelo quedan vacías.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconstruction {
    pub reconstructed_text: String,
    pub key_topics: Vec<String>,
    pub entities: Vec<String>,
    pub context_notes: String,
    pub communication_style: String,
    pub sentiment_analysis: String,
    pub action_items: String,
}

// --- Modalidad imagen ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EraAssessment {
    pub period: String,
    pub year_range: String,
    pub confidence: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignAnalysis {
    pub color_scheme: String,
    pub typography: String,
    pub layout_style: String,
    pub design_paradigm: String,
    #[serde(default)]
    pub notable_elements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CulturalContext {
    pub historical_context: String,
    pub cultural_significance: String,
    pub user_behavior_patterns: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalObservations {
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub browser_indicators: Option<String>,
    #[serde(default)]
    pub technology_stack: Vec<String>,
    #[serde(default)]
    pub performance_notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticityAssessment {
    pub assessment: String,
    pub confidence: String,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceRating {
    pub rating: u8,
    pub explanation: String,
}

/// Informe arqueológico estructurado de una interfaz histórica.
/// Es el único resultado de la modalidad imagen: no hay enriquecimiento
/// posterior porque el informe ya es autocontenido.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactReport {
    pub era: EraAssessment,
    pub platform: PlatformInfo,
    pub design: DesignAnalysis,
    pub cultural: CulturalContext,
    pub technical: TechnicalObservations,
    pub authenticity: AuthenticityAssessment,
    pub significance: SignificanceRating,
    pub summary: String,
}

// --- Enriquecimiento de contexto ---

/// Fuente de referencia sintetizada por el modelo. La URL es siempre un
/// marcador no resoluble ("#"): no se hace búsqueda web real.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSource {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credibility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_reason: Option<String>,
}

// --- Chat ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Mensaje de la conversación de seguimiento. La secuencia es append-only
/// y pertenece a la ejecución del pipeline que generó el contexto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}
