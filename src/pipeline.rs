//! Pipeline de análisis por etapas: Ingesta → Interpretación → Enriquecimiento.
//!
//! Es el único dueño de las llamadas al gateway durante una ejecución y del
//! estado observable (`Status`). Las etapas son estrictamente secuenciales
//! (cada una depende de la salida de la anterior) y un fallo en cualquiera
//! de ellas detiene la secuencia: las etapas posteriores no se intentan.
//! El progreso publicado nunca decrece dentro de una misma ejecución.

use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tracing::{error, info};

use crate::app_state::{publish, Status};
use crate::enrich;
use crate::gateway::{GenerateRequest, GenerationConfig, GenerativeBackend, InlinePayload, ModelTier};
use crate::ingest;
use crate::models::{
    Artifact, ArtifactReport, ContextSource, MediaFile, Modality, PipelineState, Reconstruction,
    TextInterpretation, Transcription,
};
use crate::parser;

/// Entrada cruda de la capa de presentación, previa a la ingesta.
#[derive(Debug)]
pub enum RawSubmission {
    Text(String),
    Audio {
        bytes: Vec<u8>,
        mime_type: Option<String>,
        filename: String,
    },
    Image {
        bytes: Vec<u8>,
        mime_type: Option<String>,
        filename: String,
    },
}

/// Resultado del pipeline de texto.
#[derive(Debug, Clone)]
pub struct TextAnalysis {
    pub interpretation: TextInterpretation,
    pub sources: Vec<ContextSource>,
}

/// Resultado del pipeline de audio: dos resultados secuenciales más fuentes.
#[derive(Debug, Clone)]
pub struct AudioAnalysis {
    pub transcription: Transcription,
    pub reconstruction: Reconstruction,
    pub sources: Vec<ContextSource>,
}

/// Resultado de una ejecución completa, junto con el grounding listo para
/// la conversación de seguimiento.
#[derive(Debug, Clone)]
pub enum AnalysisOutcome {
    Text(TextAnalysis),
    Audio(AudioAnalysis),
    Image(ArtifactReport),
}

impl AnalysisOutcome {
    pub fn modality(&self) -> Modality {
        match self {
            AnalysisOutcome::Text(_) => Modality::Text,
            AnalysisOutcome::Audio(_) => Modality::Audio,
            AnalysisOutcome::Image(_) => Modality::Image,
        }
    }
}

// --- Instrucciones por etapa ---

const TRANSCRIBE_INSTRUCTION: &str = "Transcribe this audio accurately. Handle poor quality audio, background noise, fast speech, unclear pronunciation, accents, multiple speakers, and damaged recordings. Provide the best possible transcription despite audio quality issues. Include all speech, even if unclear or overlapping.";

const TRANSCRIBE_GENERATION: GenerationConfig = GenerationConfig {
    temperature: 0.1,
    top_k: 32,
    top_p: 1.0,
    max_output_tokens: 8192,
};

const RECONSTRUCT_GENERATION: GenerationConfig = GenerationConfig {
    temperature: 0.3,
    top_k: 40,
    top_p: 0.95,
    max_output_tokens: 8192,
};

fn reconstruct_instruction(transcription: &str) -> String {
    format!(
        r#"Act as an expert analyst and communication specialist. Your task is to deeply analyze the following transcription and provide comprehensive insights.

First, reconstruct the transcription by:
1. Expanding all slang, abbreviations, and informal language into proper full context
2. Correcting grammar and structure while preserving original meaning
3. Clarifying unclear references and providing context
4. Organizing information coherently for better readability

Then, provide a detailed analysis including:
1. Key Themes: Main ideas and recurring concepts (be specific and insightful)
2. Important Entities: People, places, organizations, products mentioned (with brief context)
3. Communication Style: Tone, formality level, and speaking patterns
4. Contextual Insights: Cultural references, technical terms, or domain-specific elements
5. Sentiment Analysis: Overall emotional tone and key emotional shifts
6. Action Items: Any tasks, decisions, or follow-ups mentioned

Original Transcription:
{transcription}

Format your response exactly as:
===RECONSTRUCTED TEXT===
[Full, clear, properly formatted version]

===KEY THEMES===
[Detailed themes with brief explanations]

===IMPORTANT ENTITIES===
[Entities with context]

===COMMUNICATION STYLE===
[Tone, formality, and patterns]

===CONTEXTUAL INSIGHTS===
[Cultural, technical, or domain references]

===SENTIMENT ANALYSIS===
[Emotional tone and shifts]

===ACTION ITEMS===
[Any tasks or decisions]"#
    )
}

fn interpret_text_instruction(text: &str) -> String {
    format!(
        r#"You are a digital archaeologist specializing in historical internet slang and fragmented online communication. Reconstruct the following fragment into clear modern language and identify its origins.

Fragment:
{text}

Return ONLY valid JSON in this exact structure:
{{
  "mostLikely": "the most probable full reconstruction in plain modern English",
  "confidence": number (0-100),
  "alternatives": [
    {{ "text": "an alternative reconstruction", "confidence": number (0-100) }}
  ],
  "era": "approximate time period of this kind of language",
  "community": "the online community or platform where it was typical",
  "keyTerms": [
    {{ "original": "term as written", "expanded": "full expansion", "meaning": "what it conveys" }}
  ],
  "reasoning": "a short explanation of how you reconstructed it"
}}"#
    )
}

const IMAGE_REPORT_INSTRUCTION: &str = r#"You are a digital archaeologist analyzing historical internet artifacts. Analyze this image comprehensively and provide a detailed archaeological report in JSON format.

Your analysis should include:

1. **Era Identification**: Determine the approximate time period (e.g., "Early Web 1.0 (1995-2000)", "Web 2.0 Peak (2006-2010)", "Mobile-First Era (2012-2016)", "Modern Era (2017-present)")

2. **Platform Detection**: Identify the platform, application, or website shown. Include version details if recognizable.

3. **Design Analysis**: Analyze visual design elements including color schemes, typography, layout patterns, UI paradigms and notable design trends of that era.

4. **Cultural Context**: Provide historical and cultural significance, user behavior patterns this design encouraged, and how this artifact fits into internet history.

5. **Technical Observations**: Note screen resolution indicators, browser chrome, technology stack hints (Flash, Java applets, HTML tables, CSS frameworks) and visible performance considerations.

6. **Authenticity Assessment**: Evaluate if this is an original artifact, recreation, or modern interpretation.

7. **Historical Significance**: Rate the significance (1-10) and explain why this artifact matters to internet history.

Return ONLY valid JSON in this exact structure:
{
  "era": {
    "period": "string",
    "yearRange": "string",
    "confidence": "high/medium/low"
  },
  "platform": {
    "name": "string",
    "type": "string (website/application/OS/game/etc)",
    "version": "string or null"
  },
  "design": {
    "colorScheme": "string description",
    "typography": "string description",
    "layoutStyle": "string description",
    "designParadigm": "string (skeuomorphic/flat/etc)",
    "notableElements": ["array of strings"]
  },
  "cultural": {
    "historicalContext": "string (2-3 sentences)",
    "culturalSignificance": "string (2-3 sentences)",
    "userBehaviorPatterns": "string (1-2 sentences)"
  },
  "technical": {
    "resolution": "string or null",
    "browserIndicators": "string or null",
    "technologyStack": ["array of strings"],
    "performanceNotes": "string or null"
  },
  "authenticity": {
    "assessment": "original/recreation/modern/unclear",
    "confidence": "high/medium/low",
    "reasoning": "string"
  },
  "significance": {
    "rating": number (1-10),
    "explanation": "string (2-3 sentences)"
  },
  "summary": "string (A compelling 2-3 sentence summary of the artifact's importance)"
}"#;

// --- Motor del pipeline ---

/// Ejecuta una ejecución completa del pipeline para un artefacto.
///
/// Publica cada transición de estado en `status`; en caso de fallo el estado
/// terminal es `Failed` con el mensaje del error y las etapas restantes no
/// se intentan.
pub async fn run<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    submission: RawSubmission,
) -> Result<AnalysisOutcome> {
    let result = drive(gateway, status, submission).await;
    match &result {
        Ok(outcome) => {
            publish(status, PipelineState::Complete, 100, "Análisis completado.");
            info!("Pipeline completado (modalidad {:?}).", outcome.modality());
        }
        Err(e) => {
            let progress = status.lock().unwrap().progress;
            publish(status, PipelineState::Failed, progress, e.to_string());
            error!("Pipeline fallido: {e}");
        }
    }
    result
}

/// Variante tipada de `run` para la modalidad texto.
pub async fn run_text<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    text: String,
) -> Result<TextAnalysis> {
    match run(gateway, status, RawSubmission::Text(text)).await? {
        AnalysisOutcome::Text(analysis) => Ok(analysis),
        _ => unreachable!("una entrada de texto produce un resultado de texto"),
    }
}

/// Variante tipada de `run` para la modalidad audio.
pub async fn run_audio<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    bytes: Vec<u8>,
    mime_type: Option<String>,
    filename: String,
) -> Result<AudioAnalysis> {
    let submission = RawSubmission::Audio { bytes, mime_type, filename };
    match run(gateway, status, submission).await? {
        AnalysisOutcome::Audio(analysis) => Ok(analysis),
        _ => unreachable!("una entrada de audio produce un resultado de audio"),
    }
}

/// Variante tipada de `run` para la modalidad imagen.
pub async fn run_image<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    bytes: Vec<u8>,
    mime_type: Option<String>,
    filename: String,
) -> Result<ArtifactReport> {
    let submission = RawSubmission::Image { bytes, mime_type, filename };
    match run(gateway, status, submission).await? {
        AnalysisOutcome::Image(report) => Ok(report),
        _ => unreachable!("una entrada de imagen produce un informe de imagen"),
    }
}

async fn drive<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    submission: RawSubmission,
) -> Result<AnalysisOutcome> {
    publish(status, PipelineState::Ingesting, 0, "Validando el artefacto...");

    let artifact = match submission {
        RawSubmission::Text(text) => ingest::accept_text(&text)?,
        RawSubmission::Audio { bytes, mime_type, filename } => {
            ingest::accept_audio(bytes, mime_type.as_deref(), filename)?
        }
        RawSubmission::Image { bytes, mime_type, filename } => {
            ingest::accept_image(bytes, mime_type.as_deref(), filename)?
        }
    };

    match artifact {
        Artifact::Text(text) => drive_text(gateway, status, &text)
            .await
            .map(AnalysisOutcome::Text),
        Artifact::Audio(file) => drive_audio(gateway, status, file)
            .await
            .map(AnalysisOutcome::Audio),
        Artifact::Image(file) => drive_image(gateway, status, file)
            .await
            .map(AnalysisOutcome::Image),
    }
}

/// Texto: una llamada de interpretación (JSON estricto) y enriquecimiento
/// sobre la reconstrucción más probable.
async fn drive_text<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    text: &str,
) -> Result<TextAnalysis> {
    publish(status, PipelineState::Interpreting, 0, "Interpretando el fragmento...");
    let request = GenerateRequest::text(ModelTier::Flash, interpret_text_instruction(text));
    let response = gateway.generate(request).await?;
    let interpretation: TextInterpretation = parser::parse_strict_json(&response)?;

    publish(status, PipelineState::Enriching, 50, "Buscando contexto...");
    let entities = vec![interpretation.most_likely.clone()];
    let sources = enrich::enrich(gateway, &[], &entities).await?;

    Ok(TextAnalysis {
        interpretation,
        sources,
    })
}

/// Audio: transcripción → reconstrucción por secciones → enriquecimiento.
async fn drive_audio<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    file: MediaFile,
) -> Result<AudioAnalysis> {
    publish(status, PipelineState::Interpreting, 0, "Transcribiendo el audio...");
    let payload = InlinePayload::from_bytes(file.mime_type.clone(), &file.bytes);
    let request = GenerateRequest::text(ModelTier::Flash, TRANSCRIBE_INSTRUCTION)
        .with_payload(payload)
        .with_generation(TRANSCRIBE_GENERATION);
    let transcribed = gateway.generate(request).await?;

    if transcribed.trim().is_empty() {
        return Err(anyhow!("El modelo no devolvió ninguna transcripción"));
    }

    let transcription = Transcription {
        transcription: transcribed.clone(),
        file_name: file.filename.clone(),
        file_size: file.bytes.len() as u64,
        mime_type: file.mime_type.clone(),
    };

    publish(status, PipelineState::Interpreting, 33, "Reconstruyendo la transcripción...");
    let request = GenerateRequest::text(ModelTier::Reasoning, reconstruct_instruction(&transcribed))
        .with_generation(RECONSTRUCT_GENERATION);
    let response = gateway.generate(request).await?;
    let reconstruction = parser::parse_reconstruction(&response);

    publish(status, PipelineState::Enriching, 66, "Buscando contexto...");
    let sources = enrich::enrich(gateway, &reconstruction.key_topics, &reconstruction.entities).await?;

    Ok(AudioAnalysis {
        transcription,
        reconstruction,
        sources,
    })
}

/// Imagen: una única llamada estructurada; el informe es autocontenido y no
/// hay etapa de enriquecimiento.
async fn drive_image<G: GenerativeBackend>(
    gateway: &G,
    status: &Arc<Mutex<Status>>,
    file: MediaFile,
) -> Result<ArtifactReport> {
    publish(status, PipelineState::Interpreting, 0, "Analizando la interfaz...");
    let payload = InlinePayload::from_bytes(file.mime_type, &file.bytes);
    let request =
        GenerateRequest::text(ModelTier::Flash, IMAGE_REPORT_INSTRUCTION).with_payload(payload);
    let response = gateway.generate(request).await?;
    parser::parse_strict_json(&response)
}
