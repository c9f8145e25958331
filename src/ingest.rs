//! Ingesta de artefactos: validación de presencia y coerción de tipos MIME.
//!
//! La política es de máxima aceptación: un MIME no soportado no rechaza el
//! artefacto, se coacciona al tipo canónico de la modalidad. Sólo un
//! artefacto vacío es un error de validación.

use anyhow::{anyhow, Result};
use tracing::warn;

use crate::models::{Artifact, MediaFile};

/// Tipos de audio que acepta el backend de Gemini.
pub const SUPPORTED_AUDIO_TYPES: [&str; 5] = [
    "audio/mpeg",
    "audio/wav",
    "audio/webm",
    "audio/mp4",
    "audio/aac",
];
pub const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";

/// Tipos de imagen que acepta el backend de Gemini.
pub const SUPPORTED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];
pub const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Acepta un fragmento de texto. Vacío o sólo espacios => error de validación.
pub fn accept_text(text: &str) -> Result<Artifact> {
    if text.trim().is_empty() {
        return Err(anyhow!("No se ha proporcionado ningún texto para analizar"));
    }
    Ok(Artifact::Text(text.to_string()))
}

/// Acepta una grabación de audio, coaccionando el MIME si hace falta.
pub fn accept_audio(bytes: Vec<u8>, declared_mime: Option<&str>, filename: String) -> Result<Artifact> {
    if bytes.is_empty() {
        return Err(anyhow!("El fichero de audio no contiene datos"));
    }
    let mime_type = coerce_audio_mime(declared_mime);
    Ok(Artifact::Audio(MediaFile {
        bytes,
        mime_type,
        filename,
    }))
}

/// Acepta una captura de interfaz, coaccionando el MIME si hace falta.
pub fn accept_image(bytes: Vec<u8>, declared_mime: Option<&str>, filename: String) -> Result<Artifact> {
    if bytes.is_empty() {
        return Err(anyhow!("El fichero de imagen no contiene datos"));
    }
    let mime_type = coerce_image_mime(declared_mime, &filename);
    Ok(Artifact::Image(MediaFile {
        bytes,
        mime_type,
        filename,
    }))
}

fn coerce_audio_mime(declared: Option<&str>) -> String {
    match declared {
        Some(mime) if SUPPORTED_AUDIO_TYPES.contains(&mime) => mime.to_string(),
        Some(mime) => {
            warn!("Tipo MIME de audio no soportado '{mime}'. Se usará {DEFAULT_AUDIO_MIME}.");
            DEFAULT_AUDIO_MIME.to_string()
        }
        None => DEFAULT_AUDIO_MIME.to_string(),
    }
}

fn coerce_image_mime(declared: Option<&str>, filename: &str) -> String {
    if let Some(mime) = declared {
        if SUPPORTED_IMAGE_TYPES.contains(&mime) {
            return mime.to_string();
        }
    }

    // Intento de inferir el tipo por la extensión antes de caer al defecto.
    let guessed = mime_guess::from_path(filename)
        .first()
        .map(|m| m.to_string());
    match guessed {
        Some(mime) if SUPPORTED_IMAGE_TYPES.contains(&mime.as_str()) => mime,
        _ => {
            if let Some(mime) = declared {
                warn!("Tipo MIME de imagen no soportado '{mime}'. Se usará {DEFAULT_IMAGE_MIME}.");
            }
            DEFAULT_IMAGE_MIME.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        assert!(accept_text("   \n ").is_err());
        assert!(accept_text("lol ur so lame. asl?").is_ok());
    }

    #[test]
    fn empty_audio_bytes_are_rejected() {
        assert!(accept_audio(Vec::new(), Some("audio/mpeg"), "a.mp3".into()).is_err());
    }

    #[test]
    fn unsupported_audio_mime_defaults_to_mpeg() {
        let artifact = accept_audio(vec![1, 2, 3], Some("audio/ogg"), "voz.ogg".into()).unwrap();
        match artifact {
            Artifact::Audio(file) => assert_eq!(file.mime_type, "audio/mpeg"),
            _ => panic!("se esperaba un artefacto de audio"),
        }
    }

    #[test]
    fn supported_audio_mime_is_kept() {
        let artifact = accept_audio(vec![1], Some("audio/wav"), "voz.wav".into()).unwrap();
        match artifact {
            Artifact::Audio(file) => assert_eq!(file.mime_type, "audio/wav"),
            _ => panic!("se esperaba un artefacto de audio"),
        }
    }

    #[test]
    fn image_mime_is_inferred_from_extension() {
        let artifact = accept_image(vec![1], Some("application/octet-stream"), "captura.png".into()).unwrap();
        match artifact {
            Artifact::Image(file) => assert_eq!(file.mime_type, "image/png"),
            _ => panic!("se esperaba un artefacto de imagen"),
        }
    }

    #[test]
    fn unknown_image_extension_defaults_to_jpeg() {
        let artifact = accept_image(vec![1], Some("image/tiff"), "captura.tiff".into()).unwrap();
        match artifact {
            Artifact::Image(file) => assert_eq!(file.mime_type, "image/jpeg"),
            _ => panic!("se esperaba un artefacto de imagen"),
        }
    }

    #[test]
    fn missing_mime_falls_back_to_defaults() {
        let audio = accept_audio(vec![1], None, "voz.bin".into()).unwrap();
        match audio {
            Artifact::Audio(file) => assert_eq!(file.mime_type, DEFAULT_AUDIO_MIME),
            _ => unreachable!(),
        }
    }
}
