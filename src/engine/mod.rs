//! External recognition capability.
//!
//! The service never reimplements character recognition; it drives an engine
//! through [`RecognitionEngine`]. The production implementation is
//! [`tesseract::TesseractEngine`], which shells out to the `tesseract`
//! binary. Tests substitute in-process fakes.
//!
//! Engine calls are blocking (subprocesses, CPU-bound work) and are always
//! made from inside `spawn_blocking`.

pub mod tesseract;

use crate::error::EngineError;
use image::GrayImage;

pub use tesseract::TesseractEngine;

/// One row of the engine's structured output, before filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawToken {
    pub text: String,
    /// Native engine confidence, nominally 0–100. Non-word rows report -1.
    pub confidence: f32,
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

/// Per-call options forwarded to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognitionOptions {
    /// Extra engine arguments, e.g. `["--psm", "6"]`.
    pub args: Vec<String>,
}

/// A recognition backend.
pub trait RecognitionEngine: Send + Sync {
    /// Plain full-text transcription of `image`.
    fn transcribe(
        &self,
        image: &GrayImage,
        language: &str,
        options: &RecognitionOptions,
    ) -> Result<String, EngineError>;

    /// Structured per-word output with confidences and boxes.
    fn tokenize(
        &self,
        image: &GrayImage,
        language: &str,
        options: &RecognitionOptions,
    ) -> Result<Vec<RawToken>, EngineError>;

    /// Engine version string, reported by the health endpoint.
    fn version(&self) -> Result<String, EngineError>;

    /// Installed language packs. Engines that cannot list them report the
    /// single default language.
    fn supported_languages(&self) -> Result<Vec<String>, EngineError> {
        Ok(vec!["eng".to_string()])
    }
}

/// Picks the language hint for a page.
///
/// Language detection is pluggable; the shipped detector returns a fixed
/// language.
pub trait LanguageDetector: Send + Sync {
    fn detect(&self, image: &GrayImage) -> String;
}

/// Always answers with the configured language.
#[derive(Debug, Clone)]
pub struct FixedLanguage(pub String);

impl LanguageDetector for FixedLanguage {
    fn detect(&self, _image: &GrayImage) -> String {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_language_ignores_image() {
        let detector = FixedLanguage("deu".into());
        assert_eq!(detector.detect(&GrayImage::new(4, 4)), "deu");
    }
}
