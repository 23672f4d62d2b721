//! Recognition adapter: raw engine output to a typed page result.
//!
//! Two engine passes per page, a plain transcription and a structured
//! token pass. The token pass is modelled as an explicit [`TokenPass`]:
//! either structured data or a degraded variant carrying the reason. The
//! degraded variant yields an empty token list and [`FALLBACK_CONFIDENCE`].
//!
//! | transcription | token pass | outcome |
//! |---------------|------------|---------|
//! | ok            | structured | text as transcribed, weighted confidence |
//! | ok            | unavailable| text, no tokens, fallback confidence |
//! | failed        | structured | text rebuilt from tokens |
//! | failed        | unavailable| [`OcrError::Recognition`] |

use crate::config::FALLBACK_CONFIDENCE;
use crate::engine::{LanguageDetector, RawToken, RecognitionEngine, RecognitionOptions};
use crate::error::OcrError;
use crate::output::{BoundingBox, PageResult, Token};
use image::GrayImage;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of the structured token pass.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenPass {
    Structured(Vec<RawToken>),
    Unavailable { reason: String },
}

/// A recognised page before it is attributed to a source.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub full_text: String,
    pub confidence: f32,
    pub language: String,
    pub tokens: Vec<Token>,
}

impl Recognition {
    pub fn into_page(self, source_name: String, page_number: Option<usize>) -> PageResult {
        PageResult {
            source_name,
            full_text: self.full_text,
            confidence: self.confidence,
            language: self.language,
            tokens: self.tokens,
            page_number,
        }
    }
}

pub struct RecognitionAdapter {
    engine: Arc<dyn RecognitionEngine>,
    detector: Arc<dyn LanguageDetector>,
    options: RecognitionOptions,
}

impl RecognitionAdapter {
    pub fn new(
        engine: Arc<dyn RecognitionEngine>,
        detector: Arc<dyn LanguageDetector>,
        options: RecognitionOptions,
    ) -> Self {
        Self {
            engine,
            detector,
            options,
        }
    }

    pub fn engine(&self) -> &Arc<dyn RecognitionEngine> {
        &self.engine
    }

    /// Recognise a normalised page. `language` overrides the detector.
    pub fn recognize(
        &self,
        image: &GrayImage,
        language: Option<&str>,
    ) -> Result<Recognition, OcrError> {
        let language = match language {
            Some(lang) => lang.to_string(),
            None => self.detector.detect(image),
        };

        let transcript = self.engine.transcribe(image, &language, &self.options);
        let pass = match self.engine.tokenize(image, &language, &self.options) {
            Ok(raw) => TokenPass::Structured(raw),
            Err(e) => TokenPass::Unavailable {
                reason: e.to_string(),
            },
        };

        let (tokens, confidence) = match &pass {
            TokenPass::Structured(raw) => (filter_tokens(raw), aggregate_confidence(raw)),
            TokenPass::Unavailable { reason } => {
                warn!("token data unavailable, using fallback confidence: {}", reason);
                (Vec::new(), FALLBACK_CONFIDENCE)
            }
        };

        let full_text = match (transcript, &pass) {
            (Ok(text), _) => text,
            (Err(e), TokenPass::Structured(_)) => {
                warn!("transcription failed, rebuilding text from tokens: {}", e);
                tokens
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            (Err(e), TokenPass::Unavailable { .. }) => return Err(OcrError::Recognition(e)),
        };

        debug!(
            "recognised {} chars, {} tokens, confidence {:.3}",
            full_text.len(),
            tokens.len(),
            confidence
        );
        Ok(Recognition {
            full_text,
            confidence,
            language,
            tokens,
        })
    }
}

/// Whether a raw token survives filtering: positive confidence and
/// non-blank text. NaN confidences are dropped.
fn keep(raw: &RawToken) -> bool {
    raw.confidence > 0.0 && !raw.text.trim().is_empty()
}

/// Kept tokens with trimmed text and confidence rescaled to `[0, 1]`.
pub fn filter_tokens(raw: &[RawToken]) -> Vec<Token> {
    raw.iter()
        .filter(|t| keep(t))
        .map(|t| Token {
            text: t.text.trim().to_string(),
            confidence: (t.confidence / 100.0).clamp(0.0, 1.0),
            bounding_box: BoundingBox {
                x: t.left,
                y: t.top,
                width: t.width,
                height: t.height,
            },
        })
        .collect()
}

/// Length-weighted mean confidence of the kept tokens, in `[0, 1]`.
///
/// Each token weighs `max(1, chars)`, so long words outvote short noisy
/// detections. `0.0` when nothing survives filtering.
pub fn aggregate_confidence(raw: &[RawToken]) -> f32 {
    let (weighted, total) = raw
        .iter()
        .filter(|t| keep(t))
        .fold((0.0f64, 0.0f64), |(sum, weights), t| {
            let w = t.text.trim().chars().count().max(1) as f64;
            (sum + w * f64::from(t.confidence), weights + w)
        });
    if total == 0.0 {
        return 0.0;
    }
    ((weighted / total) / 100.0).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedLanguage;
    use crate::error::EngineError;

    fn raw(text: &str, confidence: f32) -> RawToken {
        RawToken {
            text: text.to_string(),
            confidence,
            left: 1,
            top: 2,
            width: 3,
            height: 4,
        }
    }

    struct Scripted {
        text: Option<&'static str>,
        tokens: Option<Vec<RawToken>>,
    }

    impl RecognitionEngine for Scripted {
        fn transcribe(
            &self,
            _: &GrayImage,
            _: &str,
            _: &RecognitionOptions,
        ) -> Result<String, EngineError> {
            self.text
                .map(str::to_string)
                .ok_or_else(|| EngineError::Failed("no text".into()))
        }

        fn tokenize(
            &self,
            _: &GrayImage,
            _: &str,
            _: &RecognitionOptions,
        ) -> Result<Vec<RawToken>, EngineError> {
            self.tokens
                .clone()
                .ok_or_else(|| EngineError::Failed("tsv unsupported".into()))
        }

        fn version(&self) -> Result<String, EngineError> {
            Ok("test".into())
        }
    }

    fn adapter(engine: Scripted) -> RecognitionAdapter {
        RecognitionAdapter::new(
            Arc::new(engine),
            Arc::new(FixedLanguage("eng".into())),
            RecognitionOptions::default(),
        )
    }

    #[test]
    fn filter_drops_blank_and_non_positive() {
        let input = vec![
            raw("Hello", 90.0),
            raw("   ", 95.0),
            raw("x", 0.0),
            raw("y", -1.0),
            raw("z", f32::NAN),
            raw(" world ", 80.0),
        ];
        let kept = filter_tokens(&input);
        assert_eq!(kept.len(), 2);
        assert!(kept.len() <= input.len());
        assert_eq!(kept[0].text, "Hello");
        assert_eq!(kept[1].text, "world");
        assert!((kept[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(kept[0].bounding_box, BoundingBox { x: 1, y: 2, width: 3, height: 4 });
    }

    #[test]
    fn confidence_is_length_weighted() {
        // (10 * 90 + 1 * 10) / 11 = 82.727…
        let c = aggregate_confidence(&[raw("recognised", 90.0), raw("a", 10.0)]);
        assert!((c - 0.827_272_7).abs() < 1e-4, "got {c}");
    }

    #[test]
    fn confidence_zero_without_tokens() {
        assert_eq!(aggregate_confidence(&[]), 0.0);
        assert_eq!(aggregate_confidence(&[raw(" ", 99.0), raw("a", -1.0)]), 0.0);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(aggregate_confidence(&[raw("over", 250.0)]), 1.0);
    }

    #[test]
    fn confidence_non_decreasing_in_token_confidence() {
        let base = [raw("alpha", 40.0), raw("be", 70.0), raw("c", 20.0)];
        let before = aggregate_confidence(&base);
        for i in 0..base.len() {
            let mut raised = base.clone();
            raised[i].confidence += 15.0;
            assert!(aggregate_confidence(&raised) >= before);
        }
    }

    #[test]
    fn structured_pass_fills_tokens() {
        let a = adapter(Scripted {
            text: Some("Hello world"),
            tokens: Some(vec![raw("Hello", 90.0), raw("world", 70.0)]),
        });
        let r = a.recognize(&GrayImage::new(4, 4), None).unwrap();
        assert_eq!(r.full_text, "Hello world");
        assert_eq!(r.language, "eng");
        assert_eq!(r.tokens.len(), 2);
        assert!((r.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn degraded_pass_uses_fallback_confidence() {
        let a = adapter(Scripted {
            text: Some("legacy text"),
            tokens: None,
        });
        let r = a.recognize(&GrayImage::new(4, 4), Some("deu")).unwrap();
        assert_eq!(r.full_text, "legacy text");
        assert!(r.tokens.is_empty());
        assert_eq!(r.confidence, FALLBACK_CONFIDENCE);
        assert_eq!(r.language, "deu");
    }

    #[test]
    fn text_rebuilt_from_tokens_when_transcription_fails() {
        let a = adapter(Scripted {
            text: None,
            tokens: Some(vec![raw("Hello", 90.0), raw("", 90.0), raw("world", 70.0)]),
        });
        let r = a.recognize(&GrayImage::new(4, 4), None).unwrap();
        assert_eq!(r.full_text, "Hello world");
    }

    #[test]
    fn both_passes_failing_is_an_error() {
        let a = adapter(Scripted {
            text: None,
            tokens: None,
        });
        let err = a.recognize(&GrayImage::new(4, 4), None).unwrap_err();
        assert!(matches!(err, OcrError::Recognition(_)));
    }
}
