//! Tesseract engine driven through its command-line interface.
//!
//! Each call writes the normalised page to a temporary PNG and runs
//! `tesseract <png> stdout -l <lang> <args…> [tsv]`. The TSV config makes
//! Tesseract emit one row per layout element:
//!
//! ```text
//! level page_num block_num par_num line_num word_num left top width height conf text
//! ```
//!
//! Word rows (level 5) carry a real confidence; structural rows report `-1`
//! and are dropped later by the recognition adapter's filter.

use super::{RawToken, RecognitionEngine, RecognitionOptions};
use crate::error::EngineError;
use image::GrayImage;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Reported when `tesseract --version` runs but prints no version token.
pub const UNKNOWN_VERSION: &str = "Installed (version unknown)";

static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tesseract\s+v?(\S+)").expect("valid regex"));

/// Tesseract OCR via the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    binary: PathBuf,
}

impl TesseractEngine {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str], extra: &[String]) -> Result<Output, EngineError> {
        Command::new(&self.binary)
            .args(args)
            .args(extra)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => EngineError::NotAvailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.binary.display()
                )),
                _ => EngineError::Io(e),
            })
    }

    fn run_on_image(
        &self,
        image: &GrayImage,
        language: &str,
        options: &RecognitionOptions,
        trailing: &[&str],
    ) -> Result<String, EngineError> {
        let staged = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(staged.path(), image::ImageFormat::Png)
            .map_err(|e| EngineError::Failed(format!("could not stage page image: {e}")))?;

        let mut extra = options.args.clone();
        extra.extend(trailing.iter().map(|s| s.to_string()));
        let output = self.run(
            &[path_arg(staged.path())?, "stdout", "-l", language],
            &extra,
        )?;
        if !output.status.success() {
            return Err(EngineError::Failed(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for TesseractEngine {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl RecognitionEngine for TesseractEngine {
    fn transcribe(
        &self,
        image: &GrayImage,
        language: &str,
        options: &RecognitionOptions,
    ) -> Result<String, EngineError> {
        let text = self.run_on_image(image, language, options, &[])?;
        Ok(text.trim().to_string())
    }

    fn tokenize(
        &self,
        image: &GrayImage,
        language: &str,
        options: &RecognitionOptions,
    ) -> Result<Vec<RawToken>, EngineError> {
        let tsv = self.run_on_image(image, language, options, &["tsv"])?;
        let tokens = parse_tsv(&tsv)?;
        debug!("tesseract tsv: {} rows", tokens.len());
        Ok(tokens)
    }

    fn version(&self) -> Result<String, EngineError> {
        let output = self.run(&["--version"], &[])?;
        // 3.x prints the banner on stderr, 4.x+ on stdout.
        let mut banner = String::from_utf8_lossy(&output.stdout).into_owned();
        banner.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(parse_version(&banner))
    }

    fn supported_languages(&self) -> Result<Vec<String>, EngineError> {
        let output = self.run(&["--list-langs"], &[])?;
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        listing.push_str(&String::from_utf8_lossy(&output.stderr));
        let langs = parse_language_list(&listing);
        if langs.is_empty() {
            return Err(EngineError::MalformedOutput(
                "tesseract --list-langs listed no languages".into(),
            ));
        }
        Ok(langs)
    }
}

fn path_arg(path: &Path) -> Result<&str, EngineError> {
    path.to_str()
        .ok_or_else(|| EngineError::Failed(format!("non UTF-8 temp path {}", path.display())))
}

/// Extract the version token from `tesseract --version` output.
pub fn parse_version(banner: &str) -> String {
    banner
        .lines()
        .find_map(|line| VERSION_RE.captures(line))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
}

/// Whether the engine predates structured-output support.
pub fn is_legacy_version(version: &str) -> bool {
    version.starts_with("3.") || version == UNKNOWN_VERSION
}

fn parse_language_list(listing: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.contains(' ') && !l.ends_with(':'))
        .map(str::to_string)
        .collect()
}

/// Parse Tesseract TSV output into raw tokens.
///
/// The header row is skipped. A row with an empty text column may be
/// missing its trailing field entirely; both shapes are accepted.
pub fn parse_tsv(tsv: &str) -> Result<Vec<RawToken>, EngineError> {
    let mut tokens = Vec::new();
    for (lineno, line) in tsv.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with("level") {
            continue;
        }
        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 11 {
            return Err(EngineError::MalformedOutput(format!(
                "tsv line {}: expected ≥11 columns, got {}",
                lineno + 1,
                cols.len()
            )));
        }
        let int = |idx: usize| -> Result<i32, EngineError> {
            cols[idx].trim().parse::<i32>().map_err(|e| {
                EngineError::MalformedOutput(format!("tsv line {} column {}: {e}", lineno + 1, idx))
            })
        };
        let confidence = cols[10].trim().parse::<f32>().map_err(|e| {
            EngineError::MalformedOutput(format!("tsv line {} confidence: {e}", lineno + 1))
        })?;
        tokens.push(RawToken {
            text: cols.get(11).copied().unwrap_or("").to_string(),
            confidence,
            left: int(6)?,
            top: int(7)?,
            width: int(8)?,
            height: int(9)?,
        });
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t640\t480\t-1\t\n\
5\t1\t1\t1\t1\t1\t36\t92\t60\t18\t96.063751\tHello\n\
5\t1\t1\t1\t1\t2\t104\t92\t70\t18\t91\tworld\n\
4\t1\t1\t1\t1\t0\t36\t92\t140\t18\t-1\n";

    #[test]
    fn parses_word_and_structure_rows() {
        let tokens = parse_tsv(SAMPLE_TSV).unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[1].text, "Hello");
        assert!((tokens[1].confidence - 96.063751).abs() < 1e-4);
        assert_eq!((tokens[1].left, tokens[1].top), (36, 92));
        assert_eq!(tokens[2].width, 70);
        assert_eq!(tokens[3].text, "");
        assert_eq!(tokens[3].confidence, -1.0);
    }

    #[test]
    fn rejects_truncated_rows() {
        let err = parse_tsv("5\t1\t1\n").unwrap_err();
        assert!(matches!(err, EngineError::MalformedOutput(_)));
    }

    #[test]
    fn version_from_modern_banner() {
        let banner = "tesseract 5.3.0\n leptonica-1.82.0\n  libgif 5.2.1";
        assert_eq!(parse_version(banner), "5.3.0");
        assert!(!is_legacy_version("5.3.0"));
    }

    #[test]
    fn version_from_v_prefixed_banner() {
        assert_eq!(parse_version("tesseract v5.0.0-alpha.20201127\n"), "5.0.0-alpha.20201127");
    }

    #[test]
    fn version_unknown_when_no_banner() {
        assert_eq!(parse_version("something else"), UNKNOWN_VERSION);
        assert!(is_legacy_version(UNKNOWN_VERSION));
        assert!(is_legacy_version("3.02"));
    }

    #[test]
    fn language_list_skips_header() {
        let listing = "List of available languages in \"/usr/share/tessdata/\" (3):\neng\nosd\ndeu\n";
        assert_eq!(parse_language_list(listing), vec!["eng", "osd", "deu"]);
    }

    #[test]
    fn missing_binary_is_not_available() {
        let engine = TesseractEngine::new("/definitely/not/a/tesseract");
        assert!(matches!(engine.version(), Err(EngineError::NotAvailable(_))));
    }
}
