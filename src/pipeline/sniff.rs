//! Content-type classification of staged uploads.
//!
//! Classification looks at magic bytes, never at the declared name, through
//! the `infer` signature table. Anything it does not recognise is
//! [`UNKNOWN_MIME`], which callers attempt rather than reject.

use crate::config::extension_of;
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub const PDF_MIME: &str = "application/pdf";
pub const UNKNOWN_MIME: &str = "unknown";

/// Bytes read from the head of a file for classification.
const SNIFF_LEN: u64 = 8192;

/// How a staged file is split into pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Multi-page document rasterised page by page.
    Pdf,
    /// A single raster image.
    Image,
}

impl SourceKind {
    /// Route by sniffed type, falling back to the file name only when the
    /// type is unknown.
    pub fn resolve(mime: &str, file_name: &str) -> Self {
        if mime == PDF_MIME {
            return SourceKind::Pdf;
        }
        if mime == UNKNOWN_MIME && extension_of(file_name).as_deref() == Some(".pdf") {
            return SourceKind::Pdf;
        }
        SourceKind::Image
    }
}

/// Classify a byte prefix.
pub fn classify_bytes(head: &[u8]) -> &'static str {
    infer::get(head)
        .map(|kind| kind.mime_type())
        .unwrap_or(UNKNOWN_MIME)
}

/// Classify the file at `path`. Unreadable files classify as unknown; the
/// read failure resurfaces when the file is actually loaded.
pub fn classify(path: &Path) -> String {
    let mut head = Vec::with_capacity(SNIFF_LEN as usize);
    let read = std::fs::File::open(path).and_then(|f| f.take(SNIFF_LEN).read_to_end(&mut head));
    if let Err(e) = read {
        debug!("could not sniff {}: {}", path.display(), e);
        return UNKNOWN_MIME.to_string();
    }
    classify_bytes(&head).to_string()
}
