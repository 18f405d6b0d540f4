//! Content extraction boundary (§4.7, added).
//!
//! PDF/OCR/office-format extraction is out of scope; the crate ships only a
//! plain-text reader and leaves richer formats to a caller-supplied
//! `Extractor` implementation.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::types::ItemKind;

/// Bytes read per file before extraction is abandoned as oversized.
pub const MAX_FILE_READ: u64 = 64 * 1024 * 1024;

#[derive(Debug, Default)]
pub struct CancellationFlag(AtomicBool);

impl CancellationFlag {
    pub fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractResult {
    Ok(String),
    Inaccessible,
    Timeout,
    UnsupportedFormat,
    Unknown(String),
    Cancelled,
}

pub trait Extractor: Send + Sync {
    fn extract(&self, path: &Path, kind: ItemKind, cancel: &CancellationFlag) -> ExtractResult;
}

/// Reads UTF-8 text, falling back to a lossy Latin-1 decode, for Text/Code/
/// Markdown items only.
pub struct PlainTextExtractor;

impl Extractor for PlainTextExtractor {
    fn extract(&self, path: &Path, kind: ItemKind, cancel: &CancellationFlag) -> ExtractResult {
        if !matches!(kind, ItemKind::Text | ItemKind::Code | ItemKind::Markdown) {
            return ExtractResult::UnsupportedFormat;
        }
        if cancel.is_cancelled() {
            return ExtractResult::Cancelled;
        }

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return ExtractResult::Inaccessible,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ExtractResult::Inaccessible,
            Err(e) => return ExtractResult::Unknown(e.to_string()),
        };
        if metadata.len() > MAX_FILE_READ {
            return ExtractResult::Timeout;
        }

        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return ExtractResult::Inaccessible,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return ExtractResult::Inaccessible,
            Err(e) => return ExtractResult::Unknown(e.to_string()),
        };

        if cancel.is_cancelled() {
            return ExtractResult::Cancelled;
        }

        match String::from_utf8(bytes) {
            Ok(text) => ExtractResult::Ok(text),
            Err(e) => {
                let bytes = e.into_bytes();
                ExtractResult::Ok(bytes.iter().map(|&b| b as char).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn extracts_utf8_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(f, "hello world").unwrap();

        let cancel = CancellationFlag::new();
        let result = PlainTextExtractor.extract(&path, ItemKind::Text, &cancel);
        assert_eq!(result, ExtractResult::Ok("hello world".to_string()));
    }

    #[test]
    fn rejects_unsupported_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let cancel = CancellationFlag::new();
        let result = PlainTextExtractor.extract(&path, ItemKind::Image, &cancel);
        assert_eq!(result, ExtractResult::UnsupportedFormat);
    }

    #[test]
    fn reports_inaccessible_for_missing_file() {
        let cancel = CancellationFlag::new();
        let result = PlainTextExtractor.extract(Path::new("/nonexistent/path/x.txt"), ItemKind::Text, &cancel);
        assert_eq!(result, ExtractResult::Inaccessible);
    }

    #[test]
    fn honors_cancellation_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result = PlainTextExtractor.extract(&path, ItemKind::Text, &cancel);
        assert_eq!(result, ExtractResult::Cancelled);
    }
}
