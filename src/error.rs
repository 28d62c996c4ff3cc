//! Error types for the docmerge library.
//!
//! A single [`DocMergeError`] enum covers the whole surface, but the variants
//! fall into distinct classes with distinct handling:
//!
//! * **Validation** (`InvalidUpload`) — rejected before anything touches disk.
//! * **Reference misses** (`TemplateNotFound`, `DocumentNotFound`) — surfaced
//!   before the pipeline runs.
//! * **Merge failures** (`MalformedPackage`, `QrEncodingFailed`,
//!   `OutputWrite`) — abort the pipeline; no record is persisted.
//! * **Conversion failures** (`ConversionFailed`, `FallbackFailed`) —
//!   `ConversionFailed` is recovered internally by the degraded text-only
//!   path and only logged; callers see a conversion error solely when the
//!   fallback itself dies (`FallbackFailed`).
//! * **Soft misses** (`ArtifactMissing`) — an artifact recorded in the
//!   catalog whose file was deleted out-of-band. Reported, never a panic.
//!
//! Nothing is retried automatically beyond the single documented converter
//! fallback, and no error here is treated as process-fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the library.
pub type Result<T> = std::result::Result<T, DocMergeError>;

/// All errors returned by the docmerge library.
#[derive(Debug, Error)]
pub enum DocMergeError {
    // ── Validation ────────────────────────────────────────────────────────
    /// An uploaded template failed validation before being stored.
    #[error("Invalid template upload: {reason}")]
    InvalidUpload { reason: String },

    // ── Reference misses ──────────────────────────────────────────────────
    /// No template record with this id exists in the catalog.
    #[error("Template {id} not found")]
    TemplateNotFound { id: u64 },

    /// No document record with this id exists in the catalog.
    #[error("Document {id} not found")]
    DocumentNotFound { id: u64 },

    // ── Merge ─────────────────────────────────────────────────────────────
    /// The template package could not be opened or rewritten as a .docx.
    #[error("Template package {path:?} is malformed: {detail}")]
    MalformedPackage { path: PathBuf, detail: String },

    /// The QR encoder rejected the input text.
    #[error("QR encoding failed for '{text}': {detail}")]
    QrEncodingFailed { text: String, detail: String },

    /// Could not create or write a pipeline output file.
    #[error("Failed to write output file {path:?}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Conversion ────────────────────────────────────────────────────────
    /// The external converter ran but did not produce a PDF.
    ///
    /// Never escapes [`crate::pipeline::convert`]: it is logged and the
    /// degraded text-only path is attempted instead.
    #[error("External converter failed: {detail}")]
    ConversionFailed { detail: String },

    /// The degraded text-only conversion failed as well. This is the only
    /// way a conversion error reaches the caller.
    #[error("Fallback PDF conversion failed: {detail}")]
    FallbackFailed { detail: String },

    // ── Retrieval ─────────────────────────────────────────────────────────
    /// A recorded artifact path no longer corresponds to a file on disk.
    #[error("Artifact not found on disk: {path:?}\nThe file may have been deleted out-of-band; regenerate the document.")]
    ArtifactMissing { path: PathBuf },

    // ── Catalog / ambient ─────────────────────────────────────────────────
    /// The catalog file exists but could not be parsed.
    #[error("Catalog {path:?} is corrupt: {source}")]
    CatalogCorrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Catalog serialisation failed.
    #[error("Serialisation error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Uncontextualised I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_not_found_display() {
        let e = DocMergeError::TemplateNotFound { id: 7 };
        assert_eq!(e.to_string(), "Template 7 not found");
    }

    #[test]
    fn malformed_package_display_includes_path() {
        let e = DocMergeError::MalformedPackage {
            path: PathBuf::from("/tmp/t.docx"),
            detail: "missing word/document.xml".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/t.docx"), "got: {msg}");
        assert!(msg.contains("missing word/document.xml"));
    }

    #[test]
    fn artifact_missing_display_hints_regeneration() {
        let e = DocMergeError::ArtifactMissing {
            path: PathBuf::from("outputs/pdfs/x.pdf"),
        };
        assert!(e.to_string().contains("regenerate"));
    }
}
