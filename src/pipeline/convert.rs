//! Word-to-PDF conversion with a degraded fallback.
//!
//! Two strategies, in strict order:
//!
//! 1. **Primary** — the headless office suite at
//!    [`RenderConfig::soffice_path`](crate::config::RenderConfig::soffice_path),
//!    invoked as `soffice --headless --convert-to pdf --outdir <dir> <input>`
//!    and awaited synchronously with no timeout (a hung converter hangs the
//!    caller; known gap, preserved). Non-zero exit is a failure carrying the
//!    captured stderr, as is a clean exit that produced no PDF.
//! 2. **Fallback** — when the binary is absent or the primary attempt fails
//!    for any reason: extract the body's plain text and typeset it into a
//!    freshly built PDF. Everything that is not body text — images (including
//!    the QR codes the merger embedded), tables, styling — is discarded.
//!    The fallback is lossy by contract; downstream behaviour depends on it.
//!
//! Primary failures are logged and swallowed; the caller only ever sees an
//! error when the fallback itself fails. The two outcomes are distinguished
//! in the return type ([`ConvertedPdf`]) so callers can tell a full-fidelity
//! PDF from a degraded one.

use crate::config::RenderConfig;
use crate::docx::{body, DocxPackage};
use crate::error::{DocMergeError, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A produced PDF, tagged by conversion fidelity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvertedPdf {
    /// Full-fidelity output from the external converter.
    Converted(PathBuf),
    /// Lossy text-only output from the fallback path.
    Degraded(PathBuf),
}

impl ConvertedPdf {
    /// Path of the PDF regardless of fidelity.
    pub fn path(&self) -> &Path {
        match self {
            ConvertedPdf::Converted(p) | ConvertedPdf::Degraded(p) => p,
        }
    }

    /// True when the PDF came from the lossy text-only fallback.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConvertedPdf::Degraded(_))
    }
}

/// Convert a merged `.docx` to a PDF under `<web_root>/outputs/pdfs/`.
///
/// Always returns a PDF path or an error; see the module docs for the
/// primary/fallback contract.
pub async fn convert_to_pdf(docx_path: &Path, config: &RenderConfig) -> Result<ConvertedPdf> {
    let pdf_dir = config.pdf_dir();
    tokio::fs::create_dir_all(&pdf_dir)
        .await
        .map_err(|e| DocMergeError::OutputWrite {
            path: pdf_dir.clone(),
            source: e,
        })?;

    let stem = docx_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let pdf_path = pdf_dir.join(format!("{stem}.pdf"));

    if config.soffice_path.exists() {
        match run_external(&config.soffice_path, docx_path, &pdf_dir, &pdf_path).await {
            Ok(()) => {
                info!("Converted {} → {}", docx_path.display(), pdf_path.display());
                return Ok(ConvertedPdf::Converted(pdf_path));
            }
            Err(e) => {
                warn!("External converter failed, degrading to text-only PDF: {e}");
            }
        }
    } else {
        info!(
            "No converter at {}, using text-only fallback",
            config.soffice_path.display()
        );
    }

    fallback_convert(docx_path, &pdf_path)?;
    info!(
        "Degraded conversion {} → {}",
        docx_path.display(),
        pdf_path.display()
    );
    Ok(ConvertedPdf::Degraded(pdf_path))
}

/// Run the external converter and verify it produced the expected file.
async fn run_external(
    soffice: &Path,
    input: &Path,
    outdir: &Path,
    expected: &Path,
) -> Result<()> {
    debug!("Running {} on {}", soffice.display(), input.display());
    let output = Command::new(soffice)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(outdir)
        .arg(input)
        .output()
        .await
        .map_err(|e| DocMergeError::ConversionFailed {
            detail: format!("failed to launch '{}': {e}", soffice.display()),
        })?;

    if !output.status.success() {
        return Err(DocMergeError::ConversionFailed {
            detail: format!(
                "exit status {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    if !expected.exists() {
        return Err(DocMergeError::ConversionFailed {
            detail: format!(
                "converter exited cleanly but '{}' was not produced",
                expected.display()
            ),
        });
    }
    Ok(())
}

/// Text-only conversion: body text → freshly built PDF.
///
/// Errors here are the only conversion errors a caller can observe.
fn fallback_convert(docx_path: &Path, pdf_path: &Path) -> Result<()> {
    let text = (|| -> Result<String> {
        let pkg = DocxPackage::open(docx_path)?;
        body::extract_text(&pkg.document_xml()?)
    })()
    .map_err(|e| DocMergeError::FallbackFailed {
        detail: format!("could not extract text from '{}': {e}", docx_path.display()),
    })?;

    write_text_pdf(&text, pdf_path)
}

// ── Minimal PDF writer ───────────────────────────────────────────────────

const PAGE_WIDTH: f32 = 595.0; // A4 portrait, points
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 72.0;
const FONT_SIZE: f32 = 11.0;
const LEADING: f32 = 14.0;
const WRAP_COLUMNS: usize = 90;

/// Typeset plain text into a new PDF at `path` (Helvetica, naive wrap,
/// paginated). No images, no styling — this is the degraded path.
pub fn write_text_pdf(text: &str, path: &Path) -> Result<()> {
    let fail = |detail: String| DocMergeError::FallbackFailed { detail };

    let lines = wrap_lines(text, WRAP_COLUMNS);
    let lines_per_page = ((PAGE_HEIGHT - 2.0 * MARGIN) / LEADING) as usize;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    // An empty document still gets one (blank) page.
    let empty: &[String] = &[];
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![empty]
    } else {
        lines.chunks(lines_per_page.max(1)).collect()
    };

    for page_lines in pages {
        let mut ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
            Operation::new("TL", vec![LEADING.into()]),
            Operation::new("Td", vec![MARGIN.into(), (PAGE_HEIGHT - MARGIN).into()]),
        ];
        for line in page_lines {
            ops.push(Operation::new("Tj", vec![Object::string_literal(latin1(line))]));
            ops.push(Operation::new("T*", vec![]));
        }
        ops.push(Operation::new("ET", vec![]));

        let content = Content { operations: ops };
        let encoded = content.encode().map_err(|e| fail(e.to_string()))?;
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => resources_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.save(path)
        .map_err(|e| fail(format!("writing '{}': {e}", path.display())))?;
    Ok(())
}

/// Naive column wrap on whitespace; hard-breaks words longer than `cols`.
fn wrap_lines(text: &str, cols: usize) -> Vec<String> {
    let mut out = Vec::new();
    for raw in text.lines() {
        if raw.is_empty() {
            out.push(String::new());
            continue;
        }
        let mut line = String::new();
        for word in raw.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > cols {
                out.push(std::mem::take(&mut line));
            }
            let mut word = word;
            while word.chars().count() > cols {
                let cut: String = word.chars().take(cols).collect();
                out.push(cut.clone());
                word = &word[cut.len()..];
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        out.push(line);
    }
    out
}

/// Project text onto Latin-1 for the built-in Helvetica font; anything
/// outside the codepage becomes `?`.
fn latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| if (c as u32) < 256 { c as u8 } else { b'?' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::testutil::write_minimal_docx;

    #[test]
    fn wrap_respects_columns_and_blank_lines() {
        let text = "alpha beta gamma\n\nshort";
        let lines = wrap_lines(text, 11);
        assert_eq!(lines, vec!["alpha beta", "gamma", "", "short"]);
    }

    #[test]
    fn wrap_hard_breaks_long_words() {
        let lines = wrap_lines("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn latin1_replaces_out_of_range() {
        assert_eq!(latin1("abc✓"), b"abc?".to_vec());
    }

    #[test]
    fn text_pdf_is_a_valid_nonempty_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdf");
        write_text_pdf("hello fallback world", &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 100);
    }

    #[test]
    fn empty_text_still_produces_a_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pdf");
        write_text_pdf("", &path).unwrap();
        assert!(std::fs::read(&path).unwrap().starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn missing_converter_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("doc.docx");
        std::fs::write(
            &docx,
            write_minimal_docx("<w:p><w:r><w:t>only text</w:t></w:r></w:p>"),
        )
        .unwrap();

        let config = RenderConfig::builder()
            .web_root(dir.path())
            .soffice_path("/nonexistent/soffice")
            .build()
            .unwrap();

        let pdf = convert_to_pdf(&docx, &config).await.unwrap();
        assert!(pdf.is_degraded());
        assert!(pdf.path().exists());
        assert_eq!(pdf.path().extension().unwrap(), "pdf");
    }

    #[tokio::test]
    async fn broken_primary_falls_back_silently() {
        // A "converter" that exists but always fails: /bin/false takes the
        // soffice arguments and exits non-zero, which must be swallowed.
        let dir = tempfile::tempdir().unwrap();
        let docx = dir.path().join("doc.docx");
        std::fs::write(
            &docx,
            write_minimal_docx("<w:p><w:r><w:t>fallback me</w:t></w:r></w:p>"),
        )
        .unwrap();

        let config = RenderConfig::builder()
            .web_root(dir.path())
            .soffice_path("/bin/false")
            .build()
            .unwrap();

        let pdf = convert_to_pdf(&docx, &config).await.unwrap();
        assert!(pdf.is_degraded());
        assert!(pdf.path().exists());
    }

    #[tokio::test]
    async fn unreadable_input_surfaces_fallback_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::builder()
            .web_root(dir.path())
            .soffice_path("/nonexistent/soffice")
            .build()
            .unwrap();

        let err = convert_to_pdf(&dir.path().join("ghost.docx"), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, DocMergeError::FallbackFailed { .. }));
    }
}
