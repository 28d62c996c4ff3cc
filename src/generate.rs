//! End-to-end generation: merge a template with content, then render a PDF.
//!
//! This is the one-call entry point the store (and the CLI) use. It runs the
//! pipeline stages in order and reports what each produced, including whether
//! the PDF came out full-fidelity or degraded.

use crate::config::RenderConfig;
use crate::error::Result;
use crate::pipeline::convert::{convert_to_pdf, ConvertedPdf};
use crate::pipeline::merge::{merge_template, QrCodeRef};
use crate::store::Template;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Everything a single generation run produced.
#[derive(Debug)]
pub struct GenerateOutput {
    /// The merged `.docx`, under `<web_root>/outputs/`.
    pub docx_path: PathBuf,
    /// The rendered PDF, tagged with its fidelity.
    pub pdf: ConvertedPdf,
    /// PDF path relative to the web root, suitable for persistence.
    pub pdf_relative: PathBuf,
    /// Whether the content placeholder was found and replaced (as opposed to
    /// the content being appended at the end of the body).
    pub replaced_placeholder: bool,
    /// One entry per URL occurrence in the content, in reading order.
    pub qr_codes: Vec<QrCodeRef>,
    /// Wall-clock timings, for logs and the CLI summary.
    pub stats: GenerateStats,
}

/// Per-stage wall-clock timings in milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateStats {
    pub merge_ms: u128,
    pub convert_ms: u128,
    pub total_ms: u128,
}

/// Merge `content` into `template` and render the result as a PDF.
///
/// On success both artifacts exist on disk; on error no record should be
/// persisted (partially written files under `outputs/` may remain and are
/// harmless).
pub async fn generate(
    template: &Template,
    content: &str,
    config: &RenderConfig,
) -> Result<GenerateOutput> {
    let start = Instant::now();

    let template_path = config.web_root.join(&template.file_path);
    let merged = merge_template(template.id, &template_path, content, config).await?;
    let merge_ms = start.elapsed().as_millis();

    let convert_start = Instant::now();
    let pdf = convert_to_pdf(&merged.path, config).await?;
    let convert_ms = convert_start.elapsed().as_millis();

    let stats = GenerateStats {
        merge_ms,
        convert_ms,
        total_ms: start.elapsed().as_millis(),
    };
    info!(
        "Generated from template {} in {} ms (merge {} ms, convert {} ms, {} QR codes{})",
        template.id,
        stats.total_ms,
        stats.merge_ms,
        stats.convert_ms,
        merged.qr_codes.len(),
        if pdf.is_degraded() { ", degraded PDF" } else { "" },
    );

    Ok(GenerateOutput {
        docx_path: merged.path,
        pdf_relative: config.relative_to_root(pdf.path()).to_path_buf(),
        pdf,
        replaced_placeholder: merged.replaced_placeholder,
        qr_codes: merged.qr_codes,
        stats,
    })
}

/// Blocking wrapper around [`generate`] for callers without a runtime.
pub fn generate_sync(
    template: &Template,
    content: &str,
    config: &RenderConfig,
) -> Result<GenerateOutput> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(generate(template, content, config))
}
