//! Template merging: content substitution and QR image embedding.
//!
//! The merge always works on a fresh copy of the template package — the
//! uploaded template is never mutated. The copy's name embeds the template id
//! and a local timestamp at second granularity
//! (`processed_<id>_<yyyyMMddHHmmss>.docx`); two merges of the same template
//! inside the same second therefore collide on the working file. Known,
//! documented behaviour of the naming scheme.

use crate::config::RenderConfig;
use crate::docx::body::{self, QrAttachment};
use crate::docx::DocxPackage;
use crate::error::{DocMergeError, Result};
use crate::pipeline::{qr, urls};
use std::path::PathBuf;
use tracing::{debug, info};

/// A URL found in the content and the QR image generated for it.
#[derive(Debug, Clone)]
pub struct QrCodeRef {
    pub url: String,
    pub image_path: PathBuf,
}

/// Result of merging content into a template copy.
#[derive(Debug)]
pub struct MergedDocument {
    /// The merged `.docx` under `<web_root>/outputs/`.
    pub path: PathBuf,
    /// Whether the `{{CONTENT}}` placeholder was found and replaced in
    /// place (`false`: content was appended as a trailing paragraph).
    pub replaced_placeholder: bool,
    /// QR codes generated and embedded, in first-occurrence order,
    /// duplicates included.
    pub qr_codes: Vec<QrCodeRef>,
}

/// Merge `content` into a copy of the template at `template_path`.
///
/// Steps: copy the package to the outputs directory, substitute the
/// placeholder (or append), generate one QR code per URL occurrence in the
/// content, embed each image, and save the package in place. Any failure
/// surfaces as a merge error; the original template is untouched either way.
pub async fn merge_template(
    template_id: u64,
    template_path: &std::path::Path,
    content: &str,
    config: &RenderConfig,
) -> Result<MergedDocument> {
    let outputs = config.outputs_dir();
    tokio::fs::create_dir_all(&outputs)
        .await
        .map_err(|e| DocMergeError::OutputWrite {
            path: outputs.clone(),
            source: e,
        })?;

    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let work_path = outputs.join(format!("processed_{template_id}_{stamp}.docx"));

    tokio::fs::copy(template_path, &work_path)
        .await
        .map_err(|e| DocMergeError::OutputWrite {
            path: work_path.clone(),
            source: e,
        })?;
    debug!(
        "Copied template {} → {}",
        template_path.display(),
        work_path.display()
    );

    // One QR code per URL occurrence, duplicates included, in text order.
    let mut qr_codes = Vec::new();
    let mut qr_images: Vec<(String, Vec<u8>)> = Vec::new();
    for url in urls::extract_urls(content) {
        let (image_path, bytes) = qr::write_qr_code(url, config).await?;
        qr_codes.push(QrCodeRef {
            url: url.to_string(),
            image_path,
        });
        qr_images.push((url.to_string(), bytes));
    }

    let mut pkg = DocxPackage::open(&work_path)?;

    let mut attachments = Vec::with_capacity(qr_images.len());
    for (url, bytes) in &qr_images {
        let rel_id = pkg.add_image(bytes, "png")?;
        attachments.push(QrAttachment {
            url: url.clone(),
            rel_id,
        });
    }

    let xml = pkg.document_xml()?;
    let (xml, replaced) = body::merge_body(&xml, content, &attachments)?;
    pkg.set_document_xml(xml);

    // In-place save; a failure mid-write can corrupt the working file, in
    // which case the whole merge is reported as failed.
    pkg.save(&work_path)?;

    info!(
        "Merged template {} → {} ({} QR code(s), placeholder {})",
        template_id,
        work_path.display(),
        qr_codes.len(),
        if replaced { "replaced" } else { "absent, content appended" }
    );

    Ok(MergedDocument {
        path: work_path,
        replaced_placeholder: replaced,
        qr_codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::body::QR_LABEL;
    use crate::docx::testutil::write_minimal_docx;
    use std::path::Path;

    fn minimal_docx(dir: &Path, body_xml: &str) -> PathBuf {
        let path = dir.join("template.docx");
        std::fs::write(&path, write_minimal_docx(body_xml)).unwrap();
        path
    }

    fn config(root: &Path) -> RenderConfig {
        RenderConfig::builder().web_root(root).build().unwrap()
    }

    #[tokio::test]
    async fn merge_replaces_placeholder_and_leaves_template_alone() {
        let dir = tempfile::tempdir().unwrap();
        let template =
            minimal_docx(dir.path(), "<w:p><w:r><w:t>A {{CONTENT}} Z</w:t></w:r></w:p>");
        let before = std::fs::read(&template).unwrap();

        let merged = merge_template(1, &template, "middle", &config(dir.path()))
            .await
            .unwrap();

        assert!(merged.replaced_placeholder);
        assert!(merged.path.exists());
        let xml = DocxPackage::open(&merged.path)
            .unwrap()
            .document_xml()
            .unwrap();
        assert!(xml.contains("A middle Z"));
        assert_eq!(std::fs::read(&template).unwrap(), before, "template untouched");
    }

    #[tokio::test]
    async fn merge_without_placeholder_appends_content() {
        let dir = tempfile::tempdir().unwrap();
        let template = minimal_docx(dir.path(), "<w:p><w:r><w:t>static</w:t></w:r></w:p>");

        let merged = merge_template(2, &template, "tail content", &config(dir.path()))
            .await
            .unwrap();

        assert!(!merged.replaced_placeholder);
        let xml = DocxPackage::open(&merged.path)
            .unwrap()
            .document_xml()
            .unwrap();
        let texts = crate::docx::body::paragraph_texts(&xml).unwrap();
        assert_eq!(texts, vec!["static", "tail content"]);
    }

    #[tokio::test]
    async fn no_urls_means_no_qr_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let template = minimal_docx(dir.path(), "<w:p><w:r><w:t>{{CONTENT}}</w:t></w:r></w:p>");

        let merged = merge_template(3, &template, "no links here", &config(dir.path()))
            .await
            .unwrap();

        assert!(merged.qr_codes.is_empty());
        let xml = DocxPackage::open(&merged.path)
            .unwrap()
            .document_xml()
            .unwrap();
        assert!(!xml.contains(QR_LABEL));
        assert!(!xml.contains("w:drawing"));
    }

    #[tokio::test]
    async fn duplicate_url_embeds_two_distinct_qr_images() {
        let dir = tempfile::tempdir().unwrap();
        let template = minimal_docx(dir.path(), "<w:p><w:r><w:t>{{CONTENT}}</w:t></w:r></w:p>");

        let content = "first https://example.com then again https://example.com";
        let merged = merge_template(4, &template, content, &config(dir.path()))
            .await
            .unwrap();

        assert_eq!(merged.qr_codes.len(), 2);
        assert_ne!(merged.qr_codes[0].image_path, merged.qr_codes[1].image_path);
        assert!(merged.qr_codes.iter().all(|q| q.image_path.exists()));

        let xml = DocxPackage::open(&merged.path)
            .unwrap()
            .document_xml()
            .unwrap();
        assert!(xml.contains(QR_LABEL));
        assert_eq!(xml.matches("<w:drawing>").count(), 2);
    }

    #[tokio::test]
    async fn malformed_template_is_a_merge_error() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("broken.docx");
        std::fs::write(&bogus, b"definitely not a zip").unwrap();

        let err = merge_template(5, &bogus, "content", &config(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, DocMergeError::MalformedPackage { .. }));
    }
}
