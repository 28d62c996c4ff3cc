//! Template and document records, persisted in a JSON catalog.
//!
//! The catalog (`<web_root>/catalog.json`) is the single source of truth for
//! record metadata; the files it references live under the web root
//! ([`RenderConfig::web_root`]). Records store paths relative to that root so
//! the whole tree can be relocated. Catalog writes go through a temp file and
//! a rename, so a crash mid-save never leaves a half-written catalog.
//!
//! Mutating operations persist only after their side effects succeed: a
//! failed generation leaves no document record behind.

use crate::config::RenderConfig;
use crate::error::{DocMergeError, Result};
use crate::generate::{generate, GenerateOutput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CATALOG_FILE: &str = "catalog.json";

/// An uploaded `.docx` template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: u64,
    pub name: String,
    pub description: String,
    /// Backing file path relative to the web root.
    pub file_path: String,
    /// File name the template was uploaded under, kept for display.
    pub original_file_name: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A document generated from a template and free-text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: u64,
    pub title: String,
    pub description: String,
    /// The free text merged into the template. Kept verbatim so edits can
    /// regenerate from scratch.
    pub content: String,
    pub template_id: u64,
    /// Rendered PDF path relative to the web root. `None` only for records
    /// written before a PDF existed (should not happen in practice).
    pub output_pdf_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Catalog {
    templates: Vec<Template>,
    documents: Vec<Document>,
    next_template_id: u64,
    next_document_id: u64,
}

/// The record store: catalog plus the artifact tree under the web root.
#[derive(Debug)]
pub struct Store {
    config: RenderConfig,
    catalog: Catalog,
    catalog_path: PathBuf,
}

impl Store {
    /// Open (or initialise) the store under `config.web_root`.
    ///
    /// Creates the directory skeleton and loads the catalog if one exists.
    /// A present but unparseable catalog is an error, not a silent reset —
    /// overwriting it would orphan every artifact on disk.
    pub fn open(config: RenderConfig) -> Result<Self> {
        for dir in [
            config.web_root.clone(),
            config.templates_dir(),
            config.outputs_dir(),
            config.pdf_dir(),
            config.qr_dir(),
        ] {
            std::fs::create_dir_all(&dir).map_err(|e| DocMergeError::OutputWrite {
                path: dir.clone(),
                source: e,
            })?;
        }

        let catalog_path = config.web_root.join(CATALOG_FILE);
        let catalog = if catalog_path.exists() {
            let data = std::fs::read_to_string(&catalog_path)?;
            serde_json::from_str(&data).map_err(|e| DocMergeError::CatalogCorrupt {
                path: catalog_path.clone(),
                source: e,
            })?
        } else {
            Catalog {
                next_template_id: 1,
                next_document_id: 1,
                ..Catalog::default()
            }
        };

        debug!(
            "Opened store at {} ({} templates, {} documents)",
            config.web_root.display(),
            catalog.templates.len(),
            catalog.documents.len()
        );
        Ok(Self {
            config,
            catalog,
            catalog_path,
        })
    }

    /// The configuration this store was opened with.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Write the catalog atomically (temp file, then rename).
    fn save_catalog(&self) -> Result<()> {
        let tmp = self.catalog_path.with_extension("json.tmp");
        let data = serde_json::to_string_pretty(&self.catalog)?;
        std::fs::write(&tmp, data).map_err(|e| DocMergeError::OutputWrite {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.catalog_path).map_err(|e| DocMergeError::OutputWrite {
            path: self.catalog_path.clone(),
            source: e,
        })?;
        Ok(())
    }

    // ── Templates ────────────────────────────────────────────────────────

    /// All templates, in upload order.
    pub fn templates(&self) -> &[Template] {
        &self.catalog.templates
    }

    /// Look up a template by id.
    pub fn template(&self, id: u64) -> Result<&Template> {
        self.catalog
            .templates
            .iter()
            .find(|t| t.id == id)
            .ok_or(DocMergeError::TemplateNotFound { id })
    }

    /// Upload a template: validate, copy under `templates/`, record it.
    ///
    /// Only `.docx` files (case-insensitive extension) that exist and are
    /// non-empty are accepted. The stored copy gets a fresh UUID name, so
    /// uploading the same file twice yields two independent templates.
    pub async fn add_template(
        &mut self,
        name: &str,
        description: &str,
        source: &Path,
    ) -> Result<&Template> {
        let original_file_name = source
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let ext_ok = source
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("docx"));
        if !ext_ok {
            return Err(DocMergeError::InvalidUpload {
                reason: format!("'{original_file_name}' is not a .docx file"),
            });
        }
        let meta = tokio::fs::metadata(source)
            .await
            .map_err(|e| DocMergeError::InvalidUpload {
                reason: format!("cannot read '{}': {e}", source.display()),
            })?;
        if meta.len() == 0 {
            return Err(DocMergeError::InvalidUpload {
                reason: format!("'{original_file_name}' is empty"),
            });
        }

        let stored_name = format!("{}.docx", Uuid::new_v4());
        let dest = self.config.templates_dir().join(&stored_name);
        tokio::fs::copy(source, &dest)
            .await
            .map_err(|e| DocMergeError::OutputWrite {
                path: dest.clone(),
                source: e,
            })?;

        let id = self.catalog.next_template_id;
        self.catalog.next_template_id += 1;
        let file_path = self
            .config
            .relative_to_root(&dest)
            .to_string_lossy()
            .into_owned();
        self.catalog.templates.push(Template {
            id,
            name: name.to_string(),
            description: description.to_string(),
            file_path,
            original_file_name,
            uploaded_at: Utc::now(),
        });
        self.save_catalog()?;

        info!("Uploaded template {id} ('{name}')");
        Ok(&self.catalog.templates[self.catalog.templates.len() - 1])
    }

    /// Delete a template record and its backing file.
    ///
    /// A missing backing file is logged and ignored: the point of deletion is
    /// that the template is gone afterwards. Documents generated from the
    /// template keep their records and PDFs.
    pub fn delete_template(&mut self, id: u64) -> Result<()> {
        let pos = self
            .catalog
            .templates
            .iter()
            .position(|t| t.id == id)
            .ok_or(DocMergeError::TemplateNotFound { id })?;
        let record = self.catalog.templates.remove(pos);
        self.save_catalog()?;

        let backing = self.config.web_root.join(&record.file_path);
        if let Err(e) = std::fs::remove_file(&backing) {
            warn!(
                "Template {id} deleted but backing file {} could not be removed: {e}",
                backing.display()
            );
        }
        info!("Deleted template {id}");
        Ok(())
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// All documents, in creation order.
    pub fn documents(&self) -> &[Document] {
        &self.catalog.documents
    }

    /// Look up a document by id.
    pub fn document(&self, id: u64) -> Result<&Document> {
        self.catalog
            .documents
            .iter()
            .find(|d| d.id == id)
            .ok_or(DocMergeError::DocumentNotFound { id })
    }

    /// Create a document: merge, render, then persist the record.
    ///
    /// Generation runs before anything is recorded, so a failed merge or
    /// conversion leaves the catalog untouched.
    pub async fn create_document(
        &mut self,
        title: &str,
        description: &str,
        content: &str,
        template_id: u64,
    ) -> Result<&Document> {
        let template = self.template(template_id)?.clone();
        let output = generate(&template, content, &self.config).await?;

        let id = self.catalog.next_document_id;
        self.catalog.next_document_id += 1;
        self.catalog.documents.push(Document {
            id,
            title: title.to_string(),
            description: description.to_string(),
            content: content.to_string(),
            template_id,
            output_pdf_path: Some(output.pdf_relative.to_string_lossy().into_owned()),
            created_at: Utc::now(),
            modified_at: None,
        });
        self.save_catalog()?;

        log_generation(id, &output);
        Ok(&self.catalog.documents[self.catalog.documents.len() - 1])
    }

    /// Edit a document and regenerate its PDF from the (possibly new)
    /// template and content. The old PDF is left on disk; the record points
    /// at the fresh one.
    pub async fn update_document(
        &mut self,
        id: u64,
        title: &str,
        description: &str,
        content: &str,
        template_id: u64,
    ) -> Result<&Document> {
        // Validate both record and template before any side effects.
        self.document(id)?;
        let template = self.template(template_id)?.clone();
        let output = generate(&template, content, &self.config).await?;

        // Lookups above guarantee the record exists.
        if let Some(doc) = self.catalog.documents.iter_mut().find(|d| d.id == id) {
            doc.title = title.to_string();
            doc.description = description.to_string();
            doc.content = content.to_string();
            doc.template_id = template_id;
            doc.output_pdf_path = Some(output.pdf_relative.to_string_lossy().into_owned());
            doc.modified_at = Some(Utc::now());
        }
        self.save_catalog()?;

        log_generation(id, &output);
        self.document(id)
    }

    /// Delete a document record and its rendered PDF.
    ///
    /// Like [`Store::delete_template`], a missing PDF is not an error.
    pub fn delete_document(&mut self, id: u64) -> Result<()> {
        let pos = self
            .catalog
            .documents
            .iter()
            .position(|d| d.id == id)
            .ok_or(DocMergeError::DocumentNotFound { id })?;
        let record = self.catalog.documents.remove(pos);
        self.save_catalog()?;

        if let Some(rel) = record.output_pdf_path {
            let pdf = self.config.web_root.join(rel);
            if let Err(e) = std::fs::remove_file(&pdf) {
                warn!(
                    "Document {id} deleted but PDF {} could not be removed: {e}",
                    pdf.display()
                );
            }
        }
        info!("Deleted document {id}");
        Ok(())
    }

    /// Absolute path of a document's rendered PDF, verified to exist.
    ///
    /// [`DocMergeError::ArtifactMissing`] means the record is fine but the
    /// file is gone (moved, cleaned up, never written); callers can offer a
    /// regenerate instead of treating it as corruption.
    pub fn document_pdf(&self, id: u64) -> Result<PathBuf> {
        let doc = self.document(id)?;
        let rel = doc
            .output_pdf_path
            .as_deref()
            .ok_or_else(|| DocMergeError::ArtifactMissing {
                path: self.config.pdf_dir(),
            })?;
        let path = self.config.web_root.join(rel);
        if !path.exists() {
            return Err(DocMergeError::ArtifactMissing { path });
        }
        Ok(path)
    }
}

fn log_generation(id: u64, output: &GenerateOutput) {
    info!(
        "Document {id}: {} ({}{})",
        output.pdf.path().display(),
        if output.replaced_placeholder {
            "placeholder replaced"
        } else {
            "content appended"
        },
        if output.pdf.is_degraded() {
            ", degraded PDF"
        } else {
            ""
        },
    );
}
