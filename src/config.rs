//! Configuration for the merge-and-render pipeline.
//!
//! All behaviour is controlled through [`RenderConfig`], built via its
//! [`RenderConfigBuilder`]. Keeping every knob in one struct makes it easy to
//! share a config between the store, the merger and the converter, and to log
//! the exact settings a run used.

use crate::error::{DocMergeError, Result};
use std::path::{Path, PathBuf};

/// Configuration for producing a merged document and its PDF.
///
/// # Example
/// ```rust
/// use docmerge::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .web_root("wwwroot")
///     .qr_module_px(20)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Public root directory under which every artifact lives.
    ///
    /// Layout: `templates/<uuid>.docx`, `outputs/<name>.docx`,
    /// `outputs/pdfs/<name>.pdf`, `outputs/qrcodes/qrcode_<uuid>.png`.
    /// Persisted records store paths relative to this root, so the whole
    /// tree can be moved or served as static files without touching the
    /// catalog.
    pub web_root: PathBuf,

    /// Path to the headless office-suite binary used for full-fidelity
    /// PDF conversion. Default: the conventional install location for the
    /// current OS ([`default_soffice_path`]).
    ///
    /// When the binary is absent the converter silently degrades to a lossy
    /// text-only PDF; see [`crate::pipeline::convert`].
    pub soffice_path: PathBuf,

    /// Pixels per QR module in generated PNGs. Range: 1–64. Default: 20.
    ///
    /// 20 px/module gives roughly 600 px images for a short URL — large
    /// enough to scan from a printed page, small enough to keep the .docx
    /// package compact.
    pub qr_module_px: u32,
}

/// Conventional install location of the LibreOffice binary per OS.
///
/// The converter probes this exact path; there is no `$PATH` lookup. That
/// mirrors how deployments pin the converter version, and it makes the
/// degraded path deterministic in environments without an office suite.
pub fn default_soffice_path() -> PathBuf {
    if cfg!(target_os = "windows") {
        PathBuf::from(r"C:\Program Files\LibreOffice\program\soffice.exe")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("/Applications/LibreOffice.app/Contents/MacOS/soffice")
    } else {
        PathBuf::from("/usr/bin/soffice")
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            web_root: PathBuf::from("wwwroot"),
            soffice_path: default_soffice_path(),
            qr_module_px: 20,
        }
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory for merged documents: `<web_root>/outputs`.
    pub fn outputs_dir(&self) -> PathBuf {
        self.web_root.join("outputs")
    }

    /// Directory for converted PDFs: `<web_root>/outputs/pdfs`.
    pub fn pdf_dir(&self) -> PathBuf {
        self.web_root.join("outputs").join("pdfs")
    }

    /// Directory for QR code images: `<web_root>/outputs/qrcodes`.
    pub fn qr_dir(&self) -> PathBuf {
        self.web_root.join("outputs").join("qrcodes")
    }

    /// Directory for uploaded templates: `<web_root>/templates`.
    pub fn templates_dir(&self) -> PathBuf {
        self.web_root.join("templates")
    }

    /// A path relative to the web root, for persistence into records.
    ///
    /// Falls back to the absolute path when the artifact does not live under
    /// the root (should not happen for pipeline outputs).
    pub fn relative_to_root<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.web_root).unwrap_or(path)
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    pub fn web_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.web_root = root.into();
        self
    }

    pub fn soffice_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.soffice_path = path.into();
        self
    }

    pub fn qr_module_px(mut self, px: u32) -> Self {
        self.config.qr_module_px = px.clamp(1, 64);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig> {
        let c = &self.config;
        if c.web_root.as_os_str().is_empty() {
            return Err(DocMergeError::InvalidConfig(
                "web_root must not be empty".into(),
            ));
        }
        if c.qr_module_px == 0 {
            return Err(DocMergeError::InvalidConfig(
                "qr_module_px must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let c = RenderConfig::builder().build().unwrap();
        assert_eq!(c.web_root, PathBuf::from("wwwroot"));
        assert_eq!(c.qr_module_px, 20);
    }

    #[test]
    fn builder_clamps_module_px() {
        let c = RenderConfig::builder().qr_module_px(500).build().unwrap();
        assert_eq!(c.qr_module_px, 64);
    }

    #[test]
    fn empty_root_rejected() {
        let err = RenderConfig::builder().web_root("").build();
        assert!(err.is_err());
    }

    #[test]
    fn derived_directories() {
        let c = RenderConfig::builder().web_root("/srv/site").build().unwrap();
        assert_eq!(c.pdf_dir(), PathBuf::from("/srv/site/outputs/pdfs"));
        assert_eq!(c.qr_dir(), PathBuf::from("/srv/site/outputs/qrcodes"));
        assert_eq!(c.templates_dir(), PathBuf::from("/srv/site/templates"));
    }

    #[test]
    fn relative_to_root_strips_prefix() {
        let c = RenderConfig::builder().web_root("/srv/site").build().unwrap();
        let p = PathBuf::from("/srv/site/outputs/pdfs/a.pdf");
        assert_eq!(
            c.relative_to_root(&p),
            Path::new("outputs/pdfs/a.pdf")
        );
        // Outside the root: returned unchanged.
        let q = PathBuf::from("/elsewhere/a.pdf");
        assert_eq!(c.relative_to_root(&q), q.as_path());
    }
}
