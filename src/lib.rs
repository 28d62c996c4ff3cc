//! # docmerge
//!
//! Merge free-text content into `.docx` templates and render the result as a
//! PDF, with automatic QR codes for every URL the content mentions.
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────────┐   ┌─────────────┐
//! │ template.docx │──►│ merge          │──►│ convert        │──►│ output.pdf  │
//! │ + content     │   │ {{CONTENT}} →  │   │ office suite,  │   │ (full or    │
//! │               │   │ text + QR PNGs │   │ else text-only │   │  degraded)  │
//! └──────────────┘   └───────────────┘   └───────────────┘   └─────────────┘
//! ```
//!
//! The merger looks for the literal `{{CONTENT}}` placeholder in the
//! template body, replaces it with the supplied text (or appends the text
//! when no placeholder exists), detects `http(s)` URLs in the content, and
//! embeds one QR code image per URL occurrence under a label paragraph.
//! Conversion prefers a headless office suite and degrades to a lossy
//! text-only PDF when the suite is absent or fails.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docmerge::{RenderConfig, Store};
//! use std::path::Path;
//!
//! # async fn run() -> docmerge::Result<()> {
//! let config = RenderConfig::builder().web_root("wwwroot").build()?;
//! let mut store = Store::open(config)?;
//!
//! let template = store
//!     .add_template("Welcome letter", "Standard onboarding letter", Path::new("letter.docx"))
//!     .await?
//!     .id;
//! let doc = store
//!     .create_document(
//!         "Hello",
//!         "First letter",
//!         "Welcome! Docs at https://example.com/start",
//!         template,
//!     )
//!     .await?;
//! println!("PDF at {:?}", doc.output_pdf_path);
//! # Ok(())
//! # }
//! ```
//!
//! The pipeline stages in [`pipeline`] are also usable directly, without the
//! store, via [`generate`] or per stage.
//!
//! ## Feature flags
//!
//! | Feature | Default | Effect |
//! |---------|---------|--------|
//! | `cli`   | yes     | Builds the `docmerge` binary (clap, anyhow, tracing-subscriber) |

pub mod config;
pub mod docx;
pub mod error;
pub mod generate;
pub mod pipeline;
pub mod store;

pub use config::{default_soffice_path, RenderConfig, RenderConfigBuilder};
pub use error::{DocMergeError, Result};
pub use generate::{generate, generate_sync, GenerateOutput, GenerateStats};
pub use pipeline::convert::ConvertedPdf;
pub use pipeline::merge::QrCodeRef;
pub use store::{Document, Store, Template};
