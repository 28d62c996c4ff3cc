//! The merge-and-render pipeline stages.
//!
//! Data flows through the stages in a fixed order:
//!
//! ```text
//! content text ──► urls (detect) ──► qr (encode PNGs)
//!                                        │
//! template.docx ──► merge (copy, embed, rewrite body) ──► merged .docx
//!                                                            │
//!                                     convert (office suite or text-only
//!                                     fallback) ──► .pdf
//! ```
//!
//! Each stage is independently usable; [`crate::generate`] wires them
//! together and is what the store calls.

pub mod convert;
pub mod merge;
pub mod qr;
pub mod urls;

pub use convert::{convert_to_pdf, ConvertedPdf};
pub use merge::{merge_template, MergedDocument, QrCodeRef};
pub use qr::{encode_qr_png, write_qr_code};
pub use urls::extract_urls;
