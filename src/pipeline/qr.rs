//! QR code generation: text → PNG bytes → uniquely named file.
//!
//! ## Why PNG?
//! The image lands inside an OOXML package and may later survive a trip
//! through an external PDF converter. Lossless PNG keeps the modules crisp;
//! JPEG artefacts around high-contrast edges can break scanability.
//!
//! Error correction is fixed at level Q (~25% recovery): merged documents are
//! routinely printed and rescanned, and Q is the conventional choice for
//! print media. The module scale is the only knob, via
//! [`RenderConfig::qr_module_px`](crate::config::RenderConfig::qr_module_px).

use crate::config::RenderConfig;
use crate::error::{DocMergeError, Result};
use image::{DynamicImage, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Encode `text` as a QR code and return the PNG bytes.
///
/// Pure transformation; fails only when the encoder rejects the input
/// (text too long for the symbol at level Q).
pub fn encode_qr_png(text: &str, module_px: u32) -> Result<Vec<u8>> {
    let code =
        QrCode::with_error_correction_level(text.as_bytes(), EcLevel::Q).map_err(|e| {
            DocMergeError::QrEncodingFailed {
                text: text.to_string(),
                detail: e.to_string(),
            }
        })?;

    let img = code
        .render::<Luma<u8>>()
        .module_dimensions(module_px, module_px)
        .build();

    let mut buf = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| DocMergeError::QrEncodingFailed {
            text: text.to_string(),
            detail: format!("PNG encoding failed: {e}"),
        })?;

    debug!("Encoded QR for {} → {} bytes PNG", text, buf.len());
    Ok(buf)
}

/// Encode `text` and write the PNG under `<web_root>/outputs/qrcodes/`.
///
/// The file name is `qrcode_<uuid-v4>.png`, so repeated calls — including
/// for the same text — never collide. Returns the file path together with
/// the PNG bytes so the merger can embed the image without re-reading it.
pub async fn write_qr_code(text: &str, config: &RenderConfig) -> Result<(PathBuf, Vec<u8>)> {
    let bytes = encode_qr_png(text, config.qr_module_px)?;

    let dir = config.qr_dir();
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| DocMergeError::OutputWrite {
            path: dir.clone(),
            source: e,
        })?;

    let path = dir.join(format!("qrcode_{}.png", Uuid::new_v4()));
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| DocMergeError::OutputWrite {
            path: path.clone(),
            source: e,
        })?;

    debug!("QR code written: {}", path.display());
    Ok((path, bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_valid_png() {
        let bytes = encode_qr_png("https://example.com", 4).unwrap();
        let img = image::load_from_memory(&bytes).expect("valid PNG");
        assert!(img.width() > 0);
        assert_eq!(img.width(), img.height());
    }

    #[test]
    fn module_scale_changes_size() {
        let small = encode_qr_png("https://example.com", 2).unwrap();
        let large = encode_qr_png("https://example.com", 8).unwrap();
        let small = image::load_from_memory(&small).unwrap();
        let large = image::load_from_memory(&large).unwrap();
        assert!(large.width() > small.width());
    }

    #[tokio::test]
    async fn duplicate_calls_get_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config = RenderConfig::builder()
            .web_root(dir.path())
            .build()
            .unwrap();

        let (a, _) = write_qr_code("https://example.com", &config).await.unwrap();
        let (b, _) = write_qr_code("https://example.com", &config).await.unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
        assert!(a.file_name().unwrap().to_str().unwrap().starts_with("qrcode_"));
    }
}
