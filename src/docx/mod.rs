//! OOXML package handling for `.docx` files.
//!
//! A `.docx` file is a zip archive: `word/document.xml` holds the body,
//! `word/_rels/document.xml.rels` maps relationship ids to parts, and
//! `[Content_Types].xml` registers MIME types. [`DocxPackage`] loads every
//! entry into memory (templates are small), lets the merger rewrite the body
//! and register media parts, and writes the archive back out.
//!
//! Entry order is preserved on save so diffs against the source template stay
//! minimal; new media parts are appended at the end.

pub mod body;

use crate::error::{DocMergeError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const DOCUMENT_PART: &str = "word/document.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";
const CONTENT_TYPES_PART: &str = "[Content_Types].xml";

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

static RE_REL_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r#"Id="rId(\d+)""#).expect("valid regex"));
static RE_MEDIA_NUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^word/media/image(\d+)\.").expect("valid regex"));

/// An in-memory `.docx` package.
#[derive(Debug)]
pub struct DocxPackage {
    /// Archive entries in their original order, plus any parts added since.
    parts: Vec<(String, Vec<u8>)>,
    /// Source path, kept for error context only.
    source: PathBuf,
}

impl DocxPackage {
    /// Open a `.docx` file, loading every entry into memory.
    ///
    /// Fails with [`DocMergeError::MalformedPackage`] when the file is not a
    /// zip archive or lacks `word/document.xml`.
    pub fn open(path: &Path) -> Result<Self> {
        let malformed = |detail: String| DocMergeError::MalformedPackage {
            path: path.to_path_buf(),
            detail,
        };

        let file = std::fs::File::open(path).map_err(|e| malformed(e.to_string()))?;
        let mut archive = ZipArchive::new(file).map_err(|e| malformed(e.to_string()))?;

        let mut parts = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| malformed(e.to_string()))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut data)
                .map_err(|e| malformed(format!("reading '{name}': {e}")))?;
            parts.push((name, data));
        }

        let pkg = Self {
            parts,
            source: path.to_path_buf(),
        };
        if pkg.part(DOCUMENT_PART).is_none() {
            return Err(malformed(format!("missing {DOCUMENT_PART}")));
        }
        debug!(
            "Opened package {} ({} parts)",
            path.display(),
            pkg.parts.len()
        );
        Ok(pkg)
    }

    fn part(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d.as_slice())
    }

    fn set_part(&mut self, name: &str, data: Vec<u8>) {
        if let Some(slot) = self.parts.iter_mut().find(|(n, _)| n == name) {
            slot.1 = data;
        } else {
            self.parts.push((name.to_string(), data));
        }
    }

    fn part_utf8(&self, name: &str) -> Result<String> {
        let data = self
            .part(name)
            .ok_or_else(|| DocMergeError::MalformedPackage {
                path: self.source.clone(),
                detail: format!("missing {name}"),
            })?;
        String::from_utf8(data.to_vec()).map_err(|e| DocMergeError::MalformedPackage {
            path: self.source.clone(),
            detail: format!("{name} is not UTF-8: {e}"),
        })
    }

    /// The body XML, `word/document.xml`.
    pub fn document_xml(&self) -> Result<String> {
        self.part_utf8(DOCUMENT_PART)
    }

    /// Replace the body XML.
    pub fn set_document_xml(&mut self, xml: String) {
        self.set_part(DOCUMENT_PART, xml.into_bytes());
    }

    /// Register an image part and return the fresh relationship id that the
    /// body can reference via `r:embed`.
    ///
    /// Adds `word/media/imageN.<ext>`, appends a `Relationship` entry to the
    /// document rels, and makes sure `[Content_Types].xml` declares the
    /// extension. Each call gets its own part and its own id — embedding the
    /// same bytes twice yields two independent images.
    pub fn add_image(&mut self, bytes: &[u8], ext: &str) -> Result<String> {
        let media_name = format!("word/media/image{}.{ext}", self.next_media_number());
        let rel_id = format!("rId{}", self.next_rel_number()?);

        // 1. Media part.
        self.parts.push((media_name.clone(), bytes.to_vec()));

        // 2. Relationship entry.
        let target = media_name.trim_start_matches("word/");
        let rels = match self.part(RELS_PART) {
            Some(_) => self.part_utf8(RELS_PART)?,
            None => concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#
            )
            .to_string(),
        };
        let entry = format!(r#"<Relationship Id="{rel_id}" Type="{IMAGE_REL_TYPE}" Target="{target}"/>"#);
        let rels = insert_before_close(&rels, "</Relationships>", &entry).ok_or_else(|| {
            DocMergeError::MalformedPackage {
                path: self.source.clone(),
                detail: format!("{RELS_PART} has no closing </Relationships>"),
            }
        })?;
        self.set_part(RELS_PART, rels.into_bytes());

        // 3. Content type for the extension.
        let types = self.part_utf8(CONTENT_TYPES_PART)?;
        if !types.contains(&format!(r#"Extension="{ext}""#)) {
            let default = format!(r#"<Default Extension="{ext}" ContentType="image/{ext}"/>"#);
            let types = insert_before_close(&types, "</Types>", &default).ok_or_else(|| {
                DocMergeError::MalformedPackage {
                    path: self.source.clone(),
                    detail: format!("{CONTENT_TYPES_PART} has no closing </Types>"),
                }
            })?;
            self.set_part(CONTENT_TYPES_PART, types.into_bytes());
        }

        debug!("Added image part {media_name} as {rel_id}");
        Ok(rel_id)
    }

    /// Number of media parts of the form `word/media/image<N>.*`, used for
    /// fresh part names.
    fn next_media_number(&self) -> u64 {
        self.parts
            .iter()
            .filter_map(|(n, _)| RE_MEDIA_NUM.captures(n))
            .filter_map(|c| c[1].parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1
    }

    /// One past the highest numeric `rIdN` in the document rels.
    fn next_rel_number(&self) -> Result<u64> {
        let max = match self.part(RELS_PART) {
            Some(_) => RE_REL_ID
                .captures_iter(&self.part_utf8(RELS_PART)?)
                .filter_map(|c| c[1].parse::<u64>().ok())
                .max()
                .unwrap_or(0),
            None => 0,
        };
        Ok(max + 1)
    }

    /// Write the package to `path`, overwriting in place.
    ///
    /// The write is NOT atomic: a failure mid-save can leave a corrupt file
    /// at `path`. Callers treat any error here as a failed merge and discard
    /// the working file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let write_err = |e: std::io::Error| DocMergeError::OutputWrite {
            path: path.to_path_buf(),
            source: e,
        };

        let file = std::fs::File::create(path).map_err(write_err)?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)
                .map_err(|e| write_err(std::io::Error::other(e)))?;
            zip.write_all(data).map_err(write_err)?;
        }
        zip.finish().map_err(|e| write_err(std::io::Error::other(e)))?;
        debug!("Saved package to {}", path.display());
        Ok(())
    }
}

/// Insert `fragment` immediately before the last occurrence of `close`.
fn insert_before_close(xml: &str, close: &str, fragment: &str) -> Option<String> {
    let at = xml.rfind(close)?;
    let mut out = String::with_capacity(xml.len() + fragment.len());
    out.push_str(&xml[..at]);
    out.push_str(fragment);
    out.push_str(&xml[at..]);
    Some(out)
}


#[cfg(test)]
mod tests {
    use super::testutil::write_minimal_docx;
    use super::*;

    fn write_docx(dir: &Path, body_xml: &str) -> PathBuf {
        let path = dir.join("template.docx");
        std::fs::write(&path, write_minimal_docx(body_xml)).unwrap();
        path
    }

    #[test]
    fn open_reads_document_xml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_docx(dir.path(), "<w:p><w:r><w:t>hi</w:t></w:r></w:p>");
        let pkg = DocxPackage::open(&path).unwrap();
        assert!(pkg.document_xml().unwrap().contains("hi"));
    }

    #[test]
    fn open_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.docx");
        std::fs::write(&path, b"not a zip at all").unwrap();
        let err = DocxPackage::open(&path).unwrap_err();
        assert!(matches!(err, DocMergeError::MalformedPackage { .. }));
    }

    #[test]
    fn add_image_registers_part_rel_and_content_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_docx(dir.path(), "<w:p/>");
        let mut pkg = DocxPackage::open(&path).unwrap();

        let rid = pkg.add_image(&[1, 2, 3], "png").unwrap();
        assert_eq!(rid, "rId1");
        assert!(pkg.part("word/media/image1.png").is_some());
        let rels = pkg.part_utf8(RELS_PART).unwrap();
        assert!(rels.contains(r#"Target="media/image1.png""#));
        let types = pkg.part_utf8(CONTENT_TYPES_PART).unwrap();
        assert_eq!(types.matches(r#"Extension="png""#).count(), 1);

        // Second image: fresh id, fresh part, content type not duplicated.
        let rid2 = pkg.add_image(&[4, 5], "png").unwrap();
        assert_eq!(rid2, "rId2");
        assert!(pkg.part("word/media/image2.png").is_some());
        let types = pkg.part_utf8(CONTENT_TYPES_PART).unwrap();
        assert_eq!(types.matches(r#"Extension="png""#).count(), 1);
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_docx(dir.path(), "<w:p><w:r><w:t>body</w:t></w:r></w:p>");
        let mut pkg = DocxPackage::open(&path).unwrap();
        pkg.add_image(&[9, 9, 9], "png").unwrap();
        pkg.set_document_xml(pkg.document_xml().unwrap().replace("body", "edited"));

        let out = dir.path().join("out.docx");
        pkg.save(&out).unwrap();

        let reopened = DocxPackage::open(&out).unwrap();
        assert!(reopened.document_xml().unwrap().contains("edited"));
        assert_eq!(reopened.part("word/media/image1.png"), Some(&[9u8, 9, 9][..]));
    }
}
