//! Body XML operations: paragraph scanning, placeholder substitution, and
//! paragraph/image appending inside `word/document.xml`.
//!
//! The rewrite is a single streaming pass (quick-xml reader feeding a writer)
//! so every part of the document we do not touch is carried through
//! byte-faithfully — styles, section properties, headers references, and
//! anything else a real template carries.
//!
//! ## Matching semantics
//!
//! * Only direct-child paragraphs of `w:body` are scanned for the
//!   placeholder; paragraphs nested in tables are not candidates.
//! * Within the matched paragraph, only direct-child runs are rewritten, and
//!   a run is rewritten only when its own concatenated text contains the full
//!   token. A token split across runs is left untouched. This single-run
//!   limitation is part of the contract, not an oversight to repair.

use crate::error::{DocMergeError, Result};
use quick_xml::escape::escape;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

/// The literal placeholder marker replaced during a merge.
pub const CONTENT_TOKEN: &str = "{{CONTENT}}";

/// Bounding box for embedded QR images, in English Metric Units.
/// 1 000 000 EMU ≈ 2.6 cm square.
const IMAGE_EXTENT_EMU: u64 = 1_000_000;

/// Label paragraph inserted above the embedded QR images.
pub const QR_LABEL: &str = "QR Codes for embedded URLs:";

/// One QR image to embed: the URL it encodes and the package relationship
/// that resolves to its media part.
#[derive(Debug, Clone)]
pub struct QrAttachment {
    pub url: String,
    pub rel_id: String,
}

fn xml_err(e: quick_xml::Error) -> DocMergeError {
    DocMergeError::MalformedPackage {
        path: "word/document.xml".into(),
        detail: e.to_string(),
    }
}

/// Text of each direct-child paragraph of `w:body`, in document order.
///
/// A paragraph's text is the concatenation of all its `w:t` runs, nested or
/// not — the OpenXml `InnerText` notion.
pub fn paragraph_texts(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut texts = Vec::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => {
                let name = e.name().as_ref().to_vec();
                if name == b"w:p" && stack.last().map(Vec::as_slice) == Some(b"w:body") {
                    current = Some(String::new());
                }
                stack.push(name);
            }
            Event::End(e) => {
                stack.pop();
                if e.name().as_ref() == b"w:p"
                    && stack.last().map(Vec::as_slice) == Some(b"w:body")
                {
                    if let Some(t) = current.take() {
                        texts.push(t);
                    }
                }
            }
            Event::Text(t) => {
                if let Some(ref mut buf) = current {
                    if stack.last().map(Vec::as_slice) == Some(b"w:t") {
                        buf.push_str(&t.unescape().map_err(xml_err)?);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(texts)
}

/// Concatenated text of every `w:t` element in the document — the lossy
/// plain-text view used by the degraded PDF conversion. Direct-child
/// paragraphs of the body are separated by newlines so the fallback PDF
/// keeps at least line-level structure.
pub fn extract_text(xml: &str) -> Result<String> {
    let paragraphs = paragraph_texts(xml)?;
    Ok(paragraphs.join("\n"))
}

/// Merge `content` (and QR drawings) into a body XML string.
///
/// Returns the rewritten XML and whether the placeholder token was found and
/// replaced in place (`false` means the content was appended as a trailing
/// paragraph instead).
pub fn merge_body(xml: &str, content: &str, qr: &[QrAttachment]) -> Result<(String, bool)> {
    // Pass 1: locate the first direct-child paragraph containing the token.
    let texts = paragraph_texts(xml)?;
    let target = texts.iter().position(|t| t.contains(CONTENT_TOKEN));

    // Pass 2: rewrite.
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::new());
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut para_ordinal = 0usize;
    let mut in_target = false;
    // Buffered events of the run currently being collected (direct child of
    // the target paragraph), if any.
    let mut run_buf: Option<Vec<Event>> = None;
    let mut run_depth = 0usize;

    loop {
        let ev = reader.read_event().map_err(xml_err)?;
        match ev {
            Event::Start(ref e) => {
                let name = e.name().as_ref().to_vec();
                let parent_is_body = stack.last().map(Vec::as_slice) == Some(b"w:body");
                let parent_is_target_para = in_target
                    && stack.last().map(Vec::as_slice) == Some(b"w:p")
                    && run_buf.is_none();

                if name == b"w:p" && parent_is_body {
                    if Some(para_ordinal) == target {
                        in_target = true;
                    }
                    para_ordinal += 1;
                }

                if let Some(buf) = run_buf.as_mut() {
                    run_depth += 1;
                    buf.push(ev.clone());
                } else if name == b"w:r" && parent_is_target_para {
                    run_buf = Some(vec![ev.clone()]);
                    run_depth = 1;
                } else {
                    writer.write_event(ev.clone()).map_err(io_err)?;
                }
                stack.push(name);
            }
            Event::End(ref e) => {
                stack.pop();
                let name = e.name().as_ref().to_vec();

                if let Some(mut buf) = run_buf.take() {
                    buf.push(ev.clone());
                    run_depth -= 1;
                    if run_depth == 0 {
                        flush_run(&mut writer, buf, content)?;
                    } else {
                        run_buf = Some(buf);
                    }
                    continue;
                }

                if name == b"w:p"
                    && stack.last().map(Vec::as_slice) == Some(b"w:body")
                    && in_target
                {
                    in_target = false;
                }

                if name == b"w:body" {
                    // Appended material goes at the very end of the body:
                    // the raw content when no placeholder matched, then the
                    // QR block when any codes were produced.
                    if target.is_none() {
                        write_text_paragraph(&mut writer, content)?;
                    }
                    if !qr.is_empty() {
                        write_text_paragraph(&mut writer, QR_LABEL)?;
                        for (i, att) in qr.iter().enumerate() {
                            write_qr_paragraph(&mut writer, att, i as u32 + 1)?;
                        }
                    }
                }
                writer.write_event(ev.clone()).map_err(io_err)?;
            }
            Event::Eof => break,
            other => {
                if let Some(buf) = run_buf.as_mut() {
                    buf.push(other.into_owned());
                } else {
                    writer.write_event(other).map_err(io_err)?;
                }
            }
        }
    }

    let out = writer.into_inner();
    let xml = String::from_utf8(out).map_err(|e| DocMergeError::MalformedPackage {
        path: "word/document.xml".into(),
        detail: format!("rewritten body is not UTF-8: {e}"),
    })?;
    Ok((xml, target.is_some()))
}

fn io_err(e: std::io::Error) -> DocMergeError {
    DocMergeError::OutputWrite {
        path: "word/document.xml".into(),
        source: e,
    }
}

/// Replay a buffered run, substituting the placeholder when present.
///
/// When the run's own text contains the token, its direct-child `w:t`
/// elements are dropped (everything else — run properties, breaks — is kept)
/// and a single `w:t` with the substituted text is appended, mirroring how
/// the run keeps its formatting but gains new text.
fn flush_run(writer: &mut Writer<Vec<u8>>, buf: Vec<Event>, content: &str) -> Result<()> {
    let run_text = buffered_run_text(&buf)?;

    if !run_text.contains(CONTENT_TOKEN) {
        for ev in buf {
            writer.write_event(ev).map_err(io_err)?;
        }
        return Ok(());
    }

    let new_text = run_text.replace(CONTENT_TOKEN, content);
    let last = buf.len() - 1; // closing </w:r>
    let mut depth = 0usize; // depth within the run; 1 = direct child level
    let mut skip_until = 0usize; // >0 while inside a direct-child w:t subtree

    for (i, ev) in buf.into_iter().enumerate() {
        if i == last {
            write_run_text(writer, &new_text)?;
            writer.write_event(ev).map_err(io_err)?;
            break;
        }
        match &ev {
            Event::Start(e) => {
                depth += 1;
                if skip_until > 0 {
                    continue;
                }
                if depth == 2 && e.name().as_ref() == b"w:t" {
                    skip_until = depth;
                    continue;
                }
                writer.write_event(ev).map_err(io_err)?;
            }
            Event::End(_) => {
                let was_skipping = skip_until > 0 && depth == skip_until;
                depth -= 1;
                if was_skipping {
                    skip_until = 0;
                    continue;
                }
                if skip_until > 0 {
                    continue;
                }
                writer.write_event(ev).map_err(io_err)?;
            }
            Event::Empty(e) => {
                if skip_until > 0 {
                    continue;
                }
                if depth == 1 && e.name().as_ref() == b"w:t" {
                    continue;
                }
                writer.write_event(ev).map_err(io_err)?;
            }
            _ => {
                if skip_until > 0 {
                    continue;
                }
                writer.write_event(ev).map_err(io_err)?;
            }
        }
    }
    Ok(())
}

/// Concatenated `w:t` text of a buffered run.
fn buffered_run_text(buf: &[Event]) -> Result<String> {
    let mut text = String::new();
    let mut in_t = 0usize;
    for ev in buf {
        match ev {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_t += 1,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_t -= 1,
            Event::Text(t) if in_t > 0 => text.push_str(&t.unescape().map_err(xml_err)?),
            _ => {}
        }
    }
    Ok(text)
}

/// Emit `<w:t xml:space="preserve">text</w:t>`.
fn write_run_text(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    let mut t = BytesStart::new("w:t");
    t.push_attribute(("xml:space", "preserve"));
    writer.write_event(Event::Start(t)).map_err(io_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(io_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("w:t")))
        .map_err(io_err)?;
    Ok(())
}

/// Emit a plain `<w:p><w:r><w:t>text</w:t></w:r></w:p>` paragraph.
fn write_text_paragraph(writer: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("w:p")))
        .map_err(io_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("w:r")))
        .map_err(io_err)?;
    write_run_text(writer, text)?;
    writer
        .write_event(Event::End(BytesEnd::new("w:r")))
        .map_err(io_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("w:p")))
        .map_err(io_err)?;
    Ok(())
}

/// Emit the per-URL paragraph: label text, line break, inline image drawing.
fn write_qr_paragraph(
    writer: &mut Writer<Vec<u8>>,
    att: &QrAttachment,
    docpr_id: u32,
) -> Result<()> {
    writer
        .write_event(Event::Start(BytesStart::new("w:p")))
        .map_err(io_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("w:r")))
        .map_err(io_err)?;
    write_run_text(writer, &format!("QR Code for: {}", att.url))?;
    writer
        .write_event(Event::Empty(BytesStart::new("w:br")))
        .map_err(io_err)?;
    // The drawing fragment is emitted raw: it is a fixed subtree with its
    // namespaces declared inline, so it stays valid whatever the template's
    // root element declares.
    writer
        .get_mut()
        .extend_from_slice(inline_image_xml(&att.rel_id, docpr_id).as_bytes());
    writer
        .write_event(Event::End(BytesEnd::new("w:r")))
        .map_err(io_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("w:p")))
        .map_err(io_err)?;
    Ok(())
}

/// Inline DrawingML subtree referencing an image relationship, sized to the
/// fixed QR bounding box.
fn inline_image_xml(rel_id: &str, docpr_id: u32) -> String {
    let rid = escape(rel_id);
    let emu = IMAGE_EXTENT_EMU;
    format!(
        r#"<w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0" xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><wp:extent cx="{emu}" cy="{emu}"/><wp:docPr id="{docpr_id}" name="QR Code"/><wp:cNvGraphicFramePr/><a:graphic xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main"><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:pic xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><pic:nvPicPr><pic:cNvPr id="0" name="QR Code"/><pic:cNvPicPr/></pic:nvPicPr><pic:blipFill><a:blip r:embed="{rid}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill><pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{emu}" cy="{emu}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(paragraph_xml: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{paragraph_xml}<w:sectPr/></w:body></w:document>"#
        )
    }

    fn para(runs: &str) -> String {
        format!("<w:p>{runs}</w:p>")
    }

    fn run(text: &str) -> String {
        format!("<w:r><w:t>{text}</w:t></w:r>")
    }

    #[test]
    fn paragraph_texts_in_order() {
        let xml = body(&(para(&run("first")) + &para(&run("second"))));
        assert_eq!(paragraph_texts(&xml).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn table_paragraphs_are_not_candidates() {
        let xml = body(&format!(
            "<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>{}",
            para(&run("in table")),
            para(&run("direct"))
        ));
        assert_eq!(paragraph_texts(&xml).unwrap(), vec!["direct"]);
    }

    #[test]
    fn replaces_token_in_single_run_preserving_surrounding_text() {
        let xml = body(&para(&run("before {{CONTENT}} after")));
        let (out, replaced) = merge_body(&xml, "hello", &[]).unwrap();
        assert!(replaced);
        assert_eq!(
            paragraph_texts(&out).unwrap(),
            vec!["before hello after"]
        );
        assert!(!out.contains(CONTENT_TOKEN));
    }

    #[test]
    fn keeps_run_properties_on_replacement() {
        let xml = body(&para(
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>x {{CONTENT}} y</w:t></w:r>"#,
        ));
        let (out, replaced) = merge_body(&xml, "Z", &[]).unwrap();
        assert!(replaced);
        assert!(out.contains("<w:b/>"), "run properties survive: {out}");
        assert_eq!(paragraph_texts(&out).unwrap(), vec!["x Z y"]);
    }

    #[test]
    fn token_split_across_runs_is_not_replaced() {
        // The paragraph text contains the token, so it is the target — but
        // no single run holds the full token, so nothing changes.
        let xml = body(&para(&(run("{{CON") + &run("TENT}}"))));
        let (out, replaced) = merge_body(&xml, "hello", &[]).unwrap();
        assert!(replaced, "the paragraph still counts as matched");
        assert_eq!(
            paragraph_texts(&out).unwrap(),
            vec!["{{CONTENT}}"],
            "split token stays untouched"
        );
    }

    #[test]
    fn token_spanning_wt_elements_of_one_run_is_replaced() {
        // A run can hold several w:t children; matching is against the run's
        // concatenated text, so a token split across w:t siblings within one
        // run is still a single-run match.
        let xml = body(&para("<w:r><w:t>{{CON</w:t><w:t>TENT}}</w:t></w:r>"));
        let qr = vec![QrAttachment {
            url: "https://example.com".into(),
            rel_id: "rId3".into(),
        }];
        let (out, replaced) = merge_body(&xml, "a < b & \"c\"", &qr).unwrap();
        assert!(replaced);
        let texts = paragraph_texts(&out).unwrap();
        assert_eq!(texts[0], "a < b & \"c\"");
        assert_eq!(texts[1], QR_LABEL);
        assert!(out.contains(r#"r:embed="rId3""#));
        assert!(!out.contains(CONTENT_TOKEN));
    }

    #[test]
    fn only_first_matching_paragraph_is_rewritten() {
        let xml = body(&(para(&run("{{CONTENT}}")) + &para(&run("{{CONTENT}}"))));
        let (out, _) = merge_body(&xml, "X", &[]).unwrap();
        assert_eq!(paragraph_texts(&out).unwrap(), vec!["X", "{{CONTENT}}"]);
    }

    #[test]
    fn appends_paragraph_when_token_absent() {
        let xml = body(&para(&run("no placeholder here")));
        let (out, replaced) = merge_body(&xml, "appended content", &[]).unwrap();
        assert!(!replaced);
        assert_eq!(
            paragraph_texts(&out).unwrap(),
            vec!["no placeholder here", "appended content"]
        );
    }

    #[test]
    fn content_is_xml_escaped() {
        let xml = body(&para(&run("{{CONTENT}}")));
        let (out, _) = merge_body(&xml, "a < b & c", &[]).unwrap();
        assert!(out.contains("a &lt; b &amp; c"));
        assert_eq!(paragraph_texts(&out).unwrap(), vec!["a < b & c"]);
    }

    #[test]
    fn no_urls_means_no_qr_block() {
        let xml = body(&para(&run("{{CONTENT}}")));
        let (out, _) = merge_body(&xml, "plain", &[]).unwrap();
        assert!(!out.contains(QR_LABEL));
        assert!(!out.contains("w:drawing"));
    }

    #[test]
    fn qr_block_appends_label_and_one_paragraph_per_attachment() {
        let xml = body(&para(&run("{{CONTENT}}")));
        let qr = vec![
            QrAttachment {
                url: "https://example.com".into(),
                rel_id: "rId7".into(),
            },
            QrAttachment {
                url: "https://example.com".into(),
                rel_id: "rId8".into(),
            },
        ];
        let (out, _) = merge_body(&xml, "see https://example.com twice", &qr).unwrap();
        let texts = paragraph_texts(&out).unwrap();
        assert_eq!(texts[1], QR_LABEL);
        assert_eq!(texts[2], "QR Code for: https://example.com");
        assert_eq!(texts[3], "QR Code for: https://example.com");
        assert!(out.contains(r#"r:embed="rId7""#));
        assert!(out.contains(r#"r:embed="rId8""#));
        assert_eq!(out.matches("<w:drawing>").count(), 2);
    }

    #[test]
    fn extract_text_joins_paragraphs() {
        let xml = body(&(para(&run("alpha")) + &para(&run("beta"))));
        assert_eq!(extract_text(&xml).unwrap(), "alpha\nbeta");
    }
}
