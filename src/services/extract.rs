// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plain-text extraction from uploaded syllabus documents.

use crate::error::AppError;
use std::io::Read;

/// Largest `word/document.xml` we are willing to decompress.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    /// `.docx`, and `.doc` files that are really OOXML
    Docx,
    Text,
}

impl DocumentKind {
    /// Kind from a file name's extension, case-insensitive.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" | "doc" => Some(DocumentKind::Docx),
            "txt" => Some(DocumentKind::Text),
            _ => None,
        }
    }
}

/// Extract text, rejecting documents that contain nothing readable.
pub fn extract_text(bytes: &[u8], kind: DocumentKind) -> Result<String, AppError> {
    let text = match kind {
        DocumentKind::Pdf => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| AppError::BadRequest(format!("Could not read PDF: {}", e)))?,
        DocumentKind::Docx => extract_docx(bytes)?,
        DocumentKind::Text => String::from_utf8(bytes.to_vec())
            .map_err(|_| AppError::BadRequest("Text file is not valid UTF-8".to_string()))?,
    };

    if text.trim().is_empty() {
        return Err(AppError::BadRequest(
            "No text could be extracted from the document".to_string(),
        ));
    }
    Ok(text)
}

fn extract_docx(bytes: &[u8]) -> Result<String, AppError> {
    let invalid = |e: String| AppError::BadRequest(format!("Could not read Word document: {}", e));

    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| invalid(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| invalid(e.to_string()))?;

    let mut xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut xml)
        .map_err(|e| invalid(e.to_string()))?;
    if xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(invalid("word/document.xml exceeds size limit".to_string()));
    }

    document_xml_text(&xml).map_err(invalid)
}

/// Text of `w:t` runs, one line per paragraph (`w:p`).
///
/// Table cells are paragraphs too, so cell text lands on its own line.
fn document_xml_text(xml: &[u8]) -> Result<String, String> {
    use quick_xml::events::Event;

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_text = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => out.push('\n'),
                b"tc" => out.push('\t'),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => out.push('\t'),
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"br" => out.push('\n'),
            Ok(Event::Text(t)) if in_text => match t.unescape() {
                Ok(text) => out.push_str(&text),
                // Unknown entity: keep the run as written.
                Err(_) => out.push_str(&String::from_utf8_lossy(&t)),
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}
