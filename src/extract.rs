//! Format detection and plain-text extraction.
//!
//! The normalizer calls [`Format::detect`] on a document's declared content
//! type (or its source extension) and then [`extract`] to obtain UTF-8 text.
//! Anything that is not text (markup, scripts, binary containers) is dropped
//! and reported as an [`Exclusion`] so chunk coverage can be audited.

use std::io::Read;

use quick_xml::events::Event;
use serde::Serialize;

use crate::error::{EngineError, Result};

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_ODT: &str = "application/vnd.oasis.opendocument.text";

const XLSX_MAX_SHEETS: usize = 100;
const XLSX_MAX_CELLS_PER_SHEET: usize = 100_000;
/// Zip-bomb guard for a single decompressed XML entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    PlainText,
    Markdown,
    Html,
    Pdf,
    Docx,
    Pptx,
    Xlsx,
    Odt,
}

impl Format {
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" => Some(Format::PlainText),
            "md" | "markdown" => Some(Format::Markdown),
            "html" | "htm" => Some(Format::Html),
            "pdf" => Some(Format::Pdf),
            "docx" => Some(Format::Docx),
            "pptx" => Some(Format::Pptx),
            "xlsx" => Some(Format::Xlsx),
            "odt" => Some(Format::Odt),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Format> {
        let essence = mime.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "text/plain" => Some(Format::PlainText),
            "text/markdown" | "text/x-markdown" => Some(Format::Markdown),
            "text/html" | "application/xhtml+xml" => Some(Format::Html),
            MIME_PDF => Some(Format::Pdf),
            MIME_DOCX => Some(Format::Docx),
            MIME_PPTX => Some(Format::Pptx),
            MIME_XLSX => Some(Format::Xlsx),
            MIME_ODT => Some(Format::Odt),
            _ => None,
        }
    }

    /// Resolve the format from a declared content type (MIME or extension)
    /// or, failing that, from the extension of `source`. Sources without an
    /// extension are read as plain text.
    pub fn detect(declared: Option<&str>, source: &str) -> Result<Format> {
        if let Some(declared) = declared.map(str::trim).filter(|d| !d.is_empty()) {
            let found = if declared.contains('/') {
                Format::from_mime(declared)
            } else {
                Format::from_extension(declared.trim_start_matches('.'))
            };
            return found.ok_or_else(|| {
                EngineError::unsupported(
                    source_extension(source).unwrap_or_else(|| declared.to_string()),
                )
            });
        }

        match source_extension(source) {
            Some(ext) => Format::from_extension(&ext).ok_or_else(|| EngineError::unsupported(ext)),
            None => Ok(Format::PlainText),
        }
    }
}

/// Extension of the last path segment of a URI-like source, lowercased.
///
/// The host of non-`file` URIs is ignored so `https://example.com` has no
/// extension.
pub fn source_extension(source: &str) -> Option<String> {
    let path = match source.split_once("://") {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("file") => rest,
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or(""),
        None => source,
    };
    let path = path.split(['?', '#']).next().unwrap_or("");
    let segment = path.rsplit(['/', '\\']).next().unwrap_or("");
    match segment.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < segment.len() => {
            Some(segment[dot + 1..].to_ascii_lowercase())
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionKind {
    /// Tags, attributes, and comments of a markup document.
    Markup,
    /// `<script>` and `<style>` bodies.
    Script,
    /// The binary container of PDF and office documents.
    Container,
}

/// Non-text content dropped during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub kind: ExclusionKind,
    pub bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub format: Format,
    pub text: String,
    pub exclusions: Vec<Exclusion>,
}

/// Extract plain UTF-8 text from `bytes` in the given format.
pub fn extract(bytes: &[u8], format: Format) -> Result<Extracted> {
    let (text, exclusions) = match format {
        Format::PlainText | Format::Markdown => {
            (String::from_utf8_lossy(bytes).into_owned(), Vec::new())
        }
        Format::Html => strip_html(&String::from_utf8_lossy(bytes)),
        Format::Pdf => container(bytes, extract_pdf(bytes)?),
        Format::Docx => container(bytes, extract_docx(bytes)?),
        Format::Pptx => container(bytes, extract_pptx(bytes)?),
        Format::Xlsx => container(bytes, extract_xlsx(bytes)?),
        Format::Odt => container(bytes, extract_odt(bytes)?),
    };
    Ok(Extracted {
        format,
        text,
        exclusions,
    })
}

fn container(bytes: &[u8], text: String) -> (String, Vec<Exclusion>) {
    let exclusions = vec![Exclusion {
        kind: ExclusionKind::Container,
        bytes: bytes.len(),
    }];
    (text, exclusions)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| EngineError::Extraction(format!("pdf: {}", e)))
}

fn ooxml_err(e: impl std::fmt::Display) -> EngineError {
    EngineError::Extraction(e.to_string())
}

type Archive<'a> = zip::ZipArchive<std::io::Cursor<&'a [u8]>>;

fn open_archive(bytes: &[u8]) -> Result<Archive<'_>> {
    zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(ooxml_err)
}

fn read_zip_entry_bounded(archive: &mut Archive<'_>, name: &str) -> Result<Vec<u8>> {
    let entry = archive.by_name(name).map_err(ooxml_err)?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(ooxml_err)?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(EngineError::Extraction(format!(
            "zip entry {} exceeds size limit ({} bytes)",
            name, MAX_XML_ENTRY_BYTES
        )));
    }
    Ok(out)
}

/// Entries named `{prefix}{n}.xml`, sorted by `n`.
fn numbered_entries(archive: &Archive<'_>, prefix: &str) -> Vec<String> {
    let mut names: Vec<String> = archive
        .file_names()
        .filter(|n| n.starts_with(prefix) && n.ends_with(".xml"))
        .map(|s| s.to_string())
        .collect();
    names.sort_by_key(|name| {
        name.trim_start_matches(prefix)
            .trim_end_matches(".xml")
            .parse::<u32>()
            .unwrap_or(u32::MAX)
    });
    names
}

fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "word/document.xml")?;
    collect_xml_text(&xml, Some(b"t"), b"p")
}

fn extract_pptx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "ppt/slides/slide") {
        let xml = read_zip_entry_bounded(&mut archive, &name)?;
        let text = collect_xml_text(&xml, Some(b"t"), b"p")?;
        if !out.is_empty() && !text.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&text);
    }
    Ok(out)
}

fn extract_odt(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let xml = read_zip_entry_bounded(&mut archive, "content.xml")?;
    collect_xml_text(&xml, None, b"p")
}

/// Collect text from an XML part.
///
/// With a `run_tag`, only text inside that element is kept (`w:t`, `a:t`);
/// without one, all text inside a paragraph element is kept. Paragraph ends
/// become blank lines so the paragraph chunker sees them.
fn collect_xml_text(xml: &[u8], run_tag: Option<&[u8]>, paragraph_tag: &[u8]) -> Result<String> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut out = String::new();
    let mut in_run = false;
    let mut paragraph_depth = 0usize;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == paragraph_tag {
                    paragraph_depth += 1;
                }
                if run_tag.is_some_and(|t| name.as_ref() == t) {
                    in_run = true;
                }
            }
            Ok(Event::End(e)) => {
                let name = e.local_name();
                if run_tag.is_some_and(|t| name.as_ref() == t) {
                    in_run = false;
                }
                if name.as_ref() == paragraph_tag {
                    paragraph_depth = paragraph_depth.saturating_sub(1);
                    if !out.is_empty() && !out.ends_with("\n\n") {
                        out.push_str("\n\n");
                    }
                }
            }
            Ok(Event::Text(te)) => {
                let capture = match run_tag {
                    Some(_) => in_run,
                    None => paragraph_depth > 0,
                };
                if capture {
                    out.push_str(te.unescape().map_err(ooxml_err)?.as_ref());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

fn extract_xlsx(bytes: &[u8]) -> Result<String> {
    let mut archive = open_archive(bytes)?;
    let shared_strings = read_shared_strings(&mut archive)?;
    let mut out = String::new();
    for name in numbered_entries(&archive, "xl/worksheets/sheet")
        .into_iter()
        .take(XLSX_MAX_SHEETS)
    {
        let sheet_xml = read_zip_entry_bounded(&mut archive, &name)?;
        let cells = extract_xlsx_sheet_cells(&sheet_xml, &shared_strings)?;
        if !out.is_empty() && !cells.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&cells);
    }
    Ok(out)
}

fn read_shared_strings(archive: &mut Archive<'_>) -> Result<Vec<String>> {
    if archive.index_for_name("xl/sharedStrings.xml").is_none() {
        return Ok(Vec::new());
    }
    let xml = read_zip_entry_bounded(archive, "xl/sharedStrings.xml")?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = true,
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(te.unescape().map_err(ooxml_err)?.as_ref());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"si" => strings.extend(current.take()),
                b"t" => in_t = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

fn extract_xlsx_sheet_cells(xml: &[u8], shared_strings: &[String]) -> Result<String> {
    let mut cells: Vec<String> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    let mut in_v = false;
    let mut cell_is_shared_str = false;
    loop {
        if cells.len() >= XLSX_MAX_CELLS_PER_SHEET {
            break;
        }
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = e.attributes().any(|a| {
                        a.as_ref()
                            .map(|a| a.key.as_ref() == b"t" && a.value.as_ref() == b"s")
                            .unwrap_or(false)
                    });
                } else if e.local_name().as_ref() == b"v" {
                    in_v = true;
                }
            }
            Ok(Event::Text(te)) if in_v => {
                let v = te.unescape().map_err(ooxml_err)?;
                let s = v.trim();
                if cell_is_shared_str {
                    if let Some(text) = s.parse::<usize>().ok().and_then(|i| shared_strings.get(i)) {
                        cells.push(text.clone());
                    }
                } else if !s.is_empty() {
                    cells.push(s.to_string());
                }
                in_v = false;
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"v" {
                    in_v = false;
                } else if e.local_name().as_ref() == b"c" {
                    cell_is_shared_str = false;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ooxml_err(e)),
            _ => {}
        }
        buf.clear();
    }
    Ok(cells.join(" "))
}

/// Strip tags from HTML, keeping visible text.
///
/// Block-level elements become blank lines; `<script>`/`<style>` bodies
/// and comments are dropped entirely.
fn strip_html(html: &str) -> (String, Vec<Exclusion>) {
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len() / 2);
    let mut markup = 0usize;
    let mut script = 0usize;
    let mut pos = 0usize;

    while let Some(rel) = html[pos..].find('<') {
        let open = pos + rel;
        push_decoded(&mut out, &html[pos..open]);

        if lower[open..].starts_with("<!--") {
            let close = lower[open..]
                .find("-->")
                .map(|i| open + i + 3)
                .unwrap_or(html.len());
            markup += close - open;
            pos = close;
            continue;
        }

        let tag_end = lower[open..]
            .find('>')
            .map(|i| open + i + 1)
            .unwrap_or(html.len());
        let name = tag_name(&lower[open..tag_end]);
        markup += tag_end - open;
        pos = tag_end;

        if name == "script" || name == "style" {
            let closing = format!("</{}", name);
            let body_end = lower[pos..]
                .find(&closing)
                .map(|i| pos + i)
                .unwrap_or(html.len());
            script += body_end - pos;
            pos = body_end;
            continue;
        }

        match name {
            "br" => out.push('\n'),
            "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "section"
            | "article" | "blockquote" | "pre" | "table" | "ul" | "ol" => {
                if !out.is_empty() && !out.ends_with("\n\n") {
                    out.push_str("\n\n");
                }
            }
            _ => {}
        }
    }
    push_decoded(&mut out, &html[pos..]);

    let mut exclusions = Vec::new();
    if markup > 0 {
        exclusions.push(Exclusion {
            kind: ExclusionKind::Markup,
            bytes: markup,
        });
    }
    if script > 0 {
        exclusions.push(Exclusion {
            kind: ExclusionKind::Script,
            bytes: script,
        });
    }
    (out, exclusions)
}

/// Lowercased element name of a tag such as `</P class="x">`.
fn tag_name(tag: &str) -> &str {
    let inner = tag
        .trim_start_matches('<')
        .trim_start_matches('/')
        .trim_end_matches('>');
    let end = inner
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(inner.len());
    &inner[..end]
}

fn push_decoded(out: &mut String, text: &str) {
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail.find(';').filter(|&semi| semi <= 8).and_then(|semi| {
            let ch = match &tail[1..semi] {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" | "#39" => Some('\''),
                "nbsp" => Some(' '),
                _ => None,
            };
            ch.map(|c| (c, semi + 1))
        });
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
}
