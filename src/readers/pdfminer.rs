//! pdfminer XML reader.
//!
//! pdfminer emits one `<text>` element per glyph, so tokens have to be
//! reassembled: consecutive glyphs stay in one token while the font spec
//! matches, alphanumeric-ness matches, and the inter-glyph advance stays
//! within [`MAX_CHAR_DX`] of the average glyph width. pdfminer also leaks
//! control characters into its XML; those are scrubbed to U+FFFD before
//! parsing.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use lazy_static::lazy_static;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::error::{Error, Result};
use crate::readers::{merge_lines, open_maybe_gzip, Reader};
use crate::structures::{Block, Line, Page, Token, TokenFeatures};

/// Maximum glyph advance, as a fraction of the average glyph width, for two
/// glyphs to belong to the same token.
pub const MAX_CHAR_DX: f64 = 0.05;

lazy_static! {
    /// Characters not allowed in XML 1.0 (astral planes included).
    static ref INVALID_XML_CHAR: Regex =
        Regex::new(r"[^\x09\x0A\x0D\x20-\x{D7FF}\x{E000}-\x{FFFD}]").unwrap();
}

/// Replace characters that would choke the XML parser.
pub(crate) fn replace_invalid_xml_chars(input: &str) -> String {
    INVALID_XML_CHAR.replace_all(input, "\u{FFFD}").into_owned()
}

/// Reader for pdfminer's XML output.
#[derive(Debug)]
pub struct PdfMinerReader {
    path: PathBuf,
}

impl PdfMinerReader {
    /// Create a reader over a pdfminer XML file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Reader for PdfMinerReader {
    fn pages(&mut self) -> Result<Vec<Page>> {
        let mut raw = Vec::new();
        open_maybe_gzip(&self.path)?.read_to_end(&mut raw)?;
        let xml = replace_invalid_xml_chars(&String::from_utf8_lossy(&raw));
        parse_pdfminer(&xml, &self.path.to_string_lossy())
    }
}

#[derive(Debug, Clone)]
struct Glyph {
    text: String,
    font: String,
    size: f64,
    llx: f64,
    lly: f64,
    urx: f64,
    ury: f64,
}

/// Accumulates one textline's glyphs into token groups.
#[derive(Debug, Default)]
struct LineCluster {
    groups: Vec<Vec<Glyph>>,
    glyphs: Vec<Glyph>,
    last_urx: Option<f64>,
    last_width: Option<f64>,
    last_fontspec: Option<(String, f64)>,
    last_isalnum: Option<bool>,
}

fn is_alnum(s: &str) -> bool {
    !s.is_empty() && s.chars().all(char::is_alphanumeric)
}

impl LineCluster {
    fn push(&mut self, glyph: Glyph) {
        let fontspec = (glyph.font.clone(), glyph.size);
        let dx = self.last_urx.map_or(0.0, |last| glyph.llx - last);
        let width = glyph.urx - glyph.llx;
        let avg_width = match self.last_width {
            Some(last) if last != 0.0 => (last + width) / 2.0,
            _ => width,
        };
        // degenerate zero-width glyphs fall back to an identity divisor
        let avg_width = if avg_width == 0.0 { 1.0 } else { avg_width };
        let isalnum = is_alnum(&glyph.text);
        let last_isalnum = self.last_isalnum.unwrap_or(isalnum);

        let same_token = self.last_fontspec.as_ref() == Some(&fontspec)
            && (dx / avg_width) <= MAX_CHAR_DX
            && last_isalnum == isalnum;
        if self.glyphs.is_empty() || same_token {
            self.glyphs.push(glyph.clone());
        } else {
            self.groups.push(std::mem::take(&mut self.glyphs));
            self.glyphs.push(glyph.clone());
        }

        self.last_urx = Some(glyph.urx);
        self.last_width = Some(width);
        self.last_fontspec = Some(fontspec);
        self.last_isalnum = Some(isalnum);
    }

    fn into_line(mut self) -> Line {
        if !self.glyphs.is_empty() {
            self.groups.push(self.glyphs);
        }
        let tokens = self
            .groups
            .into_iter()
            .map(|glyphs| {
                let text: String = glyphs.iter().map(|g| g.text.as_str()).collect();
                let llx = glyphs.iter().map(|g| g.llx).fold(f64::INFINITY, f64::min);
                let lly = glyphs.iter().map(|g| g.lly).fold(f64::INFINITY, f64::min);
                let urx = glyphs.iter().map(|g| g.urx).fold(f64::NEG_INFINITY, f64::max);
                let ury = glyphs.iter().map(|g| g.ury).fold(f64::NEG_INFINITY, f64::max);
                let font = glyphs.first().map(|g| g.font.clone());
                Token::new(text, (llx, lly, urx, ury), font, None, TokenFeatures::default())
            })
            .collect();
        Line::from_tokens(tokens)
    }
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

fn parse_bbox(raw: &str, element: &str, file: &str) -> Result<(f64, f64, f64, f64)> {
    let invalid = || Error::InvalidAttribute {
        file: file.to_string(),
        element: element.to_string(),
        attribute: "bbox".to_string(),
        value: raw.to_string(),
    };
    let parts: Vec<f64> = raw
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| invalid())?;
    if parts.len() != 4 {
        return Err(invalid());
    }
    Ok((parts[0], parts[1], parts[2], parts[3]))
}

#[derive(Debug, Default)]
struct GlyphAttrs {
    font: Option<String>,
    size: Option<String>,
    bbox: Option<String>,
    text: String,
}

/// Parse scrubbed pdfminer XML into pages ordered by page number.
pub(crate) fn parse_pdfminer(xml: &str, file: &str) -> Result<Vec<Page>> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut pages: BTreeMap<u32, Page> = BTreeMap::new();

    let mut cur_page: Option<(u32, f64, f64)> = None; // id, width, height
    let mut cur_blocks: Vec<Block> = Vec::new();
    let mut cur_textbox: Option<(usize, Vec<Line>)> = None;
    let mut cur_line: Option<LineCluster> = None;
    let mut cur_glyph: Option<GlyphAttrs> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Empty(ref e)) => {
                // self-closing elements never see an End event; the only one
                // that matters is an empty page
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "page" {
                    if let Some(id_raw) = attr(e, "id") {
                        let id = id_raw.parse().map_err(|_| Error::InvalidAttribute {
                            file: file.to_string(),
                            element: "page".to_string(),
                            attribute: "id".to_string(),
                            value: id_raw.clone(),
                        })?;
                        let bbox_raw =
                            attr(e, "bbox").ok_or_else(|| Error::MissingAttribute {
                                file: file.to_string(),
                                element: "page".to_string(),
                                attribute: "bbox".to_string(),
                            })?;
                        let (llx, lly, urx, ury) = parse_bbox(&bbox_raw, "page", file)?;
                        pages.insert(id, Page::new(id, urx - llx, ury - lly, Vec::new()));
                    }
                }
            }
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "page" => {
                        let id_raw = attr(e, "id").ok_or_else(|| Error::MissingAttribute {
                            file: file.to_string(),
                            element: "page".to_string(),
                            attribute: "id".to_string(),
                        })?;
                        let id = id_raw.parse().map_err(|_| Error::InvalidAttribute {
                            file: file.to_string(),
                            element: "page".to_string(),
                            attribute: "id".to_string(),
                            value: id_raw.clone(),
                        })?;
                        let bbox_raw =
                            attr(e, "bbox").ok_or_else(|| Error::MissingAttribute {
                                file: file.to_string(),
                                element: "page".to_string(),
                                attribute: "bbox".to_string(),
                            })?;
                        let (llx, lly, urx, ury) = parse_bbox(&bbox_raw, "page", file)?;
                        cur_page = Some((id, urx - llx, ury - lly));
                        cur_blocks = Vec::new();
                    }
                    "textbox" if cur_page.is_some() => {
                        let id = attr(e, "id")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(cur_blocks.len());
                        cur_textbox = Some((id, Vec::new()));
                    }
                    "textline" if cur_textbox.is_some() => {
                        cur_line = Some(LineCluster::default());
                    }
                    "text" if cur_line.is_some() => {
                        cur_glyph = Some(GlyphAttrs {
                            font: attr(e, "font"),
                            size: attr(e, "size"),
                            bbox: attr(e, "bbox"),
                            text: String::new(),
                        });
                    }
                    _ => {}
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(glyph) = cur_glyph.as_mut() {
                    glyph.text.push_str(&e.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match name.as_str() {
                    "text" => {
                        if let (Some(glyph), Some(cluster)) = (cur_glyph.take(), cur_line.as_mut())
                        {
                            // line-break markers are whitespace-only and carry
                            // no layout; skip them before touching attributes
                            if glyph.text.trim().is_empty() {
                                continue;
                            }
                            let font = glyph.font.ok_or_else(|| Error::MissingAttribute {
                                file: file.to_string(),
                                element: "text".to_string(),
                                attribute: "font".to_string(),
                            })?;
                            let size_raw =
                                glyph.size.ok_or_else(|| Error::MissingAttribute {
                                    file: file.to_string(),
                                    element: "text".to_string(),
                                    attribute: "size".to_string(),
                                })?;
                            let size =
                                size_raw.parse().map_err(|_| Error::InvalidAttribute {
                                    file: file.to_string(),
                                    element: "text".to_string(),
                                    attribute: "size".to_string(),
                                    value: size_raw.clone(),
                                })?;
                            let bbox_raw =
                                glyph.bbox.ok_or_else(|| Error::MissingAttribute {
                                    file: file.to_string(),
                                    element: "text".to_string(),
                                    attribute: "bbox".to_string(),
                                })?;
                            let (llx, lly, urx, ury) = parse_bbox(&bbox_raw, "text", file)?;
                            cluster.push(Glyph {
                                text: glyph.text,
                                font,
                                size,
                                llx,
                                lly,
                                urx,
                                ury,
                            });
                        }
                    }
                    "textline" => {
                        if let (Some(cluster), Some((_, lines))) =
                            (cur_line.take(), cur_textbox.as_mut())
                        {
                            lines.push(cluster.into_line());
                        }
                    }
                    "textbox" => {
                        if let Some((id, lines)) = cur_textbox.take() {
                            let mut block = Block::new(id, "");
                            for line in merge_lines(lines) {
                                block.push(line);
                            }
                            cur_blocks.push(block);
                        }
                    }
                    "page" => {
                        if let Some((id, width, height)) = cur_page.take() {
                            pages.insert(
                                id,
                                Page::new(id, width, height, std::mem::take(&mut cur_blocks)),
                            );
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(source) => {
                return Err(Error::Xml {
                    file: file.to_string(),
                    source,
                })
            }
            _ => {}
        }
    }

    Ok(pages.into_values().collect())
}
