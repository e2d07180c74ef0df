//! The line-oriented serialization format.
//!
//! An emitted document is UTF-8 text (optionally gzipped) of blocks
//! separated by blank lines. Each block opens with a `doc_id=...` header
//! carrying its page, id, bbox, cut label and global line span; each
//! following record is a `line` preamble, a colon aligned across the block,
//! and the respaced text. The format is its own reader: [`LineateDoc::read`]
//! re-parses anything [`LineateDoc::write`] produced.
//!
//! Ownership follows the id-map design: the document owns ordered maps of
//! blocks and lines, blocks hold only line numbers, lines hold only their
//! block id. No back-pointers, no cycles.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, Write};
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::readers::open_maybe_gzip;
use crate::respace::respace;
use crate::structures::Document;

lazy_static! {
    /// Splits a data record into preamble and text at the first colon.
    static ref LINE_RE: Regex = Regex::new(r"(line.*?):(.*)").unwrap();
    /// Anchors of `key=` pairs inside a preamble.
    static ref KEY_RE: Regex = Regex::new(r"\S+=").unwrap();
    /// A serialized font: identifier, dash, size.
    static ref FONT_RE: Regex = Regex::new(r"([^\-]+)\-([0-9\.\-]+)").unwrap();
}

/// Canonical preamble attribute order; anything else sorts after these,
/// lexicographically.
const ATTR_ORDER: [&str; 6] = ["line", "tag", "span_id", "lang_name", "lang_code", "fonts"];

fn attr_rank(key: &str) -> usize {
    ATTR_ORDER
        .iter()
        .position(|&k| k == key)
        .unwrap_or(ATTR_ORDER.len())
}

/// A `{font}-{size}` pair as serialized in the `fonts` attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct LineateFont {
    /// Opaque font identifier
    pub name: String,
    /// Point size, carried to one decimal
    pub size: f64,
}

impl LineateFont {
    /// Parse a serialized font pair.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::serialize::LineateFont;
    ///
    /// let font = LineateFont::parse("F0-10.0").unwrap();
    /// assert_eq!(font.name, "F0");
    /// assert_eq!(font.to_string(), "F0-10.0");
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let caps = FONT_RE.captures(s)?;
        Some(Self {
            name: caps[1].to_string(),
            size: caps[2].parse().ok()?,
        })
    }
}

impl fmt::Display for LineateFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:.1}", self.name, self.size)
    }
}

/// One serialized text line with its preamble attributes.
///
/// The owning block is referenced by id only; the document's line map is
/// the single owner.
#[derive(Debug, Clone, Default)]
pub struct LineateLine {
    text: String,
    block_id: Option<String>,
    attrs: IndexMap<String, String>,
}

impl LineateLine {
    /// Create a line from its text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            block_id: None,
            attrs: IndexMap::new(),
        }
    }

    /// Id of the block this line belongs to.
    pub fn block_id(&self) -> Option<&str> {
        self.block_id.as_deref()
    }

    /// Attach the line to a block by id.
    pub fn set_block_id(&mut self, block_id: impl Into<String>) {
        self.block_id = Some(block_id.into());
    }

    /// The line text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Fetch an attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|v| v.as_str())
    }

    /// Set an attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Global 1-based line number (the `line` attribute, always present).
    pub fn lineno(&self) -> usize {
        self.attr("line").and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    /// IGT tag, `O` (outside) when untagged.
    pub fn tag(&self) -> &str {
        self.attr("tag").unwrap_or("O")
    }

    /// Span membership id, if tagged.
    pub fn span_id(&self) -> Option<&str> {
        self.attr("span_id")
    }

    /// Fonts present on this line.
    pub fn fonts(&self) -> Vec<LineateFont> {
        self.attr("fonts")
            .map(|v| v.split(',').filter_map(LineateFont::parse).collect())
            .unwrap_or_default()
    }

    /// The preamble: `k=v` pairs in canonical order.
    pub fn preamble(&self) -> String {
        let mut keys: Vec<&String> = self.attrs.keys().collect();
        keys.sort_by(|a, b| (attr_rank(a), a.as_str()).cmp(&(attr_rank(b), b.as_str())));
        keys.iter()
            .map(|k| format!("{}={}", k, &self.attrs[k.as_str()]))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Parse a serialized record (preamble, colon, text) back into a line.
    ///
    /// Values may contain spaces; pairs are recovered by scanning for the
    /// next `key=` anchor rather than splitting on whitespace.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::serialize::LineateLine;
    ///
    /// let line = LineateLine::reads("line=3 tag=L fonts=F0-10.0:kos bibi", 1).unwrap();
    /// assert_eq!(line.lineno(), 3);
    /// assert_eq!(line.tag(), "L");
    /// assert_eq!(line.text(), "kos bibi");
    /// ```
    pub fn reads(record: &str, lineno: usize) -> Result<Self> {
        let caps = LINE_RE.captures(record).ok_or_else(|| Error::MalformedLine {
            lineno,
            reason: "no preamble separator".to_string(),
        })?;
        let preamble = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let text = caps.get(2).map(|m| m.as_str()).unwrap_or("");

        let mut line = Self::new(text);
        let anchors: Vec<_> = KEY_RE.find_iter(preamble).collect();
        for (i, anchor) in anchors.iter().enumerate() {
            let key = preamble[anchor.start()..anchor.end() - 1].trim();
            let value_end = anchors
                .get(i + 1)
                .map(|next| next.start())
                .unwrap_or(preamble.len());
            let value = preamble[anchor.end()..value_end].trim();
            if !key.is_empty() && !value.is_empty() {
                line.set_attr(key, value);
            }
        }
        Ok(line)
    }
}

/// One serialized block: header attributes plus the line numbers it owns.
#[derive(Debug, Clone, Default)]
pub struct LineateBlock {
    linenos: Vec<usize>,
    attrs: IndexMap<String, String>,
}

impl LineateBlock {
    /// Create an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a header attribute.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|v| v.as_str())
    }

    /// Set a header attribute.
    pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attrs.insert(key.into(), value.into());
    }

    /// Claim a line number for this block.
    pub fn push_lineno(&mut self, lineno: usize) {
        self.linenos.push(lineno);
    }

    /// Line numbers owned by this block, in order.
    pub fn linenos(&self) -> &[usize] {
        &self.linenos
    }

    /// Block id, formed as `{page}-{ordinal}`.
    pub fn block_id(&self) -> &str {
        self.attr("block_id").unwrap_or("")
    }

    /// Page number the block came from.
    pub fn page(&self) -> Option<u32> {
        self.attr("page").and_then(|v| v.parse().ok())
    }

    /// XY-cut path label, if the block has one.
    pub fn label(&self) -> Option<&str> {
        self.attr("label")
    }

    /// The raw bbox attribute, `0,0,0,0` when unset.
    pub fn bbox_str(&self) -> &str {
        self.attr("bbox").unwrap_or("0,0,0,0")
    }

    /// Block bounding box; unparseable components read as 0.
    pub fn bbox(&self) -> (f64, f64, f64, f64) {
        let mut dims = [0.0f64; 4];
        for (i, part) in self.bbox_str().split(',').take(4).enumerate() {
            dims[i] = part.trim().parse().unwrap_or(0.0);
        }
        (dims[0], dims[1], dims[2], dims[3])
    }
}

/// A whole serialized document: ordered block and line maps.
#[derive(Debug, Clone, Default)]
pub struct LineateDoc {
    blockmap: IndexMap<String, LineateBlock>,
    linemap: IndexMap<usize, LineateLine>,
}

impl LineateDoc {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines in the document.
    pub fn len(&self) -> usize {
        self.linemap.len()
    }

    /// True when the document holds no lines.
    pub fn is_empty(&self) -> bool {
        self.linemap.is_empty()
    }

    /// Blocks in document order.
    pub fn blocks(&self) -> impl Iterator<Item = &LineateBlock> {
        self.blockmap.values()
    }

    /// Lines in document order.
    pub fn lines(&self) -> impl Iterator<Item = &LineateLine> {
        self.linemap.values()
    }

    /// Look up a line by its global number.
    pub fn get_line(&self, lineno: usize) -> Option<&LineateLine> {
        self.linemap.get(&lineno)
    }

    /// Register a line under its `line` attribute.
    pub fn add_line(&mut self, line: LineateLine) {
        self.linemap.insert(line.lineno(), line);
    }

    /// Register a block under its block id. Its lines must already be in the
    /// line map.
    pub fn add_block(&mut self, block: LineateBlock) {
        self.blockmap.insert(block.block_id().to_string(), block);
    }

    /// The ordered `span_id -> (first, last)` line-number map over every
    /// tagged span in the document.
    pub fn spans(&self) -> IndexMap<String, (usize, usize)> {
        let mut spans = IndexMap::new();
        let mut open: Option<(String, usize, usize)> = None;
        for line in self.lines() {
            match line.span_id() {
                Some(span_id) => match open.as_mut() {
                    Some((id, _, last)) if id == span_id => *last = line.lineno(),
                    _ => {
                        if let Some((id, first, last)) = open.take() {
                            spans.insert(id, (first, last));
                        }
                        open = Some((span_id.to_string(), line.lineno(), line.lineno()));
                    }
                },
                None => {
                    if let Some((id, first, last)) = open.take() {
                        spans.insert(id, (first, last));
                    }
                }
            }
        }
        if let Some((id, first, last)) = open.take() {
            spans.insert(id, (first, last));
        }
        spans
    }

    fn render_block(&self, block: &LineateBlock) -> String {
        let lines: Vec<&LineateLine> = block
            .linenos()
            .iter()
            .filter_map(|n| self.get_line(*n))
            .collect();
        let start_line = lines.first().map(|l| l.lineno()).unwrap_or(0);
        let stop_line = lines.last().map(|l| l.lineno()).unwrap_or(0);

        let mut out = format!(
            "doc_id={} page={} block_id={} bbox={} label={} {} {}\n",
            block.attr("doc_id").unwrap_or("None"),
            block.attr("page").unwrap_or("None"),
            block.block_id(),
            block.bbox_str(),
            block.label().unwrap_or("None"),
            start_line,
            stop_line
        );

        let max_pre_len = lines.iter().map(|l| l.preamble().len()).max().unwrap_or(0);
        let rendered: Vec<String> = lines
            .iter()
            .map(|l| format!("{:<width$}:{}", l.preamble(), l.text(), width = max_pre_len))
            .collect();
        out.push_str(&rendered.join("\n"));
        out
    }

    /// Read a serialized document, decompressing `.gz` transparently.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use lineate::serialize::LineateDoc;
    ///
    /// let doc = LineateDoc::read("paper.txt.gz".as_ref())?;
    /// println!("{} lines", doc.len());
    /// # Ok::<(), lineate::Error>(())
    /// ```
    pub fn read(path: &Path) -> Result<Self> {
        Self::read_from(open_maybe_gzip(path)?)
    }

    /// Read a serialized document from any line source.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::serialize::LineateDoc;
    ///
    /// let text = "doc_id=d page=1 block_id=1-1 bbox=2,5,8,15 label= 1 1\n\
    ///             line=1 fonts=F0-10.0 bbox=2,5,8,15:hi";
    /// let doc = LineateDoc::read_from(Box::new(std::io::Cursor::new(text.as_bytes()))).unwrap();
    /// assert_eq!(doc.len(), 1);
    /// assert_eq!(doc.get_line(1).unwrap().text(), "hi");
    /// // writing it back reproduces the input byte for byte
    /// assert_eq!(doc.to_string(), text);
    /// ```
    pub fn read_from(input: Box<dyn BufRead>) -> Result<Self> {
        let mut doc = Self::new();
        let mut cur_block: Option<LineateBlock> = None;

        for (i, line) in input.lines().enumerate() {
            let line = line?;
            let lineno = i + 1;
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with("doc_id") {
                if let Some(block) = cur_block.take() {
                    doc.add_block(block);
                }
                let mut block = LineateBlock::new();
                let fields: Vec<&str> = line.split_whitespace().collect();
                let kv_fields = fields.len().saturating_sub(2);
                for field in &fields[..kv_fields] {
                    let (key, value) =
                        field.split_once('=').ok_or_else(|| Error::MalformedLine {
                            lineno,
                            reason: format!("header field without '=': {:?}", field),
                        })?;
                    block.set_attr(key.trim(), value.trim());
                }
                cur_block = Some(block);
            } else if line.starts_with("line") {
                let mut record = LineateLine::reads(&line, lineno)?;
                match cur_block.as_mut() {
                    Some(block) => {
                        block.push_lineno(record.lineno());
                        record.set_block_id(block.block_id());
                    }
                    None => return Err(Error::OrphanLine(lineno)),
                }
                doc.add_line(record);
            }
        }
        if let Some(block) = cur_block.take() {
            doc.add_block(block);
        }
        Ok(doc)
    }

    /// Write the document, creating parent directories and gzipping when
    /// asked. The caller appends `.gz` to the path beforehand.
    pub fn write(&self, path: &Path, gzip: bool) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let rendered = self.to_string();
        if gzip {
            let mut encoder = GzEncoder::new(File::create(path)?, Compression::default());
            encoder.write_all(rendered.as_bytes())?;
            encoder.finish()?;
        } else {
            File::create(path)?.write_all(rendered.as_bytes())?;
        }
        Ok(())
    }

    /// Build the serialized document from an analyzed layout document.
    ///
    /// This is where geometry becomes text: every block is respaced against
    /// the document-wide left margin, lines are numbered globally from 1,
    /// and each line carries its fonts, bbox and interlinear score.
    pub fn from_layout(doc: &Document) -> Self {
        let mut fd = Self::new();
        let mut line_no: usize = 1;

        let l_margin = doc
            .pages()
            .iter()
            .flat_map(|p| p.tokens())
            .map(|t| t.llx())
            .fold(f64::INFINITY, f64::min);
        let l_margin = if l_margin.is_finite() { l_margin } else { 0.0 };

        for page in doc.pages() {
            for blk in page.blocks() {
                let bbox = blk.bbox();
                let mut block = LineateBlock::new();
                block.set_attr("doc_id", doc.doc_id());
                block.set_attr("page", page.id().to_string());
                block.set_attr("block_id", format!("{}-{}", page.id(), blk.id()));
                block.set_attr(
                    "bbox",
                    format!("{},{},{},{}", bbox.llx, bbox.lly, bbox.urx, bbox.ury),
                );
                block.set_attr("label", blk.label());

                for (i, (text, iscore)) in respace(blk, -l_margin).into_iter().enumerate() {
                    let layout_line = &blk.lines()[i];
                    let mut fonts: Vec<String> = layout_line
                        .tokens()
                        .iter()
                        .map(|t| {
                            format!("{}-{:.1}", t.font().unwrap_or("None"), t.size())
                        })
                        .collect();
                    fonts.sort();
                    fonts.dedup();
                    let lbbox = layout_line.bbox();

                    let mut record = LineateLine::new(text);
                    record.set_block_id(format!("{}-{}", page.id(), blk.id()));
                    record.set_attr("line", (line_no + i).to_string());
                    record.set_attr("fonts", fonts.join(","));
                    record.set_attr(
                        "bbox",
                        format!("{},{},{},{}", lbbox.llx, lbbox.lly, lbbox.urx, lbbox.ury),
                    );
                    if let Some(score) = iscore {
                        record.set_attr("iscore", format!("{:.2}", score));
                    }
                    block.push_lineno(line_no + i);
                    fd.add_line(record);
                }

                fd.add_block(block);
                line_no += blk.lines().len();
            }
        }
        fd
    }
}

impl fmt::Display for LineateDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let blocks: Vec<String> = self.blocks().map(|b| self.render_block(b)).collect();
        write!(f, "{}", blocks.join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_str(s: &str) -> LineateDoc {
        let input: Box<dyn BufRead> = Box::new(Cursor::new(s.as_bytes().to_vec()));
        LineateDoc::read_from(input).unwrap()
    }

    #[test]
    fn test_font_display_and_parse() {
        let font = LineateFont {
            name: "F0".to_string(),
            size: 10.0,
        };
        assert_eq!(font.to_string(), "F0-10.0");
        let parsed = LineateFont::parse("F0-10.0").unwrap();
        assert_eq!(parsed, font);
    }

    #[test]
    fn test_preamble_canonical_order() {
        let mut line = LineateLine::new("text");
        line.set_attr("iscore", "1.00");
        line.set_attr("bbox", "1,2,3,4");
        line.set_attr("fonts", "F0-10.0");
        line.set_attr("tag", "L");
        line.set_attr("line", "3");
        assert_eq!(
            line.preamble(),
            "line=3 tag=L fonts=F0-10.0 bbox=1,2,3,4 iscore=1.00"
        );
    }

    #[test]
    fn test_reads_round_trips_attrs() {
        let line =
            LineateLine::reads("line=5 tag=L fonts=F0-10.0 bbox=1,2,3,4:kos bibi", 1).unwrap();
        assert_eq!(line.lineno(), 5);
        assert_eq!(line.tag(), "L");
        assert_eq!(line.text(), "kos bibi");
        assert_eq!(line.fonts()[0].name, "F0");
        assert_eq!(line.attr("bbox"), Some("1,2,3,4"));
    }

    #[test]
    fn test_reads_tolerates_spaces_in_values() {
        let line = LineateLine::reads("line=1 lang_name=Tok Pisin fonts=F0-10.0:x", 1).unwrap();
        assert_eq!(line.attr("lang_name"), Some("Tok Pisin"));
        assert_eq!(line.attr("fonts"), Some("F0-10.0"));
    }

    #[test]
    fn test_reads_rejects_garbage() {
        assert!(LineateLine::reads("no separator here", 1).is_err());
    }

    #[test]
    fn test_block_bbox_fallbacks() {
        let block = LineateBlock::new();
        assert_eq!(block.bbox_str(), "0,0,0,0");
        let mut block = LineateBlock::new();
        block.set_attr("bbox", "1.5,2,junk,4");
        assert_eq!(block.bbox(), (1.5, 2.0, 0.0, 4.0));
    }

    const SAMPLE: &str = "doc_id=d1 page=1 block_id=1-1 bbox=2,5,8,15 label= 1 2\n\
line=1 fonts=F0-10.0 bbox=2,5,8,15           :hi\n\
line=2 fonts=F0-10.0 bbox=2,5,8,15 iscore=1.00:ho\n\
\n\
doc_id=d1 page=2 block_id=2-1 bbox=0,0,4,4 label=lt 3 3\n\
line=3 fonts=F1-9.0 bbox=0,0,4,4:x";

    #[test]
    fn test_read_structure() {
        let doc = read_str(SAMPLE);
        assert_eq!(doc.len(), 3);
        let blocks: Vec<&LineateBlock> = doc.blocks().collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].block_id(), "1-1");
        assert_eq!(blocks[0].linenos(), &[1, 2]);
        assert_eq!(blocks[1].label(), Some("lt"));
        assert_eq!(blocks[1].page(), Some(2));
        assert_eq!(doc.get_line(2).unwrap().text(), "ho");
    }

    #[test]
    fn test_serialize_round_trip_is_byte_identical() {
        let doc = read_str(SAMPLE);
        let first = doc.to_string();
        let doc2 = read_str(&first);
        assert_eq!(first, doc2.to_string());
    }

    #[test]
    fn test_orphan_line_is_fatal() {
        let input: Box<dyn BufRead> =
            Box::new(Cursor::new(b"line=1 fonts=F0-10.0:x".to_vec()));
        assert!(matches!(
            LineateDoc::read_from(input),
            Err(Error::OrphanLine(1))
        ));
    }

    #[test]
    fn test_spans() {
        let mut doc = LineateDoc::new();
        let mut block = LineateBlock::new();
        block.set_attr("block_id", "1-1");
        for (no, span) in [(1usize, None), (2, Some("s0")), (3, Some("s0")), (4, Some("s1"))] {
            let mut line = LineateLine::new("x");
            line.set_attr("line", no.to_string());
            if let Some(span_id) = span {
                line.set_attr("span_id", span_id);
            }
            block.push_lineno(no);
            doc.add_line(line);
        }
        doc.add_block(block);
        let spans = doc.spans();
        assert_eq!(spans.get("s0"), Some(&(2, 3)));
        assert_eq!(spans.get("s1"), Some(&(4, 4)));
    }

    #[test]
    fn test_untagged_line_defaults_to_outside() {
        let line = LineateLine::new("x");
        assert_eq!(line.tag(), "O");
    }
}
