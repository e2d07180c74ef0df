//! TETML reader.
//!
//! TETML word elements carry a `<Text>` transcription plus one `<Box>` per
//! layout fragment; dehyphenated words have two boxes. Layout matters more
//! than transcription here, so every box becomes its own token built from
//! the box's glyphs. All of a `Para`'s tokens go into a single line: TETML
//! does not expose baselines, and the analyzer rebuilds lines anyway.

use std::collections::BTreeMap;
use std::hash::Hash;
use std::io::BufRead;
use std::path::PathBuf;

use indexmap::IndexMap;
use quick_xml::events::{BytesStart, Event};

use crate::error::{Error, Result};
use crate::readers::{open_maybe_gzip, Reader};
use crate::structures::{Block, Dehyphenation, Line, Page, Token, TokenFeatures};

/// Reader for the TETML XML dialect. `.gz` inputs decompress transparently.
#[derive(Debug)]
pub struct TetmlReader {
    path: PathBuf,
}

impl TetmlReader {
    /// Create a reader over a TETML file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Reader for TetmlReader {
    fn pages(&mut self) -> Result<Vec<Page>> {
        let input = open_maybe_gzip(&self.path)?;
        parse_tetml(input, &self.path.to_string_lossy())
    }
}

/// The most frequent item, first-seen winning ties.
fn most_common<T: Eq + Hash + Clone>(items: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: IndexMap<T, usize> = IndexMap::new();
    for item in items {
        *counts.entry(item).or_insert(0) += 1;
    }
    let mut best: Option<(&T, usize)> = None;
    for (key, &count) in &counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((key, count));
        }
    }
    best.map(|(key, _)| key.clone())
}

#[derive(Debug, Default)]
struct GlyphState {
    text: String,
    font: Option<String>,
    size: Option<String>,
    dehyphenation: Option<String>,
    sub: Option<String>,
    sup: Option<String>,
}

#[derive(Debug)]
struct BoxState {
    llx: f64,
    lly: f64,
    urx: f64,
    ury: f64,
    glyphs: Vec<GlyphState>,
}

#[derive(Debug, Default)]
struct PageState {
    id: u32,
    width: f64,
    height: f64,
    blocks: Vec<Block>,
}

fn attr(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

fn f64_attr(e: &BytesStart, name: &str, element: &str, file: &str) -> Result<f64> {
    let raw = attr(e, name).ok_or_else(|| Error::MissingAttribute {
        file: file.to_string(),
        element: element.to_string(),
        attribute: name.to_string(),
    })?;
    raw.parse().map_err(|_| Error::InvalidAttribute {
        file: file.to_string(),
        element: element.to_string(),
        attribute: name.to_string(),
        value: raw,
    })
}

fn u32_attr(e: &BytesStart, name: &str, element: &str, file: &str) -> Result<u32> {
    let raw = attr(e, name).ok_or_else(|| Error::MissingAttribute {
        file: file.to_string(),
        element: element.to_string(),
        attribute: name.to_string(),
    })?;
    raw.parse().map_err(|_| Error::InvalidAttribute {
        file: file.to_string(),
        element: element.to_string(),
        attribute: name.to_string(),
        value: raw,
    })
}

struct TetmlParser<'a> {
    file: &'a str,
    pages: BTreeMap<u32, Page>,
    page: Option<PageState>,
    para_tokens: Option<Vec<Token>>,
    cur_box: Option<BoxState>,
    in_glyph: bool,
}

impl<'a> TetmlParser<'a> {
    fn new(file: &'a str) -> Self {
        Self {
            file,
            pages: BTreeMap::new(),
            page: None,
            para_tokens: None,
            cur_box: None,
            in_glyph: false,
        }
    }

    fn handle_start(&mut self, name: &str, e: &BytesStart) -> Result<()> {
        match name {
            "Page" => {
                self.page = Some(PageState {
                    id: u32_attr(e, "number", "Page", self.file)?,
                    width: f64_attr(e, "width", "Page", self.file)?,
                    height: f64_attr(e, "height", "Page", self.file)?,
                    blocks: Vec::new(),
                });
            }
            "Para" => {
                self.para_tokens = Some(Vec::new());
            }
            "Box" if self.para_tokens.is_some() => {
                self.cur_box = Some(BoxState {
                    llx: f64_attr(e, "llx", "Box", self.file)?,
                    lly: f64_attr(e, "lly", "Box", self.file)?,
                    urx: f64_attr(e, "urx", "Box", self.file)?,
                    ury: f64_attr(e, "ury", "Box", self.file)?,
                    glyphs: Vec::new(),
                });
            }
            "Glyph" => {
                if let Some(boxstate) = self.cur_box.as_mut() {
                    boxstate.glyphs.push(GlyphState {
                        text: String::new(),
                        font: attr(e, "font"),
                        size: attr(e, "size"),
                        dehyphenation: attr(e, "dehyphenation"),
                        sub: attr(e, "sub"),
                        sup: attr(e, "sup"),
                    });
                    self.in_glyph = true;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str) {
        if self.in_glyph {
            if let Some(glyph) = self.cur_box.as_mut().and_then(|b| b.glyphs.last_mut()) {
                glyph.text.push_str(text);
            }
        }
    }

    fn handle_end(&mut self, name: &str) {
        match name {
            "Glyph" => self.in_glyph = false,
            "Box" => {
                if let (Some(boxstate), Some(tokens)) =
                    (self.cur_box.take(), self.para_tokens.as_mut())
                {
                    tokens.push(box_to_token(boxstate));
                }
            }
            "Para" => {
                if let (Some(tokens), Some(page)) = (self.para_tokens.take(), self.page.as_mut()) {
                    let mut block = Block::new(page.blocks.len() + 1, "");
                    block.push(Line::from_tokens(tokens));
                    page.blocks.push(block);
                }
            }
            "Page" => {
                if let Some(page) = self.page.take() {
                    self.pages
                        .insert(page.id, Page::new(page.id, page.width, page.height, page.blocks));
                }
            }
            _ => {}
        }
    }
}

/// Build the token for one word box from its glyphs.
///
/// Font and super/subscript flags follow the most common value over the
/// box's glyphs; a `dehyphenation=pre` tail re-appends the hyphen the
/// extractor removed. Size is left to the box height.
fn box_to_token(boxstate: BoxState) -> Token {
    let mut text: String = boxstate.glyphs.iter().map(|g| g.text.as_str()).collect();
    let mut features = TokenFeatures::default();

    let last_dehyph = boxstate.glyphs.last().and_then(|g| g.dehyphenation.as_deref());
    let first_dehyph = boxstate.glyphs.first().and_then(|g| g.dehyphenation.as_deref());
    if last_dehyph == Some("pre") {
        text.push('-');
        features.dehyphenation = Some(Dehyphenation::Pre);
    } else if first_dehyph == Some("post") {
        features.dehyphenation = Some(Dehyphenation::Post);
    }

    let font = most_common(
        boxstate
            .glyphs
            .iter()
            .map(|g| (g.font.clone(), g.size.clone())),
    )
    .and_then(|(font, _)| font);

    if let Some((sub, sup)) = most_common(boxstate.glyphs.iter().map(|g| {
        (
            g.sub.clone().unwrap_or_default(),
            g.sup.clone().unwrap_or_default(),
        )
    })) {
        if !sub.is_empty() {
            features.sub = true;
        }
        if !sup.is_empty() {
            features.sup = true;
        }
    }

    Token::new(
        text,
        (boxstate.llx, boxstate.lly, boxstate.urx, boxstate.ury),
        font,
        None,
        features,
    )
}

/// Parse a TETML stream into pages ordered by page number.
pub(crate) fn parse_tetml(input: Box<dyn BufRead>, file: &str) -> Result<Vec<Page>> {
    let mut reader = quick_xml::Reader::from_reader(input);
    let mut parser = TetmlParser::new(file);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                parser.handle_start(&name, e)?;
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                parser.handle_start(&name, e)?;
                parser.handle_end(&name);
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().unwrap_or_default().to_string();
                parser.handle_text(&text);
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                parser.handle_end(&name);
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
        buf.clear();
    }

    Ok(parser.pages.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(xml: &str) -> Vec<Page> {
        let input: Box<dyn BufRead> = Box::new(Cursor::new(xml.as_bytes().to_vec()));
        parse_tetml(input, "test.tetml").unwrap()
    }

    const SIMPLE: &str = r#"<?xml version="1.0"?>
<TET xmlns="http://www.pdflib.com/XML/TET3/TET-3.0">
 <Document>
  <Pages>
   <Page number="1" width="612" height="792">
    <Content granularity="word">
     <Para>
      <Word>
       <Text>hi</Text>
       <Box llx="2" lly="5" urx="8" ury="15">
        <Glyph font="F0" size="10" x="2" y="5" width="3">h</Glyph>
        <Glyph font="F0" size="10" x="5" y="5" width="3">i</Glyph>
       </Box>
      </Word>
     </Para>
    </Content>
   </Page>
  </Pages>
 </Document>
</TET>"#;

    #[test]
    fn test_simple_word() {
        let pages = parse(SIMPLE);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id(), 1);
        assert_eq!(pages[0].page_width(), 612.0);
        let tokens = pages[0].tokens();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text(), "hi");
        assert_eq!(tokens[0].font(), Some("F0"));
        assert_eq!(tokens[0].llx(), 2.0);
        assert_eq!(tokens[0].size(), 10.0); // size unset, box height used
    }

    #[test]
    fn test_namespace_is_stripped() {
        // SIMPLE carries the default TET namespace; parsing it at all
        // demonstrates local-name matching
        assert_eq!(parse(SIMPLE)[0].blocks().len(), 1);
    }

    #[test]
    fn test_dehyphenation_pre_appends_hyphen() {
        let xml = r#"<TET><Document><Pages>
<Page number="1" width="100" height="100">
 <Content><Para><Word>
  <Text>example</Text>
  <Box llx="0" lly="0" urx="20" ury="10">
   <Glyph font="F0" size="10">e</Glyph>
   <Glyph font="F0" size="10" dehyphenation="pre">x</Glyph>
  </Box>
  <Box llx="0" lly="0" urx="20" ury="10">
   <Glyph font="F0" size="10" dehyphenation="post">a</Glyph>
  </Box>
 </Word></Para></Content>
</Page></Pages></Document></TET>"#;
        let pages = parse(xml);
        let tokens = pages[0].tokens();
        assert_eq!(tokens[0].text(), "ex-");
        assert_eq!(tokens[0].features().dehyphenation, Some(Dehyphenation::Pre));
        assert_eq!(tokens[1].text(), "a");
        assert_eq!(tokens[1].features().dehyphenation, Some(Dehyphenation::Post));
    }

    #[test]
    fn test_sup_flag_from_majority() {
        let xml = r#"<TET><Document><Pages>
<Page number="1" width="100" height="100">
 <Content><Para><Word>
  <Text>2</Text>
  <Box llx="0" lly="0" urx="5" ury="5">
   <Glyph font="F0" size="5" sup="yes">2</Glyph>
  </Box>
 </Word></Para></Content>
</Page></Pages></Document></TET>"#;
        let pages = parse(xml);
        assert!(pages[0].tokens()[0].features().sup);
        assert!(!pages[0].tokens()[0].features().sub);
    }

    #[test]
    fn test_mixed_fonts_take_most_common() {
        let xml = r#"<TET><Document><Pages>
<Page number="1" width="100" height="100">
 <Content><Para><Word>
  <Text>abc</Text>
  <Box llx="0" lly="0" urx="15" ury="10">
   <Glyph font="F1" size="10">a</Glyph>
   <Glyph font="F2" size="10">b</Glyph>
   <Glyph font="F2" size="10">c</Glyph>
  </Box>
 </Word></Para></Content>
</Page></Pages></Document></TET>"#;
        let pages = parse(xml);
        assert_eq!(pages[0].tokens()[0].font(), Some("F2"));
    }

    #[test]
    fn test_pages_sorted_by_number() {
        let xml = r#"<TET><Document><Pages>
<Page number="2" width="100" height="100"><Content/></Page>
<Page number="1" width="100" height="100"><Content/></Page>
</Pages></Document></TET>"#;
        let pages = parse(xml);
        assert_eq!(pages[0].id(), 1);
        assert_eq!(pages[1].id(), 2);
    }

    #[test]
    fn test_empty_page() {
        let xml = r#"<TET><Document><Pages>
<Page number="1" width="100" height="100"/>
</Pages></Document></TET>"#;
        let pages = parse(xml);
        assert_eq!(pages.len(), 1);
        assert!(pages[0].tokens().is_empty());
    }

    #[test]
    fn test_invalid_numeric_attribute_is_fatal() {
        let xml = r#"<TET><Document><Pages>
<Page number="1" width="wide" height="100"/>
</Pages></Document></TET>"#;
        let input: Box<dyn BufRead> = Box::new(Cursor::new(xml.as_bytes().to_vec()));
        let err = parse_tetml(input, "bad.tetml").unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("width"), "got {}", msg);
        assert!(msg.contains("bad.tetml"), "got {}", msg);
    }
}
