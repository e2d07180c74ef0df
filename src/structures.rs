//! Core data model for layout analysis.
//!
//! Tokens come from a reader and are immutable; Lines, Blocks and Pages are
//! built up by the analyzer and own their contents outright. Coordinates use
//! PDF conventions: origin at the lower-left, y increasing up the page.

/// An axis-aligned bounding box in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    /// Lower-left x
    pub llx: f64,
    /// Lower-left y
    pub lly: f64,
    /// Upper-right x
    pub urx: f64,
    /// Upper-right y
    pub ury: f64,
}

impl BBox {
    /// Create a new bounding box from its corners.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::structures::BBox;
    ///
    /// let bbox = BBox::new(2.0, 5.0, 8.0, 15.0);
    /// assert_eq!(bbox.width(), 6.0);
    /// assert_eq!(bbox.height(), 10.0);
    /// ```
    pub fn new(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self { llx, lly, urx, ury }
    }

    /// Box width.
    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    /// Box height.
    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    /// Expand the box to contain itself and `other`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::structures::BBox;
    ///
    /// let mut bbox = BBox::new(0.0, 0.0, 5.0, 5.0);
    /// bbox.merge(&BBox::new(3.0, -1.0, 8.0, 4.0));
    /// assert_eq!((bbox.llx, bbox.lly, bbox.urx, bbox.ury), (0.0, -1.0, 8.0, 5.0));
    /// ```
    pub fn merge(&mut self, other: &BBox) {
        self.llx = self.llx.min(other.llx);
        self.lly = self.lly.min(other.lly);
        self.urx = self.urx.max(other.urx);
        self.ury = self.ury.max(other.ury);
    }
}

/// Dehyphenation role of a token that was split across a line break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dehyphenation {
    /// Token before the break (the hyphenated half)
    Pre,
    /// Token after the break
    Post,
}

/// Boolean layout flags attached to a token by the reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenFeatures {
    /// Token is a subscript
    pub sub: bool,
    /// Token is a superscript
    pub sup: bool,
    /// Token participates in dehyphenation
    pub dehyphenation: Option<Dehyphenation>,
}

impl TokenFeatures {
    /// True when no flag is set.
    pub fn is_empty(&self) -> bool {
        !self.sub && !self.sup && self.dehyphenation.is_none()
    }
}

/// A glyph run produced by a reader. Immutable after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    text: String,
    bbox: BBox,
    font: Option<String>,
    size: f64,
    features: TokenFeatures,
}

/// Round a coordinate to tenths of a point.
fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

impl Token {
    /// Create a token. Coordinates are rounded to 0.1 pt; when `size` is
    /// unknown the box height is used as an estimate.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::structures::{Token, TokenFeatures};
    ///
    /// let token = Token::new(
    ///     "hi",
    ///     (2.04, 5.0, 8.0, 15.0),
    ///     Some("F0".to_string()),
    ///     None,
    ///     TokenFeatures::default(),
    /// );
    /// assert_eq!(token.llx(), 2.0); // rounded to tenths
    /// assert_eq!(token.size(), 10.0); // defaults to the box height
    /// assert_eq!(token.font(), Some("F0"));
    /// ```
    pub fn new(
        text: impl Into<String>,
        bbox: (f64, f64, f64, f64),
        font: Option<String>,
        size: Option<f64>,
        features: TokenFeatures,
    ) -> Self {
        let bbox = BBox::new(
            round_tenth(bbox.0),
            round_tenth(bbox.1),
            round_tenth(bbox.2),
            round_tenth(bbox.3),
        );
        let size = size.unwrap_or(bbox.ury - bbox.lly);
        Self {
            text: text.into(),
            bbox,
            font,
            size,
            features,
        }
    }

    /// Token text (may be empty).
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bounding box.
    pub fn bbox(&self) -> &BBox {
        &self.bbox
    }

    /// Opaque font identifier, if the reader supplied one.
    pub fn font(&self) -> Option<&str> {
        self.font.as_deref()
    }

    /// Point size (box height when the reader supplied none).
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Layout feature flags.
    pub fn features(&self) -> &TokenFeatures {
        &self.features
    }

    /// Lower-left x.
    pub fn llx(&self) -> f64 {
        self.bbox.llx
    }

    /// Lower-left y.
    pub fn lly(&self) -> f64 {
        self.bbox.lly
    }

    /// Upper-right x.
    pub fn urx(&self) -> f64 {
        self.bbox.urx
    }

    /// Upper-right y.
    pub fn ury(&self) -> f64 {
        self.bbox.ury
    }

    /// Box width.
    pub fn width(&self) -> f64 {
        self.bbox.width()
    }

    /// Box height.
    pub fn height(&self) -> f64 {
        self.bbox.height()
    }
}

/// An ordered run of tokens sharing an approximate baseline.
///
/// The bounding box is cached and re-derived as tokens are appended.
#[derive(Debug, Clone, Default)]
pub struct Line {
    tokens: Vec<Token>,
    bbox: Option<BBox>,
}

impl Line {
    /// Create an empty line.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a line from tokens.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::structures::{Line, Token, TokenFeatures};
    ///
    /// let mut line = Line::from_tokens(vec![
    ///     Token::new("world", (30.0, 0.0, 60.0, 10.0), None, None, TokenFeatures::default()),
    ///     Token::new("hello", (0.0, 0.0, 25.0, 10.0), None, None, TokenFeatures::default()),
    /// ]);
    /// line.sort();
    /// assert_eq!(line.tokens()[0].text(), "hello");
    /// assert_eq!(line.bbox().urx, 60.0);
    /// ```
    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        let mut line = Self::new();
        for token in tokens {
            line.push(token);
        }
        line
    }

    /// Append a token, growing the cached box.
    pub fn push(&mut self, token: Token) {
        match self.bbox.as_mut() {
            Some(bbox) => bbox.merge(token.bbox()),
            None => self.bbox = Some(*token.bbox()),
        }
        self.tokens.push(token);
    }

    /// Append every token from `iter`.
    pub fn extend<I: IntoIterator<Item = Token>>(&mut self, iter: I) {
        for token in iter {
            self.push(token);
        }
    }

    /// Tokens in their current order.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// True when the line holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Bounding box over the tokens; a zero box when empty.
    pub fn bbox(&self) -> BBox {
        self.bbox.unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Order tokens left-to-right by `llx`.
    pub fn sort(&mut self) {
        self.tokens.sort_by(|a, b| a.llx().total_cmp(&b.llx()));
    }

    /// Vertical overlap with `other` as a fraction of the shorter line's
    /// height. Super/subscript fragments that dangle across a baseline give
    /// small positive values; disjoint lines give 0.0.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::structures::{Line, Token, TokenFeatures};
    ///
    /// let base = Line::from_tokens(vec![
    ///     Token::new("x", (0.0, 0.0, 5.0, 12.0), None, None, TokenFeatures::default()),
    /// ]);
    /// // a superscript band dipping 2pt into the 4pt-tall fragment
    /// let sup = Line::from_tokens(vec![
    ///     Token::new("2", (6.0, 10.0, 9.0, 14.0), None, None, TokenFeatures::default()),
    /// ]);
    /// assert_eq!(base.overlap(&sup), 0.5);
    /// ```
    pub fn overlap(&self, other: &Line) -> f64 {
        let mut a = self.bbox();
        let mut b = other.bbox();
        if a.ury <= b.lly || a.lly >= b.ury {
            return 0.0;
        }
        if a.ury == b.ury && a.lly == b.lly {
            return 1.0;
        }
        if a.height() < b.height() {
            std::mem::swap(&mut a, &mut b);
        }
        if b.height() == 0.0 {
            return 0.0;
        }
        if a.ury < b.ury {
            (a.ury - b.lly) / b.height()
        } else {
            (b.ury - a.lly) / b.height()
        }
    }
}

/// A rectangular zone's worth of lines, one per XY-cut leaf.
#[derive(Debug, Clone)]
pub struct Block {
    id: usize,
    label: String,
    lines: Vec<Line>,
    bbox: Option<BBox>,
}

impl Block {
    /// Create an empty block with its page-unique id and cut-path label.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::structures::{Block, Line, Token, TokenFeatures};
    ///
    /// let word = |text: &str, lly: f64| {
    ///     Token::new(text, (0.0, lly, 10.0, lly + 10.0), None, None, TokenFeatures::default())
    /// };
    /// let mut block = Block::new(1, "tl");
    /// block.push(Line::from_tokens(vec![word("lower", 10.0)]));
    /// block.push(Line::from_tokens(vec![word("upper", 50.0)]));
    /// block.sort();
    /// assert_eq!(block.label(), "tl");
    /// assert_eq!(block.lines()[0].tokens()[0].text(), "upper");
    /// ```
    pub fn new(id: usize, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            lines: Vec::new(),
            bbox: None,
        }
    }

    /// Page-unique block id (1-based emission ordinal).
    pub fn id(&self) -> usize {
        self.id
    }

    /// Cut-path label over {t,b,l,r}; empty for an uncut page.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Append a line, growing the cached box.
    pub fn push(&mut self, line: Line) {
        let line_bbox = line.bbox();
        match self.bbox.as_mut() {
            Some(bbox) => bbox.merge(&line_bbox),
            None => self.bbox = Some(line_bbox),
        }
        self.lines.push(line);
    }

    /// Lines in their current order.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Bounding box over the lines; a zero box when empty.
    pub fn bbox(&self) -> BBox {
        self.bbox.unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }

    /// Order lines top-to-bottom (descending `lly`).
    pub fn sort(&mut self) {
        self.lines.sort_by(|a, b| b.bbox().lly.total_cmp(&a.bbox().lly));
    }
}

/// One physical page: blocks plus the page rectangle.
#[derive(Debug, Clone)]
pub struct Page {
    id: u32,
    page_width: f64,
    page_height: f64,
    blocks: Vec<Block>,
}

impl Page {
    /// Create a page with its reader-supplied number and dimensions.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineate::structures::{Block, Line, Page, Token, TokenFeatures};
    ///
    /// let token = Token::new("hi", (2.0, 5.0, 8.0, 15.0), None, None, TokenFeatures::default());
    /// let mut block = Block::new(1, "");
    /// block.push(Line::from_tokens(vec![token]));
    /// let page = Page::new(1, 612.0, 792.0, vec![block]);
    /// assert_eq!(page.tokens().len(), 1);
    /// assert_eq!(page.page_width(), 612.0);
    /// ```
    pub fn new(id: u32, page_width: f64, page_height: f64, blocks: Vec<Block>) -> Self {
        Self {
            id,
            page_width,
            page_height,
            blocks,
        }
    }

    /// Reader-supplied page number.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Page width in points.
    pub fn page_width(&self) -> f64 {
        self.page_width
    }

    /// Page height in points.
    pub fn page_height(&self) -> f64 {
        self.page_height
    }

    /// Blocks in emission order.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Replace the page's blocks in a single assignment.
    pub fn set_blocks(&mut self, blocks: Vec<Block>) {
        self.blocks = blocks;
    }

    /// Flattened view of every token on the page.
    pub fn tokens(&self) -> Vec<&Token> {
        self.blocks
            .iter()
            .flat_map(|b| b.lines())
            .flat_map(|l| l.tokens())
            .collect()
    }
}

/// An analyzed document: ordered pages plus the document id.
#[derive(Debug, Clone)]
pub struct Document {
    doc_id: String,
    pages: Vec<Page>,
}

impl Document {
    /// Create an empty document.
    pub fn new(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            pages: Vec::new(),
        }
    }

    /// Document identifier (typically the input file stem).
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// Pages in reader order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Append an analyzed page.
    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }
}
