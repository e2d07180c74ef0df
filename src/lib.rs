#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

//! # Lineate
//!
//! Recovers logical reading order and block structure from the token stream
//! produced by a PDF text-extraction front end, so that downstream
//! consumers (IGT detection, linguistic annotation) can work on physical
//! text lines enriched with position, font, and layout metadata.
//!
//! ## Pipeline
//!
//! 1. A [`readers::Reader`] parses one extraction tool's XML dialect into
//!    pages of immutable [`structures::Token`]s.
//! 2. The [`analyzers::XYCutAnalyzer`] rasterizes each page onto a density
//!    bitmap and recursively splits it along empty gutters into ordered
//!    zones, then rebuilds the lines inside each zone.
//! 3. The [`respace`] module converts token geometry back into whitespace,
//!    keeping interlinear glosses column-aligned under their source tokens.
//! 4. [`serialize::LineateDoc`] writes the result as a line-oriented text
//!    document that is itself re-parseable input.
//!
//! ```no_run
//! use lineate::analyzers::{Analyzer, XYCutAnalyzer};
//! use lineate::readers::TetmlReader;
//! use lineate::serialize::LineateDoc;
//!
//! # fn main() -> lineate::error::Result<()> {
//! let mut reader = TetmlReader::new("paper.tetml");
//! let doc = XYCutAnalyzer::new().analyze(&mut reader, "paper")?;
//! LineateDoc::from_layout(&doc).write("paper.txt".as_ref(), false)?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod analyzers;
pub mod debug;
pub mod error;
pub mod readers;
pub mod respace;
pub mod serialize;
pub mod structures;
pub mod text_import;

pub use analyzers::{Analyzer, XYCutAnalyzer};
pub use error::{Error, Result};
pub use readers::{PdfMinerReader, Reader, TetmlReader};
pub use serialize::LineateDoc;
pub use structures::{BBox, Block, Document, Line, Page, Token};
