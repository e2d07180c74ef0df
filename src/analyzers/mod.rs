//! Layout analyzers: token streams in, ordered blocks out.
//!
//! An analyzer consumes the pages a reader produced and rebuilds each page's
//! block list in reading order. The only shipped implementation is the
//! modified recursive XY-cut segmenter; the trait is the seam for plugging in
//! alternatives.

use crate::error::Result;
use crate::readers::Reader;
use crate::structures::Document;

pub mod bitmap;
pub mod xycut;

pub use xycut::XYCutAnalyzer;

/// A rectangular region of the page bitmap, in integer bitmap coordinates
/// with the origin at the lower-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zone {
    /// Lower-left x
    pub llx: usize,
    /// Lower-left y
    pub lly: usize,
    /// Upper-right x
    pub urx: usize,
    /// Upper-right y
    pub ury: usize,
}

impl Zone {
    /// Zone width in bitmap cells.
    pub fn width(&self) -> usize {
        self.urx - self.llx
    }

    /// Zone height in bitmap cells.
    pub fn height(&self) -> usize {
        self.ury - self.lly
    }
}

/// A layout analyzer over a reader's pages.
pub trait Analyzer {
    /// Analyze every page the reader produces, returning the document with
    /// each page's blocks rebuilt in reading order.
    fn analyze(&self, reader: &mut dyn Reader, doc_id: &str) -> Result<Document>;
}
