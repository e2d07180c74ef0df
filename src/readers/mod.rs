//! Front-end readers for PDF text-extraction XML dialects.
//!
//! A reader parses one extraction tool's XML into the canonical token
//! stream. The rest of the pipeline only sees [`Page`]s of tokens and is
//! oblivious to the source format. Readers may pre-group tokens into blocks
//! and lines; the XY-cut analyzer ignores that grouping and rebuilds it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;

use crate::error::Result;
use crate::structures::{Line, Page};

pub mod pdfminer;
pub mod tetml;

pub use pdfminer::PdfMinerReader;
pub use tetml::TetmlReader;

/// Minimum vertical-overlap ratio for two reader lines to be merged.
pub const MIN_LINE_OVERLAP: f64 = 0.01;

/// A front-end reader: one operation, produce pages of tokens.
pub trait Reader {
    /// Parse the input into pages, ordered by page number.
    fn pages(&mut self) -> Result<Vec<Page>>;
}

/// Merge lines whose vertical bands overlap.
///
/// Readers that compute lines independently can leave super/subscript
/// fragments on near-baselines of their own; each candidate line is folded
/// into the first already-kept line it overlaps by at least
/// [`MIN_LINE_OVERLAP`], otherwise kept as a new line.
pub fn merge_lines(lines: Vec<Line>) -> Vec<Line> {
    let mut merged: Vec<Line> = Vec::new();
    for line in lines {
        let mut absorbed = false;
        for kept in merged.iter_mut() {
            if line.overlap(kept) >= MIN_LINE_OVERLAP {
                kept.extend(line.tokens().iter().cloned());
                absorbed = true;
                break;
            }
        }
        if !absorbed {
            merged.push(line);
        }
    }
    merged
}

/// Open a file for line-oriented reading, decompressing `.gz` transparently.
pub(crate) fn open_maybe_gzip(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{Token, TokenFeatures};

    fn line(text: &str, lly: f64, ury: f64) -> Line {
        Line::from_tokens(vec![Token::new(
            text,
            (0.0, lly, 10.0, ury),
            Some("F".to_string()),
            None,
            TokenFeatures::default(),
        )])
    }

    #[test]
    fn test_merge_lines_absorbs_overlapping() {
        // superscript band 18..24 dips into the 0..20 baseline
        let lines = vec![line("base", 0.0, 20.0), line("sup", 18.0, 24.0)];
        let merged = merge_lines(lines);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].tokens().len(), 2);
    }

    #[test]
    fn test_merge_lines_keeps_disjoint() {
        let lines = vec![line("a", 40.0, 50.0), line("b", 0.0, 10.0)];
        let merged = merge_lines(lines);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_lines_empty() {
        assert!(merge_lines(vec![]).is_empty());
    }
}
