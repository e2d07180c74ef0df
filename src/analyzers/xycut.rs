//! Modified recursive XY-cut segmentation.
//!
//! The page bitmap is projected onto each axis and recursively split along
//! zero-density gutters, always taking the widest admissible gap. Leaf zones
//! become blocks; inside each zone the row-maximum projection separates the
//! lines. The depth-first top-first/left-first recursion order is what puts
//! blocks into reading order for typical layouts.

use crate::analyzers::bitmap::PageBitmap;
use crate::analyzers::{Analyzer, Zone};
use crate::error::Result;
use crate::readers::Reader;
use crate::structures::{Block, Document, Line, Page, Token};

/// Cut admissibility parameters, derived once per document.
#[derive(Debug, Clone)]
pub struct CutParams {
    /// Minimum width of a column gap worth cutting at
    pub min_x_gap: f64,
    /// Minimum height of a row gap worth cutting at
    pub min_y_gap: f64,
    /// Maximum normalized column density still counted as empty
    pub max_x_density: f32,
    /// Maximum normalized row density still counted as empty
    pub max_y_density: f32,
    /// Minimum (height, width) page ratios for a vertical cut
    pub min_vcut_size: (f64, f64),
    /// Minimum (height, width) page ratios for a horizontal cut
    pub min_hcut_size: (f64, f64),
}

impl CutParams {
    /// Derive parameters from every token in the document. The average token
    /// height guards both axes against cutting inside character spacing;
    /// vertical cuts demand much more height than horizontal cuts do.
    pub fn from_pages(pages: &[Page]) -> Self {
        let mut total = 0.0;
        let mut count = 0usize;
        for page in pages {
            for token in page.tokens() {
                total += token.height();
                count += 1;
            }
        }
        let avg_height = if count > 0 { total / count as f64 } else { 1.0 };
        let params = Self {
            min_x_gap: avg_height,
            min_y_gap: avg_height,
            max_x_density: 0.0,
            max_y_density: 0.0,
            min_vcut_size: (1.0 / 32.0, 1.0 / 6.0),
            min_hcut_size: (1.0 / 128.0, 1.0 / 6.0),
        };
        log::debug!(
            "cut params: min_x_gap={} min_y_gap={} min_vcut_size={:?} min_hcut_size={:?}",
            params.min_x_gap,
            params.min_y_gap,
            params.min_vcut_size,
            params.min_hcut_size
        );
        params
    }
}

/// Find the empty runs of a projection vector.
///
/// The vector is normalized by its maximum (a zero maximum counts as 1) and a
/// gap is a maximal run of values `<= max_density`. Returns
/// `(start, gaps, end)` in global coordinates (`offset` is the vector's
/// origin): a leading run touching the boundary is the margin and is folded
/// into `start`, symmetrically for `end`, and surviving gaps shorter than
/// `min_gap` are dropped.
pub fn gaps(
    vec: &[f32],
    min_gap: f64,
    max_density: f32,
    offset: usize,
) -> (usize, Vec<(usize, usize)>, usize) {
    let mut start = offset;
    let mut end = vec.len() + offset;
    let mut runs: Vec<(usize, usize)> = Vec::new();

    if end > start {
        let mut max = vec.iter().cloned().fold(0.0f32, f32::max);
        if max == 0.0 {
            max = 1.0;
        }
        let mut run_start: Option<usize> = None;
        for (i, &v) in vec.iter().enumerate() {
            let empty = v / max <= max_density;
            match (empty, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(a)) => {
                    runs.push((a + offset, i + offset));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(a) = run_start {
            runs.push((a + offset, vec.len() + offset));
        }
    }

    if runs.first().is_some_and(|&(a, _)| a == start) {
        start = runs.remove(0).1;
    }
    if runs.last().is_some_and(|&(_, b)| b == end) {
        end = runs.pop().map(|(a, _)| a).unwrap_or(end);
    }
    runs.retain(|&(a, b)| (b - a) as f64 >= min_gap);

    (start, runs, end)
}

/// Axis of a cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CutAxis {
    /// Split into top/bottom halves at a row gap
    Horizontal,
    /// Split into left/right halves at a column gap
    Vertical,
}

/// Pick the best admissible cut: maximum gap width, ties broken toward
/// vertical cuts and then the later midpoint. The smaller-child extent is
/// measured from the zone rectangle; the cross-axis extent uses the trimmed
/// content bounds.
fn best_cut(
    x_gaps: &[(usize, usize)],
    y_gaps: &[(usize, usize)],
    trimmed: (usize, usize, usize, usize),
    zone: &Zone,
    shape: (usize, usize),
    params: &CutParams,
) -> Option<(CutAxis, usize)> {
    let (lft, btm, rgt, top) = trimmed;
    let (h, w) = shape;
    if h == 0 || w == 0 {
        return None;
    }
    // (gap width, axis rank, midpoint); vertical ranks above horizontal
    let mut cuts: Vec<(usize, u8, usize)> = Vec::new();
    for &(a, b) in x_gaps {
        let h_ratio = top.saturating_sub(btm) as f64 / h as f64;
        let w_ratio = (a - zone.llx).min(zone.urx - b) as f64 / w as f64;
        if h_ratio >= params.min_vcut_size.0 && w_ratio >= params.min_vcut_size.1 {
            cuts.push((b - a, 1, (a + b) / 2));
        }
    }
    for &(a, b) in y_gaps {
        let h_ratio = (a - zone.lly).min(zone.ury - b) as f64 / h as f64;
        let w_ratio = rgt.saturating_sub(lft) as f64 / w as f64;
        if h_ratio >= params.min_hcut_size.0 && w_ratio >= params.min_hcut_size.1 {
            cuts.push((b - a, 0, (a + b) / 2));
        }
    }
    cuts.into_iter().max().map(|(_, rank, mid)| {
        let axis = if rank == 1 { CutAxis::Vertical } else { CutAxis::Horizontal };
        (axis, mid)
    })
}

/// Recursively segment the bitmap into leaf zones in reading order.
///
/// Each leaf carries the cut path that produced it, a string over
/// `{t,b,l,r}` naming the half taken at each recursion step.
pub fn find_zones(bitmap: &PageBitmap, params: &CutParams) -> Vec<(Zone, String)> {
    let mut zones = Vec::new();
    descend(bitmap, bitmap.full_zone(), String::new(), params, &mut zones);
    zones
}

fn descend(
    bitmap: &PageBitmap,
    zone: Zone,
    path: String,
    params: &CutParams,
    out: &mut Vec<(Zone, String)>,
) {
    let x_vec = bitmap.col_sums(&zone);
    let y_vec = bitmap.row_sums(&zone);
    let (lft, x_gaps, rgt) = gaps(&x_vec, params.min_x_gap, params.max_x_density, zone.llx);
    let (btm, y_gaps, top) = gaps(&y_vec, params.min_y_gap, params.max_y_density, zone.lly);

    let shape = (bitmap.height(), bitmap.width());
    match best_cut(&x_gaps, &y_gaps, (lft, btm, rgt, top), &zone, shape, params) {
        Some((CutAxis::Horizontal, mid)) => {
            descend(
                bitmap,
                Zone { lly: mid, ..zone },
                format!("{}t", path),
                params,
                out,
            );
            descend(
                bitmap,
                Zone { ury: mid, ..zone },
                format!("{}b", path),
                params,
                out,
            );
        }
        Some((CutAxis::Vertical, mid)) => {
            descend(
                bitmap,
                Zone { urx: mid, ..zone },
                format!("{}l", path),
                params,
                out,
            );
            descend(
                bitmap,
                Zone { llx: mid, ..zone },
                format!("{}r", path),
                params,
                out,
            );
        }
        None => {
            log::debug!(
                "  zone found: ({}, {}, {}, {})\t(width: {}, height: {}, path={})",
                zone.llx,
                zone.lly,
                zone.urx,
                zone.ury,
                zone.width(),
                zone.height(),
                path
            );
            out.push((zone, path));
        }
    }
}

/// One point of slack on every side absorbs integer truncation in the
/// bitmap; it only captures extra tokens that already overlapped the zone.
fn token_within(token: &Token, llx: f64, lly: f64, urx: f64, ury: f64) -> bool {
    token.llx() >= llx - 1.0
        && token.lly() >= lly - 1.0
        && token.urx() <= urx + 1.0
        && token.ury() <= ury + 1.0
}

/// Convert a leaf zone into a block of sorted lines.
///
/// The zone's row-maximum projection yields every empty row run; the
/// midpoints of those runs separate the vertical bands, and each in-zone
/// token lands in the band that contains it.
pub fn zone_to_block(
    tokens: &[Token],
    bitmap: &PageBitmap,
    zone: &Zone,
    id: usize,
    path: &str,
) -> Block {
    let (zllx, zlly, zurx, zury) = (
        zone.llx as f64,
        zone.lly as f64,
        zone.urx as f64,
        zone.ury as f64,
    );
    let in_zone: Vec<&Token> = tokens
        .iter()
        .filter(|t| token_within(t, zllx, zlly, zurx, zury))
        .collect();

    let mut block = Block::new(id, path);

    let (_, y_gaps, _) = gaps(&bitmap.row_max(zone), 0.0, 0.0, zone.lly);
    let mids: Vec<f64> = y_gaps.iter().map(|&(a, b)| (a + b) as f64 / 2.0).collect();

    let mut lowers = vec![zlly];
    lowers.extend(&mids);
    let mut uppers = mids;
    uppers.push(zury);

    for (&band_btm, &band_top) in lowers.iter().zip(uppers.iter()) {
        let band_tokens: Vec<Token> = in_zone
            .iter()
            .filter(|t| token_within(t, zllx, band_btm, zurx, band_top))
            .map(|t| (*t).clone())
            .collect();
        if !band_tokens.is_empty() {
            let mut line = Line::from_tokens(band_tokens);
            line.sort();
            block.push(line);
        }
    }

    block.sort();
    block
}

/// The XY-cut layout analyzer.
#[derive(Debug, Default)]
pub struct XYCutAnalyzer {
    debug: bool,
}

impl XYCutAnalyzer {
    /// Create an analyzer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an analyzer with the diagnostic overlay hook enabled.
    pub fn with_debug(debug: bool) -> Self {
        Self { debug }
    }
}

impl Analyzer for XYCutAnalyzer {
    fn analyze(&self, reader: &mut dyn Reader, doc_id: &str) -> Result<Document> {
        let pages = reader.pages()?;
        let params = CutParams::from_pages(&pages);
        let mut doc = Document::new(doc_id);

        for mut page in pages {
            log::debug!("Analyzing page id={}", page.id());
            let bitmap = PageBitmap::from_page(&page);
            let tokens: Vec<Token> = page.tokens().into_iter().cloned().collect();
            let mut blocks = Vec::new();

            if !tokens.is_empty() {
                let zones = find_zones(&bitmap, &params);
                for (i, (zone, path)) in zones.iter().enumerate() {
                    blocks.push(zone_to_block(&tokens, &bitmap, zone, i + 1, path));
                }
                if self.debug {
                    match crate::debug::write_zone_overlay(&page, &zones, doc_id) {
                        Ok(path) => log::info!("zone overlay written to {}", path.display()),
                        Err(e) => log::warn!("could not write zone overlay: {}", e),
                    }
                }
            }

            let block_toks: usize = blocks
                .iter()
                .flat_map(|b| b.lines())
                .map(|l| l.tokens().len())
                .sum();
            if block_toks != tokens.len() {
                log::warn!(
                    "Page {}: different page-vs-block token counts: {} vs {}",
                    page.id(),
                    tokens.len(),
                    block_toks
                );
            }

            page.set_blocks(blocks);
            doc.push_page(page);
        }

        Ok(doc)
    }
}
