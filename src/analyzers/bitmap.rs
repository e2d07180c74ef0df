//! Page density bitmap for projection-profile analysis.
//!
//! Each page is rasterized onto a dense grid of per-cell densities. Tokens
//! are written as a five-band vertical profile rather than a uniform fill:
//! the outer fifths at the top and bottom stay empty so that a horizontal
//! gutter always exists between the baselines of adjacent text rows, and the
//! next fifths inward get a tapered weight so a column's density does not
//! bleed into its neighbor. The central fifth carries the full token height.

use crate::analyzers::Zone;
use crate::structures::{Page, Token};

/// Dense `[y][x]` grid of densities covering one page, origin lower-left.
#[derive(Debug, Clone)]
pub struct PageBitmap {
    width: usize,
    height: usize,
    cells: Vec<f32>,
}

impl PageBitmap {
    /// Rasterize a page's tokens. Page dimensions are truncated to integers.
    pub fn from_page(page: &Page) -> Self {
        let width = page.page_width().max(0.0) as usize;
        let height = page.page_height().max(0.0) as usize;
        let mut bitmap = Self {
            width,
            height,
            cells: vec![0.0; width * height],
        };
        for token in page.tokens() {
            bitmap.render_token(token);
        }
        bitmap
    }

    /// Grid width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// The full-page zone.
    pub fn full_zone(&self) -> Zone {
        Zone {
            llx: 0,
            lly: 0,
            urx: self.width,
            ury: self.height,
        }
    }

    /// Write the five-band profile of one token. Bands are assigned, not
    /// accumulated, so later tokens overwrite earlier ones where they
    /// overlap. Tokens shorter than five cells collapse to the central band.
    fn render_token(&mut self, token: &Token) {
        let lx = clamp_coord(token.llx(), self.width);
        let rx = clamp_coord(token.urx(), self.width);
        let ly = clamp_coord(token.lly(), self.height);
        let ry = clamp_coord(token.ury(), self.height);
        if rx <= lx || ry <= ly {
            return;
        }
        let dy = (ry - ly) / 5;
        let h = token.height() as f32;
        self.fill(ly, ly + dy, lx, rx, 0.0);
        self.fill(ly + dy, ly + 2 * dy, lx, rx, 0.1 * h);
        self.fill(ly + 2 * dy, ry - 2 * dy, lx, rx, h);
        self.fill(ry - 2 * dy, ry - dy, lx, rx, 0.1 * h);
        self.fill(ry - dy, ry, lx, rx, 0.0);
    }

    fn fill(&mut self, y0: usize, y1: usize, x0: usize, x1: usize, value: f32) {
        for y in y0..y1.min(self.height) {
            let row = y * self.width;
            for x in x0..x1.min(self.width) {
                self.cells[row + x] = value;
            }
        }
    }

    /// Density at `(x, y)`.
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.cells[y * self.width + x]
    }

    /// Column sums over a zone: one value per x, summed over the zone's rows.
    pub fn col_sums(&self, zone: &Zone) -> Vec<f32> {
        let mut sums = vec![0.0; zone.width()];
        for y in zone.lly..zone.ury.min(self.height) {
            let row = y * self.width;
            for (i, x) in (zone.llx..zone.urx.min(self.width)).enumerate() {
                sums[i] += self.cells[row + x];
            }
        }
        sums
    }

    /// Row sums over a zone: one value per y, summed over the zone's columns.
    pub fn row_sums(&self, zone: &Zone) -> Vec<f32> {
        let mut sums = vec![0.0; zone.height()];
        for (i, y) in (zone.lly..zone.ury.min(self.height)).enumerate() {
            let row = y * self.width;
            for x in zone.llx..zone.urx.min(self.width) {
                sums[i] += self.cells[row + x];
            }
        }
        sums
    }

    /// Row maxima over a zone. Keeps inter-line gaps sharp when individual
    /// lines have sparse tokens, which row sums would wash out.
    pub fn row_max(&self, zone: &Zone) -> Vec<f32> {
        let mut maxima = vec![0.0; zone.height()];
        for (i, y) in (zone.lly..zone.ury.min(self.height)).enumerate() {
            let row = y * self.width;
            for x in zone.llx..zone.urx.min(self.width) {
                if self.cells[row + x] > maxima[i] {
                    maxima[i] = self.cells[row + x];
                }
            }
        }
        maxima
    }
}

/// Truncate a coordinate toward zero and clamp it onto the grid.
fn clamp_coord(v: f64, limit: usize) -> usize {
    let v = v as i64;
    if v < 0 {
        0
    } else {
        (v as usize).min(limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{Block, Line, TokenFeatures};

    fn page_with_token(bbox: (f64, f64, f64, f64), w: f64, h: f64) -> Page {
        let token = Token::new("x", bbox, Some("F".to_string()), None, TokenFeatures::default());
        let mut block = Block::new(1, "");
        block.push(Line::from_tokens(vec![token]));
        Page::new(1, w, h, vec![block])
    }

    #[test]
    fn test_five_band_profile() {
        // Token rows 0..10, dy = 2: bands 0,0 | 1,1 | 10 full | 1,1 | 0,0.
        let page = page_with_token((0.0, 0.0, 4.0, 10.0), 10.0, 10.0);
        let bitmap = PageBitmap::from_page(&page);
        assert_eq!(bitmap.at(0, 0), 0.0);
        assert_eq!(bitmap.at(0, 1), 0.0);
        assert_eq!(bitmap.at(0, 2), 1.0);
        assert_eq!(bitmap.at(0, 3), 1.0);
        assert_eq!(bitmap.at(0, 4), 10.0);
        assert_eq!(bitmap.at(0, 5), 10.0);
        assert_eq!(bitmap.at(0, 6), 1.0);
        assert_eq!(bitmap.at(0, 7), 1.0);
        assert_eq!(bitmap.at(0, 8), 0.0);
        assert_eq!(bitmap.at(0, 9), 0.0);
        // Columns outside the token stay empty.
        assert_eq!(bitmap.at(5, 4), 0.0);
    }

    #[test]
    fn test_short_token_collapses_to_central_strip() {
        // Height 3 gives dy = 0: the whole band carries the full height.
        let page = page_with_token((0.0, 2.0, 4.0, 5.0), 10.0, 10.0);
        let bitmap = PageBitmap::from_page(&page);
        assert_eq!(bitmap.at(0, 1), 0.0);
        assert_eq!(bitmap.at(0, 2), 3.0);
        assert_eq!(bitmap.at(0, 4), 3.0);
        assert_eq!(bitmap.at(0, 5), 0.0);
    }

    #[test]
    fn test_projections() {
        let page = page_with_token((2.0, 0.0, 6.0, 10.0), 10.0, 10.0);
        let bitmap = PageBitmap::from_page(&page);
        let zone = bitmap.full_zone();

        let cols = bitmap.col_sums(&zone);
        assert_eq!(cols.len(), 10);
        assert_eq!(cols[0], 0.0);
        assert!(cols[2] > 0.0);
        assert_eq!(cols[6], 0.0);

        let rows = bitmap.row_sums(&zone);
        assert_eq!(rows.len(), 10);
        assert_eq!(rows[0], 0.0);
        assert_eq!(rows[4], 4.0 * 10.0);

        let maxima = bitmap.row_max(&zone);
        assert_eq!(maxima[4], 10.0);
        assert_eq!(maxima[0], 0.0);
    }

    #[test]
    fn test_zone_slicing() {
        let page = page_with_token((2.0, 0.0, 6.0, 10.0), 10.0, 10.0);
        let bitmap = PageBitmap::from_page(&page);
        let zone = Zone {
            llx: 4,
            lly: 0,
            urx: 10,
            ury: 10,
        };
        let cols = bitmap.col_sums(&zone);
        assert_eq!(cols.len(), 6);
        assert!(cols[0] > 0.0); // x = 4 still inside the token
        assert_eq!(cols[2], 0.0); // x = 6 outside
    }

    #[test]
    fn test_empty_page() {
        let page = Page::new(1, 20.0, 20.0, vec![]);
        let bitmap = PageBitmap::from_page(&page);
        assert!(bitmap.col_sums(&bitmap.full_zone()).iter().all(|&v| v == 0.0));
    }
}
