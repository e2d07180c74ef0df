//! Diagnostic visualization for layout analysis.
//!
//! With `--debug` the analyzer writes one SVG per page: token boxes in
//! grey, leaf zones outlined and labeled with their cut path. Purely
//! diagnostic; the analysis output is unaffected.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::analyzers::Zone;
use crate::error::Result;
use crate::structures::Page;

/// Write the zone overlay for one page as `<doc_id>-page<id>-zones.svg`
/// in the current directory, returning the path written.
pub fn write_zone_overlay(page: &Page, zones: &[(Zone, String)], doc_id: &str) -> Result<PathBuf> {
    let width = page.page_width();
    let height = page.page_height();
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}">"#,
        width, height
    );
    let _ = writeln!(
        svg,
        r#"<rect x="0" y="0" width="{}" height="{}" fill="white"/>"#,
        width, height
    );

    // page coordinates have a lower-left origin; SVG a top-left one
    for token in page.tokens() {
        let _ = writeln!(
            svg,
            r##"<rect x="{}" y="{}" width="{}" height="{}" fill="#999999" fill-opacity="0.5"/>"##,
            token.llx(),
            height - token.ury(),
            token.width(),
            token.height()
        );
    }
    for (zone, path) in zones {
        let _ = writeln!(
            svg,
            r##"<rect x="{}" y="{}" width="{}" height="{}" fill="none" stroke="#1f77b4" stroke-width="1"/>"##,
            zone.llx,
            height - zone.ury as f64,
            zone.width(),
            zone.height()
        );
        let _ = writeln!(
            svg,
            r##"<text x="{}" y="{}" font-size="8" fill="#1f77b4">{}</text>"##,
            zone.llx as f64 + 2.0,
            height - zone.ury as f64 + 10.0,
            if path.is_empty() { "-" } else { path }
        );
    }
    svg.push_str("</svg>\n");

    let out = PathBuf::from(format!("{}-page{}-zones.svg", doc_id, page.id()));
    std::fs::write(&out, svg)?;
    Ok(out)
}
