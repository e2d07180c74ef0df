//! Column-preserving text reconstruction.
//!
//! A block's tokens carry geometry, not whitespace. The respacer converts
//! each line back into ASCII by mapping x positions onto character columns,
//! then aligns the columns of vertically adjacent lines that form an
//! interlinear group, so glosses and translations line up under their source
//! tokens in the emitted text.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::structures::Block;

/// Minimum shared-column fraction for a line to join the group above it.
pub const INTERLINEAR_THRESHOLD: f64 = 0.6;

/// A `(column, text)` pair: one emitted token and its character column.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColToken {
    col: i64,
    text: String,
}

/// Map an x position onto a character column.
fn llx_col(x: f64, dx: f64) -> i64 {
    let dx = if dx == 0.0 { 1.0 } else { dx };
    ((x / dx) + 0.5) as i64
}

/// Build the `(column, text)` pairs for one line.
///
/// Tokens closer than `min_dx` to their predecessor are glyph runs the
/// extractor mis-split; their text is folded into the previous pair.
/// Super/subscript tokens are wrapped as `^{...}` / `_{...}`.
fn columnized_tokens(
    tokens: &[crate::structures::Token],
    min_dx: f64,
    char_dx: f64,
    xoffset: f64,
) -> Vec<ColToken> {
    let mut last_x = 0.0;
    let mut pairs: Vec<ColToken> = Vec::new();
    for t in tokens {
        let dx = t.llx() - last_x;
        let mut text = t.text().to_string();
        if t.features().sup {
            text = format!("^{{{}}}", text);
        } else if t.features().sub {
            text = format!("_{{{}}}", text);
        }
        let new_pair = pairs.is_empty() || (char_dx > 0.0 && dx >= min_dx);
        if new_pair {
            pairs.push(ColToken {
                col: llx_col(t.llx() + xoffset, char_dx),
                text,
            });
        } else if let Some(last) = pairs.last_mut() {
            last.text.push_str(&text);
        }
        last_x = t.urx();
    }
    pairs
}

/// Fraction of column positions the current line shares with its
/// predecessor. The smaller column collection is matched against the larger
/// one; predecessor columns left of the current line's first token are
/// ignored.
fn interlinear_score(cur: &[ColToken], prev: &[ColToken]) -> f64 {
    let a: Vec<i64> = cur.iter().map(|p| p.col).collect();
    let left = match a.iter().min() {
        Some(&left) => left,
        None => return 0.0,
    };
    let b: BTreeSet<i64> = prev.iter().map(|p| p.col).filter(|&c| c >= left).collect();

    let (hits, denominator) = if a.len() > b.len() {
        let a_set: HashSet<i64> = a.iter().copied().collect();
        (b.iter().filter(|c| a_set.contains(c)).count(), a.len())
    } else {
        (a.iter().filter(|c| b.contains(c)).count(), b.len())
    };
    if denominator == 0 {
        return 0.0;
    }
    hits as f64 / denominator as f64
}

/// Rewrite the columns of an interlinear group so that pairs sharing a
/// column land at a common, monotonically increasing position and every
/// row's own columns stay strictly increasing (one space reserved between
/// neighbors).
fn respace_group(group: &mut [(Vec<ColToken>, Option<f64>)]) {
    let mut cols: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (i, (pairs, _)) in group.iter().enumerate() {
        for pair in pairs {
            cols.entry(pair.col).or_default().push(i);
        }
    }

    let mut colidx = vec![0usize; group.len()];
    let mut nextcol = vec![0i64; group.len()];
    for (col, rows) in cols {
        let start = rows
            .iter()
            .map(|&i| nextcol[i])
            .max()
            .unwrap_or(0)
            .max(col);
        for &i in &rows {
            let pair = &mut group[i].0[colidx[i]];
            pair.col = start;
            nextcol[i] = start + pair.text.chars().count() as i64 + 1;
            colidx[i] += 1;
        }
    }
}

/// Emit one pair list as text, padding each token out to its column.
fn emit(pairs: &[ColToken]) -> String {
    let mut out = String::new();
    let mut cursor: i64 = 0;
    for pair in pairs {
        let pad = pair.col - cursor;
        for _ in 0..pad.max(0) {
            out.push(' ');
        }
        out.push_str(&pair.text);
        cursor = pair.col + pair.text.chars().count() as i64;
    }
    out
}

/// Respace a block into `(text, interlinear score)` lines.
///
/// `xoffset` normalizes x positions against the document's minimum left
/// margin so columns start at zero. The score is `None` for the first line
/// of the block; lines scoring at or above [`INTERLINEAR_THRESHOLD`] join
/// the open group and are column-aligned with it.
///
/// # Examples
///
/// ```
/// use lineate::respace::respace;
/// use lineate::structures::{Block, Line, Token, TokenFeatures};
///
/// // words laid out at 3pt per character: a source line and its gloss
/// let word = |text: &str, col: f64, lly: f64| {
///     let llx = col * 3.0;
///     let urx = llx + text.len() as f64 * 3.0;
///     Token::new(text, (llx, lly, urx, lly + 10.0), None, None, TokenFeatures::default())
/// };
/// let mut block = Block::new(1, "");
/// block.push(Line::from_tokens(vec![word("kos", 0.0, 25.0), word("bibi", 5.0, 25.0)]));
/// block.push(Line::from_tokens(vec![word("dog", 0.0, 10.0), word("big", 5.0, 10.0)]));
///
/// let lines = respace(&block, 0.0);
/// assert_eq!(lines[0].0, "kos  bibi");
/// assert_eq!(lines[1].0, "dog  big");
/// assert_eq!(lines[0].1, None);
/// assert_eq!(lines[1].1, Some(1.0));
/// ```
pub fn respace(block: &Block, xoffset: f64) -> Vec<(String, Option<f64>)> {
    let char_num: f64 = block
        .lines()
        .iter()
        .flat_map(|l| l.tokens())
        .map(|t| t.width())
        .sum();
    let char_den: usize = block
        .lines()
        .iter()
        .flat_map(|l| l.tokens())
        .map(|t| t.text().chars().count())
        .sum();
    let char_dx = if char_den > 0 {
        char_num / char_den as f64
    } else {
        1.0
    };
    let min_dx = char_dx / 3.0;

    let mut groups: Vec<Vec<(Vec<ColToken>, Option<f64>)>> = Vec::new();
    let mut prev: Option<Vec<ColToken>> = None;
    for line in block.lines() {
        let toklist = columnized_tokens(line.tokens(), min_dx, char_dx, xoffset);
        let iscore = prev
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| interlinear_score(&toklist, p));
        if iscore.is_some_and(|s| s >= INTERLINEAR_THRESHOLD) {
            match groups.last_mut() {
                Some(open) => open.push((toklist.clone(), iscore)),
                None => groups.push(vec![(toklist.clone(), iscore)]),
            }
        } else {
            groups.push(vec![(toklist.clone(), iscore)]);
        }
        prev = Some(toklist);
    }

    let mut lines = Vec::new();
    for group in &mut groups {
        respace_group(group);
        for (pairs, iscore) in group.iter() {
            lines.push((emit(pairs), *iscore));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structures::{Block, Line, Token, TokenFeatures};

    fn tok(text: &str, llx: f64, urx: f64, lly: f64, ury: f64) -> Token {
        Token::new(
            text,
            (llx, lly, urx, ury),
            Some("F".to_string()),
            None,
            TokenFeatures::default(),
        )
    }

    /// Tokens rendered 3pt per character on a 10pt baseline grid.
    fn word(text: &str, col: i64, lly: f64) -> Token {
        let llx = col as f64 * 3.0;
        tok(text, llx, llx + text.len() as f64 * 3.0, lly, lly + 10.0)
    }

    fn block_of(lines: Vec<Vec<Token>>) -> Block {
        let mut block = Block::new(1, "");
        for tokens in lines {
            block.push(Line::from_tokens(tokens));
        }
        block
    }

    #[test]
    fn test_single_line_starts_at_column() {
        let block = block_of(vec![vec![word("hi", 0, 0.0)]]);
        let lines = respace(&block, 0.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, "hi");
        assert_eq!(lines[0].1, None);
    }

    #[test]
    fn test_xoffset_normalizes_margin() {
        let block = block_of(vec![vec![tok("hi", 2.0, 8.0, 5.0, 15.0)]]);
        // char_dx = 6/2 = 3; col = round((2 - 2) / 3) = 0
        let lines = respace(&block, -2.0);
        assert_eq!(lines[0].0, "hi");
    }

    #[test]
    fn test_close_tokens_rejoin() {
        // second token starts 0.5pt after the first ends: below min_dx = 1
        let block = block_of(vec![vec![
            tok("fo", 0.0, 6.0, 0.0, 10.0),
            tok("o", 6.5, 9.5, 0.0, 10.0),
        ]]);
        let lines = respace(&block, 0.0);
        assert_eq!(lines[0].0, "foo");
    }

    #[test]
    fn test_superscript_and_subscript_wrapping() {
        let mut sup = TokenFeatures::default();
        sup.sup = true;
        let mut sub = TokenFeatures::default();
        sub.sub = true;
        let t_sup = Token::new("2", (30.0, 0.0, 33.0, 10.0), None, None, sup);
        let t_sub = Token::new("2", (60.0, 0.0, 63.0, 10.0), None, None, sub);
        let base = tok("x", 0.0, 3.0, 0.0, 10.0);
        let block = block_of(vec![vec![base, t_sup, t_sub]]);
        let text = &respace(&block, 0.0)[0].0;
        assert!(text.contains("^{2}"), "got {:?}", text);
        assert!(text.contains("_{2}"), "got {:?}", text);
    }

    #[test]
    fn test_interlinear_group_detection() {
        // three lines with identical column layout: scores None, 1.00, 1.00
        let rows: Vec<Vec<Token>> = (0..3)
            .map(|i| {
                let lly = 40.0 - i as f64 * 15.0;
                vec![
                    word("kos", 0, lly),
                    word("bibi", 5, lly),
                    word("nay", 11, lly),
                ]
            })
            .collect();
        let block = block_of(rows);
        let lines = respace(&block, 0.0);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].1, None);
        assert_eq!(lines[1].1, Some(1.0));
        assert_eq!(lines[2].1, Some(1.0));
        // column alignment preserved under each word
        assert_eq!(lines[0].0, lines[1].0);
        assert_eq!(lines[1].0, lines[2].0);
        let text = &lines[0].0;
        assert_eq!(text.find("kos"), Some(0));
        assert_eq!(text.find("bibi"), Some(5));
        assert_eq!(text.find("nay"), Some(11));
    }

    #[test]
    fn test_unrelated_line_breaks_group() {
        let rows = vec![
            vec![word("kos", 0, 40.0), word("bibi", 8, 40.0)],
            vec![word("x", 3, 25.0), word("y", 13, 25.0)],
        ];
        let block = block_of(rows);
        let lines = respace(&block, 0.0);
        assert!(lines[1].1.is_some());
        assert!(lines[1].1.unwrap() < INTERLINEAR_THRESHOLD);
    }

    #[test]
    fn test_group_alignment_with_offset_gloss() {
        // gloss line starts under the second word; both lines share column 6
        let rows = vec![
            vec![word("ama", 0, 40.0), word("du", 6, 40.0)],
            vec![word("water", 6, 25.0)],
        ];
        let block = block_of(rows);
        let lines = respace(&block, 0.0);
        // prev columns >= 6 are {6}; current columns are [6]: full match
        assert_eq!(lines[1].1, Some(1.0));
        let src_at = lines[0].0.find("du");
        let gloss_at = lines[1].0.find("water");
        assert_eq!(src_at, gloss_at);
    }

    #[test]
    fn test_group_respacing_pushes_collisions_right() {
        // long gloss under the first word forces the shared second column out
        let pair = |col: i64, text: &str| ColToken {
            col,
            text: text.to_string(),
        };
        let mut group = vec![
            (vec![pair(0, "ab"), pair(7, "cd")], None::<f64>),
            (vec![pair(0, "abcdefgh"), pair(7, "gh")], Some(1.0)),
        ];
        respace_group(&mut group);
        // the shared column moves past "abcdefgh " (9 chars) on both rows
        assert_eq!(group[0].0[1].col, 9);
        assert_eq!(group[1].0[1].col, 9);
        // rows stay strictly increasing
        assert!(group[0].0[1].col > group[0].0[0].col);
        assert_eq!(emit(&group[1].0), "abcdefgh gh");
    }

    #[test]
    fn test_respace_group_idempotent() {
        let rows = vec![
            vec![word("kos", 0, 40.0), word("bibi", 5, 40.0), word("nay", 11, 40.0)],
            vec![word("dog", 0, 25.0), word("big", 5, 25.0), word("two", 11, 25.0)],
        ];
        let mut group = vec![
            (columnized_tokens(&rows[0], 1.0, 3.0, 0.0), None::<f64>),
            (columnized_tokens(&rows[1], 1.0, 3.0, 0.0), Some(1.0)),
        ];
        respace_group(&mut group);
        let emitted: Vec<String> = group.iter().map(|(p, _)| emit(p)).collect();

        // reconstruct pairs from the emitted text with char_dx = 1
        let mut rebuilt: Vec<(Vec<ColToken>, Option<f64>)> = emitted
            .iter()
            .map(|text| {
                let mut pairs = Vec::new();
                let mut col = 0i64;
                for chunk in text.split(' ') {
                    if !chunk.is_empty() {
                        pairs.push(ColToken {
                            col,
                            text: chunk.to_string(),
                        });
                    }
                    col += chunk.chars().count() as i64 + 1;
                }
                // the trailing split adds one past the end; harmless
                (pairs, None::<f64>)
            })
            .collect();
        respace_group(&mut rebuilt);
        let re_emitted: Vec<String> = rebuilt.iter().map(|(p, _)| emit(p)).collect();
        assert_eq!(emitted, re_emitted);
    }

    #[test]
    fn test_empty_block() {
        let block = Block::new(1, "");
        assert!(respace(&block, 0.0).is_empty());
    }

    #[test]
    fn test_interlinear_score_denominator_guard() {
        // predecessor entirely left of the current line: denominator empty
        let cur = vec![ColToken { col: 10, text: "x".into() }];
        let prev = vec![ColToken { col: 0, text: "y".into() }];
        // a.len() 1 > b.len() 0, so roles swap and the score is 0 of 1
        assert_eq!(interlinear_score(&cur, &prev), 0.0);
    }
}
