//! Plain-text importer.
//!
//! When no PDF layout data exists, a plain text file (plus an optional IGT
//! span sidecar) is converted into the serialized format with a synthetic
//! single-page layout: paragraphs split on blank lines become blocks, every
//! line gets a zero bbox, and sidecar tags attach to the surviving non-blank
//! lines.

use std::collections::HashMap;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::serialize::{LineateBlock, LineateDoc, LineateLine};

lazy_static! {
    static ref NEWLINE_RE: Regex = Regex::new(r"\r\n|\n").unwrap();
    static ref MULTI_NEWLINE_RE: Regex = Regex::new(r"(\r\n|\n){2,}").unwrap();
}

/// Convert text (and an optional span sidecar) into a serialized document.
///
/// Sidecar records are `start end tag1 ... tagN`, one span per record, with
/// line numbers counted over the raw text including blank lines. Tags land
/// on the corresponding non-blank lines; a record pointing at a blank line
/// is reported and skipped. Span ids are `s0`, `s1`, ... by record position.
pub fn convert_text(doc_id: &str, text: &str, span_text: Option<&str>) -> Result<LineateDoc> {
    // map raw line numbers onto non-blank ordinals
    let mut pre2post: HashMap<usize, usize> = HashMap::new();
    let mut wo_index = 1;
    for (i, line) in NEWLINE_RE.split(text).enumerate() {
        if !line.trim().is_empty() {
            pre2post.insert(i + 1, wo_index);
            wo_index += 1;
        }
    }

    // (tag, span id) per non-blank line number
    let mut line_dict: HashMap<usize, (String, String)> = HashMap::new();
    if let Some(span_text) = span_text {
        for (s_index, record) in span_text.split('\n').enumerate() {
            if record.is_empty() {
                continue;
            }
            let parts: Vec<&str> = record.split_whitespace().collect();
            if parts.len() < 3 {
                return Err(Error::MalformedSpan(record.to_string()));
            }
            let parse = |s: &str| {
                s.parse::<usize>()
                    .map_err(|_| Error::MalformedSpan(record.to_string()))
            };
            let start = parse(parts[0])?;
            let stop = parse(parts[1])?;
            let tags = &parts[2..];
            for i in start..=stop {
                let num = match pre2post.get(&i) {
                    Some(&num) => num,
                    None => {
                        log::warn!(
                            "a line specified in the igt file is a blank line in the \
                             document; check the line numbers in the igt file. \
                             Skipping the problem line."
                        );
                        break;
                    }
                };
                let tag = tags
                    .get(i - start)
                    .ok_or_else(|| Error::MalformedSpan(record.to_string()))?;
                line_dict.insert(num, (tag.to_string(), format!("s{}", s_index)));
            }
        }
    }

    let mut doc = LineateDoc::new();
    let text = MULTI_NEWLINE_RE.replace_all(text, "\n\n");
    let mut index = 1;
    for (b_index, para) in text.split("\n\n").enumerate() {
        let mut block = LineateBlock::new();
        block.set_attr("page", "1");
        block.set_attr("block_id", format!("b{}", b_index + 1));
        block.set_attr("doc_id", doc_id);
        for line_text in NEWLINE_RE.split(para) {
            let mut line = LineateLine::new(line_text);
            line.set_block_id(format!("b{}", b_index + 1));
            line.set_attr("line", index.to_string());
            line.set_attr("bbox", "0,0,0,0");
            if let Some((tag, span_id)) = line_dict.get(&index) {
                line.set_attr("tag", tag.clone());
                line.set_attr("span_id", span_id.clone());
            }
            block.push_lineno(index);
            doc.add_line(line);
            index += 1;
        }
        doc.add_block(block);
    }
    Ok(doc)
}

/// Decode bytes by sniffing the encoding.
fn detect_decode(bytes: &[u8]) -> String {
    let mut detector = chardetng::EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    log::info!("Using encoding: {}", encoding.name());
    encoding.decode(bytes).0.into_owned()
}

/// Decode a file with the requested encoding, falling back to detection
/// when the label is honored but the bytes do not decode cleanly.
fn decode_file(path: &Path, encoding: &str, detect: bool) -> Result<String> {
    let bytes = std::fs::read(path)?;
    if detect {
        return Ok(detect_decode(&bytes));
    }
    let enc = encoding_rs::Encoding::for_label(encoding.as_bytes())
        .ok_or_else(|| Error::UnknownEncoding(encoding.to_string()))?;
    let (text, _, had_errors) = enc.decode(&bytes);
    if had_errors {
        log::info!(
            "the file cannot be read using encoding {}; detecting instead",
            encoding
        );
        return Ok(detect_decode(&bytes));
    }
    Ok(text.into_owned())
}

/// Read a text file (and optional sidecar) and convert it.
pub fn read_and_convert(
    path: &Path,
    igt_path: Option<&Path>,
    encoding: &str,
    detect_encoding: bool,
) -> Result<LineateDoc> {
    let doc_id = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| n.split('.').next())
        .unwrap_or("doc")
        .to_string();
    let text = decode_file(path, encoding, detect_encoding)?;
    let igt_text = match igt_path {
        Some(igt) => Some(decode_file(igt, encoding, detect_encoding)?),
        None => None,
    };
    convert_text(&doc_id, &text, igt_text.as_deref())
}
