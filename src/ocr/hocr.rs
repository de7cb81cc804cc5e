//! hOCR markup parsing
//!
//! Extracts word boxes from the `ocrx_word` spans of an hOCR document:
//!
//! ```html
//! <span class='ocrx_word' id='word_1_1' title='bbox 36 92 96 116; x_wconf 95'>Invoice</span>
//! ```
//!
//! Absent or malformed markup yields an empty list; callers fall back to
//! synthesized geometry.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::types::{BoundingBox, OcrWord};

/// Confidence assigned to every markup word
pub const MARKUP_WORD_CONFIDENCE: f64 = 85.0;

/// Parse word boxes out of hOCR markup
pub fn parse_hocr_words(markup: &str) -> Vec<OcrWord> {
    if markup.trim().is_empty() {
        return Vec::new();
    }

    match scan_words(markup) {
        Ok(words) => words,
        Err(e) => {
            tracing::warn!("hOCR parsing failed, discarding markup: {}", e);
            Vec::new()
        }
    }
}

/// Word currently being collected
struct OpenWord {
    bbox: BoundingBox,
    text: String,
    /// Nesting depth of elements inside the word span
    depth: usize,
}

fn scan_words(markup: &str) -> Result<Vec<OcrWord>, quick_xml::Error> {
    let mut reader = Reader::from_str(markup);
    reader.trim_text(false);

    let mut words = Vec::new();
    let mut open: Option<OpenWord> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if let Some(word) = open.as_mut() {
                    word.depth += 1;
                } else if is_word_span(&e) {
                    open = word_bbox(&e).map(|bbox| OpenWord {
                        bbox,
                        text: String::new(),
                        depth: 0,
                    });
                }
            }
            Event::End(_) => {
                if let Some(word) = open.as_mut() {
                    if word.depth == 0 {
                        if let Some(finished) = open.take() {
                            push_word(&mut words, finished);
                        }
                    } else {
                        word.depth -= 1;
                    }
                }
            }
            Event::Text(t) => {
                if let Some(word) = open.as_mut() {
                    let text = t
                        .unescape()
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&t).into_owned());
                    word.text.push_str(&text);
                }
            }
            Event::CData(t) => {
                if let Some(word) = open.as_mut() {
                    word.text.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(words)
}

fn push_word(words: &mut Vec<OcrWord>, word: OpenWord) {
    let text = word.text.trim();
    if text.is_empty() {
        return;
    }
    words.push(OcrWord {
        text: text.to_string(),
        confidence: MARKUP_WORD_CONFIDENCE,
        bbox: word.bbox,
    });
}

fn is_word_span(e: &BytesStart<'_>) -> bool {
    if e.name().as_ref() != b"span" {
        return false;
    }
    attribute(e, b"class")
        .map(|class| class.split_whitespace().any(|c| c == "ocrx_word"))
        .unwrap_or(false)
}

fn word_bbox(e: &BytesStart<'_>) -> Option<BoundingBox> {
    attribute(e, b"title").and_then(|title| parse_bbox(&title))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Parse the `bbox x0 y0 x1 y1` property of an hOCR title attribute
fn parse_bbox(title: &str) -> Option<BoundingBox> {
    let props = title
        .split(';')
        .map(str::trim)
        .find_map(|prop| prop.strip_prefix("bbox "))?;

    let coords: Vec<f64> = props
        .split_whitespace()
        .map(|n| n.parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match coords.as_slice() {
        [x0, y0, x1, y1] if x1 >= x0 && y1 >= y0 => {
            Some(BoundingBox::from_corners(*x0, *y0, *x1, *y1))
        }
        _ => None,
    }
}
