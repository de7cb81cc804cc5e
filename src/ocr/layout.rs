//! Spatial structure building
//!
//! Groups word boxes into lines and lines into paragraphs by vertical
//! proximity. When a backend provides no word geometry, approximate boxes are
//! synthesized from the line-broken plain text and flagged as such.

use super::hocr::parse_hocr_words;
use super::types::{
    BoundingBox, GeometrySource, OcrLine, OcrParagraph, OcrWord, UnifiedOcrResult,
};

/// Maximum top-to-top gap (px) between words of the same line
pub const LINE_THRESHOLD: f64 = 15.0;
/// Maximum bottom-to-top gap (px) between lines of the same paragraph
pub const PARAGRAPH_THRESHOLD: f64 = 40.0;

/// Estimated glyph width for synthesized boxes
pub const SYNTH_CHAR_WIDTH: f64 = 8.0;
/// Height of a synthesized word box
pub const SYNTH_WORD_HEIGHT: f64 = 20.0;
/// Vertical advance between synthesized lines
pub const SYNTH_LINE_ADVANCE: f64 = 25.0;
/// Horizontal gap between synthesized words
pub const SYNTH_WORD_GAP: f64 = 5.0;

/// Anything with a bounding box that can be clustered
pub trait Boxed {
    fn bbox(&self) -> &BoundingBox;
    fn text(&self) -> &str;
    fn confidence(&self) -> f64;
}

impl Boxed for OcrWord {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
    fn text(&self) -> &str {
        &self.text
    }
    fn confidence(&self) -> f64 {
        self.confidence
    }
}

impl Boxed for OcrLine {
    fn bbox(&self) -> &BoundingBox {
        &self.bbox
    }
    fn text(&self) -> &str {
        &self.text
    }
    fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// How the vertical gap between consecutive sorted items is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GapMeasure {
    /// |top(current) - top(previous)|, used for words -> lines
    TopToTop,
    /// |top(current) - bottom(previous)|, used for lines -> paragraphs
    BottomToTop,
}

impl GapMeasure {
    fn gap(self, prev: &BoundingBox, curr: &BoundingBox) -> f64 {
        match self {
            GapMeasure::TopToTop => (curr.y - prev.y).abs(),
            GapMeasure::BottomToTop => (curr.y - prev.bottom()).abs(),
        }
    }
}

/// Sort items by top edge and split them into runs whose consecutive
/// vertical gaps stay below `threshold`.
///
/// The sort is stable, so items sharing a top edge keep their input order.
pub fn cluster<T: Boxed + Clone>(items: &[T], threshold: f64, measure: GapMeasure) -> Vec<Vec<T>> {
    let mut sorted: Vec<T> = items.to_vec();
    sorted.sort_by(|a, b| a.bbox().y.total_cmp(&b.bbox().y));

    let mut clusters: Vec<Vec<T>> = Vec::new();
    let mut current: Vec<T> = Vec::new();

    for item in sorted {
        let joins = current
            .last()
            .map(|prev| measure.gap(prev.bbox(), item.bbox()) < threshold)
            .unwrap_or(true);
        if !joins {
            clusters.push(std::mem::take(&mut current));
        }
        current.push(item);
    }
    if !current.is_empty() {
        clusters.push(current);
    }

    clusters
}

/// Aggregate text, mean confidence and box union of a cluster
fn summarize<T: Boxed>(members: &[T]) -> (String, f64, BoundingBox) {
    let text = members
        .iter()
        .map(|m| m.text())
        .collect::<Vec<_>>()
        .join(" ");
    let confidence = if members.is_empty() {
        0.0
    } else {
        (members.iter().map(|m| m.confidence()).sum::<f64>() / members.len() as f64).round()
    };
    let bbox = BoundingBox::union(members.iter().map(|m| m.bbox())).unwrap_or_default();
    (text, confidence, bbox)
}

/// Group words into lines; words within a line are ordered left to right
pub fn group_words_into_lines(words: &[OcrWord]) -> Vec<OcrLine> {
    cluster(words, LINE_THRESHOLD, GapMeasure::TopToTop)
        .into_iter()
        .map(|mut members| {
            members.sort_by(|a, b| a.bbox.x.total_cmp(&b.bbox.x));
            let (text, confidence, bbox) = summarize(&members);
            OcrLine {
                text,
                confidence,
                bbox,
                words: members,
            }
        })
        .collect()
}

/// Group lines into paragraphs; lines within a paragraph are ordered top to bottom
pub fn group_lines_into_paragraphs(lines: &[OcrLine]) -> Vec<OcrParagraph> {
    cluster(lines, PARAGRAPH_THRESHOLD, GapMeasure::BottomToTop)
        .into_iter()
        .map(|members| {
            let (text, confidence, bbox) = summarize(&members);
            OcrParagraph {
                text,
                confidence,
                bbox,
                lines: members,
            }
        })
        .collect()
}

/// Estimate word boxes from plain text
///
/// Each non-blank line advances the vertical offset; each token advances the
/// horizontal offset by its estimated width plus a fixed gap.
pub fn synthesize_words(text: &str, confidence: f64) -> Vec<OcrWord> {
    let confidence = confidence.round();
    let mut words = Vec::new();
    let mut y = 0.0;

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut x = 0.0;
        for token in line.split_whitespace() {
            let width = token.chars().count() as f64 * SYNTH_CHAR_WIDTH;
            words.push(OcrWord {
                text: token.to_string(),
                confidence,
                bbox: BoundingBox::new(x, y, width, SYNTH_WORD_HEIGHT),
            });
            x += width + SYNTH_WORD_GAP;
        }
        y += SYNTH_LINE_ADVANCE;
    }

    words
}

/// Fill in words, lines, paragraphs and blocks of a raw engine result
///
/// Word geometry is taken from the engine if present, then from its hOCR
/// markup, and synthesized from the text as a last resort.
pub fn build_structure(mut result: UnifiedOcrResult) -> UnifiedOcrResult {
    if result.words.is_empty() {
        if let Some(markup) = result.markup.as_deref() {
            result.words = parse_hocr_words(markup);
        }
    }

    result.geometry = if !result.words.is_empty() {
        GeometrySource::Backend
    } else {
        result.words = synthesize_words(&result.text, result.confidence);
        if result.words.is_empty() {
            GeometrySource::None
        } else {
            tracing::info!(
                "No word geometry from {} backend, synthesized {} word boxes",
                result.engine,
                result.words.len()
            );
            GeometrySource::Synthesized
        }
    };

    result.lines = group_words_into_lines(&result.words);
    result.paragraphs = group_lines_into_paragraphs(&result.lines);
    result.blocks = result.paragraphs.clone();

    tracing::debug!(
        "Structure: {} words, {} lines, {} paragraphs",
        result.words.len(),
        result.lines.len(),
        result.paragraphs.len()
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrEngineKind;

    fn word(text: &str, x: f64, y: f64, w: f64, h: f64, confidence: f64) -> OcrWord {
        OcrWord {
            text: text.to_string(),
            confidence,
            bbox: BoundingBox::new(x, y, w, h),
        }
    }

    fn line_at(y: f64, h: f64) -> OcrLine {
        OcrLine {
            text: format!("line@{}", y),
            confidence: 80.0,
            bbox: BoundingBox::new(0.0, y, 100.0, h),
            words: Vec::new(),
        }
    }

    #[test]
    fn test_words_grouped_into_lines() {
        let words = vec![
            word("Total:", 10.0, 100.0, 50.0, 20.0, 90.0),
            word("Invoice", 10.0, 10.0, 60.0, 20.0, 80.0),
            word("$42.00", 70.0, 104.0, 50.0, 20.0, 70.0),
            word("No.", 80.0, 12.0, 30.0, 20.0, 91.0),
        ];

        let lines = group_words_into_lines(&words);
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0].text, "Invoice No.");
        assert_eq!(lines[0].confidence, 86.0);
        assert_eq!(lines[0].bbox, BoundingBox::new(10.0, 10.0, 100.0, 22.0));

        assert_eq!(lines[1].text, "Total: $42.00");
        assert_eq!(lines[1].confidence, 80.0);
        assert_eq!(lines[1].words.len(), 2);
    }

    #[test]
    fn test_words_on_a_line_ordered_left_to_right() {
        let words = vec![
            word("world", 60.0, 10.0, 40.0, 20.0, 90.0),
            word("hello", 0.0, 12.0, 40.0, 20.0, 90.0),
        ];
        let lines = group_words_into_lines(&words);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "hello world");
    }

    #[test]
    fn test_lines_grouped_into_paragraphs() {
        // gap 5 -> same paragraph, gap 75 -> new paragraph
        let lines = vec![line_at(0.0, 20.0), line_at(25.0, 20.0), line_at(120.0, 20.0)];
        let paragraphs = group_lines_into_paragraphs(&lines);
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].lines.len(), 2);
        assert_eq!(paragraphs[0].bbox, BoundingBox::new(0.0, 0.0, 100.0, 45.0));
        assert_eq!(paragraphs[1].lines.len(), 1);
    }

    #[test]
    fn test_line_deep_inside_previous_box_starts_new_paragraph() {
        // |10 - 100| = 90 >= 40
        let lines = vec![line_at(0.0, 100.0), line_at(10.0, 20.0)];
        assert_eq!(group_lines_into_paragraphs(&lines).len(), 2);

        // |90 - 100| = 10 < 40
        let lines = vec![line_at(0.0, 100.0), line_at(90.0, 20.0)];
        assert_eq!(group_lines_into_paragraphs(&lines).len(), 1);
    }

    #[test]
    fn test_clustering_is_idempotent() {
        let lines = vec![
            line_at(0.0, 20.0),
            line_at(30.0, 20.0),
            line_at(200.0, 20.0),
            line_at(230.0, 18.0),
            line_at(400.0, 20.0),
        ];

        let first: Vec<Vec<OcrLine>> = cluster(&lines, PARAGRAPH_THRESHOLD, GapMeasure::BottomToTop);
        let flattened: Vec<OcrLine> = first.iter().flatten().cloned().collect();
        let second = cluster(&flattened, PARAGRAPH_THRESHOLD, GapMeasure::BottomToTop);

        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_clusters_respect_vertical_order() {
        let words: Vec<OcrWord> = [300.0, 5.0, 150.0, 8.0, 310.0, 160.0, 0.0]
            .iter()
            .enumerate()
            .map(|(i, y)| word(&format!("w{}", i), 0.0, *y, 10.0, 10.0, 50.0))
            .collect();

        let clusters = cluster(&words, LINE_THRESHOLD, GapMeasure::TopToTop);
        assert_eq!(clusters.len(), 3);
        for pair in clusters.windows(2) {
            let max_a = pair[0].iter().map(|w| w.bbox.y).fold(f64::MIN, f64::max);
            let min_b = pair[1].iter().map(|w| w.bbox.y).fold(f64::MAX, f64::min);
            assert!(max_a <= min_b);
        }
    }

    #[test]
    fn test_synthesize_words() {
        let words = synthesize_words("Invoice No\n\n  \n42", 87.6);
        assert_eq!(words.len(), 3);

        assert_eq!(words[0].bbox, BoundingBox::new(0.0, 0.0, 56.0, 20.0));
        assert_eq!(words[1].bbox, BoundingBox::new(61.0, 0.0, 16.0, 20.0));
        // blank lines do not advance the vertical offset
        assert_eq!(words[2].bbox, BoundingBox::new(0.0, 25.0, 16.0, 20.0));
        assert!(words.iter().all(|w| w.confidence == 88.0));
    }

    #[test]
    fn test_build_structure_synthesizes_when_no_geometry() {
        let raw = UnifiedOcrResult::plain(
            OcrEngineKind::Tesseract,
            "Name: Jane Doe\nDate: 2024-01-01\n".to_string(),
            77.0,
        );
        let result = build_structure(raw);

        assert_eq!(result.geometry, GeometrySource::Synthesized);
        assert_eq!(result.words.len(), 5);
        assert_eq!(result.lines.len(), 2);
        assert_eq!(result.lines[1].text, "Date: 2024-01-01");
        assert_eq!(result.paragraphs.len(), 1);
        assert_eq!(result.blocks, result.paragraphs);
    }

    #[test]
    fn test_build_structure_prefers_markup() {
        let mut raw = UnifiedOcrResult::plain(OcrEngineKind::Tesseract, "Hello".to_string(), 60.0);
        raw.markup = Some(
            "<div><span class='ocrx_word' title='bbox 5 5 50 25'>Hello</span></div>".to_string(),
        );
        let result = build_structure(raw);

        assert_eq!(result.geometry, GeometrySource::Backend);
        assert_eq!(result.words[0].bbox, BoundingBox::new(5.0, 5.0, 45.0, 20.0));
        assert_eq!(result.lines.len(), 1);
    }

    #[test]
    fn test_build_structure_empty_text() {
        let raw = UnifiedOcrResult::plain(OcrEngineKind::OcrSpace, "  ".to_string(), 0.0);
        let result = build_structure(raw);
        assert_eq!(result.geometry, GeometrySource::None);
        assert!(result.lines.is_empty());
        assert!(result.blocks.is_empty());
    }
}
