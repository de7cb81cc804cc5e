//! Structure Clustering Benchmarks
//!
//! Word -> line -> paragraph grouping over synthetic pages of increasing size.
//!
//! Run with: `cargo bench --bench structure_clustering`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use template_ocr::ocr::layout::{build_structure, group_lines_into_paragraphs, group_words_into_lines};
use template_ocr::ocr::{BoundingBox, OcrEngineKind, OcrWord, UnifiedOcrResult};

/// A page of `lines` lines with 12 words each, every fifth line starting a
/// new paragraph
fn synthetic_page(lines: usize) -> Vec<OcrWord> {
    let mut words = Vec::with_capacity(lines * 12);
    let mut y = 40.0;
    for line in 0..lines {
        if line % 5 == 0 {
            y += 60.0;
        }
        for column in 0..12 {
            words.push(OcrWord {
                text: format!("w{}_{}", line, column),
                confidence: 80.0 + (column % 5) as f64,
                // slight jitter keeps words of one line from sharing a top edge
                bbox: BoundingBox::new(60.0 + column as f64 * 70.0, y + (column % 3) as f64, 60.0, 22.0),
            });
        }
        y += 28.0;
    }
    words
}

fn synthetic_text(lines: usize) -> String {
    (0..lines)
        .map(|l| format!("Line {} of a scanned invoice with several tokens", l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_grouping(c: &mut Criterion) {
    let mut group = c.benchmark_group("grouping");
    group.measurement_time(Duration::from_secs(5));

    for lines in [10usize, 50, 200] {
        let words = synthetic_page(lines);
        group.throughput(Throughput::Elements(words.len() as u64));

        group.bench_with_input(BenchmarkId::new("words_to_lines", lines), &words, |b, words| {
            b.iter(|| group_words_into_lines(black_box(words)))
        });

        let grouped = group_words_into_lines(&words);
        group.bench_with_input(
            BenchmarkId::new("lines_to_paragraphs", lines),
            &grouped,
            |b, grouped| b.iter(|| group_lines_into_paragraphs(black_box(grouped))),
        );
    }

    group.finish();
}

fn bench_build_structure(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_structure");

    let text = synthetic_text(100);
    group.bench_function("synthesized_100_lines", |b| {
        b.iter(|| {
            let raw = UnifiedOcrResult::plain(OcrEngineKind::OcrSpace, text.clone(), 90.0);
            build_structure(black_box(raw))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_grouping, bench_build_structure);
criterion_main!(benches);
