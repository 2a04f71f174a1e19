//! Benchmarks for segmentation and cleaning.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use grokken::clean::BookCatalog;
use grokken::config::StrategyConfig;
use grokken::segment::{detect_headings, Segmenter};
use grokken::tokenizer::ApproximateTokenCounter;

const PARAGRAPH: &str = "It is a commonplace that the mind attends to one thing at a time, \
                         and yet the stream of thought carries many things along with it.\n\n";

fn chaptered_text(chapters: usize, paragraphs: usize) -> String {
    let mut text = String::new();
    for i in 1..=chapters {
        text.push_str(&format!("CHAPTER {i}.\n\n"));
        text.push_str(&PARAGRAPH.repeat(paragraphs));
    }
    text
}

fn bench_detect_headings(c: &mut Criterion) {
    let text = chaptered_text(40, 50);
    c.bench_function("detect_headings_40ch", |bench| {
        bench.iter(|| black_box(detect_headings(&text)))
    });
}

fn bench_segment_chapters(c: &mut Criterion) {
    let segmenter = Segmenter::new(Arc::new(ApproximateTokenCounter), StrategyConfig::default());
    let text = chaptered_text(40, 50);
    c.bench_function("segment_chapters_40ch", |bench| {
        bench.iter(|| black_box(segmenter.segment(&text).unwrap()))
    });
}

fn bench_segment_token_budget(c: &mut Criterion) {
    let segmenter = Segmenter::new(Arc::new(ApproximateTokenCounter), StrategyConfig::default());
    let text = PARAGRAPH.repeat(2_000);
    c.bench_function("segment_budget_2k_paragraphs", |bench| {
        bench.iter(|| black_box(segmenter.segment_by_token_budget(&text, 2_000).unwrap()))
    });
}

fn bench_clean_book(c: &mut Criterion) {
    let catalog = BookCatalog::builtin();
    let book = catalog.iter().next().unwrap();
    let raw = chaptered_text(10, 50).replace("the", "tbe").replace('\n', "\r\n");
    c.bench_function("clean_builtin_10ch", |bench| {
        bench.iter(|| black_box(book.process(&raw).unwrap()))
    });
}

criterion_group!(
    benches,
    bench_detect_headings,
    bench_segment_chapters,
    bench_segment_token_budget,
    bench_clean_book
);
criterion_main!(benches);
