//! Benchmarks for docweave reconciliation performance.
//!
//! Run with: cargo bench
//!
//! These benchmarks run the stages over synthetic pages of word tokens and
//! glyphs.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use docweave::model::{BoundingBox, ExtractedElement, PhysicalChar};
use docweave::pipeline::{DocumentInput, PageInput, Pipeline, PipelineOptions};
use docweave::reconcile::{chain_merge, MergeGroup, Scrubber};

/// Creates a page of `lines` lines with eight words each, plus matching glyphs.
fn create_test_page(page: i32, lines: usize) -> PageInput {
    let mut tokens = Vec::new();
    let mut chars = Vec::new();

    for line in 0..lines {
        let y = 20.0 + line as f32 * 14.0;
        for w in 0..8 {
            let x = 20.0 + w as f32 * 60.0;
            let text = format!("word{}", w);
            tokens.push(ExtractedElement::word(
                format!("p{}-l{}-w{}", page, line, w),
                text.clone(),
                page,
                BoundingBox::new(x, y, x + 50.0, y + 10.0),
            ));
            for (i, c) in text.chars().enumerate() {
                let cx = x + i as f32 * 10.0;
                chars.push(PhysicalChar::new(
                    c.to_string(),
                    page,
                    BoundingBox::new(cx, y, cx + 10.0, y + 10.0),
                ));
            }
        }
    }

    PageInput::new(page).with_tokens(tokens).with_physical_chars(chars)
}

fn create_test_document(id: &str, pages: usize) -> DocumentInput {
    (0..pages).fold(DocumentInput::new(id), |doc, p| {
        doc.with_page(create_test_page(p as i32, 40))
    })
}

/// Benchmark a full document run at various sizes.
fn bench_process_document(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_document");
    let pipeline = Pipeline::with_options(PipelineOptions::new().with_suggester_timeout_ms(0));

    for pages in [1, 5, 10].iter() {
        let input = create_test_document("bench", *pages);
        group.bench_function(format!("{}_pages", pages), |b| {
            b.iter(|| pipeline.process_document(black_box(&input)));
        });
    }

    group.finish();
}

/// Benchmark batches with and without the rayon pool.
fn bench_process_batch(c: &mut Criterion) {
    let inputs: Vec<DocumentInput> = (0..8)
        .map(|i| create_test_document(&format!("doc{}", i), 2))
        .collect();

    let parallel = Pipeline::with_options(PipelineOptions::new().with_suggester_timeout_ms(0));
    let sequential = Pipeline::with_options(PipelineOptions::new().with_suggester_timeout_ms(0).sequential());

    c.bench_function("batch_parallel", |b| {
        b.iter(|| parallel.process_batch(black_box(&inputs)));
    });
    c.bench_function("batch_sequential", |b| {
        b.iter(|| sequential.process_batch(black_box(&inputs)));
    });
}

/// Benchmark chain merging of overlapping groups.
fn bench_chain_merge(c: &mut Criterion) {
    let groups: Vec<MergeGroup> = (0..2_000)
        .map(|i| MergeGroup::new([format!("t{}", i), format!("t{}", i + 1)]))
        .collect();

    c.bench_function("chain_merge_2000", |b| {
        b.iter(|| chain_merge(black_box(groups.clone())));
    });
}

/// Benchmark scrubbing one dense page.
fn bench_scrub(c: &mut Criterion) {
    let page = create_test_page(0, 60);
    let scrubber = Scrubber::new(page.physical_chars.clone());

    c.bench_function("scrub_canonical_text", |b| {
        b.iter(|| {
            let mut hits = 0;
            for token in &page.tokens {
                if scrubber.canonical_text(0, black_box(&token.bbox)).is_some() {
                    hits += 1;
                }
            }
            hits
        });
    });
}

criterion_group!(
    benches,
    bench_process_document,
    bench_process_batch,
    bench_chain_merge,
    bench_scrub,
);
criterion_main!(benches);
