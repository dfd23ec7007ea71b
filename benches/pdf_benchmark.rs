//! Performance benchmarks for the in-process transformations
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pdf_transform::archive::assemble_pages;
use pdf_transform::{PageRange, QpdfWrapper};
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures");
    path.push(name);
    path
}

fn load_fixture(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).expect("Failed to read fixture")
}

/// Lock inspection on unlocked and locked input
fn bench_inspect(c: &mut Criterion) {
    let data = load_fixture("report.pdf");
    let locked = QpdfWrapper::protect(&data, "secret").unwrap();

    let mut group = c.benchmark_group("inspect");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("unlocked", |b| {
        b.iter(|| QpdfWrapper::inspect(black_box(&data)).unwrap());
    });
    group.bench_function("locked", |b| {
        b.iter(|| QpdfWrapper::inspect(black_box(&locked)).unwrap());
    });

    group.finish();
}

/// Protect and reset round trip costs
fn bench_passwords(c: &mut Criterion) {
    let data = load_fixture("report.pdf");
    let locked = QpdfWrapper::protect(&data, "secret").unwrap();

    let mut group = c.benchmark_group("passwords");

    group.bench_function("protect", |b| {
        b.iter(|| QpdfWrapper::protect(black_box(&data), "secret").unwrap());
    });
    group.bench_function("reset_password", |b| {
        b.iter(|| QpdfWrapper::reset_password(black_box(&locked), "secret", "other").unwrap());
    });

    group.finish();
}

/// Page range extraction with growing ranges
fn bench_split(c: &mut Criterion) {
    let data = load_fixture("report.pdf");

    let mut group = c.benchmark_group("split_range");

    for range in ["1-1", "3-5", "1-10"] {
        let parsed = PageRange::parse(range).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(range), &parsed, |b, parsed| {
            b.iter(|| QpdfWrapper::extract_range(black_box(&data), parsed).unwrap());
        });
    }

    group.finish();
}

/// ZIP assembly of page-sized payloads
fn bench_archive(c: &mut Criterion) {
    let page: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();

    let mut group = c.benchmark_group("archive");

    for pages in [1usize, 10, 50] {
        group.throughput(Throughput::Bytes((page.len() * pages) as u64));
        group.bench_with_input(BenchmarkId::new("pages", pages), &pages, |b, &pages| {
            b.iter(|| assemble_pages(vec![page.clone(); pages]).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_inspect, bench_passwords, bench_split, bench_archive);
criterion_main!(benches);
