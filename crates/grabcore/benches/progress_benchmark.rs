//! Progress parser benchmarks
//!
//! Run with: cargo bench -p grabcore --bench progress_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use grabcore::download::progress::{parse_progress_line, ParsedLine};
use grabcore::ProgressParser;

/// Output resembling a real download: mostly progress lines, some chatter
fn sample_output(lines: usize) -> Vec<u8> {
    let mut out = String::new();
    for i in 0..lines {
        match i % 10 {
            0 => out.push_str("[youtube] abc: Downloading webpage\n"),
            5 => out.push_str(&format!("[download] {:>5.1}%\r", i as f64 * 100.0 / lines as f64)),
            _ => out.push_str(&format!(
                "[download] {:>5.1}% of 10.00MiB at 2.50MiB/s ETA 00:{:02}\n",
                i as f64 * 100.0 / lines as f64,
                i % 60
            )),
        }
    }
    out.into_bytes()
}

fn benchmark_single_line(c: &mut Criterion) {
    c.bench_function("parse_rich_line", |b| {
        b.iter(|| parse_progress_line(black_box("[download]  23.5% of 10.00MiB at 2.50MiB/s ETA 00:03")))
    });
}

fn benchmark_chunked_stream(c: &mut Criterion) {
    let data = sample_output(2000);
    let mut group = c.benchmark_group("parser_chunked");
    group.throughput(Throughput::Bytes(data.len() as u64));

    for chunk_size in [64usize, 1024, 8192].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(chunk_size), chunk_size, |b, &chunk_size| {
            b.iter(|| {
                let mut parser = ProgressParser::new();
                let mut events = 0usize;
                for chunk in data.chunks(chunk_size) {
                    events += parser
                        .feed(chunk)
                        .iter()
                        .filter(|l| matches!(l, ParsedLine::Progress(_)))
                        .count();
                }
                black_box(events)
            })
        });
    }

    group.finish();
}

/// One metadata-sized line with no terminator until the end, read in pipe-sized chunks
fn benchmark_long_line(c: &mut Criterion) {
    let mut data = vec![b'x'; 2 * 1024 * 1024];
    data.push(b'\n');
    let mut group = c.benchmark_group("parser_long_line");
    group.throughput(Throughput::Bytes(data.len() as u64));

    group.bench_function("8192", |b| {
        b.iter(|| {
            let mut parser = ProgressParser::lines_only();
            let mut lines = 0usize;
            for chunk in data.chunks(8192) {
                lines += parser.feed(chunk).len();
            }
            black_box(lines)
        })
    });

    group.finish();
}

criterion_group!(benches, benchmark_single_line, benchmark_chunked_stream, benchmark_long_line);
criterion_main!(benches);
