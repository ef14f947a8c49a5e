//! Benchmarks for indicators and the technical analyzer.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use trading_core::traits::Indicator;
use trading_core::types::Candle;
use trading_indicators::{Rsi, Sma, TechnicalAnalyzer};

fn generate_candles(size: usize) -> Vec<Candle> {
    (0..size)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            Candle::new(i as i64 * 60_000, close - 0.2, close + 0.5, close - 0.5, close, 1_000.0)
        })
        .collect()
}

fn benchmark_indicators(c: &mut Criterion) {
    let mut group = c.benchmark_group("indicators");

    for size in [1_000, 10_000].iter() {
        let closes: Vec<f64> = generate_candles(*size).iter().map(|c| c.close).collect();

        group.bench_with_input(BenchmarkId::new("sma20", size), &closes, |b, data| {
            let sma = Sma::new(20).unwrap();
            b.iter(|| sma.calculate(black_box(data)))
        });

        group.bench_with_input(BenchmarkId::new("rsi14", size), &closes, |b, data| {
            let rsi = Rsi::new(14).unwrap();
            b.iter(|| rsi.calculate(black_box(data)))
        });
    }

    group.finish();
}

fn benchmark_analyzer(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyzer");
    let analyzer = TechnicalAnalyzer::default();

    for size in [100, 500].iter() {
        let candles = generate_candles(*size);
        group.bench_with_input(BenchmarkId::new("analyze", size), &candles, |b, candles| {
            b.iter(|| analyzer.analyze("BENCH", black_box(candles)))
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_indicators, benchmark_analyzer);
criterion_main!(benches);
