use chrono::{Duration, NaiveDate};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rusty_pipeline::prelude::*;
use std::sync::Arc;

const N_ASSETS: u64 = 200;
const N_SESSIONS: usize = 300;

fn synthetic_engine(parallel: bool) -> (PipelineEngine, Vec<SessionDate>) {
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let calendar = WeekdayCalendar::new();
    let sessions: Vec<SessionDate> = calendar
        .sessions_in_range(start, start + Duration::days(2 * N_SESSIONS as i64))
        .into_iter()
        .take(N_SESSIONS)
        .collect();

    let close = EquityPricing::close();
    let volume = EquityPricing::volume();
    let sector = Fundamentals::categorical("sector");
    let mut loader = InMemoryLoader::new();
    let mut assets = Vec::new();

    for id in 1..=N_ASSETS {
        assets.push(Asset::equity(id, format!("A{}", id), "NYSE"));
        let mut price = 10.0 + id as f64;
        for (i, day) in sessions.iter().enumerate() {
            price *= 1.0 + (((id * 31 + i as u64 * 17) % 41) as f64 - 20.0) / 1000.0;
            loader.insert_number(&close, id, *day, price).unwrap();
            loader
                .insert_number(&volume, id, *day, 10_000.0 + (i as f64) * id as f64)
                .unwrap();
            loader
                .insert_label(&sector, id, *day, format!("S{}", id % 11))
                .unwrap();
        }
    }

    let config = EngineConfig {
        parallel,
        ..EngineConfig::default()
    };
    let engine = PipelineEngine::new(
        Arc::new(loader),
        Arc::new(calendar),
        Arc::new(AssetUniverse::new("bench", assets)),
    )
    .with_config(config);
    (engine, sessions)
}

fn multi_factor_pipeline() -> Pipeline {
    let close = Factor::latest(&EquityPricing::close());
    let volume = Factor::latest(&EquityPricing::volume());
    let sector = Classifier::latest(&Fundamentals::categorical("sector"));

    let sma_fast = close.sma(10);
    let sma_slow = close.sma(50);
    let momentum = close.returns(60);
    let adv = Factor::average_dollar_volume(&close, &volume, 20);
    let liquid = adv.top(100);

    let mut pipeline = Pipeline::new();
    pipeline
        .add_output("trend", sma_fast.percent_difference(&sma_slow))
        .add_output("momentum_rank", momentum.rank_grouped(false, &sector).with_mask(&liquid))
        .add_output("vol", close.daily_returns().annualized_volatility(20))
        .add_output("z", momentum.zscore())
        .set_screen(liquid.and(&close.gt(5.0)));
    pipeline
}

fn benchmark_compile(c: &mut Criterion) {
    let pipeline = multi_factor_pipeline();
    c.bench_function("compile_multi_factor", |b| {
        b.iter(|| black_box(pipeline.compile().unwrap()));
    });
}

fn benchmark_run(c: &mut Criterion) {
    let pipeline = multi_factor_pipeline();

    for parallel in [false, true] {
        let (engine, sessions) = synthetic_engine(parallel);
        let start = sessions[100];
        let end = sessions[N_SESSIONS - 1];
        let name = if parallel {
            "run_200_assets_200_sessions_parallel"
        } else {
            "run_200_assets_200_sessions_serial"
        };
        c.bench_function(name, |b| {
            b.iter(|| black_box(engine.run_pipeline(&pipeline, start, end).unwrap()));
        });
    }
}

fn benchmark_chunked_run(c: &mut Criterion) {
    let pipeline = multi_factor_pipeline();
    let (engine, sessions) = synthetic_engine(true);
    let start = sessions[100];
    let end = sessions[N_SESSIONS - 1];

    c.bench_function("run_chunked_50", |b| {
        b.iter(|| {
            black_box(
                engine
                    .run_chunked_pipeline(&pipeline, start, end, 50)
                    .unwrap(),
            )
        });
    });
}

criterion_group!(
    benches,
    benchmark_compile,
    benchmark_run,
    benchmark_chunked_run
);
criterion_main!(benches);
