//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use rusty_pipeline::prelude::*;
use std::sync::Arc;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// First `n` weekday sessions starting 2024-01-01
pub fn sessions(n: usize) -> Vec<SessionDate> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    WeekdayCalendar::new()
        .sessions_in_range(start, start + Duration::days(2 * n as i64 + 7))
        .into_iter()
        .take(n)
        .collect()
}

pub fn engine(loader: InMemoryLoader, assets: Vec<Asset>) -> PipelineEngine {
    PipelineEngine::new(
        Arc::new(loader),
        Arc::new(WeekdayCalendar::new()),
        Arc::new(AssetUniverse::new("test", assets)),
    )
}

/// Deterministic pseudo-random walk per asset
pub fn price_path(asset: AssetId, len: usize, start: f64) -> Vec<f64> {
    let mut price = start;
    let mut state = asset.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let step = ((state >> 33) % 200) as f64 / 1000.0 - 0.1;
            price = (price * (1.0 + step)).max(0.5);
            price
        })
        .collect()
}

/// Loader with close and volume for each asset on every session
pub fn pricing_loader(sessions: &[SessionDate], assets: &[(AssetId, f64)]) -> InMemoryLoader {
    let close = EquityPricing::close();
    let volume = EquityPricing::volume();
    let mut loader = InMemoryLoader::new();
    for (asset, start) in assets {
        let path = price_path(*asset, sessions.len(), *start);
        loader
            .add_series(&close, *asset, sessions.iter().copied().zip(path))
            .unwrap();
        loader
            .add_series(
                &volume,
                *asset,
                sessions
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (*s, 1_000.0 * (*asset as f64) + i as f64)),
            )
            .unwrap();
    }
    loader
}
