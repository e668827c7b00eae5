//! Example of a screened factor pipeline
//!
//! Shows how to:
//! - Build factors and filters from dataset columns
//! - Screen the universe down to cheap stocks trading above their average
//! - Inspect the compiled plan and print the result table as CSV

use chrono::NaiveDate;
use rusty_pipeline::prelude::*;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("=== Screened Pipeline Example ===\n");

    let calendar = WeekdayCalendar::new();
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
    let sessions = calendar.sessions_in_range(start, end);

    let close = EquityPricing::close();
    let mut loader = InMemoryLoader::new();
    let assets = vec![
        Asset::equity(1, "AAA", "NYSE"),
        Asset::equity(2, "BBB", "NYSE"),
        Asset::equity(3, "CCC", "NASDAQ"),
        Asset::equity(4, "DDD", "NASDAQ").listed_from(sessions[20]),
    ];

    for asset in &assets {
        let base = 2.0 + asset.id as f64;
        let drift = if asset.id % 2 == 0 { 0.01 } else { -0.005 };
        loader.add_series(
            &close,
            asset.id,
            sessions
                .iter()
                .enumerate()
                .map(|(i, day)| (*day, base * (1.0 + drift * i as f64))),
        )?;
    }

    let price = Factor::latest(&close);
    let sma = price.sma(30);
    let above_average = price.percent_difference(&sma);

    let mut pipeline = Pipeline::new();
    pipeline
        .add_output("close", &price)
        .add_output("sma_30", &sma)
        .add_output("pct_above_sma", &above_average)
        .set_screen(above_average.gt(0.0).and(&price.lt(5.0)));

    let plan = pipeline.compile()?;
    println!("Compiled {} terms in {} layers", plan.len(), plan.layers().len());
    println!("Lookback required: {} sessions\n", plan.max_lookback());

    let engine = PipelineEngine::new(
        Arc::new(loader),
        Arc::new(calendar),
        Arc::new(AssetUniverse::new("demo", assets)),
    );
    let table = engine.run_pipeline(&pipeline, sessions[30], end)?;

    println!("{} rows passed the screen\n", table.len());
    print!("{}", table.to_csv_string()?);

    Ok(())
}
