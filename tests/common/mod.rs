use std::sync::Once;

use chrono::NaiveDate;
use finport::{FixedPriceProvider, RunRequest, RunRequestBuilder};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test subscriber honoring `RUST_LOG`. Safe to call from every
/// test; only the first call wins.
pub fn init_tracing() {
    TRACING.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn window() -> (NaiveDate, NaiveDate) {
    (date(2024, 1, 1), date(2024, 6, 28))
}

/// A small synthetic market: one steady grower, one flat stock, one noisy
/// stock paying a quarterly dividend, and a slowly rising benchmark index.
pub fn market() -> FixedPriceProvider {
    let (start, end) = window();
    let days = (end - start).num_days();

    let grower = (0..=days).map(|i| {
        let d = start + chrono::Duration::days(i);
        (d, 100.0 * (1.0 + 0.0015 * i as f64))
    });
    let noisy = (0..=days).map(|i| {
        let d = start + chrono::Duration::days(i);
        (d, 80.0 + 6.0 * ((i % 7) as f64) - 4.0 * ((i % 5) as f64))
    });
    let benchmark = (0..=days).map(|i| {
        let d = start + chrono::Duration::days(i);
        (d, 380.0 * (1.0 + 0.0008 * i as f64))
    });

    FixedPriceProvider::new()
        .with_series("GRW", grower)
        .with_flat_price("FLT", 50.0, start, end)
        .with_series("NSY", noisy)
        .with_series("DJI", benchmark)
        .with_dividends("NSY", [(date(2024, 3, 15), 0.75), (date(2024, 6, 14), 0.75)])
}

pub fn request(total_steps: u64, chunk_step_quota: u64, seed: u64) -> RunRequest {
    let (start, end) = window();
    RunRequestBuilder::new()
        .with_symbols(["GRW", "FLT", "NSY"])
        .with_max_value(2_000.0)
        .with_window(start, end)
        .with_total_steps(total_steps)
        .with_chunk_step_quota(chunk_step_quota)
        .with_seed(seed)
        .build()
        .unwrap()
}
