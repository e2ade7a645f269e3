use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::FinportResult;

/// One daily closing price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// One per-share cash dividend payment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DividendPayment {
    pub date: NaiveDate,
    pub amount_per_share: f64,
}

/// Source of historical market data.
///
/// The annealing core is injected with a handle to this trait instead of
/// reaching for a process-wide session. Implementations may fail with
/// [`DataError::Connection`](crate::error::DataError::Connection) on
/// transient network trouble; wrap them in
/// [`RetryingProvider`](crate::market::RetryingProvider) to keep those
/// failures invisible to the search loop.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Daily closing prices for `symbol` within `[start, end]`, ascending by
    /// date. Non-trading days are simply absent.
    async fn price_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FinportResult<Vec<PricePoint>>;

    /// Closing price of `symbol` on `date`, or on the latest trading day
    /// before it if the market was closed.
    async fn price_at(&self, symbol: &str, date: NaiveDate) -> FinportResult<f64>;

    /// Per-share cash dividends paid by `symbol` within `[start, end]`,
    /// ascending by date. Defaults to none; providers without dividend data
    /// need not override this.
    async fn dividend_series(
        &self,
        _symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> FinportResult<Vec<DividendPayment>> {
        Ok(Vec::new())
    }
}
