use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    error::{DataError, FinportResult},
    market::provider::{DividendPayment, PricePoint, PriceProvider},
};

/// In-memory [`PriceProvider`] backed by explicit daily bars.
///
/// Used by the test suite and by examples that want a deterministic market.
/// Lookups behave like a daily-bar cache: `price_at` forward-fills from the
/// latest bar on or before the requested date.
#[derive(Debug, Clone, Default)]
pub struct FixedPriceProvider {
    prices: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
    dividends: BTreeMap<String, BTreeMap<NaiveDate, f64>>,
}

impl FixedPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a bar series for `symbol`.
    pub fn with_series(
        mut self,
        symbol: impl Into<String>,
        series: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        self.prices
            .entry(symbol.into())
            .or_default()
            .extend(series);
        self
    }

    /// Registers a constant daily price for `symbol` across `[start, end]`.
    pub fn with_flat_price(
        self,
        symbol: impl Into<String>,
        price: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        let series = start
            .iter_days()
            .take_while(|d| *d <= end)
            .map(|d| (d, price));
        self.with_series(symbol, series)
    }

    /// Registers per-share cash dividend payments for `symbol`.
    pub fn with_dividends(
        mut self,
        symbol: impl Into<String>,
        payments: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        self.dividends
            .entry(symbol.into())
            .or_default()
            .extend(payments);
        self
    }

    fn series_of(&self, symbol: &str) -> FinportResult<&BTreeMap<NaiveDate, f64>> {
        self.prices
            .get(symbol)
            .ok_or_else(|| DataError::UnknownSymbol(symbol.to_string()).into())
    }
}

#[async_trait]
impl PriceProvider for FixedPriceProvider {
    async fn price_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FinportResult<Vec<PricePoint>> {
        let series = self.series_of(symbol)?;
        Ok(series
            .range(start..=end)
            .map(|(&date, &close)| PricePoint { date, close })
            .collect())
    }

    async fn price_at(&self, symbol: &str, date: NaiveDate) -> FinportResult<f64> {
        let series = self.series_of(symbol)?;
        series
            .range(..=date)
            .next_back()
            .map(|(_, &close)| close)
            .ok_or_else(|| {
                DataError::MissingPrice {
                    symbol: symbol.to_string(),
                    date: date.to_string(),
                }
                .into()
            })
    }

    async fn dividend_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FinportResult<Vec<DividendPayment>> {
        Ok(self
            .dividends
            .get(symbol)
            .map(|payments| {
                payments
                    .range(start..=end)
                    .map(|(&date, &amount_per_share)| DividendPayment {
                        date,
                        amount_per_share,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn provider() -> FixedPriceProvider {
        FixedPriceProvider::new().with_series(
            "AAPL",
            [
                (date(2024, 6, 3), 100.0),
                (date(2024, 6, 4), 102.0),
                (date(2024, 6, 7), 99.0),
            ],
        )
    }

    #[tokio::test]
    async fn price_at_exact_date() {
        let price = provider().price_at("AAPL", date(2024, 6, 4)).await.unwrap();
        assert_eq!(price, 102.0);
    }

    #[tokio::test]
    async fn price_at_forward_fills_over_gap() {
        // June 5 and 6 have no bar; the June 4 close applies.
        let price = provider().price_at("AAPL", date(2024, 6, 6)).await.unwrap();
        assert_eq!(price, 102.0);
    }

    #[tokio::test]
    async fn price_before_first_bar_is_missing() {
        let result = provider().price_at("AAPL", date(2024, 6, 1)).await;
        assert!(matches!(
            result,
            Err(crate::error::FinportError::Data(DataError::MissingPrice { .. }))
        ));
    }

    #[tokio::test]
    async fn unknown_symbol_is_an_error() {
        let result = provider().price_at("NOPE", date(2024, 6, 4)).await;
        assert!(matches!(
            result,
            Err(crate::error::FinportError::Data(DataError::UnknownSymbol(_)))
        ));
    }

    #[tokio::test]
    async fn series_respects_window_bounds() {
        let series = provider()
            .price_series("AAPL", date(2024, 6, 4), date(2024, 6, 7))
            .await
            .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].date, date(2024, 6, 4));
        assert_eq!(series[1].date, date(2024, 6, 7));
    }

    #[tokio::test]
    async fn dividends_default_to_empty() {
        let payments = provider()
            .dividend_series("AAPL", date(2024, 1, 1), date(2024, 12, 31))
            .await
            .unwrap();
        assert!(payments.is_empty());
    }
}
