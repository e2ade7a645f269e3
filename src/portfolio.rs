use std::collections::BTreeMap;

use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    error::{DataError, FinportResult},
    market::provider::{DividendPayment, PricePoint, PriceProvider},
};

/// Whether portfolio valuation accrues dividend cash on top of stock value.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default,
)]
#[strum(serialize_all = "snake_case")]
pub enum ValuationMode {
    /// Stock value only.
    PriceOnly,

    /// Stock value plus cumulative per-share cash dividends.
    #[default]
    WithDividends,
}

/// Portfolio value on one trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationPoint {
    pub date: NaiveDate,

    /// Market value of the held shares.
    pub stock_value: f64,

    /// `stock_value` plus accrued dividends up to `date`. Equals
    /// `stock_value` under [`ValuationMode::PriceOnly`].
    pub total_value: f64,
}

/// A mapping from symbol to a non-negative share count, anchored to the
/// valuation date used for the budget invariant.
///
/// Share counts are real numbers; exchange moves may produce fractional
/// holdings even though practical trades are integral. The type itself does
/// not enforce the maximum-value invariant — that guard lives at the point a
/// mutation is accepted, where market data is available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    shares: BTreeMap<String, f64>,
    anchor_date: NaiveDate,
}

impl Portfolio {
    pub fn new(
        shares: impl IntoIterator<Item = (String, f64)>,
        anchor_date: NaiveDate,
    ) -> Self {
        Self {
            shares: shares.into_iter().collect(),
            anchor_date,
        }
    }

    /// The bootstrap portfolio: one share of each symbol in the universe.
    pub fn one_share_each<I, S>(symbols: I, anchor_date: NaiveDate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            symbols.into_iter().map(|s| (s.into(), 1.0)),
            anchor_date,
        )
    }

    pub fn anchor_date(&self) -> NaiveDate {
        self.anchor_date
    }

    pub fn shares(&self) -> &BTreeMap<String, f64> {
        &self.shares
    }

    pub fn share_count(&self, symbol: &str) -> f64 {
        self.shares.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.shares.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Returns a copy with `delta` shares added to `symbol`. The symbol stays
    /// in the map even at zero shares so it remains a buy candidate.
    pub fn with_share_delta(&self, symbol: &str, delta: f64) -> Self {
        let mut next = self.clone();
        *next.shares.entry(symbol.to_string()).or_insert(0.0) += delta;
        next
    }

    /// Per-symbol dollar value at `date`. Fetches all symbols concurrently.
    pub async fn allocation_at<P>(
        &self,
        provider: &P,
        date: NaiveDate,
    ) -> FinportResult<BTreeMap<String, f64>>
    where
        P: PriceProvider + ?Sized,
    {
        let tasks = self.shares.iter().map(|(symbol, &nb_shares)| async move {
            let price = provider.price_at(symbol, date).await?;
            Ok::<_, crate::error::FinportError>((symbol.clone(), nb_shares * price))
        });
        join_all(tasks).await.into_iter().collect()
    }

    /// Total dollar value at `date`.
    pub async fn value_at<P>(&self, provider: &P, date: NaiveDate) -> FinportResult<f64>
    where
        P: PriceProvider + ?Sized,
    {
        Ok(self.allocation_at(provider, date).await?.values().sum())
    }

    /// Daily valuation series over `[start, end]`.
    ///
    /// Symbol series are fetched concurrently and joined onto the union of
    /// their trading days, forward-filling each symbol's latest close across
    /// gaps. Leading dates where some symbol has no bar yet are dropped.
    pub async fn value_series<P>(
        &self,
        provider: &P,
        start: NaiveDate,
        end: NaiveDate,
        mode: ValuationMode,
    ) -> FinportResult<Vec<ValuationPoint>>
    where
        P: PriceProvider + ?Sized,
    {
        let price_tasks = self.shares.keys().map(|symbol| async move {
            let series = provider.price_series(symbol, start, end).await?;
            if series.is_empty() {
                return Err(DataError::EmptySeries {
                    symbol: symbol.clone(),
                    start: start.to_string(),
                    end: end.to_string(),
                }
                .into());
            }
            Ok::<_, crate::error::FinportError>((symbol.as_str(), series))
        });
        let priced: Vec<(&str, Vec<PricePoint>)> =
            join_all(price_tasks).await.into_iter().collect::<FinportResult<_>>()?;

        let dividends = match mode {
            ValuationMode::PriceOnly => Vec::new(),
            ValuationMode::WithDividends => {
                let tasks = self.shares.keys().map(|symbol| async move {
                    let payments = provider.dividend_series(symbol, start, end).await?;
                    Ok::<_, crate::error::FinportError>((symbol.as_str(), payments))
                });
                join_all(tasks).await.into_iter().collect::<FinportResult<_>>()?
            }
        };

        Ok(join_valuations(&self.shares, priced, dividends))
    }
}

/// Synchronous join of the fetched per-symbol series into one valuation
/// series. Split out of `value_series` so the arithmetic is testable without
/// a provider.
fn join_valuations(
    shares: &BTreeMap<String, f64>,
    priced: Vec<(&str, Vec<PricePoint>)>,
    dividends: Vec<(&str, Vec<DividendPayment>)>,
) -> Vec<ValuationPoint> {
    let mut dates: Vec<NaiveDate> = priced
        .iter()
        .flat_map(|(_, series)| series.iter().map(|p| p.date))
        .collect();
    dates.sort_unstable();
    dates.dedup();

    let price_maps: Vec<(&str, BTreeMap<NaiveDate, f64>)> = priced
        .into_iter()
        .map(|(symbol, series)| {
            (symbol, series.into_iter().map(|p| (p.date, p.close)).collect())
        })
        .collect();
    let dividend_maps: Vec<(&str, BTreeMap<NaiveDate, f64>)> = dividends
        .into_iter()
        .map(|(symbol, payments)| {
            (
                symbol,
                payments
                    .into_iter()
                    .map(|d| (d.date, d.amount_per_share))
                    .collect(),
            )
        })
        .collect();

    let mut points = Vec::with_capacity(dates.len());
    'dates: for date in dates {
        let mut stock_value = 0.0;
        for (symbol, prices) in &price_maps {
            let Some((_, close)) = prices.range(..=date).next_back() else {
                // Before this symbol's first bar; the date axis starts once
                // every symbol is priced.
                continue 'dates;
            };
            stock_value += shares[*symbol] * close;
        }

        let mut accrued = 0.0;
        for (symbol, payments) in &dividend_maps {
            let paid: f64 = payments.range(..=date).map(|(_, amount)| amount).sum();
            accrued += shares[*symbol] * paid;
        }

        points.push(ValuationPoint {
            date,
            stock_value,
            total_value: stock_value + accrued,
        });
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FixedPriceProvider;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn two_symbol_provider() -> FixedPriceProvider {
        FixedPriceProvider::new()
            .with_series(
                "A",
                [
                    (date(2024, 6, 3), 100.0),
                    (date(2024, 6, 4), 110.0),
                    (date(2024, 6, 5), 120.0),
                ],
            )
            .with_series(
                "B",
                [(date(2024, 6, 3), 50.0), (date(2024, 6, 5), 40.0)],
            )
    }

    #[tokio::test]
    async fn value_at_sums_holdings() {
        let port = Portfolio::new(
            [("A".to_string(), 2.0), ("B".to_string(), 1.0)],
            date(2024, 6, 3),
        );
        let value = port
            .value_at(&two_symbol_provider(), date(2024, 6, 3))
            .await
            .unwrap();
        assert_eq!(value, 2.0 * 100.0 + 50.0);
    }

    #[tokio::test]
    async fn value_series_forward_fills_gaps() {
        let port = Portfolio::one_share_each(["A", "B"], date(2024, 6, 5));
        let series = port
            .value_series(
                &two_symbol_provider(),
                date(2024, 6, 3),
                date(2024, 6, 5),
                ValuationMode::PriceOnly,
            )
            .await
            .unwrap();

        // B has no bar on June 4; its June 3 close carries forward.
        assert_eq!(series.len(), 3);
        assert_eq!(series[0].stock_value, 150.0);
        assert_eq!(series[1].stock_value, 160.0);
        assert_eq!(series[2].stock_value, 160.0);
    }

    #[tokio::test]
    async fn dividends_accrue_cumulatively() {
        let provider = FixedPriceProvider::new()
            .with_flat_price("A", 100.0, date(2024, 6, 3), date(2024, 6, 7))
            .with_dividends("A", [(date(2024, 6, 4), 1.0), (date(2024, 6, 6), 2.0)]);
        let port = Portfolio::new([("A".to_string(), 3.0)], date(2024, 6, 7));

        let series = port
            .value_series(
                &provider,
                date(2024, 6, 3),
                date(2024, 6, 7),
                ValuationMode::WithDividends,
            )
            .await
            .unwrap();

        assert_eq!(series[0].total_value, 300.0);
        assert_eq!(series[1].total_value, 303.0); // 3 shares x $1
        assert_eq!(series[4].total_value, 309.0); // plus 3 shares x $2
        // Stock value never includes the cash leg.
        assert!(series.iter().all(|p| p.stock_value == 300.0));
    }

    #[tokio::test]
    async fn price_only_ignores_dividends() {
        let provider = FixedPriceProvider::new()
            .with_flat_price("A", 100.0, date(2024, 6, 3), date(2024, 6, 5))
            .with_dividends("A", [(date(2024, 6, 4), 5.0)]);
        let port = Portfolio::new([("A".to_string(), 1.0)], date(2024, 6, 5));

        let series = port
            .value_series(
                &provider,
                date(2024, 6, 3),
                date(2024, 6, 5),
                ValuationMode::PriceOnly,
            )
            .await
            .unwrap();
        assert!(series.iter().all(|p| p.total_value == p.stock_value));
    }

    #[tokio::test]
    async fn empty_window_is_an_error() {
        let port = Portfolio::one_share_each(["A"], date(2024, 6, 5));
        let result = port
            .value_series(
                &two_symbol_provider(),
                date(2023, 1, 1),
                date(2023, 1, 31),
                ValuationMode::PriceOnly,
            )
            .await;
        assert!(matches!(
            result,
            Err(crate::error::FinportError::Data(DataError::EmptySeries { .. }))
        ));
    }

    #[test]
    fn share_delta_keeps_symbol_at_zero() {
        let port = Portfolio::one_share_each(["A"], date(2024, 6, 5));
        let sold_out = port.with_share_delta("A", -1.0);
        assert_eq!(sold_out.share_count("A"), 0.0);
        assert_eq!(sold_out.len(), 1);
    }
}
