use tracing::debug;

use crate::{
    config::{ObjectiveParams, ObjectiveTerm},
    error::FinportResult,
    estimate,
    market::provider::PriceProvider,
    portfolio::{Portfolio, ValuationMode},
};

/// Scores a candidate portfolio over the historical evaluation window.
///
/// Pure given the market data it reads: identical inputs against identical
/// price series always produce the identical reward, which is what makes
/// fixed-seed replay of a chunk deterministic. Higher is better.
///
/// Reward = `r − λ₁·sigma + λ₂·entropy + λ₃·utilization − λ₄·downside_risk`,
/// with each term after `r` contributing only when enabled in
/// [`ObjectiveParams::terms`].
pub struct RewardEvaluator<'a, P: ?Sized> {
    provider: &'a P,
}

impl<'a, P: PriceProvider + ?Sized> RewardEvaluator<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    pub async fn evaluate(
        &self,
        portfolio: &Portfolio,
        objective: &ObjectiveParams,
        max_value: f64,
        mode: ValuationMode,
    ) -> FinportResult<f64> {
        let series = portfolio
            .value_series(self.provider, objective.start_date, objective.end_date, mode)
            .await?;
        let samples: Vec<_> = series.iter().map(|p| (p.date, p.total_value)).collect();

        let (r, sigma) = estimate::fit_growth_and_volatility(&samples)?;
        let mut reward = r;

        if objective.is_enabled(ObjectiveTerm::Volatility) {
            reward -= objective.lambda_volatility * sigma;
        }

        // Both allocation-based terms share one end-of-window revaluation;
        // skip the per-symbol fetches entirely when neither is enabled.
        if objective.is_enabled(ObjectiveTerm::Diversification)
            || objective.is_enabled(ObjectiveTerm::BudgetUtilization)
        {
            let allocation = portfolio
                .allocation_at(self.provider, objective.end_date)
                .await?;

            if objective.is_enabled(ObjectiveTerm::Diversification) {
                let entropy =
                    normalized_entropy(allocation.values().copied(), portfolio.len());
                reward += objective.lambda_diversification * entropy;
            }

            if objective.is_enabled(ObjectiveTerm::BudgetUtilization) {
                let total_value: f64 = allocation.values().sum();
                reward += objective.lambda_budget * total_value / max_value;
            }
        }

        if objective.is_enabled(ObjectiveTerm::DownsideRisk) {
            let downside = estimate::downside_risk(&samples, 0.0)?;
            reward -= objective.lambda_downside * downside;
        }

        debug!(reward, r, sigma, "Evaluated candidate portfolio");
        Ok(reward)
    }
}

/// Shannon entropy of the dollar allocation, normalized by `ln(n)` so it
/// lies in `[0, 1]`.
///
/// Symbols with zero (or negative) value contribute zero, never `NaN`. A
/// universe of fewer than two symbols, or a worthless portfolio, has
/// entropy 0 by convention.
pub fn normalized_entropy(values: impl Iterator<Item = f64>, n_symbols: usize) -> f64 {
    if n_symbols < 2 {
        return 0.0;
    }
    let values: Vec<f64> = values.filter(|&v| v > 0.0).collect();
    let total: f64 = values.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let entropy: f64 = values
        .iter()
        .map(|&v| {
            let p = v / total;
            -p * p.ln()
        })
        .sum();
    entropy / (n_symbols as f64).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RunRequestBuilder,
        market::FixedPriceProvider,
    };
    use chrono::NaiveDate;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    // ============================================================================================
    // Entropy
    // ============================================================================================

    #[test]
    fn equal_split_has_maximum_entropy() {
        let e = normalized_entropy([50.0, 50.0].into_iter(), 2);
        assert!((e - 1.0).abs() < 1e-12, "entropy = {e}");
    }

    #[test]
    fn concentrated_allocation_has_zero_entropy() {
        let e = normalized_entropy([100.0, 0.0].into_iter(), 2);
        assert_eq!(e, 0.0);
    }

    #[test]
    fn single_symbol_universe_has_zero_entropy() {
        assert_eq!(normalized_entropy([100.0].into_iter(), 1), 0.0);
    }

    #[test]
    fn worthless_portfolio_has_zero_entropy() {
        assert_eq!(normalized_entropy([0.0, 0.0].into_iter(), 2), 0.0);
    }

    #[test]
    fn four_way_equal_split_is_also_maximal() {
        let e = normalized_entropy([25.0, 25.0, 25.0, 25.0].into_iter(), 4);
        assert!((e - 1.0).abs() < 1e-12);
    }

    #[test]
    fn entropy_is_never_nan() {
        for values in [vec![], vec![0.0], vec![1e-300, 1.0], vec![f64::MIN_POSITIVE; 3]] {
            let e = normalized_entropy(values.into_iter(), 3);
            assert!(!e.is_nan());
        }
    }

    // ============================================================================================
    // Evaluator
    // ============================================================================================

    fn growth_provider() -> FixedPriceProvider {
        let start = date(2024, 1, 1);
        // A grows 20%/quarter-ish, B is flat.
        let a_series = (0..90).map(|i| {
            let d = start + chrono::Duration::days(i);
            (d, 100.0 * (1.0 + 0.002 * i as f64))
        });
        FixedPriceProvider::new()
            .with_series("A", a_series)
            .with_flat_price("B", 100.0, start, date(2024, 3, 30))
    }

    fn objective() -> crate::config::ObjectiveParams {
        RunRequestBuilder::new()
            .with_symbols(["A", "B"])
            .with_max_value(1_000.0)
            .with_window(date(2024, 1, 1), date(2024, 3, 30))
            .build()
            .unwrap()
            .objective
    }

    #[tokio::test]
    async fn evaluation_is_deterministic() {
        let provider = growth_provider();
        let evaluator = RewardEvaluator::new(&provider);
        let port = Portfolio::one_share_each(["A", "B"], date(2024, 3, 30));
        let objective = objective();

        let first = evaluator
            .evaluate(&port, &objective, 1_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        let second = evaluator
            .evaluate(&port, &objective, 1_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn growth_heavy_portfolio_scores_higher() {
        let provider = growth_provider();
        let evaluator = RewardEvaluator::new(&provider);
        let objective = objective();

        let growthy = Portfolio::new(
            [("A".to_string(), 3.0), ("B".to_string(), 1.0)],
            date(2024, 3, 30),
        );
        let flat = Portfolio::new(
            [("A".to_string(), 0.0), ("B".to_string(), 4.0)],
            date(2024, 3, 30),
        );

        let growthy_reward = evaluator
            .evaluate(&growthy, &objective, 10_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        let flat_reward = evaluator
            .evaluate(&flat, &objective, 10_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        assert!(
            growthy_reward > flat_reward,
            "growth {growthy_reward} should beat flat {flat_reward}"
        );
    }

    #[tokio::test]
    async fn allocation_is_not_fetched_when_no_term_needs_it() {
        use std::sync::atomic::{AtomicU32, Ordering};

        use async_trait::async_trait;

        use crate::market::provider::{DividendPayment, PricePoint, PriceProvider};

        /// Delegates to an inner provider, counting `price_at` calls.
        struct CountingProvider {
            inner: FixedPriceProvider,
            price_at_calls: AtomicU32,
        }

        #[async_trait]
        impl PriceProvider for CountingProvider {
            async fn price_series(
                &self,
                symbol: &str,
                start: NaiveDate,
                end: NaiveDate,
            ) -> crate::error::FinportResult<Vec<PricePoint>> {
                self.inner.price_series(symbol, start, end).await
            }

            async fn price_at(
                &self,
                symbol: &str,
                date: NaiveDate,
            ) -> crate::error::FinportResult<f64> {
                self.price_at_calls.fetch_add(1, Ordering::SeqCst);
                self.inner.price_at(symbol, date).await
            }

            async fn dividend_series(
                &self,
                symbol: &str,
                start: NaiveDate,
                end: NaiveDate,
            ) -> crate::error::FinportResult<Vec<DividendPayment>> {
                self.inner.dividend_series(symbol, start, end).await
            }
        }

        let provider = CountingProvider {
            inner: growth_provider(),
            price_at_calls: AtomicU32::new(0),
        };
        let evaluator = RewardEvaluator::new(&provider);
        let port = Portfolio::one_share_each(["A", "B"], date(2024, 3, 30));
        let objective = RunRequestBuilder::new()
            .with_symbols(["A", "B"])
            .with_max_value(1_000.0)
            .with_window(date(2024, 1, 1), date(2024, 3, 30))
            .with_terms([ObjectiveTerm::Volatility])
            .build()
            .unwrap()
            .objective;

        evaluator
            .evaluate(&port, &objective, 1_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        assert_eq!(provider.price_at_calls.load(Ordering::SeqCst), 0);

        // Enabling an allocation-based term brings the fetches back.
        let objective = RunRequestBuilder::new()
            .with_symbols(["A", "B"])
            .with_max_value(1_000.0)
            .with_window(date(2024, 1, 1), date(2024, 3, 30))
            .with_terms([ObjectiveTerm::Volatility, ObjectiveTerm::BudgetUtilization])
            .build()
            .unwrap()
            .objective;
        evaluator
            .evaluate(&port, &objective, 1_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        assert!(provider.price_at_calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn downside_term_only_counts_when_enabled() {
        let start = date(2024, 1, 1);
        // Sawtooth series with real drawdowns.
        let series = (0..60).map(|i| {
            let d = start + chrono::Duration::days(i);
            (d, 100.0 + 10.0 * ((i % 4) as f64) - 5.0 * ((i % 3) as f64))
        });
        let provider = FixedPriceProvider::new()
            .with_series("A", series)
            .with_flat_price("B", 100.0, start, date(2024, 2, 29));
        let evaluator = RewardEvaluator::new(&provider);
        let port = Portfolio::one_share_each(["A", "B"], date(2024, 2, 29));

        let base_objective = RunRequestBuilder::new()
            .with_symbols(["A", "B"])
            .with_max_value(1_000.0)
            .with_window(date(2024, 1, 1), date(2024, 2, 29))
            .build()
            .unwrap()
            .objective;
        let with_downside = RunRequestBuilder::new()
            .with_symbols(["A", "B"])
            .with_max_value(1_000.0)
            .with_window(date(2024, 1, 1), date(2024, 2, 29))
            .with_downside_risk(0.5)
            .build()
            .unwrap()
            .objective;

        let without = evaluator
            .evaluate(&port, &base_objective, 1_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        let with = evaluator
            .evaluate(&port, &with_downside, 1_000.0, ValuationMode::PriceOnly)
            .await
            .unwrap();
        assert!(with < without, "downside penalty should lower the reward");
    }
}
