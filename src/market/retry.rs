use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::warn;

use crate::{
    error::{DataError, FinportError, FinportResult},
    market::provider::{DividendPayment, PricePoint, PriceProvider},
};

/// Decorator that retries transient connectivity failures of an inner
/// [`PriceProvider`] with exponential backoff.
///
/// Only [`DataError::Connection`] is retried; every other error (unknown
/// symbol, missing price) is permanent and propagates on the first attempt.
/// The annealing loop never sees a transient failure unless all attempts
/// are exhausted.
#[derive(Debug, Clone)]
pub struct RetryingProvider<P> {
    inner: P,
    max_attempts: u32,
    base_delay: Duration,
}

impl<P> RetryingProvider<P> {
    pub fn new(inner: P, max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// 3 attempts, 250ms base delay.
    pub fn with_defaults(inner: P) -> Self {
        Self::new(inner, 3, Duration::from_millis(250))
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    async fn retrying<T, F, Fut>(&self, what: &str, mut call: F) -> FinportResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = FinportResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(FinportError::Data(DataError::Connection(msg)))
                    if attempt < self.max_attempts =>
                {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        %what,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Transient provider failure, backing off before retry"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl<P: PriceProvider> PriceProvider for RetryingProvider<P> {
    async fn price_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FinportResult<Vec<PricePoint>> {
        self.retrying("price_series", || self.inner.price_series(symbol, start, end))
            .await
    }

    async fn price_at(&self, symbol: &str, date: NaiveDate) -> FinportResult<f64> {
        self.retrying("price_at", || self.inner.price_at(symbol, date))
            .await
    }

    async fn dividend_series(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> FinportResult<Vec<DividendPayment>> {
        self.retrying("dividend_series", || {
            self.inner.dividend_series(symbol, start, end)
        })
        .await
    }
}
