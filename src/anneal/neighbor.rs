use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use strum::{Display, EnumIter};

use crate::{
    error::FinportResult,
    market::provider::PriceProvider,
    portfolio::Portfolio,
};

/// The three rebalancing move classes, drawn with equal probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum MoveKind {
    Buy,
    Sell,
    Exchange,
}

/// One leg of a proposed mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLeg {
    pub symbol: String,
    pub delta_shares: f64,
}

/// An ephemeral proposed mutation: a small set of symbol share deltas,
/// generated fresh each step and discarded after accept/reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMove {
    pub kind: MoveKind,
    pub legs: SmallVec<[TradeLeg; 2]>,
}

impl CandidateMove {
    fn apply_to(&self, portfolio: &Portfolio) -> Portfolio {
        self.legs.iter().fold(portfolio.clone(), |acc, leg| {
            acc.with_share_delta(&leg.symbol, leg.delta_shares)
        })
    }
}

/// Produces one randomized, budget-respecting mutation of a portfolio.
///
/// A move that turns out to be infeasible (selling below zero, or pushing
/// the valuation past the maximum) is discarded and the unchanged input
/// returned; the caller cannot distinguish a rejected move from "candidate
/// equals current state", and treats both as a consumed no-op step.
pub struct NeighborGenerator<'a, P: ?Sized> {
    provider: &'a P,
}

impl<'a, P: PriceProvider + ?Sized> NeighborGenerator<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    pub async fn propose<R: Rng>(
        &self,
        current: &Portfolio,
        max_value: f64,
        rng: &mut R,
    ) -> FinportResult<Portfolio> {
        let mv = self.draw(current, rng).await?;
        match mv {
            Some(mv) => self.apply_guarded(current, &mv, max_value).await,
            None => Ok(current.clone()),
        }
    }

    /// Draws one move uniformly across the three classes. Returns `None`
    /// when the drawn class has no valid move (rejected-by-construction).
    async fn draw<R: Rng>(
        &self,
        current: &Portfolio,
        rng: &mut R,
    ) -> FinportResult<Option<CandidateMove>> {
        match rng.random_range(0..3u32) {
            0 => Ok(draw_buy(current, rng)),
            1 => Ok(draw_sell(current, rng)),
            _ => self.draw_exchange(current, rng).await,
        }
    }

    /// Applies the move and enforces the two guards: no share count may go
    /// below zero, and the revalued candidate must not exceed `max_value`.
    /// A failed guard returns the original portfolio unchanged.
    async fn apply_guarded(
        &self,
        current: &Portfolio,
        mv: &CandidateMove,
        max_value: f64,
    ) -> FinportResult<Portfolio> {
        let candidate = mv.apply_to(current);
        if candidate.shares().values().any(|&n| n < 0.0) {
            return Ok(current.clone());
        }
        let value = candidate
            .value_at(self.provider, candidate.anchor_date())
            .await?;
        if value > max_value {
            return Ok(current.clone());
        }
        Ok(candidate)
    }

    /// Sell one share of one symbol, buy a roughly dollar-neutral amount of
    /// another.
    async fn draw_exchange<R: Rng>(
        &self,
        current: &Portfolio,
        rng: &mut R,
    ) -> FinportResult<Option<CandidateMove>> {
        let symbols: Vec<&str> = current.symbols().collect();
        let n = symbols.len();
        if n < 2 {
            return Ok(None);
        }
        let i = rng.random_range(0..n);
        let j = (i + 1 + rng.random_range(0..n - 1)) % n;
        let (sell_symbol, buy_symbol) = (symbols[i], symbols[j]);

        if current.share_count(sell_symbol) < 1.0 {
            return Ok(None);
        }

        let date = current.anchor_date();
        let sell_price = self.provider.price_at(sell_symbol, date).await?;
        let buy_price = self.provider.price_at(buy_symbol, date).await?;
        let ratio = sell_price / buy_price;

        // Keep the exchange roughly dollar-neutral across price disparities:
        // comparable prices swap 1:1, a cheap sell-candidate buys a fraction,
        // an expensive one buys floor(ratio) whole shares.
        let buy_shares = if 0.5 < ratio && ratio < 2.0 {
            1.0
        } else if ratio <= 0.5 {
            ratio
        } else {
            ratio.floor()
        };

        Ok(Some(CandidateMove {
            kind: MoveKind::Exchange,
            legs: smallvec![
                TradeLeg {
                    symbol: sell_symbol.to_string(),
                    delta_shares: -1.0,
                },
                TradeLeg {
                    symbol: buy_symbol.to_string(),
                    delta_shares: buy_shares,
                },
            ],
        }))
    }
}

fn draw_buy<R: Rng>(current: &Portfolio, rng: &mut R) -> Option<CandidateMove> {
    let symbol = pick_symbol(current, rng)?;
    Some(CandidateMove {
        kind: MoveKind::Buy,
        legs: smallvec![TradeLeg {
            symbol,
            delta_shares: 1.0,
        }],
    })
}

fn draw_sell<R: Rng>(current: &Portfolio, rng: &mut R) -> Option<CandidateMove> {
    let symbol = pick_symbol(current, rng)?;
    if current.share_count(&symbol) < 1.0 {
        // Not enough shares to sell; rejected-by-construction.
        return None;
    }
    Some(CandidateMove {
        kind: MoveKind::Sell,
        legs: smallvec![TradeLeg {
            symbol,
            delta_shares: -1.0,
        }],
    })
}

fn pick_symbol<R: Rng>(current: &Portfolio, rng: &mut R) -> Option<String> {
    let symbols: Vec<&str> = current.symbols().collect();
    if symbols.is_empty() {
        return None;
    }
    Some(symbols[rng.random_range(0..symbols.len())].to_string())
}
