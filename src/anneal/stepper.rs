use rand::Rng;
use tracing::info;

use crate::{
    anneal::{SearchStatus, neighbor::NeighborGenerator, reward::RewardEvaluator},
    error::{AnnealError, FinportResult},
    market::provider::PriceProvider,
    state::SearchState,
};

/// What one step did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// The candidate replaced the current portfolio.
    pub accepted: bool,

    /// The proposed move was rejected-by-construction (or produced no valid
    /// candidate) and nothing was evaluated. Still consumes one step.
    pub noop: bool,

    /// Reward of the current portfolio after the step.
    pub reward: f64,
}

/// Applies one generate/evaluate/accept-or-reject cycle at a time and
/// updates the temperature on schedule.
///
/// Owns the [`SearchState`] for the duration of a chunk; the initial reward
/// is evaluated once at construction and cached across steps. The acceptance
/// rule is the Metropolis criterion: a better candidate is always taken, a
/// worse one with probability `exp(Δreward / temperature)` against a fresh
/// uniform draw. When `Δreward` is very negative relative to the temperature
/// the exponential underflows to zero, which is exactly the intended
/// "effectively never" and not an error.
pub struct AnnealingStepper<'a, P: ?Sized> {
    provider: &'a P,
    state: SearchState,
    current_reward: f64,
}

impl<'a, P: PriceProvider + ?Sized> AnnealingStepper<'a, P> {
    pub async fn new(provider: &'a P, state: SearchState) -> FinportResult<Self> {
        let current_reward = RewardEvaluator::new(provider)
            .evaluate(
                &state.portfolio,
                &state.objective,
                state.max_value,
                state.valuation_mode,
            )
            .await?;
        Ok(Self {
            provider,
            state,
            current_reward,
        })
    }

    pub fn state(&self) -> &SearchState {
        &self.state
    }

    pub fn current_reward(&self) -> f64 {
        self.current_reward
    }

    pub fn status(&self) -> SearchStatus {
        if self.state.is_complete() {
            SearchStatus::Complete
        } else {
            SearchStatus::Running
        }
    }

    pub fn into_state(self) -> SearchState {
        self.state
    }

    pub async fn step<R: Rng>(&mut self, rng: &mut R) -> FinportResult<StepReport> {
        if self.state.is_complete() {
            return Err(AnnealError::AlreadyComplete.into());
        }

        let candidate = NeighborGenerator::new(self.provider)
            .propose(&self.state.portfolio, self.state.max_value, rng)
            .await?;

        // A discarded move comes back as the unchanged portfolio. It still
        // consumes a step: exploring the dead-end cost wall-clock and API
        // calls, and the budget accounts for that.
        let noop = candidate == self.state.portfolio;
        let mut accepted = false;

        if !noop {
            let candidate_reward = RewardEvaluator::new(self.provider)
                .evaluate(
                    &candidate,
                    &self.state.objective,
                    self.state.max_value,
                    self.state.valuation_mode,
                )
                .await?;

            accepted = if candidate_reward > self.current_reward {
                true
            } else {
                let delta = candidate_reward - self.current_reward;
                let probability = (delta / self.state.temperature).exp();
                rng.random::<f64>() < probability
            };

            if accepted {
                self.state.portfolio = candidate;
                self.current_reward = candidate_reward;
            }
        }

        self.state.steps_completed += 1;
        self.decay_on_schedule();

        Ok(StepReport {
            accepted,
            noop,
            reward: self.current_reward,
        })
    }

    /// Multiplies the temperature by the decay factor whenever the completed
    /// step count hits a positive multiple of `steps_per_decay`. Driven by
    /// the persisted counter, so chunk splits cannot shift decay boundaries.
    fn decay_on_schedule(&mut self) {
        let completed = self.state.steps_completed.0;
        if completed % self.state.schedule.steps_per_decay == 0 {
            self.state.temperature *= self.state.schedule.decay_factor;
            info!(
                step = completed,
                temperature = self.state.temperature,
                reward = self.current_reward,
                holdings = ?self.state.portfolio.shares(),
                "Temperature decayed"
            );
        }
    }
}
