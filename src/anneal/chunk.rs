use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::info;

use crate::{
    anneal::{SearchStatus, stepper::AnnealingStepper},
    error::FinportResult,
    market::provider::PriceProvider,
    state::SearchState,
};

/// Bounds of one chunk: a step quota and an optional wall-clock deadline.
///
/// The deadline is checked between steps; a step in flight always finishes
/// (it involves provider calls that cannot be meaningfully abandoned
/// half-way). Callers running under a hard invocation limit should place the
/// deadline a serialization margin short of that limit so there is headroom
/// to encode and hand off the checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct ChunkBudget {
    step_quota: u64,
    deadline: Option<Instant>,
}

impl ChunkBudget {
    pub fn new(step_quota: u64) -> Self {
        Self {
            step_quota,
            deadline: None,
        }
    }

    pub fn with_deadline(self, deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    pub fn with_time_budget(self, budget: Duration) -> Self {
        self.with_deadline(Instant::now() + budget)
    }

    /// Budget as configured in the state itself: the per-chunk quota plus
    /// the optional time budget counted from now.
    pub fn for_state(state: &SearchState) -> Self {
        let budget = Self::new(state.chunk_step_quota);
        match state.chunk_time_budget {
            Some(time_budget) => budget.with_time_budget(time_budget),
            None => budget,
        }
    }

    fn is_exhausted(&self, steps_run: u64) -> bool {
        if steps_run >= self.step_quota {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Outcome of one chunk execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReport {
    /// The updated search state, ready to be checkpointed or finalized.
    pub state: SearchState,

    /// `ChunkExhausted` or `Complete`, never `Running`.
    pub status: SearchStatus,

    /// Steps consumed by this chunk.
    pub steps_run: u64,

    /// Reward of the portfolio when the chunk stopped.
    pub final_reward: f64,

    /// Wall-clock time this chunk spent, including the initial reward
    /// evaluation.
    pub elapsed: Duration,
}

impl ChunkReport {
    pub fn more_steps_remain(&self) -> bool {
        self.status.is_chunk_exhausted()
    }
}

/// Runs the stepper for a bounded number of steps or until the time budget
/// is exhausted, whichever comes first.
///
/// Stateless with respect to failure recovery: provider errors propagate and
/// the whole chunk restarts cleanly from the last checkpoint on the next
/// invocation. Never retries internally.
pub struct ChunkRunner<'a, P: ?Sized> {
    provider: &'a P,
}

impl<'a, P: PriceProvider + ?Sized> ChunkRunner<'a, P> {
    pub fn new(provider: &'a P) -> Self {
        Self { provider }
    }

    #[tracing::instrument(
        skip(self, state, budget, rng),
        fields(
            chunk_seq = state.checkpoint_seq.0,
            steps_completed = state.steps_completed.0,
        )
    )]
    pub async fn run<R: Rng>(
        &self,
        state: SearchState,
        budget: &ChunkBudget,
        rng: &mut R,
    ) -> FinportResult<ChunkReport> {
        let started = Instant::now();

        // Running a completed state for zero further steps is valid; it is
        // how a resumed checkpoint proves it lost nothing.
        if state.is_complete() {
            let stepper = AnnealingStepper::new(self.provider, state).await?;
            let final_reward = stepper.current_reward();
            return Ok(ChunkReport {
                state: stepper.into_state(),
                status: SearchStatus::Complete,
                steps_run: 0,
                final_reward,
                elapsed: started.elapsed(),
            });
        }

        let mut stepper = AnnealingStepper::new(self.provider, state).await?;
        let mut steps_run = 0u64;

        while stepper.status().is_running() && !budget.is_exhausted(steps_run) {
            stepper.step(rng).await?;
            steps_run += 1;
        }

        let status = if stepper.status().is_complete() {
            SearchStatus::Complete
        } else {
            SearchStatus::ChunkExhausted
        };
        let final_reward = stepper.current_reward();
        let state = stepper.into_state();

        info!(
            steps_run,
            steps_completed = state.steps_completed.0,
            steps_remaining = state.steps_remaining(),
            temperature = state.temperature,
            reward = final_reward,
            ?status,
            "Chunk finished"
        );

        Ok(ChunkReport {
            state,
            status,
            steps_run,
            final_reward,
            elapsed: started.elapsed(),
        })
    }
}
