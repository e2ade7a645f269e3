use std::time::Duration;

use rand::{SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::{ObjectiveParams, RunRequest, ScheduleParams},
    impl_add_sub_primitive, impl_from_primitive,
    portfolio::{Portfolio, ValuationMode},
};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct StepCount(pub u64);
impl_from_primitive!(StepCount, u64);
impl_add_sub_primitive!(StepCount, u64);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct CheckpointSeq(pub u64);
impl_from_primitive!(CheckpointSeq, u64);
impl_add_sub_primitive!(CheckpointSeq, u64);

/// The full resumable unit of an annealing run.
///
/// Everything a fresh invocation needs to continue the search exactly where
/// the previous one stopped: the current portfolio, temperature, step
/// accounting, and the immutable run parameters. Exactly one
/// [`ChunkRunner`](crate::anneal::ChunkRunner) owns a `SearchState` at a
/// time; chunks are strictly sequential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchState {
    /// Current portfolio, anchored to the evaluation window's end date.
    pub portfolio: Portfolio,

    /// Current annealing temperature. Mutated only at decay boundaries.
    pub temperature: f64,

    /// Immutable temperature schedule.
    pub schedule: ScheduleParams,

    /// Immutable reward coefficients and evaluation window.
    pub objective: ObjectiveParams,

    /// Whether valuation accrues dividends.
    pub valuation_mode: ValuationMode,

    /// Hard upper bound on portfolio valuation at the anchor date.
    pub max_value: f64,

    /// Index symbol for the final beta estimate.
    pub benchmark_symbol: String,

    /// Total steps the whole run is budgeted for.
    pub total_steps_planned: StepCount,

    /// Steps completed across all chunks so far. Monotonically
    /// non-decreasing; every step counts, including rejected and no-op moves.
    pub steps_completed: StepCount,

    /// Per-chunk step quota, immutable across the run.
    pub chunk_step_quota: u64,

    /// Optional per-chunk wall-clock budget.
    pub chunk_time_budget: Option<Duration>,

    /// Wall-clock seconds spent across all chunks. Reporting only; never
    /// used for control decisions.
    pub accumulated_runtime_secs: f64,

    /// Base seed of the search RNG, immutable across the run.
    pub seed: u64,

    /// Number of checkpoints emitted so far. Bumped before each handoff so
    /// the transport can enforce at-most-once delivery per sequence number.
    pub checkpoint_seq: CheckpointSeq,
}

impl SearchState {
    /// Builds the initial state for a run. The portfolio is expected to be
    /// the feasibility-checked bootstrap portfolio.
    pub fn initial(request: &RunRequest, portfolio: Portfolio) -> Self {
        Self {
            portfolio,
            temperature: request.schedule.initial_temperature,
            schedule: request.schedule,
            objective: request.objective.clone(),
            valuation_mode: request.valuation_mode,
            max_value: request.max_value,
            benchmark_symbol: request.benchmark_symbol.clone(),
            total_steps_planned: StepCount(request.total_steps),
            steps_completed: StepCount(0),
            chunk_step_quota: request.chunk_step_quota,
            chunk_time_budget: request.chunk_time_budget,
            accumulated_runtime_secs: 0.0,
            seed: request.seed,
            checkpoint_seq: CheckpointSeq(0),
        }
    }

    pub fn steps_remaining(&self) -> u64 {
        self.total_steps_planned
            .0
            .saturating_sub(self.steps_completed.0)
    }

    pub fn is_complete(&self) -> bool {
        self.steps_completed >= self.total_steps_planned
    }

    /// Deterministic RNG for the upcoming chunk, derived from the immutable
    /// base seed and the checkpoint sequence number. Replaying a chunk from
    /// the same checkpoint reproduces the same draw sequence, so redelivery
    /// is idempotent at the state level.
    pub fn chunk_rng(&self) -> StdRng {
        let stream = self
            .checkpoint_seq
            .0
            .wrapping_mul(0x9E37_79B9_7F4A_7C15);
        StdRng::seed_from_u64(self.seed ^ stream)
    }
}

/// Final summary statistics of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    /// Annualized continuously-compounded growth rate.
    pub r: f64,

    /// Annualized volatility.
    pub sigma: f64,

    pub downside_risk: f64,

    pub upside_risk: f64,

    /// Beta against the benchmark index; `None` when ill-conditioned.
    pub beta: Option<f64>,
}

/// Produced exactly once, when `steps_completed == total_steps_planned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalResult {
    pub portfolio: Portfolio,
    pub summary: RiskSummary,
    pub steps_completed: StepCount,
    pub total_runtime_secs: f64,
}
