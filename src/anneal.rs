use serde::{Deserialize, Serialize};

pub mod chunk;
pub mod neighbor;
pub mod reward;
pub mod stepper;

pub use chunk::{ChunkBudget, ChunkReport, ChunkRunner};
pub use neighbor::{CandidateMove, MoveKind, NeighborGenerator, TradeLeg};
pub use reward::RewardEvaluator;
pub use stepper::{AnnealingStepper, StepReport};

/// Lifecycle status of the annealing search.
///
/// The search follows a finite state machine spanning chunk boundaries.
///
/// ```md
/// Current State  (context)                        | Event              | Next State     | Notes
/// ------------------------------------------------|--------------------|----------------|----------------------------------------
/// `Running`      (quota left, steps left)         | step               | Running        | Continue within chunk
/// `Running`      (quota or deadline hit)          | chunk ends         | ChunkExhausted | Checkpoint emitted, fresh invocation
/// `Running`      (steps_completed == planned)     | step               | Complete       | Terminal; result computed once
/// `ChunkExhausted`                                | next invocation    | Running        | Same SearchState, continued
/// ```
///
/// `Complete` is terminal. `ChunkExhausted` is only ever observed between
/// invocations; within a chunk the stepper is always `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStatus {
    /// Steps are being consumed within the current chunk.
    Running,

    /// The chunk's step quota or wall-clock deadline was reached with steps
    /// still remaining. Triggers checkpoint emission.
    ChunkExhausted,

    /// Every planned step has been consumed. Terminal.
    Complete,
}

impl SearchStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_chunk_exhausted(&self) -> bool {
        matches!(self, Self::ChunkExhausted)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}
