pub mod anneal;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod estimate;
mod macros;
pub mod market;
pub mod orchestrator;
pub mod portfolio;
pub mod state;

pub use anneal::{
    AnnealingStepper, ChunkBudget, ChunkReport, ChunkRunner, NeighborGenerator,
    RewardEvaluator, SearchStatus,
};
pub use checkpoint::{CHECKPOINT_SCHEMA_VERSION, CheckpointCodec, CheckpointEnvelope};
pub use config::{
    ObjectiveParams, ObjectiveTerm, RunRequest, RunRequestBuilder, ScheduleParams,
};
pub use error::{FinportError, FinportResult};
pub use market::{FixedPriceProvider, PriceProvider, RetryingProvider};
pub use orchestrator::{
    CheckpointTransport, ChunkDisposition, ContinuationOrchestrator, RecordingTransport,
};
pub use portfolio::{Portfolio, ValuationMode, ValuationPoint};
pub use state::{CheckpointSeq, RiskSummary, SearchState, StepCount, TerminalResult};
