use async_trait::async_trait;
use tracing::info;

use crate::{
    anneal::{ChunkBudget, ChunkRunner},
    checkpoint::CheckpointCodec,
    config::RunRequest,
    error::{ConfigError, FinportResult},
    estimate,
    market::provider::PriceProvider,
    portfolio::Portfolio,
    state::{CheckpointSeq, RiskSummary, SearchState, TerminalResult},
};

/// Hands finished artifacts to the outside world: encoded continuations to
/// whatever schedules the next invocation, and the terminal result to
/// whoever is waiting for it.
///
/// Continuation submission is fire-and-forget from the orchestrator's point
/// of view; the transport is responsible for at-most-once delivery per
/// sequence number. The sequence number is passed alongside the payload so
/// the transport can deduplicate without decoding it.
#[async_trait]
pub trait CheckpointTransport: Send + Sync {
    async fn submit_continuation(
        &self,
        seq: CheckpointSeq,
        payload: String,
    ) -> FinportResult<()>;

    async fn deliver_result(&self, result: &TerminalResult) -> FinportResult<()>;
}

/// What became of a chunk: either the search continues through a checkpoint
/// handoff, or it finished and the terminal result went out.
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkDisposition {
    Continued { state: SearchState },
    Finished(TerminalResult),
}

impl ChunkDisposition {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}

/// Drives a whole search across invocation boundaries.
///
/// Each invocation calls exactly one of [`bootstrap`](Self::bootstrap) +
/// [`run_chunk`](Self::run_chunk) (fresh run) or [`resume`](Self::resume)
/// (continuation). The orchestrator never retries a chunk: a failed
/// invocation leaves the last checkpoint untouched and the next delivery of
/// the same payload replays the chunk deterministically.
pub struct ContinuationOrchestrator<'a, P: ?Sized, T: ?Sized> {
    provider: &'a P,
    transport: &'a T,
}

impl<'a, P, T> ContinuationOrchestrator<'a, P, T>
where
    P: PriceProvider + ?Sized,
    T: CheckpointTransport + ?Sized,
{
    pub fn new(provider: &'a P, transport: &'a T) -> Self {
        Self {
            provider,
            transport,
        }
    }

    /// Builds the initial state for a fresh run: one share of each symbol,
    /// rejected up front when that portfolio already busts the budget.
    pub async fn bootstrap(&self, request: &RunRequest) -> FinportResult<SearchState> {
        let portfolio =
            Portfolio::one_share_each(request.symbols.iter().cloned(), request.objective.end_date);
        let value = portfolio.value_at(self.provider, portfolio.anchor_date()).await?;
        if value > request.max_value {
            return Err(ConfigError::Infeasible {
                value,
                max_value: request.max_value,
            }
            .into());
        }

        info!(
            symbols = request.symbols.len(),
            bootstrap_value = value,
            max_value = request.max_value,
            total_steps = request.total_steps,
            "Bootstrapped search"
        );
        Ok(SearchState::initial(request, portfolio))
    }

    /// Decodes a delivered checkpoint and runs the next chunk.
    pub async fn resume(&self, payload: &str) -> FinportResult<ChunkDisposition> {
        let state = CheckpointCodec::decode(payload)?;
        self.run_chunk(state).await
    }

    /// Runs one chunk, then either hands the continuation to the transport
    /// or finalizes and delivers the terminal result.
    #[tracing::instrument(
        skip(self, state),
        fields(
            chunk_seq = state.checkpoint_seq.0,
            steps_completed = state.steps_completed.0,
        )
    )]
    pub async fn run_chunk(&self, state: SearchState) -> FinportResult<ChunkDisposition> {
        let budget = ChunkBudget::for_state(&state);
        let mut rng = state.chunk_rng();
        let report = ChunkRunner::new(self.provider)
            .run(state, &budget, &mut rng)
            .await?;

        let more_steps_remain = report.more_steps_remain();
        let mut state = report.state;
        state.accumulated_runtime_secs += report.elapsed.as_secs_f64();

        if more_steps_remain {
            // Bump before encoding so the next chunk draws from a fresh RNG
            // stream and the transport sees a strictly increasing sequence.
            state.checkpoint_seq += 1;
            let payload = CheckpointCodec::encode(&state)?;
            self.transport
                .submit_continuation(state.checkpoint_seq, payload)
                .await?;
            info!(
                seq = state.checkpoint_seq.0,
                steps_completed = state.steps_completed.0,
                steps_remaining = state.steps_remaining(),
                "Continuation handed off"
            );
            return Ok(ChunkDisposition::Continued { state });
        }

        let result = self.finalize(state).await?;
        self.transport.deliver_result(&result).await?;
        Ok(ChunkDisposition::Finished(result))
    }

    /// Convenience driver for single-process use: bootstraps, then runs
    /// chunks back-to-back until the terminal result is out. Checkpoints
    /// still flow through the transport, so the run remains resumable if the
    /// loop dies between chunks.
    pub async fn run_to_completion(
        &self,
        request: &RunRequest,
    ) -> FinportResult<TerminalResult> {
        let mut state = self.bootstrap(request).await?;
        loop {
            match self.run_chunk(state).await? {
                ChunkDisposition::Continued { state: next } => state = next,
                ChunkDisposition::Finished(result) => return Ok(result),
            }
        }
    }

    /// Full risk summary of the winning portfolio, including beta against
    /// the benchmark index.
    async fn finalize(&self, state: SearchState) -> FinportResult<TerminalResult> {
        let series = state
            .portfolio
            .value_series(
                self.provider,
                state.objective.start_date,
                state.objective.end_date,
                state.valuation_mode,
            )
            .await?;
        let samples: Vec<_> = series.iter().map(|p| (p.date, p.total_value)).collect();

        let (r, sigma) = estimate::fit_growth_and_volatility(&samples)?;
        let downside_risk = estimate::downside_risk(&samples, 0.0)?;
        let upside_risk = estimate::upside_risk(&samples, 0.0)?;

        let benchmark: Vec<_> = self
            .provider
            .price_series(
                &state.benchmark_symbol,
                state.objective.start_date,
                state.objective.end_date,
            )
            .await?
            .into_iter()
            .map(|p| (p.date, p.close))
            .collect();
        let beta = estimate::beta(&samples, &benchmark);

        let result = TerminalResult {
            portfolio: state.portfolio,
            summary: RiskSummary {
                r,
                sigma,
                downside_risk,
                upside_risk,
                beta,
            },
            steps_completed: state.steps_completed,
            total_runtime_secs: state.accumulated_runtime_secs,
        };
        info!(
            r,
            sigma,
            ?beta,
            steps_completed = result.steps_completed.0,
            runtime_secs = result.total_runtime_secs,
            "Search complete"
        );
        Ok(result)
    }
}

/// In-memory transport that records every handoff. Enforces the at-most-once
/// contract: a duplicate sequence number is a delivery error.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    checkpoints: std::sync::Mutex<Vec<(CheckpointSeq, String)>>,
    results: std::sync::Mutex<Vec<TerminalResult>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkpoints(&self) -> Vec<(CheckpointSeq, String)> {
        lock_ignoring_poison(&self.checkpoints).clone()
    }

    pub fn results(&self) -> Vec<TerminalResult> {
        lock_ignoring_poison(&self.results).clone()
    }
}

/// The recorded `Vec`s stay consistent even if a panicking test poisoned the
/// lock, so the poison flag carries no information here.
fn lock_ignoring_poison<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[async_trait]
impl CheckpointTransport for RecordingTransport {
    async fn submit_continuation(
        &self,
        seq: CheckpointSeq,
        payload: String,
    ) -> FinportResult<()> {
        let mut checkpoints = lock_ignoring_poison(&self.checkpoints);
        if checkpoints.iter().any(|&(s, _)| s == seq) {
            return Err(crate::error::TransportError::Continuation(format!(
                "duplicate checkpoint seq {}",
                seq.0
            ))
            .into());
        }
        checkpoints.push((seq, payload));
        Ok(())
    }

    async fn deliver_result(&self, result: &TerminalResult) -> FinportResult<()> {
        let mut results = lock_ignoring_poison(&self.results);
        if !results.is_empty() {
            return Err(crate::error::TransportError::Delivery(
                "terminal result already delivered".to_string(),
            )
            .into());
        }
        results.push(result.clone());
        Ok(())
    }
}
