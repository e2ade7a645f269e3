use std::{collections::BTreeSet, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::{
    error::{ConfigError, FinportError, FinportResult},
    portfolio::ValuationMode,
};

/// Default per-chunk step quota. Small enough that a chunk plus its
/// serialization handoff fits comfortably inside one bounded invocation.
pub const DEFAULT_CHUNK_STEP_QUOTA: u64 = 2_000;

/// Reward terms that may be switched on per run.
///
/// The growth term `r` is always active; everything else is listed here
/// explicitly. Carrying the active set in the request (instead of inferring
/// it from which weights happen to be non-zero) keeps reward-function
/// variants apart without branching on field presence.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[strum(serialize_all = "snake_case")]
pub enum ObjectiveTerm {
    /// `− λ₁ · sigma`, penalizes fitted volatility.
    Volatility,

    /// `+ λ₂ · entropy`, rewards spreading value across symbols.
    Diversification,

    /// `+ λ₃ · value / max_value`, rewards using the allowed budget.
    BudgetUtilization,

    /// `− λ₄ · downside_risk`, penalizes negative-return excursions.
    DownsideRisk,
}

/// Reward-function coefficients and the evaluation window.
///
/// Immutable across the whole run; checkpointed verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveParams {
    /// Risk-aversion weight λ₁.
    pub lambda_volatility: f64,

    /// Diversification weight λ₂.
    pub lambda_diversification: f64,

    /// Budget-utilization weight λ₃.
    pub lambda_budget: f64,

    /// Downside-risk weight λ₄.
    pub lambda_downside: f64,

    /// Terms that contribute to the reward besides the growth rate.
    pub terms: BTreeSet<ObjectiveTerm>,

    /// First day of the historical evaluation window.
    pub start_date: NaiveDate,

    /// Last day of the historical evaluation window. Also the valuation
    /// anchor date for the budget invariant.
    pub end_date: NaiveDate,
}

impl ObjectiveParams {
    pub fn is_enabled(&self, term: ObjectiveTerm) -> bool {
        self.terms.contains(&term)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.start_date >= self.end_date {
            return Err(ConfigError::InvalidObjective(format!(
                "evaluation window start ({}) must precede end ({})",
                self.start_date, self.end_date
            )));
        }
        for (name, lambda) in [
            ("lambda_volatility", self.lambda_volatility),
            ("lambda_diversification", self.lambda_diversification),
            ("lambda_budget", self.lambda_budget),
            ("lambda_downside", self.lambda_downside),
        ] {
            if !lambda.is_finite() || lambda < 0.0 {
                return Err(ConfigError::InvalidObjective(format!(
                    "{name} must be finite and non-negative, got {lambda}"
                )));
            }
        }
        Ok(())
    }
}

/// Temperature schedule parameters, immutable across the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduleParams {
    /// Starting annealing temperature.
    pub initial_temperature: f64,

    /// Multiplier applied at every decay boundary, strictly in (0, 1).
    pub decay_factor: f64,

    /// Number of completed steps between decay boundaries.
    pub steps_per_decay: u64,
}

impl ScheduleParams {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.initial_temperature.is_finite() || self.initial_temperature <= 0.0 {
            return Err(ConfigError::InvalidSchedule(format!(
                "initial_temperature must be positive, got {}",
                self.initial_temperature
            )));
        }
        if !(0.0 < self.decay_factor && self.decay_factor < 1.0) {
            return Err(ConfigError::InvalidSchedule(format!(
                "decay_factor must lie strictly between 0 and 1, got {}",
                self.decay_factor
            )));
        }
        if self.steps_per_decay == 0 {
            return Err(ConfigError::InvalidSchedule(
                "steps_per_decay must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything needed to start an optimization run.
///
/// Built via [`RunRequestBuilder`]; `build()` validates all fields so a
/// `RunRequest` is well-formed by construction. Feasibility of the initial
/// one-share-each portfolio is checked separately at bootstrap, since it
/// needs market data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Symbols eligible for the portfolio.
    pub symbols: Vec<String>,

    /// Index symbol used for the final beta estimate.
    pub benchmark_symbol: String,

    /// Hard upper bound on portfolio valuation at the anchor date.
    pub max_value: f64,

    /// Total number of annealing steps for the whole run.
    pub total_steps: u64,

    /// Maximum number of steps a single chunk may consume.
    pub chunk_step_quota: u64,

    /// Optional wall-clock budget per chunk. Callers running under a hard
    /// invocation limit should pass the limit minus a serialization margin.
    pub chunk_time_budget: Option<Duration>,

    /// Temperature schedule.
    pub schedule: ScheduleParams,

    /// Reward coefficients and evaluation window.
    pub objective: ObjectiveParams,

    /// Whether portfolio valuation accrues dividends.
    pub valuation_mode: ValuationMode,

    /// Base seed for the search RNG. A fixed seed makes the whole chunked
    /// run replayable.
    pub seed: u64,
}

pub struct RunRequestBuilder {
    symbols: Vec<String>,
    benchmark_symbol: String,
    max_value: Option<f64>,
    total_steps: u64,
    chunk_step_quota: u64,
    chunk_time_budget: Option<Duration>,
    initial_temperature: f64,
    decay_factor: f64,
    steps_per_decay: u64,
    lambda_volatility: f64,
    lambda_diversification: f64,
    lambda_budget: f64,
    lambda_downside: f64,
    terms: BTreeSet<ObjectiveTerm>,
    window: Option<(NaiveDate, NaiveDate)>,
    with_dividends: bool,
    seed: u64,
}

impl RunRequestBuilder {
    pub fn new() -> Self {
        Self {
            symbols: Vec::new(),
            benchmark_symbol: "DJI".to_string(),
            max_value: None,
            total_steps: 10_000,
            chunk_step_quota: DEFAULT_CHUNK_STEP_QUOTA,
            chunk_time_budget: None,
            initial_temperature: 1_000.0,
            decay_factor: 0.75,
            steps_per_decay: 100,
            lambda_volatility: 0.3,
            lambda_diversification: 0.01,
            lambda_budget: 1.0,
            lambda_downside: 0.0,
            terms: BTreeSet::from([
                ObjectiveTerm::Volatility,
                ObjectiveTerm::Diversification,
                ObjectiveTerm::BudgetUtilization,
            ]),
            window: None,
            with_dividends: true,
            seed: 0,
        }
    }

    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_benchmark_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.benchmark_symbol = symbol.into();
        self
    }

    pub fn with_max_value(mut self, max_value: f64) -> Self {
        self.max_value = Some(max_value);
        self
    }

    pub fn with_window(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.window = Some((start, end));
        self
    }

    pub fn with_total_steps(mut self, total_steps: u64) -> Self {
        self.total_steps = total_steps;
        self
    }

    pub fn with_chunk_step_quota(mut self, quota: u64) -> Self {
        self.chunk_step_quota = quota;
        self
    }

    pub fn with_chunk_time_budget(mut self, budget: Duration) -> Self {
        self.chunk_time_budget = Some(budget);
        self
    }

    pub fn with_initial_temperature(mut self, t: f64) -> Self {
        self.initial_temperature = t;
        self
    }

    pub fn with_decay_factor(mut self, factor: f64) -> Self {
        self.decay_factor = factor;
        self
    }

    pub fn with_steps_per_decay(mut self, steps: u64) -> Self {
        self.steps_per_decay = steps;
        self
    }

    pub fn with_lambda_volatility(mut self, lambda: f64) -> Self {
        self.lambda_volatility = lambda;
        self
    }

    pub fn with_lambda_diversification(mut self, lambda: f64) -> Self {
        self.lambda_diversification = lambda;
        self
    }

    pub fn with_lambda_budget(mut self, lambda: f64) -> Self {
        self.lambda_budget = lambda;
        self
    }

    /// Enables the downside-risk penalty with the given weight λ₄.
    pub fn with_downside_risk(mut self, lambda: f64) -> Self {
        self.lambda_downside = lambda;
        self.terms.insert(ObjectiveTerm::DownsideRisk);
        self
    }

    pub fn with_terms(mut self, terms: impl IntoIterator<Item = ObjectiveTerm>) -> Self {
        self.terms = terms.into_iter().collect();
        self
    }

    pub fn without_dividends(mut self) -> Self {
        self.with_dividends = false;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn build(self) -> FinportResult<RunRequest> {
        if self.symbols.is_empty() {
            return Err(ConfigError::EmptySymbolUniverse.into());
        }
        let max_value = self
            .max_value
            .ok_or_else(|| missing_field("max_value"))?;
        if !max_value.is_finite() || max_value <= 0.0 {
            return Err(ConfigError::InvalidObjective(format!(
                "max_value must be positive, got {max_value}"
            ))
            .into());
        }
        let (start_date, end_date) = self.window.ok_or_else(|| missing_field("window"))?;
        if self.total_steps == 0 {
            return Err(ConfigError::InvalidSchedule(
                "total_steps must be positive".to_string(),
            )
            .into());
        }
        if self.chunk_step_quota == 0 {
            return Err(ConfigError::InvalidSchedule(
                "chunk_step_quota must be positive".to_string(),
            )
            .into());
        }

        let schedule = ScheduleParams {
            initial_temperature: self.initial_temperature,
            decay_factor: self.decay_factor,
            steps_per_decay: self.steps_per_decay,
        };
        schedule.validate()?;

        let objective = ObjectiveParams {
            lambda_volatility: self.lambda_volatility,
            lambda_diversification: self.lambda_diversification,
            lambda_budget: self.lambda_budget,
            lambda_downside: self.lambda_downside,
            terms: self.terms,
            start_date,
            end_date,
        };
        objective.validate()?;

        Ok(RunRequest {
            symbols: self.symbols,
            benchmark_symbol: self.benchmark_symbol,
            max_value,
            total_steps: self.total_steps,
            chunk_step_quota: self.chunk_step_quota,
            chunk_time_budget: self.chunk_time_budget,
            schedule,
            objective,
            valuation_mode: if self.with_dividends {
                ValuationMode::WithDividends
            } else {
                ValuationMode::PriceOnly
            },
            seed: self.seed,
        })
    }
}

impl Default for RunRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_field(s: &str) -> FinportError {
    ConfigError::MissingField(format!("Field `{s}` is required to build `RunRequest`")).into()
}
