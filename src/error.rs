use thiserror::Error;

pub type FinportResult<T> = Result<T, FinportError>;

#[derive(Debug, Error)]
pub enum FinportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Anneal(#[from] AnnealError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    System(#[from] SystemError),
}

/// Errors raised while validating or building a run request.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid schedule parameter: {0}")]
    InvalidSchedule(String),

    #[error("Invalid objective parameter: {0}")]
    InvalidObjective(String),

    #[error(
        "Infeasible initial configuration: one share of each symbol is worth {value}, which exceeds the maximum portfolio value {max_value}"
    )]
    Infeasible { value: f64, max_value: f64 },

    #[error("Empty symbol universe")]
    EmptySymbolUniverse,
}

/// Errors related to market data retrieval and availability.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Connection to price provider failed: {0}")]
    Connection(String),

    #[error("No price data for symbol '{symbol}' on or before {date}")]
    MissingPrice { symbol: String, date: String },

    #[error("Empty price series for symbol '{symbol}' in window {start}..{end}")]
    EmptySeries {
        symbol: String,
        start: String,
        end: String,
    },

    #[error("Unknown symbol: '{0}'")]
    UnknownSymbol(String),
}

/// Errors related to the annealing state machine itself.
#[derive(Debug, Error)]
pub enum AnnealError {
    #[error("Search is already complete. No further chunks may run.")]
    AlreadyComplete,

    #[error("Invalid search state: {0}")]
    InvalidState(String),

    #[error("Too few samples to fit the value series: {0}")]
    DegenerateSeries(String),
}

/// Errors related to checkpoint encoding, decoding, and schema versioning.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Failed to encode checkpoint")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode checkpoint")]
    Decode(#[source] serde_json::Error),

    #[error("Unsupported checkpoint schema version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Errors raised by the external continuation transport or result sink.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to submit continuation: {0}")]
    Continuation(String),

    #[error("Failed to deliver terminal result: {0}")]
    Delivery(String),
}

/// Errors related to internal invariants and bugs.
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Missing internal field: {0}")]
    MissingField(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
}
