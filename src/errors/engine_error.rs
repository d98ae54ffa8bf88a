//! Custom error types for the engine

use thiserror::Error;

use crate::types::InstrumentId;

/// Stage at which an arbitrage opportunity failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStage {
    Liquidity,
    Risk,
    Timing,
    Feasibility,
}

impl std::fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Liquidity => "liquidity",
            Self::Risk => "risk",
            Self::Timing => "timing",
            Self::Feasibility => "feasibility",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("feed stale: all {known_instruments} known instruments exceed the staleness budget")]
    FeedStale { known_instruments: usize },

    #[error("sequence gap on {exchange}/{instrument}: expected {expected}, observed {observed}")]
    SequenceGap {
        exchange: String,
        instrument: InstrumentId,
        expected: u64,
        observed: u64,
    },

    #[error("insufficient history for {instrument}: {available} of {required} observations")]
    InsufficientHistory {
        instrument: InstrumentId,
        required: usize,
        available: usize,
    },

    #[error("validation failed at {stage} stage: {reason}")]
    ValidationFailure {
        stage: ValidationStage,
        reason: String,
    },

    #[error("model domain error: {reason}")]
    ModelDomain { reason: String },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("configuration error: {message}")]
    Config { message: String },
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn model_domain(reason: impl Into<String>) -> Self {
        Self::ModelDomain {
            reason: reason.into(),
        }
    }

    pub fn validation(stage: ValidationStage, reason: impl Into<String>) -> Self {
        Self::ValidationFailure {
            stage,
            reason: reason.into(),
        }
    }

    /// Recoverable errors are counted and skipped; only configuration
    /// errors abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
