use rust_decimal::Decimal;
use thiserror::Error;

use crate::events::OptionSide;

/// Failure taxonomy for the decision engine.
///
/// Only `Configuration` is fatal; the rest are recoverable at the tick level
/// and are logged and skipped by the evaluation loop.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("{side} sell multiplier {multiplier} breached threshold {threshold}")]
    RiskBreach {
        side: OptionSide,
        multiplier: i64,
        threshold: i64,
    },

    #[error("no eligible {side} instrument near strike {target_strike}")]
    NoEligibleInstrument {
        side: OptionSide,
        target_strike: Decimal,
    },

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] anyhow::Error),
}
