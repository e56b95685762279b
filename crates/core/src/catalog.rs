use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::EngineError;
use crate::events::OptionSide;

/// Options segment code in the broker instrument dump.
pub const OPTIONS_SEGMENT: &str = "NFO-OPT";

/// One tradable option contract from the broker's instrument list. Never
/// mutated after load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_token: u32,
    pub trading_symbol: String,
    pub strike: Decimal,
    pub option_type: OptionSide,
    pub segment: String,
    pub lot_size: u32,
}

/// Immutable snapshot of the tradable instruments for one expiry series,
/// rebuilt once per session (or once per backtest run).
///
/// Construction derives the series strike spacing from the two lowest CE
/// strikes; a series where that spacing cannot be derived, or is zero, is
/// unusable and the engine refuses to start.
#[derive(Debug, Clone)]
pub struct InstrumentCatalog {
    series_prefix: String,
    instruments: Vec<Instrument>,
    strike_difference: Decimal,
}

impl InstrumentCatalog {
    /// Builds a catalog for `series_prefix` from a full instrument list.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` when no instruments match the
    /// prefix, fewer than two CE strikes exist, or the derived strike
    /// spacing is not positive.
    pub fn new(series_prefix: &str, instruments: Vec<Instrument>) -> Result<Self, EngineError> {
        let instruments: Vec<Instrument> = instruments
            .into_iter()
            .filter(|i| i.trading_symbol.starts_with(series_prefix))
            .collect();

        if instruments.is_empty() {
            return Err(EngineError::Configuration(format!(
                "no instruments found for series {series_prefix}"
            )));
        }

        let strike_difference = Self::derive_strike_difference(&instruments)?;

        info!(
            series = series_prefix,
            count = instruments.len(),
            strike_difference = %strike_difference,
            "Instrument catalog loaded"
        );

        Ok(Self {
            series_prefix: series_prefix.to_string(),
            instruments,
            strike_difference,
        })
    }

    /// Absolute difference between the two lowest CE strikes in the series.
    fn derive_strike_difference(instruments: &[Instrument]) -> Result<Decimal, EngineError> {
        let mut ce_strikes: Vec<Decimal> = instruments
            .iter()
            .filter(|i| i.option_type == OptionSide::CE)
            .map(|i| i.strike)
            .collect();
        ce_strikes.sort();

        if ce_strikes.len() < 2 {
            return Err(EngineError::Configuration(
                "not enough CE strikes to derive strike spacing".to_string(),
            ));
        }

        let difference = (ce_strikes[1] - ce_strikes[0]).abs();
        if difference <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "derived strike spacing is zero".to_string(),
            ));
        }
        Ok(difference)
    }

    #[must_use]
    pub fn series_prefix(&self) -> &str {
        &self.series_prefix
    }

    #[must_use]
    pub const fn strike_difference(&self) -> Decimal {
        self.strike_difference
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    #[must_use]
    pub fn by_symbol(&self, trading_symbol: &str) -> Option<&Instrument> {
        self.instruments
            .iter()
            .find(|i| i.trading_symbol == trading_symbol)
    }

    /// Candidates for strike selection: instruments of `side` in the options
    /// segment of this series.
    pub fn candidates(&self, side: OptionSide) -> impl Iterator<Item = &Instrument> {
        self.instruments
            .iter()
            .filter(move |i| i.option_type == side && i.segment == OPTIONS_SEGMENT)
    }
}
