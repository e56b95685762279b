use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub kite: KiteConfig,
    pub strategy: StrategyConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KiteConfig {
    pub api_url: String,
    pub ws_url: String,
    pub api_key: String,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub orders_file: String,
}

/// Immutable strategy parameters. Loaded once at start; never mutated.
///
/// Price-distance fields are in index points. `pe_*` parameters govern the
/// put side (triggered by upward index moves), `ce_*` the call side
/// (triggered by downward moves).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Option series identifier, e.g. "NIFTY25807".
    pub symbol_prefix: String,
    /// Underlying index quote symbol, e.g. "NSE:NIFTY 50".
    pub index_symbol: String,

    /// Upward move (points) that triggers a PE sell.
    pub pe_gap: Decimal,
    /// Downward move (points) that triggers a CE sell.
    pub ce_gap: Decimal,
    /// Favorable downward move that resets the PE reference.
    pub pe_reset_gap: Decimal,
    /// Favorable upward move that resets the CE reference.
    pub ce_reset_gap: Decimal,
    /// Initial strike distance below spot for PE selection.
    pub pe_symbol_gap: Decimal,
    /// Initial strike distance above spot for CE selection.
    pub ce_symbol_gap: Decimal,

    /// Base PE quantity; total = quantity * multiplier.
    pub pe_quantity: u32,
    /// Base CE quantity; total = quantity * multiplier.
    pub ce_quantity: u32,

    /// Initial PE reference. Zero means seed from the live price.
    pub pe_start_point: Decimal,
    /// Initial CE reference. Zero means seed from the live price.
    pub ce_start_point: Decimal,

    /// Premium floor: instruments quoting below this are skipped.
    pub min_price_to_sell: Decimal,
    /// Hard stop on the position-scaling multiplier.
    pub sell_multiplier_threshold: i64,
    /// Points subtracted from the strike gap when the premium is too low,
    /// normally the lot size.
    pub strike_step_fallback: Decimal,

    pub exchange: String,
    pub transaction_type: String,
    pub order_type: String,
    pub product_type: String,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            symbol_prefix: "NIFTY25807".to_string(),
            index_symbol: "NSE:NIFTY 50".to_string(),
            pe_gap: Decimal::from(20),
            ce_gap: Decimal::from(20),
            pe_reset_gap: Decimal::from(30),
            ce_reset_gap: Decimal::from(30),
            pe_symbol_gap: Decimal::from(200),
            ce_symbol_gap: Decimal::from(200),
            pe_quantity: 75,
            ce_quantity: 75,
            pe_start_point: Decimal::ZERO,
            ce_start_point: Decimal::ZERO,
            min_price_to_sell: Decimal::from(15),
            sell_multiplier_threshold: 5,
            strike_step_fallback: Decimal::from(75),
            exchange: "NFO".to_string(),
            transaction_type: "SELL".to_string(),
            order_type: "MARKET".to_string(),
            product_type: "NRML".to_string(),
        }
    }
}

impl StrategyConfig {
    /// Checks the parameters the engine cannot run without.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Configuration` for non-positive gaps, steps,
    /// quantities, or multiplier threshold.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.symbol_prefix.is_empty() {
            return Err(EngineError::Configuration(
                "symbol_prefix must not be empty".to_string(),
            ));
        }
        if self.pe_gap <= Decimal::ZERO || self.ce_gap <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "pe_gap and ce_gap must be positive".to_string(),
            ));
        }
        if self.strike_step_fallback <= Decimal::ZERO {
            return Err(EngineError::Configuration(
                "strike_step_fallback must be positive".to_string(),
            ));
        }
        if self.pe_quantity == 0 || self.ce_quantity == 0 {
            return Err(EngineError::Configuration(
                "quantities must be positive".to_string(),
            ));
        }
        if self.sell_multiplier_threshold < 1 {
            return Err(EngineError::Configuration(
                "sell_multiplier_threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            kite: KiteConfig {
                api_url: "https://api.kite.trade".to_string(),
                ws_url: "wss://ws.kite.trade".to_string(),
                api_key: String::new(),
                access_token: String::new(),
            },
            strategy: StrategyConfig::default(),
            ledger: LedgerConfig {
                orders_file: "artifacts/orders_data.json".to_string(),
            },
        }
    }
}
