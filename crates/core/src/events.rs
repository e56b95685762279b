use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::Instrument;

/// A single underlying-index price update, pushed by the live transport or
/// iterated by the backtester.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tick {
    pub last_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// One historical OHLC candle for an instrument. Close is the price used for
/// premium resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionSide {
    /// Put option. Sold when the index moves up past the PE gap.
    PE,
    /// Call option. Sold when the index moves down past the CE gap.
    CE,
}

impl std::fmt::Display for OptionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PE => write!(f, "PE"),
            Self::CE => write!(f, "CE"),
        }
    }
}

/// Decision produced by one evaluation step. Consumed immediately by the
/// trade executor; never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeIntent {
    pub side: OptionSide,
    pub instrument: Instrument,
    pub quantity: u32,
    /// Index price at decision time.
    pub reference_price: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Broker-facing order parameters. All strategy orders are market sells; the
/// fields mirror what the order API requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub quantity: u32,
    pub transaction_type: String,
    pub order_type: String,
    pub product: String,
    pub exchange: String,
    pub tag: String,
}

/// A persisted order, owned by the ledger. Created on successful placement;
/// only the completion flag is ever updated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub order_id: String,
    pub symbol: String,
    pub transaction_type: String,
    pub quantity: u32,
    /// None for market orders.
    pub price: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
}
