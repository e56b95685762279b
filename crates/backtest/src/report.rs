use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use gapsell_core::OptionSide;

/// One settled backtest trade. Every strategy trade is a sell, so profit is
/// `(entry - exit) * quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeResult {
    pub symbol: String,
    pub side: OptionSide,
    pub quantity: u32,
    pub entry_price: Decimal,
    /// Zero when the instrument expired worthless (no exit price resolvable).
    pub exit_price: Decimal,
    pub profit: Decimal,
}

impl TradeResult {
    #[must_use]
    pub fn settle(
        symbol: String,
        side: OptionSide,
        quantity: u32,
        entry_price: Decimal,
        exit_price: Decimal,
    ) -> Self {
        let profit = (entry_price - exit_price) * Decimal::from(quantity);
        Self {
            symbol,
            side,
            quantity,
            entry_price,
            exit_price,
            profit,
        }
    }
}

/// Performance summary of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub trades: Vec<TradeResult>,
    pub total_pnl: Decimal,
    pub winning_trades: usize,
    pub win_rate_pct: f64,
    pub bars_replayed: usize,
}

impl BacktestReport {
    #[must_use]
    pub fn from_trades(trades: Vec<TradeResult>, bars_replayed: usize) -> Self {
        let total_pnl: Decimal = trades.iter().map(|t| t.profit).sum();
        let winning_trades = trades.iter().filter(|t| t.profit > Decimal::ZERO).count();
        #[allow(clippy::cast_precision_loss)]
        let win_rate_pct = if trades.is_empty() {
            0.0
        } else {
            winning_trades as f64 / trades.len() as f64 * 100.0
        };

        Self {
            trades,
            total_pnl,
            winning_trades,
            win_rate_pct,
            bars_replayed,
        }
    }
}
