use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use gapsell_core::{Bar, InstrumentCatalog, OptionSide, QuoteSource, StrategyConfig, Tick};
use gapsell_strategy::{ReferenceState, ReferenceStateMachine};

use crate::quotes::{CachingHistoricalQuotes, HistoricalSeriesSource};
use crate::report::{BacktestReport, TradeResult};

/// A trade recorded during replay, before settlement. The entry price is
/// resolved at execution time; intents with no resolvable premium are never
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktestTrade {
    pub symbol: String,
    pub side: OptionSide,
    pub quantity: u32,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
}

/// Replays historical underlying bars through the live decision logic.
///
/// The runner substitutes a caching historical quote source for the live one
/// and pure bookkeeping for order placement; the reference state machine and
/// strike selector are the same code the live loop runs. Each run is
/// self-contained: a fresh runner over the same bars produces the same
/// report.
pub struct BacktestRunner<S> {
    config: Arc<StrategyConfig>,
    catalog: Arc<InstrumentCatalog>,
    quotes: CachingHistoricalQuotes<S>,
}

impl<S: HistoricalSeriesSource> BacktestRunner<S> {
    pub fn new(
        config: Arc<StrategyConfig>,
        catalog: Arc<InstrumentCatalog>,
        series_source: S,
    ) -> Self {
        Self {
            config,
            catalog,
            quotes: CachingHistoricalQuotes::new(series_source),
        }
    }

    /// Replays `bars` in order and settles every recorded trade at the final
    /// bar's timestamp.
    ///
    /// # Errors
    ///
    /// Fails when `bars` is empty, not strictly time-ordered, or the
    /// strategy configuration is invalid.
    pub async fn run(&self, bars: &[Bar]) -> Result<BacktestReport> {
        self.config.validate()?;
        let Some(first) = bars.first() else {
            bail!("backtest requires at least one underlying bar");
        };

        info!(
            bars = bars.len(),
            from = %first.timestamp,
            series = %self.config.symbol_prefix,
            "Backtest loading"
        );

        let state = ReferenceState::seed(&self.config, first.close);
        let mut machine =
            ReferenceStateMachine::new(Arc::clone(&self.config), Arc::clone(&self.catalog), state);

        let mut trades: Vec<BacktestTrade> = Vec::new();
        let mut last_timestamp: Option<DateTime<Utc>> = None;

        info!("Backtest replaying");
        for bar in bars {
            if let Some(previous) = last_timestamp {
                if bar.timestamp <= previous {
                    bail!(
                        "bars must be strictly time-ordered: {} follows {}",
                        bar.timestamp,
                        previous
                    );
                }
            }
            last_timestamp = Some(bar.timestamp);

            let tick = Tick {
                last_price: bar.close,
                timestamp: bar.timestamp,
            };
            let intents = machine.evaluate(&tick, &self.quotes).await;

            for intent in intents {
                let symbol = intent.instrument.trading_symbol.clone();
                match self.quotes.premium_at(&symbol, intent.timestamp).await? {
                    Some(entry_price) => {
                        trades.push(BacktestTrade {
                            symbol,
                            side: intent.side,
                            quantity: intent.quantity,
                            entry_price,
                            entry_time: intent.timestamp,
                        });
                    }
                    None => {
                        warn!(
                            symbol,
                            side = %intent.side,
                            "Entry premium unresolvable at execution time, trade not recorded"
                        );
                    }
                }
            }
        }

        info!(trades = trades.len(), "Backtest reporting");
        let end = last_timestamp.unwrap_or(first.timestamp);
        let mut results = Vec::with_capacity(trades.len());
        for trade in trades {
            // No exit price at replay end means the option expired worthless.
            let exit_price = self
                .quotes
                .premium_at(&trade.symbol, end)
                .await?
                .unwrap_or(Decimal::ZERO);
            results.push(TradeResult::settle(
                trade.symbol,
                trade.side,
                trade.quantity,
                trade.entry_price,
                exit_price,
            ));
        }

        let report = BacktestReport::from_trades(results, bars.len());
        info!(
            total_pnl = %report.total_pnl,
            trades = report.trades.len(),
            win_rate_pct = report.win_rate_pct,
            "Backtest done"
        );
        Ok(report)
    }
}
