use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use gapsell_core::{
    EngineError, InstrumentCatalog, OptionSide, QuoteSource, StrategyConfig, Tick, TradeIntent,
};

use crate::selector::{SelectionOutcome, StrikeSelector};

/// The two floating reference prices and their reset flags.
///
/// Outside of resets, `pe_last_value` only increases and `ce_last_value`
/// only decreases. A reset moves a value toward the current price but never
/// past it. The state is an explicit owned struct so the engine is testable
/// without a live broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceState {
    pub pe_last_value: Decimal,
    pub ce_last_value: Decimal,
    pub pe_reset_armed: bool,
    pub ce_reset_armed: bool,
}

impl ReferenceState {
    /// Seeds each reference from the configured start point, falling back to
    /// the live/first quote of the underlying when the start point is zero.
    #[must_use]
    pub fn seed(config: &StrategyConfig, live_price: Decimal) -> Self {
        let pe_last_value = if config.pe_start_point == Decimal::ZERO {
            debug!(price = %live_price, "PE start point is 0, seeding from live price");
            live_price
        } else {
            config.pe_start_point
        };
        let ce_last_value = if config.ce_start_point == Decimal::ZERO {
            debug!(price = %live_price, "CE start point is 0, seeding from live price");
            live_price
        } else {
            config.ce_start_point
        };

        info!(
            pe_start = %pe_last_value,
            ce_start = %ce_last_value,
            "Reference values seeded"
        );

        Self {
            pe_last_value,
            ce_last_value,
            pe_reset_armed: false,
            ce_reset_armed: false,
        }
    }
}

/// Dual-sided gap-triggered decision engine.
///
/// Each tick is evaluated fully (PE branch, CE branch, reset pass) before
/// the next is accepted; the caller serializes ticks through one consumer.
/// A tick can legally produce both a PE and a CE intent.
pub struct ReferenceStateMachine {
    config: Arc<StrategyConfig>,
    selector: StrikeSelector,
    state: ReferenceState,
}

impl ReferenceStateMachine {
    #[must_use]
    pub fn new(
        config: Arc<StrategyConfig>,
        catalog: Arc<InstrumentCatalog>,
        state: ReferenceState,
    ) -> Self {
        Self {
            config,
            selector: StrikeSelector::new(catalog),
            state,
        }
    }

    #[must_use]
    pub const fn state(&self) -> &ReferenceState {
        &self.state
    }

    /// Evaluates one tick and returns the trades to place.
    ///
    /// The reference advance happens as soon as the gap is crossed and is
    /// not rolled back when no tradable instrument is found; a skipped trade
    /// still consumes the gap. Collaborator failures are logged and skip the
    /// branch; they never abort evaluation.
    pub async fn evaluate(&mut self, tick: &Tick, quotes: &dyn QuoteSource) -> Vec<TradeIntent> {
        let mut intents = Vec::new();

        if let Some(intent) = self.evaluate_side(OptionSide::PE, tick, quotes).await {
            intents.push(intent);
        }
        if let Some(intent) = self.evaluate_side(OptionSide::CE, tick, quotes).await {
            intents.push(intent);
        }
        self.reset_pass(tick.last_price);

        intents
    }

    async fn evaluate_side(
        &mut self,
        side: OptionSide,
        tick: &Tick,
        quotes: &dyn QuoteSource,
    ) -> Option<TradeIntent> {
        let price = tick.last_price;
        let (reference, gap, symbol_gap, base_quantity) = match side {
            OptionSide::PE => (
                self.state.pe_last_value,
                self.config.pe_gap,
                self.config.pe_symbol_gap,
                self.config.pe_quantity,
            ),
            OptionSide::CE => (
                self.state.ce_last_value,
                self.config.ce_gap,
                self.config.ce_symbol_gap,
                self.config.ce_quantity,
            ),
        };

        // PE watches upward moves, CE downward. Anything else is a stable
        // market for that side.
        let raw_diff = match side {
            OptionSide::PE => price - reference,
            OptionSide::CE => reference - price,
        };
        if raw_diff <= Decimal::ZERO {
            self.log_stable(price);
            return None;
        }

        // Whole-unit rounding before the threshold comparison.
        let diff = raw_diff.round();
        if diff <= gap {
            return None;
        }

        let multiplier = (diff / gap).trunc().to_i64().unwrap_or(0);
        if multiplier > self.config.sell_multiplier_threshold {
            let error = EngineError::RiskBreach {
                side,
                multiplier,
                threshold: self.config.sell_multiplier_threshold,
            };
            warn!(
                %error,
                pe_reference = %self.state.pe_last_value,
                ce_reference = %self.state.ce_last_value,
                price = %price,
                "Sell multiplier breached threshold, skipping trade"
            );
            return None;
        }
        let quantity = u32::try_from(multiplier).ok()? * base_quantity;

        // Advance the reference immediately; the gap is consumed whether or
        // not a tradable instrument turns up below.
        let advance = gap * Decimal::from(multiplier);
        match side {
            OptionSide::PE => self.state.pe_last_value += advance,
            OptionSide::CE => self.state.ce_last_value -= advance,
        }

        let outcome = self
            .selector
            .select_tradable(
                side,
                price,
                symbol_gap,
                quotes,
                tick.timestamp,
                self.config.min_price_to_sell,
                self.config.strike_step_fallback,
            )
            .await;

        match outcome {
            SelectionOutcome::Selected {
                instrument,
                premium,
            } => {
                info!(
                    %side,
                    symbol = %instrument.trading_symbol,
                    quantity,
                    multiplier,
                    premium = %premium,
                    price = %price,
                    pe_reference = %self.state.pe_last_value,
                    ce_reference = %self.state.ce_last_value,
                    "Sell signal"
                );
                match side {
                    OptionSide::PE => self.state.pe_reset_armed = true,
                    OptionSide::CE => self.state.ce_reset_armed = true,
                }
                Some(TradeIntent {
                    side,
                    instrument,
                    quantity,
                    reference_price: price,
                    timestamp: tick.timestamp,
                })
            }
            SelectionOutcome::NoInstrument { gap } => {
                warn!(
                    %side,
                    gap = %gap,
                    multiplier,
                    pe_reference = %self.state.pe_last_value,
                    ce_reference = %self.state.ce_last_value,
                    "No suitable instrument, trade skipped"
                );
                None
            }
            SelectionOutcome::Exhausted => {
                warn!(
                    %side,
                    multiplier,
                    pe_reference = %self.state.pe_last_value,
                    ce_reference = %self.state.ce_last_value,
                    "Premium floor never met, trade skipped"
                );
                None
            }
        }
    }

    /// Pulls a reference back toward the price after a favorable move.
    ///
    /// The armed flag is not cleared when a reset fires, so a reset keeps
    /// firing on every tick while the condition holds.
    fn reset_pass(&mut self, price: Decimal) {
        if self.state.pe_reset_armed
            && (self.state.pe_last_value - price) > self.config.pe_reset_gap
        {
            let new_value = price + self.config.pe_reset_gap;
            info!(
                from = %self.state.pe_last_value,
                to = %new_value,
                "Resetting PE reference"
            );
            self.state.pe_last_value = new_value;
        }

        if self.state.ce_reset_armed
            && (price - self.state.ce_last_value) > self.config.ce_reset_gap
        {
            let new_value = price - self.config.ce_reset_gap;
            info!(
                from = %self.state.ce_last_value,
                to = %new_value,
                "Resetting CE reference"
            );
            self.state.ce_last_value = new_value;
        }
    }

    fn log_stable(&self, price: Decimal) {
        debug!(
            series = %self.config.symbol_prefix,
            pe_reference = %self.state.pe_last_value,
            ce_reference = %self.state.ce_last_value,
            price = %price,
            pe_gap = %self.config.pe_gap,
            ce_gap = %self.config.ce_gap,
            "Market under control"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use gapsell_core::{Instrument, OPTIONS_SEGMENT};
    use rust_decimal_macros::dec;

    /// Quotes every symbol at a fixed premium.
    struct FlatQuotes(Decimal);

    #[async_trait]
    impl QuoteSource for FlatQuotes {
        async fn premium(&self, _symbol: &str) -> Result<Decimal> {
            Ok(self.0)
        }
    }

    /// Fails every lookup, as a dead collaborator would.
    struct DeadQuotes;

    #[async_trait]
    impl QuoteSource for DeadQuotes {
        async fn premium(&self, symbol: &str) -> Result<Decimal> {
            anyhow::bail!("quote service down for {symbol}")
        }
    }

    fn catalog() -> Arc<InstrumentCatalog> {
        let mut instruments = Vec::new();
        for strike in (23000..=26000).step_by(50) {
            for side in [OptionSide::PE, OptionSide::CE] {
                instruments.push(Instrument {
                    instrument_token: u32::try_from(strike).unwrap(),
                    trading_symbol: format!("NIFTY25807{strike}{side}"),
                    strike: Decimal::from(strike),
                    option_type: side,
                    segment: OPTIONS_SEGMENT.to_string(),
                    lot_size: 75,
                });
            }
        }
        Arc::new(InstrumentCatalog::new("NIFTY25807", instruments).unwrap())
    }

    fn config() -> StrategyConfig {
        StrategyConfig {
            pe_gap: dec!(25),
            ce_gap: dec!(25),
            pe_reset_gap: dec!(30),
            ce_reset_gap: dec!(30),
            pe_symbol_gap: dec!(200),
            ce_symbol_gap: dec!(200),
            pe_quantity: 75,
            ce_quantity: 75,
            sell_multiplier_threshold: 3,
            strike_step_fallback: dec!(50),
            min_price_to_sell: dec!(15),
            ..StrategyConfig::default()
        }
    }

    fn machine_at(pe: Decimal, ce: Decimal, config: StrategyConfig) -> ReferenceStateMachine {
        let state = ReferenceState {
            pe_last_value: pe,
            ce_last_value: ce,
            pe_reset_armed: false,
            ce_reset_armed: false,
        };
        ReferenceStateMachine::new(Arc::new(config), catalog(), state)
    }

    fn tick(price: Decimal) -> Tick {
        Tick {
            last_price: price,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn seeds_from_live_price_when_start_point_is_zero() {
        let config = StrategyConfig::default();
        let state = ReferenceState::seed(&config, dec!(24512.35));
        assert_eq!(state.pe_last_value, dec!(24512.35));
        assert_eq!(state.ce_last_value, dec!(24512.35));
        assert!(!state.pe_reset_armed);
        assert!(!state.ce_reset_armed);
    }

    #[test]
    fn seeds_from_configured_start_points() {
        let config = StrategyConfig {
            pe_start_point: dec!(24400),
            ce_start_point: dec!(24600),
            ..StrategyConfig::default()
        };
        let state = ReferenceState::seed(&config, dec!(24500));
        assert_eq!(state.pe_last_value, dec!(24400));
        assert_eq!(state.ce_last_value, dec!(24600));
    }

    #[tokio::test]
    async fn multiplier_law() {
        // diff = 60, gap = 25 => multiplier 2, reference moves to 24550.
        let mut machine = machine_at(dec!(24500), dec!(24500), config());
        let intents = machine
            .evaluate(&tick(dec!(24560)), &FlatQuotes(dec!(40)))
            .await;

        assert_eq!(machine.state().pe_last_value, dec!(24550));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, OptionSide::PE);
        assert_eq!(intents[0].quantity, 150);
        assert_eq!(intents[0].reference_price, dec!(24560));
    }

    #[tokio::test]
    async fn move_within_gap_is_ignored() {
        let mut machine = machine_at(dec!(24500), dec!(24500), config());
        let intents = machine
            .evaluate(&tick(dec!(24520)), &FlatQuotes(dec!(40)))
            .await;

        assert!(intents.is_empty());
        assert_eq!(machine.state().pe_last_value, dec!(24500));
        assert_eq!(machine.state().ce_last_value, dec!(24500));
    }

    #[tokio::test]
    async fn breach_law_leaves_state_untouched() {
        // diff = 100, gap = 25 => multiplier 4 > threshold 3: hard stop.
        let mut machine = machine_at(dec!(24500), dec!(24500), config());
        let intents = machine
            .evaluate(&tick(dec!(24600)), &FlatQuotes(dec!(40)))
            .await;

        assert!(intents.is_empty());
        assert_eq!(machine.state().pe_last_value, dec!(24500));
        assert!(!machine.state().pe_reset_armed);
    }

    #[tokio::test]
    async fn ce_branch_is_symmetric() {
        let mut machine = machine_at(dec!(24500), dec!(24500), config());
        let intents = machine
            .evaluate(&tick(dec!(24440)), &FlatQuotes(dec!(40)))
            .await;

        assert_eq!(machine.state().ce_last_value, dec!(24450));
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, OptionSide::CE);
        // CE strike sits above the price.
        assert!(intents[0].instrument.strike > dec!(24440));
    }

    #[tokio::test]
    async fn one_tick_can_trigger_both_sides() {
        let config = StrategyConfig {
            sell_multiplier_threshold: 10,
            ..config()
        };
        let mut machine = machine_at(dec!(24400), dec!(24700), config);
        let intents = machine
            .evaluate(&tick(dec!(24550)), &FlatQuotes(dec!(40)))
            .await;

        let sides: Vec<OptionSide> = intents.iter().map(|i| i.side).collect();
        assert_eq!(sides, vec![OptionSide::PE, OptionSide::CE]);
    }

    #[tokio::test]
    async fn references_are_monotonic_without_resets() {
        // Dead quotes keep the reset flags disarmed (no trade ever fires),
        // so only the gap-crossing advances move the references.
        let mut machine = machine_at(dec!(24500), dec!(24500), config());

        let mut last_pe = machine.state().pe_last_value;
        let mut last_ce = machine.state().ce_last_value;
        for price in [24530, 24480, 24555, 24410, 24575, 24390] {
            machine
                .evaluate(&tick(Decimal::from(price)), &DeadQuotes)
                .await;
            assert!(machine.state().pe_last_value >= last_pe);
            assert!(machine.state().ce_last_value <= last_ce);
            last_pe = machine.state().pe_last_value;
            last_ce = machine.state().ce_last_value;
        }
    }

    #[tokio::test]
    async fn reset_law() {
        let mut machine = machine_at(dec!(24550), dec!(24000), config());
        machine.state.pe_reset_armed = true;

        let intents = machine
            .evaluate(&tick(dec!(24500)), &FlatQuotes(dec!(40)))
            .await;

        assert!(intents.is_empty());
        assert_eq!(machine.state().pe_last_value, dec!(24530));
    }

    #[tokio::test]
    async fn reset_does_not_fire_unarmed() {
        let mut machine = machine_at(dec!(24550), dec!(24000), config());
        machine
            .evaluate(&tick(dec!(24500)), &FlatQuotes(dec!(40)))
            .await;

        assert_eq!(machine.state().pe_last_value, dec!(24550));
    }

    #[tokio::test]
    async fn reset_fires_on_consecutive_ticks_while_armed() {
        // The armed flag is never cleared, so the reset keeps tracking the
        // price down tick after tick.
        let mut machine = machine_at(dec!(24550), dec!(24000), config());
        machine.state.pe_reset_armed = true;

        machine
            .evaluate(&tick(dec!(24500)), &FlatQuotes(dec!(40)))
            .await;
        assert_eq!(machine.state().pe_last_value, dec!(24530));

        machine
            .evaluate(&tick(dec!(24450)), &FlatQuotes(dec!(40)))
            .await;
        assert_eq!(machine.state().pe_last_value, dec!(24480));
        assert!(machine.state().pe_reset_armed);
    }

    #[tokio::test]
    async fn reference_advances_even_when_no_trade_executes() {
        // Dead quote source: the search exhausts, no intent is emitted, but
        // the crossed gap is still consumed.
        let mut machine = machine_at(dec!(24500), dec!(24000), config());
        let intents = machine.evaluate(&tick(dec!(24560)), &DeadQuotes).await;

        assert!(intents.is_empty());
        assert_eq!(machine.state().pe_last_value, dec!(24550));
        assert!(!machine.state().pe_reset_armed);
    }

    #[tokio::test]
    async fn diff_is_rounded_before_threshold_comparison() {
        // Raw diff 25.4 rounds to 25 which does not clear the gap of 25.
        let mut machine = machine_at(dec!(24500), dec!(24000), config());
        let intents = machine
            .evaluate(&tick(dec!(24525.4)), &FlatQuotes(dec!(40)))
            .await;

        assert!(intents.is_empty());
        assert_eq!(machine.state().pe_last_value, dec!(24500));

        // Raw diff 25.6 rounds to 26 and triggers with multiplier 1.
        let intents = machine
            .evaluate(&tick(dec!(24525.6)), &FlatQuotes(dec!(40)))
            .await;
        assert_eq!(intents.len(), 1);
        assert_eq!(machine.state().pe_last_value, dec!(24525));
    }
}
