use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use gapsell_core::{EngineError, Instrument, InstrumentCatalog, OptionSide, QuoteSource};

/// Result of a premium-floor strike search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// An instrument at an acceptable premium.
    Selected {
        instrument: Instrument,
        premium: Decimal,
    },
    /// No strike within tolerance of the target at the current gap.
    NoInstrument { gap: Decimal },
    /// The gap was stepped down to zero without clearing the premium floor.
    Exhausted,
}

/// Picks the option contract to sell for a given side and target distance.
#[derive(Debug, Clone)]
pub struct StrikeSelector {
    catalog: Arc<InstrumentCatalog>,
}

impl StrikeSelector {
    #[must_use]
    pub fn new(catalog: Arc<InstrumentCatalog>) -> Self {
        Self { catalog }
    }

    /// Closest eligible instrument to `reference_price -/+ gap` (PE/CE).
    ///
    /// Candidates further than half the series strike spacing from the
    /// target are rejected. Ties on distance break by trading symbol so the
    /// result is deterministic.
    #[must_use]
    pub fn find(
        &self,
        side: OptionSide,
        reference_price: Decimal,
        gap: Decimal,
    ) -> Option<Instrument> {
        let target_strike = match side {
            OptionSide::PE => reference_price - gap,
            OptionSide::CE => reference_price + gap,
        };
        let tolerance = self.catalog.strike_difference() / Decimal::from(2);

        let best = self
            .catalog
            .candidates(side)
            .map(|i| ((i.strike - target_strike).abs(), i))
            .filter(|(distance, _)| *distance <= tolerance)
            .min_by(|(da, a), (db, b)| {
                da.cmp(db)
                    .then_with(|| a.trading_symbol.cmp(&b.trading_symbol))
            });

        match best {
            Some((distance, instrument)) => {
                debug!(
                    %side,
                    target_strike = %target_strike,
                    strike = %instrument.strike,
                    distance = %distance,
                    symbol = %instrument.trading_symbol,
                    "Strike selected"
                );
                Some(instrument.clone())
            }
            None => {
                let error = EngineError::NoEligibleInstrument { side, target_strike };
                warn!(
                    %error,
                    tolerance = %tolerance,
                    "No instrument within tolerance of target strike"
                );
                None
            }
        }
    }

    /// Premium-floor search: walks the strike closer to at-the-money,
    /// `step` points at a time, until an instrument quotes at or above
    /// `min_premium`.
    ///
    /// A premium that cannot be resolved (collaborator failure, missing
    /// history) counts as below the floor. The search stops once the gap is
    /// no longer positive, so it always terminates.
    pub async fn select_tradable(
        &self,
        side: OptionSide,
        reference_price: Decimal,
        initial_gap: Decimal,
        quotes: &dyn QuoteSource,
        at: DateTime<Utc>,
        min_premium: Decimal,
        step: Decimal,
    ) -> SelectionOutcome {
        let mut gap = initial_gap;

        loop {
            if gap <= Decimal::ZERO {
                warn!(%side, min_premium = %min_premium, "Strike search exhausted without meeting premium floor");
                return SelectionOutcome::Exhausted;
            }

            let Some(instrument) = self.find(side, reference_price, gap) else {
                return SelectionOutcome::NoInstrument { gap };
            };

            match quotes.premium_at(&instrument.trading_symbol, at).await {
                Ok(Some(premium)) if premium >= min_premium => {
                    return SelectionOutcome::Selected {
                        instrument,
                        premium,
                    };
                }
                Ok(Some(premium)) => {
                    debug!(
                        symbol = %instrument.trading_symbol,
                        premium = %premium,
                        min_premium = %min_premium,
                        "Premium below floor, trying closer strike"
                    );
                }
                Ok(None) => {
                    debug!(
                        symbol = %instrument.trading_symbol,
                        "No premium resolvable, trying closer strike"
                    );
                }
                Err(error) => {
                    let error = EngineError::Collaborator(error);
                    warn!(
                        symbol = %instrument.trading_symbol,
                        %error,
                        "Quote lookup failed, trying closer strike"
                    );
                }
            }

            gap -= step;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use gapsell_core::OPTIONS_SEGMENT;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct MapQuotes(HashMap<String, Decimal>);

    #[async_trait]
    impl QuoteSource for MapQuotes {
        async fn premium(&self, symbol: &str) -> Result<Decimal> {
            self.0
                .get(symbol)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("no quote for {symbol}"))
        }
    }

    fn instrument(strike: i64, side: OptionSide) -> Instrument {
        Instrument {
            instrument_token: u32::try_from(strike).unwrap(),
            trading_symbol: format!("NIFTY25807{strike}{side}"),
            strike: Decimal::from(strike),
            option_type: side,
            segment: OPTIONS_SEGMENT.to_string(),
            lot_size: 75,
        }
    }

    fn selector() -> StrikeSelector {
        // Strikes every 50 points on both sides, 24000..=25000.
        let mut instruments = Vec::new();
        for strike in (24000..=25000).step_by(50) {
            instruments.push(instrument(strike, OptionSide::PE));
            instruments.push(instrument(strike, OptionSide::CE));
        }
        let catalog = InstrumentCatalog::new("NIFTY25807", instruments).unwrap();
        StrikeSelector::new(Arc::new(catalog))
    }

    #[test]
    fn finds_closest_strike_within_half_spacing() {
        let selector = selector();
        // Target 24360: nearest listed strike is 24350, distance 10 <= 25.
        let found = selector
            .find(OptionSide::PE, dec!(24560), dec!(200))
            .unwrap();
        assert_eq!(found.strike, dec!(24350));
    }

    #[test]
    fn ce_target_is_above_reference() {
        let selector = selector();
        let found = selector
            .find(OptionSide::CE, dec!(24510), dec!(200))
            .unwrap();
        assert_eq!(found.strike, dec!(24700));
    }

    #[test]
    fn equidistant_candidates_break_ties_by_symbol() {
        let selector = selector();
        // Target 24325 sits exactly between 24300 and 24350.
        let found = selector
            .find(OptionSide::PE, dec!(24525), dec!(200))
            .unwrap();
        assert_eq!(found.strike, dec!(24300));
    }

    #[test]
    fn returns_none_outside_listed_range() {
        let selector = selector();
        assert!(selector.find(OptionSide::PE, dec!(20000), dec!(200)).is_none());
    }

    #[tokio::test]
    async fn steps_gap_down_when_premium_below_floor() {
        let selector = selector();
        // Premium at gap 200 (strike 24300) is 10; at gap 150 (24350) it is 22.
        let quotes = MapQuotes(HashMap::from([
            ("NIFTY2580724300PE".to_string(), dec!(10)),
            ("NIFTY2580724350PE".to_string(), dec!(22)),
        ]));

        let outcome = selector
            .select_tradable(
                OptionSide::PE,
                dec!(24500),
                dec!(200),
                &quotes,
                Utc::now(),
                dec!(15),
                dec!(50),
            )
            .await;

        match outcome {
            SelectionOutcome::Selected {
                instrument,
                premium,
            } => {
                assert_eq!(instrument.strike, dec!(24350));
                assert_eq!(premium, dec!(22));
            }
            other => panic!("expected selection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausts_when_no_premium_clears_floor() {
        let selector = selector();
        // Every lookup fails, which counts as below-floor.
        let quotes = MapQuotes(HashMap::new());

        let outcome = selector
            .select_tradable(
                OptionSide::PE,
                dec!(24500),
                dec!(200),
                &quotes,
                Utc::now(),
                dec!(15),
                dec!(50),
            )
            .await;

        assert_eq!(outcome, SelectionOutcome::Exhausted);
    }

    #[tokio::test]
    async fn reports_missing_instrument_with_the_failing_gap() {
        let selector = selector();
        let quotes = MapQuotes(HashMap::new());

        // Reference far below the listed range: no strike near the target.
        let outcome = selector
            .select_tradable(
                OptionSide::PE,
                dec!(20000),
                dec!(200),
                &quotes,
                Utc::now(),
                dec!(15),
                dec!(50),
            )
            .await;

        assert_eq!(
            outcome,
            SelectionOutcome::NoInstrument { gap: dec!(200) }
        );
    }
}
