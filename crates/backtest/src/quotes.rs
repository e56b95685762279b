use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use gapsell_core::{Bar, QuoteSource};

/// Fetches the full historical price series for one option symbol.
///
/// The live implementation hits the broker's candle endpoint; tests supply a
/// map-backed one.
#[async_trait]
pub trait HistoricalSeriesSource: Send + Sync {
    async fn fetch_series(&self, symbol: &str) -> Result<Vec<Bar>>;
}

/// Historical, caching [`QuoteSource`] for backtests.
///
/// The first request for a symbol fetches its whole series once; later
/// lookups scan the cached bars for the first timestamp at or after the
/// requested one and return its close. A symbol whose series cannot be
/// fetched resolves to "unknown" on every lookup, which the premium-floor
/// search treats the same as a too-low premium.
pub struct CachingHistoricalQuotes<S> {
    source: S,
    cache: Mutex<HashMap<String, Vec<Bar>>>,
}

impl<S: HistoricalSeriesSource> CachingHistoricalQuotes<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn series_close_at(&self, symbol: &str, at: DateTime<Utc>) -> Option<Decimal> {
        let mut cache = self.cache.lock().await;

        if !cache.contains_key(symbol) {
            let series = match self.source.fetch_series(symbol).await {
                Ok(mut bars) => {
                    bars.sort_by_key(|b| b.timestamp);
                    debug!(symbol, bars = bars.len(), "Historical series cached");
                    bars
                }
                Err(error) => {
                    warn!(symbol, %error, "Historical series fetch failed, caching as unknown");
                    Vec::new()
                }
            };
            cache.insert(symbol.to_string(), series);
        }

        cache
            .get(symbol)
            .and_then(|bars| bars.iter().find(|b| b.timestamp >= at))
            .map(|bar| bar.close)
    }
}

#[async_trait]
impl<S: HistoricalSeriesSource> QuoteSource for CachingHistoricalQuotes<S> {
    async fn premium(&self, symbol: &str) -> Result<Decimal> {
        anyhow::bail!("historical quote source has no live premium for {symbol}")
    }

    async fn premium_at(&self, symbol: &str, at: DateTime<Utc>) -> Result<Option<Decimal>> {
        Ok(self.series_close_at(symbol, at).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        series: HashMap<String, Vec<Bar>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl HistoricalSeriesSource for &CountingSource {
        async fn fetch_series(&self, symbol: &str) -> Result<Vec<Bar>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.series
                .get(symbol)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no history for {symbol}"))
        }
    }

    fn bar(symbol: &str, minute: u32, close: Decimal) -> Bar {
        Bar {
            symbol: symbol.to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::ZERO,
            timestamp: Utc.with_ymd_and_hms(2025, 8, 7, 9, minute, 0).unwrap(),
        }
    }

    fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 7, 9, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn fetches_each_symbol_once() {
        let source = CountingSource {
            series: HashMap::from([(
                "OPT1".to_string(),
                vec![bar("OPT1", 15, dec!(40)), bar("OPT1", 30, dec!(25))],
            )]),
            fetches: AtomicUsize::new(0),
        };
        let quotes = CachingHistoricalQuotes::new(&source);

        assert_eq!(quotes.premium_at("OPT1", ts(15)).await.unwrap(), Some(dec!(40)));
        assert_eq!(quotes.premium_at("OPT1", ts(20)).await.unwrap(), Some(dec!(25)));
        assert_eq!(quotes.premium_at("OPT1", ts(30)).await.unwrap(), Some(dec!(25)));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lookup_past_series_end_is_unknown() {
        let source = CountingSource {
            series: HashMap::from([("OPT1".to_string(), vec![bar("OPT1", 15, dec!(40))])]),
            fetches: AtomicUsize::new(0),
        };
        let quotes = CachingHistoricalQuotes::new(&source);

        assert_eq!(quotes.premium_at("OPT1", ts(45)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn failed_fetch_is_cached_as_unknown() {
        let source = CountingSource {
            series: HashMap::new(),
            fetches: AtomicUsize::new(0),
        };
        let quotes = CachingHistoricalQuotes::new(&source);

        assert_eq!(quotes.premium_at("MISSING", ts(15)).await.unwrap(), None);
        assert_eq!(quotes.premium_at("MISSING", ts(30)).await.unwrap(), None);
        // The failure is cached; the source is not hammered per tick.
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }
}
