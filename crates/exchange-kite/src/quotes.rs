use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use gapsell_backtest::HistoricalSeriesSource;
use gapsell_core::{Bar, InstrumentCatalog, QuoteSource};

use crate::client::KiteClient;

/// Live [`QuoteSource`] backed by the quote endpoint. Option symbols are
/// looked up on the NFO segment.
pub struct LiveQuoteSource {
    client: Arc<KiteClient>,
}

impl LiveQuoteSource {
    #[must_use]
    pub fn new(client: Arc<KiteClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl QuoteSource for LiveQuoteSource {
    async fn premium(&self, symbol: &str) -> Result<Decimal> {
        let code = format!("NFO:{symbol}");
        let quote = self.client.quote(&code).await?;
        Ok(quote.last_price)
    }
}

/// Candle-endpoint [`HistoricalSeriesSource`] for broker-fed backtests.
/// Trading symbols are resolved to instrument tokens through the catalog.
pub struct KiteSeriesSource {
    client: Arc<KiteClient>,
    catalog: Arc<InstrumentCatalog>,
    interval: String,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

impl KiteSeriesSource {
    #[must_use]
    pub fn new(
        client: Arc<KiteClient>,
        catalog: Arc<InstrumentCatalog>,
        interval: impl Into<String>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        Self {
            client,
            catalog,
            interval: interval.into(),
            from,
            to,
        }
    }
}

#[async_trait]
impl HistoricalSeriesSource for KiteSeriesSource {
    async fn fetch_series(&self, symbol: &str) -> Result<Vec<Bar>> {
        let instrument = self
            .catalog
            .by_symbol(symbol)
            .with_context(|| format!("{symbol} is not in the instrument catalog"))?;
        self.client
            .historical_candles(
                instrument.instrument_token,
                &self.interval,
                self.from,
                self.to,
                symbol,
            )
            .await
    }
}
