use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::events::{OrderRequest, TradeRecord};

/// Source of option premiums. The engine never computes theoretical prices;
/// it asks a collaborator for the traded price of a concrete instrument.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Current premium for `symbol`.
    async fn premium(&self, symbol: &str) -> Result<Decimal>;

    /// Premium for `symbol` as of `at`. Returns `None` when no price is
    /// resolvable at that time. Live sources only know "now", so the default
    /// ignores the timestamp.
    async fn premium_at(&self, symbol: &str, at: DateTime<Utc>) -> Result<Option<Decimal>> {
        let _ = at;
        self.premium(symbol).await.map(Some)
    }
}

/// Places orders with the broker (or records them, in a backtest).
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    /// Returns the broker order id on success.
    async fn place(&mut self, order: OrderRequest) -> Result<String>;
}

/// Durable store of executed trades.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Adds a record. A duplicate order id is an update (last write wins),
    /// not an error.
    async fn add(&mut self, trade: TradeRecord) -> Result<()>;

    /// Flags an order as completed. Returns false if the id is unknown.
    async fn mark_completed(&mut self, order_id: &str) -> Result<bool>;

    async fn get(&self, order_id: &str) -> Result<Option<TradeRecord>>;

    async fn list(&self) -> Result<Vec<TradeRecord>>;
}
