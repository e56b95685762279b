use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use gapsell_core::{OrderRequest, TradeExecutor};

use crate::client::KiteClient;

/// Places real orders through the order API.
pub struct LiveTradeExecutor {
    client: Arc<KiteClient>,
}

impl LiveTradeExecutor {
    #[must_use]
    pub fn new(client: Arc<KiteClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TradeExecutor for LiveTradeExecutor {
    async fn place(&mut self, order: OrderRequest) -> Result<String> {
        let order_id = self.client.place_order(&order).await?;
        info!(
            order_id = %order_id,
            symbol = %order.symbol,
            quantity = order.quantity,
            transaction_type = %order.transaction_type,
            "Order placed"
        );
        Ok(order_id)
    }
}
