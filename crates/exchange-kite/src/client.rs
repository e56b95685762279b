use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::debug;

use gapsell_core::{Bar, KiteConfig, OrderRequest};

/// Current quote for one symbol.
#[derive(Debug, Clone)]
pub struct Quote {
    pub instrument_token: u32,
    pub last_price: Decimal,
}

/// Thin Kite Connect REST client. All requests carry the
/// `token api_key:access_token` authorization header; session setup is
/// assumed to have happened out of band.
pub struct KiteClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: String,
}

impl KiteClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &KiteConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }

    async fn get_json(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .header("X-Kite-Version", "3")
            .header("Authorization", self.auth_header())
            .send()
            .await
            .with_context(|| format!("GET {path}"))?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Quote for an `EXCHANGE:SYMBOL` code.
    ///
    /// # Errors
    ///
    /// Returns an error on HTTP failure or an unexpected response shape.
    pub async fn quote(&self, symbol_code: &str) -> Result<Quote> {
        let body = self.get_json("/quote", &[("i", symbol_code)]).await?;
        let data = body
            .get("data")
            .and_then(|d| d.get(symbol_code))
            .ok_or_else(|| anyhow::anyhow!("no quote data for {symbol_code}"))?;

        let last_price = data
            .get("last_price")
            .and_then(Value::as_f64)
            .and_then(Decimal::from_f64)
            .ok_or_else(|| anyhow::anyhow!("missing last_price for {symbol_code}"))?;
        let instrument_token = data
            .get("instrument_token")
            .and_then(Value::as_u64)
            .and_then(|t| u32::try_from(t).ok())
            .ok_or_else(|| anyhow::anyhow!("missing instrument_token for {symbol_code}"))?;

        Ok(Quote {
            instrument_token,
            last_price,
        })
    }

    /// Places a regular order and returns the broker order id.
    ///
    /// # Errors
    ///
    /// Returns an error on HTTP failure or a rejected order.
    pub async fn place_order(&self, order: &OrderRequest) -> Result<String> {
        let quantity = order.quantity.to_string();
        let params = [
            ("tradingsymbol", order.symbol.as_str()),
            ("exchange", order.exchange.as_str()),
            ("transaction_type", order.transaction_type.as_str()),
            ("order_type", order.order_type.as_str()),
            ("quantity", quantity.as_str()),
            ("product", order.product.as_str()),
            ("validity", "DAY"),
            ("tag", order.tag.as_str()),
        ];

        let url = format!("{}/orders/regular", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&params)
            .header("X-Kite-Version", "3")
            .header("Authorization", self.auth_header())
            .send()
            .await
            .context("POST /orders/regular")?;

        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("order rejected ({status}): {message}");
        }

        body.get("data")
            .and_then(|d| d.get("order_id"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| anyhow::anyhow!("order response missing order_id"))
    }

    /// Downloads the instrument dump for `exchange` as CSV text.
    ///
    /// # Errors
    ///
    /// Returns an error on HTTP failure.
    pub async fn instruments_csv(&self, exchange: &str) -> Result<String> {
        let url = format!("{}/instruments/{exchange}", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("X-Kite-Version", "3")
            .header("Authorization", self.auth_header())
            .send()
            .await
            .with_context(|| format!("GET /instruments/{exchange}"))?
            .error_for_status()?;
        Ok(response.text().await?)
    }

    /// Historical candles for an instrument token, chronological order.
    ///
    /// # Errors
    ///
    /// Returns an error on HTTP failure or an unparsable candle row.
    pub async fn historical_candles(
        &self,
        instrument_token: u32,
        interval: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        symbol: &str,
    ) -> Result<Vec<Bar>> {
        let path = format!("/instruments/historical/{instrument_token}/{interval}");
        let from = from.format("%Y-%m-%d %H:%M:%S").to_string();
        let to = to.format("%Y-%m-%d %H:%M:%S").to_string();
        let body = self
            .get_json(&path, &[("from", from.as_str()), ("to", to.as_str())])
            .await?;

        let candles = body
            .get("data")
            .and_then(|d| d.get("candles"))
            .and_then(Value::as_array)
            .ok_or_else(|| anyhow::anyhow!("candle response missing data.candles"))?;

        let mut bars = Vec::with_capacity(candles.len());
        for candle in candles {
            bars.push(parse_candle(candle, symbol)?);
        }
        debug!(symbol, bars = bars.len(), interval, "Historical candles fetched");
        Ok(bars)
    }
}

/// One candle row is `[timestamp, open, high, low, close, volume]`, the
/// timestamp formatted like `2025-08-07T09:15:00+0530`.
fn parse_candle(candle: &Value, symbol: &str) -> Result<Bar> {
    let fields = candle
        .as_array()
        .filter(|a| a.len() >= 6)
        .ok_or_else(|| anyhow::anyhow!("malformed candle row"))?;

    let timestamp = fields[0]
        .as_str()
        .ok_or_else(|| anyhow::anyhow!("candle timestamp is not a string"))?;
    let timestamp = DateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| DateTime::parse_from_rfc3339(timestamp))
        .with_context(|| format!("parsing candle timestamp {timestamp}"))?
        .with_timezone(&Utc);

    let decimal_at = |index: usize| -> Result<Decimal> {
        fields[index]
            .as_f64()
            .and_then(Decimal::from_f64)
            .ok_or_else(|| anyhow::anyhow!("candle field {index} is not numeric"))
    };

    Ok(Bar {
        symbol: symbol.to_string(),
        open: decimal_at(1)?,
        high: decimal_at(2)?,
        low: decimal_at(3)?,
        close: decimal_at(4)?,
        volume: decimal_at(5)?,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn parses_offset_timestamp_candle() {
        let candle = json!(["2025-08-07T09:15:00+0530", 24500.0, 24510.5, 24490.0, 24505.25, 125000.0]);
        let bar = parse_candle(&candle, "NIFTY 50").unwrap();
        assert_eq!(bar.close, dec!(24505.25));
        assert_eq!(bar.timestamp.format("%H:%M").to_string(), "03:45"); // UTC
    }

    #[test]
    fn rejects_short_candle_row() {
        let candle = json!(["2025-08-07T09:15:00+0530", 24500.0]);
        assert!(parse_candle(&candle, "NIFTY 50").is_err());
    }
}
