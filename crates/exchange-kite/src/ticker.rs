//! Kite ticker WebSocket.
//!
//! The ticker pushes binary frames: a two-byte big-endian packet count, then
//! length-prefixed quote packets. In LTP mode each packet is eight bytes,
//! instrument token followed by the last traded price in paise. One-byte
//! frames are heartbeats.

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};
use url::Url;

use gapsell_core::{KiteConfig, Tick};

const PRICE_DIVISOR: i64 = 100;

/// Maintains the ticker connection for one instrument token and decodes its
/// price packets.
pub struct KiteTicker {
    ws_url: String,
    instrument_token: u32,
    connection: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl KiteTicker {
    /// # Errors
    ///
    /// Returns an error if the WebSocket URL cannot be constructed.
    pub fn new(config: &KiteConfig, instrument_token: u32) -> Result<Self> {
        let mut url = Url::parse(&config.ws_url).context("parsing ticker URL")?;
        url.query_pairs_mut()
            .append_pair("api_key", &config.api_key)
            .append_pair("access_token", &config.access_token);
        Ok(Self {
            ws_url: url.to_string(),
            instrument_token,
            connection: None,
        })
    }

    /// Connects and subscribes to the instrument in LTP mode.
    ///
    /// # Errors
    ///
    /// Returns an error on connection or subscription failure.
    pub async fn connect(&mut self) -> Result<()> {
        let (stream, _) = connect_async(&self.ws_url)
            .await
            .context("connecting to ticker")?;
        self.connection = Some(stream);
        info!(token = self.instrument_token, "Ticker connected");
        self.subscribe().await
    }

    async fn subscribe(&mut self) -> Result<()> {
        let connection = self
            .connection
            .as_mut()
            .context("ticker is not connected")?;

        let subscribe = json!({ "a": "subscribe", "v": [self.instrument_token] });
        connection
            .send(Message::Text(subscribe.to_string()))
            .await?;

        let mode = json!({ "a": "mode", "v": ["ltp", [self.instrument_token]] });
        connection.send(Message::Text(mode.to_string())).await?;

        debug!(token = self.instrument_token, "Subscribed in LTP mode");
        Ok(())
    }

    /// Next price tick for the subscribed instrument. Skips heartbeats,
    /// text frames, and packets for other tokens; reconnects on close.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection fails and cannot be reopened.
    pub async fn next_tick(&mut self) -> Result<Tick> {
        loop {
            let connection = self
                .connection
                .as_mut()
                .context("ticker is not connected")?;

            match connection.next().await {
                Some(Ok(Message::Binary(frame))) => {
                    if let Some(price) = decode_ltp(&frame, self.instrument_token) {
                        return Ok(Tick {
                            last_price: price,
                            timestamp: Utc::now(),
                        });
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    connection.send(Message::Pong(payload)).await?;
                }
                Some(Ok(Message::Close(_))) | None => {
                    warn!("Ticker connection closed, reconnecting");
                    self.reconnect().await?;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    error!(%error, "Ticker stream error, reconnecting");
                    self.reconnect().await?;
                }
            }
        }
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.connection = None;
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        self.connect().await
    }
}

/// Spawns a task that forwards ticks into a channel until the receiver is
/// dropped.
pub fn spawn_tick_stream(mut ticker: KiteTicker) -> mpsc::Receiver<Tick> {
    let (sender, receiver) = mpsc::channel(64);
    tokio::spawn(async move {
        loop {
            match ticker.next_tick().await {
                Ok(tick) => {
                    if sender.send(tick).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    error!(%error, "Tick stream terminated");
                    break;
                }
            }
        }
    });
    receiver
}

/// Decodes the last traded price for `token` from a binary ticker frame.
/// Returns `None` for heartbeats, malformed frames, and frames that carry
/// only other tokens.
fn decode_ltp(frame: &[u8], token: u32) -> Option<Decimal> {
    if frame.len() < 2 {
        return None; // heartbeat
    }

    let packet_count = u16::from_be_bytes([frame[0], frame[1]]) as usize;
    let mut offset = 2;

    for _ in 0..packet_count {
        let length = u16::from_be_bytes([*frame.get(offset)?, *frame.get(offset + 1)?]) as usize;
        offset += 2;
        let packet = frame.get(offset..offset + length)?;
        offset += length;

        if length < 8 {
            continue;
        }
        let packet_token = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
        if packet_token != token {
            continue;
        }
        let paise = i64::from(i32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]));
        return Some(Decimal::new(paise, 0) / Decimal::new(PRICE_DIVISOR, 0));
    }
    None
}
