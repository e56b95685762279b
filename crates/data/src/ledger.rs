//! File-backed order ledger.
//!
//! Orders are kept in a JSON map keyed by order id and rewritten on every
//! mutation, so the ledger survives restarts. Missing or corrupt files are
//! handled gracefully: the ledger starts empty and logs the problem.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use gapsell_core::{OrderLedger, TradeRecord};

/// Durable [`OrderLedger`] persisted to a JSON file.
pub struct FileOrderLedger {
    path: PathBuf,
    orders: HashMap<String, TradeRecord>,
}

impl FileOrderLedger {
    /// Opens (or creates) the ledger at `path`, loading any existing orders.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating ledger directory {}", parent.display()))?;
            }
        }

        let orders = Self::load(&path);
        Ok(Self { path, orders })
    }

    fn load(path: &PathBuf) -> HashMap<String, TradeRecord> {
        if !path.exists() {
            info!(path = %path.display(), "No existing order file, starting fresh");
            return HashMap::new();
        }

        match File::open(path) {
            Ok(file) => match serde_json::from_reader(BufReader::new(file)) {
                Ok(orders) => {
                    let orders: HashMap<String, TradeRecord> = orders;
                    info!(path = %path.display(), count = orders.len(), "Orders loaded");
                    orders
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "Corrupt order file, starting empty");
                    HashMap::new()
                }
            },
            Err(error) => {
                warn!(path = %path.display(), %error, "Cannot read order file, starting empty");
                HashMap::new()
            }
        }
    }

    fn persist(&self) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("writing ledger {}", self.path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &self.orders)?;
        Ok(())
    }
}

#[async_trait]
impl OrderLedger for FileOrderLedger {
    async fn add(&mut self, trade: TradeRecord) -> Result<()> {
        if self.orders.contains_key(&trade.order_id) {
            warn!(
                order_id = %trade.order_id,
                "Order id already exists, updating existing record"
            );
        }
        self.orders.insert(trade.order_id.clone(), trade);
        self.persist()
    }

    async fn mark_completed(&mut self, order_id: &str) -> Result<bool> {
        match self.orders.get_mut(order_id) {
            Some(record) => {
                record.completed = true;
                self.persist()?;
                info!(order_id, "Order marked completed");
                Ok(true)
            }
            None => {
                warn!(order_id, "Order not found in ledger");
                Ok(false)
            }
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<TradeRecord>> {
        Ok(self.orders.get(order_id).cloned())
    }

    async fn list(&self) -> Result<Vec<TradeRecord>> {
        let mut records: Vec<TradeRecord> = self.orders.values().cloned().collect();
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}
