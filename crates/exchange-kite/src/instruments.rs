//! Instrument dump parsing.
//!
//! Kite publishes the full tradable instrument list as a CSV dump per
//! exchange. Only PE/CE rows survive parsing; everything else (futures,
//! indices) is skipped before the catalog filters by series prefix.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use gapsell_core::{Instrument, InstrumentCatalog, OptionSide};

use crate::client::KiteClient;

#[derive(Debug, Deserialize)]
struct InstrumentRow {
    instrument_token: u32,
    #[serde(rename = "tradingsymbol")]
    trading_symbol: String,
    strike: Decimal,
    lot_size: u32,
    instrument_type: String,
    segment: String,
}

/// Parses an instrument dump into option instruments.
///
/// # Errors
///
/// Returns an error if a row fails to parse.
pub fn parse_instruments(csv_text: &str) -> Result<Vec<Instrument>> {
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let mut instruments = Vec::new();

    for result in reader.deserialize() {
        let row: InstrumentRow = result.context("parsing instrument dump row")?;
        let option_type = match row.instrument_type.as_str() {
            "PE" => OptionSide::PE,
            "CE" => OptionSide::CE,
            _ => continue,
        };
        instruments.push(Instrument {
            instrument_token: row.instrument_token,
            trading_symbol: row.trading_symbol,
            strike: row.strike,
            option_type,
            segment: row.segment,
            lot_size: row.lot_size,
        });
    }

    debug!(options = instruments.len(), "Instrument dump parsed");
    Ok(instruments)
}

/// Downloads the NFO instrument dump and builds the catalog for the
/// configured series.
///
/// # Errors
///
/// Returns an error on download failure or when the series yields an
/// unusable catalog.
pub async fn load_catalog(client: &KiteClient, series_prefix: &str) -> Result<InstrumentCatalog> {
    let csv_text = client.instruments_csv("NFO").await?;
    let instruments = parse_instruments(&csv_text)?;
    Ok(InstrumentCatalog::new(series_prefix, instruments)?)
}
