//! CSV storage for historical bars.
//!
//! Format: `timestamp,symbol,open,high,low,close,volume`, one row per bar.
//! Used by the `fetch-data` command to store downloads and by the backtester
//! to read them back.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use gapsell_core::Bar;

/// Reads bars from a CSV file, sorted chronologically.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or a row fails to parse.
pub fn read_bars(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening bar file {}", path.display()))?;

    let mut bars = Vec::new();
    for result in reader.records() {
        let record = result?;
        let timestamp: DateTime<Utc> = record[0].parse()?;
        let symbol = record[1].to_string();
        let open = Decimal::from_str(&record[2])?;
        let high = Decimal::from_str(&record[3])?;
        let low = Decimal::from_str(&record[4])?;
        let close = Decimal::from_str(&record[5])?;
        let volume = Decimal::from_str(&record[6])?;

        bars.push(Bar {
            symbol,
            open,
            high,
            low,
            close,
            volume,
            timestamp,
        });
    }

    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

/// Writes bars to a CSV file, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_bars(path: impl AsRef<Path>, bars: &[Bar]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating bar file {}", path.display()))?;
    writer.write_record(["timestamp", "symbol", "open", "high", "low", "close", "volume"])?;
    for bar in bars {
        writer.write_record([
            bar.timestamp.to_rfc3339(),
            bar.symbol.clone(),
            bar.open.to_string(),
            bar.high.to_string(),
            bar.low.to_string(),
            bar.close.to_string(),
            bar.volume.to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn bar(minute: u32, close: Decimal) -> Bar {
        Bar {
            symbol: "NIFTY 50".to_string(),
            open: close,
            high: close,
            low: close,
            close,
            volume: dec!(1000),
            timestamp: Utc.with_ymd_and_hms(2025, 8, 7, 9, minute, 0).unwrap(),
        }
    }

    #[test]
    fn roundtrip_preserves_bars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        let bars = vec![bar(15, dec!(24500)), bar(16, dec!(24530.55))];

        write_bars(&path, &bars).unwrap();
        let loaded = read_bars(&path).unwrap();

        assert_eq!(loaded, bars);
    }

    #[test]
    fn reading_sorts_chronologically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.csv");
        let bars = vec![bar(30, dec!(24540)), bar(15, dec!(24500))];

        write_bars(&path, &bars).unwrap();
        let loaded = read_bars(&path).unwrap();

        assert!(loaded[0].timestamp < loaded[1].timestamp);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_bars("/nonexistent/bars.csv").is_err());
    }
}
