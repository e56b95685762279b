pub mod quotes;
pub mod report;
pub mod runner;

pub use quotes::{CachingHistoricalQuotes, HistoricalSeriesSource};
pub use report::{BacktestReport, TradeResult};
pub use runner::{BacktestRunner, BacktestTrade};
