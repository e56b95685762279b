pub mod client;
pub mod execution;
pub mod instruments;
pub mod quotes;
pub mod ticker;

pub use client::{KiteClient, Quote};
pub use execution::LiveTradeExecutor;
pub use instruments::{load_catalog, parse_instruments};
pub use quotes::{KiteSeriesSource, LiveQuoteSource};
pub use ticker::{spawn_tick_stream, KiteTicker};
