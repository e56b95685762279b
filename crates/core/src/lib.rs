pub mod catalog;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod events;
pub mod traits;

pub use catalog::{Instrument, InstrumentCatalog, OPTIONS_SEGMENT};
pub use config::{AppConfig, KiteConfig, LedgerConfig, StrategyConfig};
pub use config_loader::ConfigLoader;
pub use error::EngineError;
pub use events::{Bar, OptionSide, OrderRequest, Tick, TradeIntent, TradeRecord};
pub use traits::{OrderLedger, QuoteSource, TradeExecutor};
