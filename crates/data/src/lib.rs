pub mod bars;
pub mod ledger;

pub use bars::{read_bars, write_bars};
pub use ledger::FileOrderLedger;
