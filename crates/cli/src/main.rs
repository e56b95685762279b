use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;

use gapsell_core::StrategyConfig;

#[derive(Parser)]
#[command(name = "gapsell")]
#[command(about = "Gap-triggered options selling engine for NSE index options", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Strategy parameters that can be set on the command line, layered over the
/// loaded configuration. Anything not given keeps its config/default value.
#[derive(Args)]
struct StrategyOverrides {
    /// Override the option series prefix (e.g. "NIFTY25807")
    #[arg(long)]
    symbol_prefix: Option<String>,
    /// Override the upward move (points) that triggers a PE sell
    #[arg(long)]
    pe_gap: Option<Decimal>,
    /// Override the downward move (points) that triggers a CE sell
    #[arg(long)]
    ce_gap: Option<Decimal>,
    /// Override the favorable move that resets the PE reference
    #[arg(long)]
    pe_reset_gap: Option<Decimal>,
    /// Override the favorable move that resets the CE reference
    #[arg(long)]
    ce_reset_gap: Option<Decimal>,
    /// Override the initial PE strike distance from spot
    #[arg(long)]
    pe_symbol_gap: Option<Decimal>,
    /// Override the initial CE strike distance from spot
    #[arg(long)]
    ce_symbol_gap: Option<Decimal>,
    /// Override the base PE quantity
    #[arg(long)]
    pe_quantity: Option<u32>,
    /// Override the base CE quantity
    #[arg(long)]
    ce_quantity: Option<u32>,
    /// Override the PE reference start point (0 seeds from the live price)
    #[arg(long)]
    pe_start_point: Option<Decimal>,
    /// Override the CE reference start point (0 seeds from the live price)
    #[arg(long)]
    ce_start_point: Option<Decimal>,
    /// Override the premium floor
    #[arg(long)]
    min_price_to_sell: Option<Decimal>,
    /// Override the hard stop on the position-scaling multiplier
    #[arg(long)]
    sell_multiplier_threshold: Option<i64>,
}

impl StrategyOverrides {
    fn apply(&self, config: &mut StrategyConfig) {
        if let Some(v) = &self.symbol_prefix {
            config.symbol_prefix.clone_from(v);
        }
        if let Some(v) = self.pe_gap {
            config.pe_gap = v;
        }
        if let Some(v) = self.ce_gap {
            config.ce_gap = v;
        }
        if let Some(v) = self.pe_reset_gap {
            config.pe_reset_gap = v;
        }
        if let Some(v) = self.ce_reset_gap {
            config.ce_reset_gap = v;
        }
        if let Some(v) = self.pe_symbol_gap {
            config.pe_symbol_gap = v;
        }
        if let Some(v) = self.ce_symbol_gap {
            config.ce_symbol_gap = v;
        }
        if let Some(v) = self.pe_quantity {
            config.pe_quantity = v;
        }
        if let Some(v) = self.ce_quantity {
            config.ce_quantity = v;
        }
        if let Some(v) = self.pe_start_point {
            config.pe_start_point = v;
        }
        if let Some(v) = self.ce_start_point {
            config.ce_start_point = v;
        }
        if let Some(v) = self.min_price_to_sell {
            config.min_price_to_sell = v;
        }
        if let Some(v) = self.sell_multiplier_threshold {
            config.sell_multiplier_threshold = v;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live trading loop
    Run {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        #[command(flatten)]
        overrides: StrategyOverrides,
    },
    /// Replay historical underlying bars through the decision engine
    Backtest {
        /// Underlying bar CSV file
        #[arg(short, long)]
        data: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
        /// Candle interval for option premium history
        #[arg(long, default_value = "minute")]
        interval: String,
        #[command(flatten)]
        overrides: StrategyOverrides,
    },
    /// Fetch historical candles for a symbol into a CSV file
    FetchData {
        /// Quote symbol (e.g., "NSE:NIFTY 50")
        #[arg(long)]
        symbol: String,
        /// Candle interval (minute, 5minute, day, ...)
        #[arg(long, default_value = "minute")]
        interval: String,
        /// Start time in ISO 8601 format (e.g., "2025-08-07T03:45:00Z")
        #[arg(long)]
        start: String,
        /// End time in ISO 8601 format
        #[arg(long)]
        end: String,
        /// Output CSV file path
        #[arg(short, long)]
        output: String,
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
    /// Print the effective configuration
    ShowConfig {
        /// Config file path
        #[arg(short, long, default_value = "config/Config.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match cli.command {
        Commands::Run { config, overrides } => {
            run_live(&config, &overrides).await?;
        }
        Commands::Backtest {
            data,
            config,
            interval,
            overrides,
        } => {
            run_backtest(&data, &config, &interval, &overrides).await?;
        }
        Commands::FetchData {
            symbol,
            interval,
            start,
            end,
            output,
            config,
        } => {
            run_fetch_data(&symbol, &interval, &start, &end, &output, &config).await?;
        }
        Commands::ShowConfig { config } => {
            run_show_config(&config)?;
        }
    }

    Ok(())
}

async fn run_live(config_path: &str, overrides: &StrategyOverrides) -> anyhow::Result<()> {
    use gapsell_core::{ConfigLoader, OrderLedger, TradeExecutor, TradeRecord};
    use gapsell_data::FileOrderLedger;
    use gapsell_kite::{
        load_catalog, spawn_tick_stream, KiteClient, KiteTicker, LiveQuoteSource,
        LiveTradeExecutor,
    };
    use gapsell_strategy::{ReferenceState, ReferenceStateMachine};
    use std::sync::Arc;

    tracing::info!("Starting live engine with config: {}", config_path);

    let app_config = ConfigLoader::load_from(config_path)?;
    let mut strategy_config = app_config.strategy.clone();
    overrides.apply(&mut strategy_config);
    strategy_config.validate()?;
    let strategy_config = Arc::new(strategy_config);

    let client = Arc::new(KiteClient::new(&app_config.kite)?);
    let catalog = Arc::new(load_catalog(&client, &strategy_config.symbol_prefix).await?);

    // One index quote up front: the instrument token feeds the ticker
    // subscription, the price seeds any zero start point.
    let index_quote = client.quote(&strategy_config.index_symbol).await?;
    tracing::info!(
        symbol = %strategy_config.index_symbol,
        price = %index_quote.last_price,
        "Underlying quoted"
    );

    let state = ReferenceState::seed(&strategy_config, index_quote.last_price);
    let mut machine =
        ReferenceStateMachine::new(Arc::clone(&strategy_config), Arc::clone(&catalog), state);

    let quotes = LiveQuoteSource::new(Arc::clone(&client));
    let mut executor = LiveTradeExecutor::new(Arc::clone(&client));
    let mut ledger = FileOrderLedger::open(&app_config.ledger.orders_file)?;

    let mut ticker = KiteTicker::new(&app_config.kite, index_quote.instrument_token)?;
    ticker.connect().await?;
    let mut ticks = spawn_tick_stream(ticker);

    tracing::info!("Live loop running, press Ctrl+C to stop");

    loop {
        tokio::select! {
            tick = ticks.recv() => {
                let Some(tick) = tick else {
                    anyhow::bail!("tick stream ended");
                };

                let intents = machine.evaluate(&tick, &quotes).await;
                for intent in intents {
                    let order = gapsell_core::OrderRequest {
                        symbol: intent.instrument.trading_symbol.clone(),
                        quantity: intent.quantity,
                        transaction_type: strategy_config.transaction_type.clone(),
                        order_type: strategy_config.order_type.clone(),
                        product: strategy_config.product_type.clone(),
                        exchange: strategy_config.exchange.clone(),
                        tag: "gapsell".to_string(),
                    };

                    // A failed placement drops this intent only; the loop
                    // keeps consuming ticks.
                    match executor.place(order).await {
                        Ok(order_id) => {
                            let record = TradeRecord {
                                order_id,
                                symbol: intent.instrument.trading_symbol,
                                transaction_type: strategy_config.transaction_type.clone(),
                                quantity: intent.quantity,
                                price: None,
                                timestamp: intent.timestamp,
                                completed: false,
                            };
                            if let Err(e) = ledger.add(record).await {
                                tracing::error!("Failed to record order: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::error!("Order placement failed: {}", e);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    tracing::info!("Live engine stopped");
    Ok(())
}

async fn run_backtest(
    data_path: &str,
    config_path: &str,
    interval: &str,
    overrides: &StrategyOverrides,
) -> anyhow::Result<()> {
    use gapsell_backtest::BacktestRunner;
    use gapsell_core::ConfigLoader;
    use gapsell_kite::{load_catalog, KiteClient, KiteSeriesSource};
    use std::sync::Arc;

    tracing::info!("Running backtest with data: {}", data_path);

    let app_config = ConfigLoader::load_from(config_path)?;
    let mut strategy_config = app_config.strategy.clone();
    overrides.apply(&mut strategy_config);
    let strategy_config = Arc::new(strategy_config);

    let bars = gapsell_data::read_bars(data_path)?;
    let (Some(first), Some(last)) = (bars.first(), bars.last()) else {
        anyhow::bail!("no bars in {data_path}");
    };

    let client = Arc::new(KiteClient::new(&app_config.kite)?);
    let catalog = Arc::new(load_catalog(&client, &strategy_config.symbol_prefix).await?);

    let series_source = KiteSeriesSource::new(
        Arc::clone(&client),
        Arc::clone(&catalog),
        interval,
        first.timestamp,
        last.timestamp,
    );

    let runner = BacktestRunner::new(strategy_config, catalog, series_source);
    let report = runner.run(&bars).await?;

    println!("\n{}", "=".repeat(72));
    println!("Backtest Report");
    println!("{}", "=".repeat(72));
    println!(
        "{:<24} {:>5} {:>6} {:>10} {:>10} {:>12}",
        "Symbol", "Side", "Qty", "Entry", "Exit", "P&L"
    );
    println!("{}", "-".repeat(72));
    for trade in &report.trades {
        println!(
            "{:<24} {:>5} {:>6} {:>10} {:>10} {:>12}",
            trade.symbol, trade.side, trade.quantity, trade.entry_price, trade.exit_price,
            trade.profit
        );
    }
    println!("{}", "=".repeat(72));
    println!("Bars replayed:  {}", report.bars_replayed);
    println!("Trades:         {}", report.trades.len());
    println!("Winning trades: {}", report.winning_trades);
    println!("Win rate:       {:.1}%", report.win_rate_pct);
    println!("Total P&L:      {}", report.total_pnl);
    println!();

    Ok(())
}

async fn run_fetch_data(
    symbol: &str,
    interval: &str,
    start_str: &str,
    end_str: &str,
    output_path: &str,
    config_path: &str,
) -> anyhow::Result<()> {
    use anyhow::Context;
    use chrono::{DateTime, Utc};
    use gapsell_core::ConfigLoader;
    use gapsell_kite::KiteClient;

    tracing::info!("Fetching candles for {} ({} interval)", symbol, interval);

    let start: DateTime<Utc> = start_str
        .parse()
        .context("Invalid start time. Use ISO 8601 format (e.g., 2025-08-07T03:45:00Z)")?;
    let end: DateTime<Utc> = end_str
        .parse()
        .context("Invalid end time. Use ISO 8601 format (e.g., 2025-08-07T10:00:00Z)")?;
    if start >= end {
        anyhow::bail!("Start time must be before end time");
    }

    let app_config = ConfigLoader::load_from(config_path)?;
    let client = KiteClient::new(&app_config.kite)?;

    let quote = client.quote(symbol).await?;
    let bars = client
        .historical_candles(quote.instrument_token, interval, start, end, symbol)
        .await?;

    if bars.is_empty() {
        anyhow::bail!("No candle data returned for {symbol} {interval}");
    }

    gapsell_data::write_bars(output_path, &bars)?;
    tracing::info!("Wrote {} candles to {}", bars.len(), output_path);
    tracing::info!(
        "You can now run: gapsell backtest --data {}",
        output_path
    );

    Ok(())
}

fn run_show_config(config_path: &str) -> anyhow::Result<()> {
    use gapsell_core::ConfigLoader;

    let mut config = ConfigLoader::load_from(config_path)?;
    if !config.kite.access_token.is_empty() {
        config.kite.access_token = "<redacted>".to_string();
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn backtest_flags_override_loaded_config() {
        let cli = Cli::try_parse_from([
            "gapsell",
            "backtest",
            "--data",
            "bars.csv",
            "--symbol-prefix",
            "NIFTY25814",
            "--pe-gap",
            "25",
            "--ce-gap",
            "30",
            "--pe-symbol-gap",
            "250",
            "--pe-quantity",
            "150",
            "--min-price-to-sell",
            "20",
            "--sell-multiplier-threshold",
            "3",
        ])
        .unwrap();

        let Commands::Backtest {
            data, overrides, ..
        } = cli.command
        else {
            panic!("expected backtest subcommand");
        };
        assert_eq!(data, "bars.csv");

        let mut config = StrategyConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.symbol_prefix, "NIFTY25814");
        assert_eq!(config.pe_gap, dec!(25));
        assert_eq!(config.ce_gap, dec!(30));
        assert_eq!(config.pe_symbol_gap, dec!(250));
        assert_eq!(config.pe_quantity, 150);
        assert_eq!(config.min_price_to_sell, dec!(20));
        assert_eq!(config.sell_multiplier_threshold, 3);
        // Parameters not given on the command line keep their loaded values.
        assert_eq!(config.pe_reset_gap, dec!(30));
        assert_eq!(config.ce_quantity, 75);
    }

    #[test]
    fn run_accepts_the_same_override_surface() {
        let cli = Cli::try_parse_from([
            "gapsell",
            "run",
            "--pe-reset-gap",
            "40",
            "--ce-start-point",
            "24600",
        ])
        .unwrap();

        let Commands::Run { overrides, .. } = cli.command else {
            panic!("expected run subcommand");
        };

        let mut config = StrategyConfig::default();
        overrides.apply(&mut config);
        assert_eq!(config.pe_reset_gap, dec!(40));
        assert_eq!(config.ce_start_point, dec!(24600));
    }
}
