// src/main.rs
use crate::config::AppConfig;
use crate::connectors::traits::MarketDataGateway;
use crate::connectors::yahoo::YahooChainClient;
use crate::core::buyback::BuybackMonitor;
use crate::core::sink::{AlertSink, UiFeed};
use crate::core::spike::SpikeScanner;
use crate::rules::wheel;
use crate::storage::export::append_alert_csv;
use crate::storage::positions::{
    load_positions_file, parse_positions_text, ParsedPositions, PositionDefaults,
};
use crate::storage::presets::TickerUniverse;
use crate::types::UiEvent;
use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod connectors;
mod core;
mod error;
mod rules;
mod storage;
mod tui;
mod types;
mod utils;

/// Bounds log lines and snapshots waiting for the display. Alerts are never dropped.
const UI_QUEUE_CAPACITY: usize = 1024;

#[derive(Parser)]
#[command(name = "option_sentinel", version, about = "Option premium spike and buyback alerts")]
struct Cli {
    /// Settings file, without extension
    #[arg(long, env = "SENTINEL_CONFIG", default_value = "Settings")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the configured monitors
    Run {
        /// Log alerts to stdout instead of drawing the terminal UI
        #[arg(long)]
        headless: bool,
        #[arg(long)]
        no_spike: bool,
        #[arg(long)]
        no_buyback: bool,
    },
    /// Validate a position file and print what would be monitored
    Positions {
        file: PathBuf,
        /// Treat the file as a pasted block without a header row
        #[arg(long)]
        paste: bool,
        #[arg(long)]
        json: bool,
    },
    /// Cash-secured put / covered call figures for one contract
    Wheel {
        #[arg(long)]
        strike: Decimal,
        #[arg(long)]
        premium: Decimal,
        #[arg(long)]
        dte: i64,
        /// Share price, required for covered calls
        #[arg(long)]
        spot: Option<Decimal>,
        #[arg(long)]
        covered_call: bool,
    },
}

fn init_logging(config: &AppConfig, to_stdout: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&config.logging.directory)
        .with_context(|| format!("creating log directory {}", config.logging.directory.display()))?;
    let file_appender =
        tracing_appender::rolling::daily(&config.logging.directory, &config.logging.file_prefix);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    // the TUI owns the terminal, so stdout only gets logs in headless mode
    let stdout_layer = to_stdout.then(|| fmt::layer().with_target(false).compact());

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    // 1. Load Configuration
    let config = AppConfig::new(&cli.config)?;

    match cli.command {
        Command::Run {
            headless,
            no_spike,
            no_buyback,
        } => {
            let _guard = init_logging(&config, headless)?;
            run_monitors(config, headless, !no_spike, !no_buyback).await
        }
        Command::Positions { file, paste, json } => show_positions(&config, &file, paste, json),
        Command::Wheel {
            strike,
            premium,
            dte,
            spot,
            covered_call,
        } => show_wheel(strike, premium, dte, spot, covered_call),
    }
}

async fn run_monitors(config: AppConfig, headless: bool, spike_on: bool, buyback_on: bool) -> Result<()> {
    // 2. Initialize Components
    let gateway: Arc<dyn MarketDataGateway> = Arc::new(YahooChainClient::new(&config.gateway)?);
    let (sink, ui_rx) = AlertSink::channel(UI_QUEUE_CAPACITY);

    let universe = TickerUniverse::from_tickers(&config.universe.tickers);
    for preset in &config.universe.presets {
        if let Err(e) = universe.load_preset(&config.universe.presets_dir, preset) {
            warn!(preset = %preset, error = %e, "Preset not loaded");
            sink.log(format!("Preset {} not loaded: {:#}", preset, e));
        }
    }

    let spike = Arc::new(SpikeScanner::new(
        gateway.clone(),
        config.quotes.policy,
        sink.clone(),
        config.stop_timeout(),
    ));
    let buyback = Arc::new(BuybackMonitor::new(
        gateway,
        config.quotes.policy,
        sink.clone(),
        config.stop_timeout(),
    ));

    if let Some(path) = &config.buyback.positions_file {
        let defaults = PositionDefaults::from(&config.buyback);
        match load_positions_file(path, &defaults, Utc::now().date_naive()) {
            Ok(parsed) => {
                for rejected in &parsed.rejected {
                    sink.log(format!("Position skipped: {}", rejected));
                }
                sink.log(format!("Loaded {} positions", parsed.positions.len()));
                buyback.add_positions(parsed.positions);
            }
            Err(e) => {
                error!(error = %e, "Position file not loaded");
                sink.log(format!("Position file not loaded: {:#}", e));
            }
        }
    }

    info!(
        tickers = universe.len(),
        positions = buyback.positions().len(),
        "Option sentinel starting"
    );

    // 3. Start Monitors
    if spike_on {
        if universe.is_empty() {
            sink.log("No tickers configured, spike scanner left idle");
        } else {
            spike.start(config.spike.clone(), universe.clone())?;
        }
    }
    if buyback_on {
        buyback.start(config.buyback.clone())?;
    }

    // 4. Run Interface
    if headless {
        run_headless(ui_rx, config.logging.alerts_csv.clone()).await;
        // NotRunning for a monitor that was never started is fine here
        let _ = spike.stop().await;
        let _ = buyback.stop().await;
        Ok(())
    } else {
        let monitors = tui::Monitors {
            spike,
            buyback,
            universe,
            config,
        };
        tui::run(ui_rx, monitors).await
    }
}

async fn run_headless(mut rx: UiFeed, alerts_csv: Option<PathBuf>) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl+C received, shutting down");
                break;
            }
            event = rx.recv() => match event {
                Some(UiEvent::Alert(alert)) => {
                    info!(kind = %alert.kind, key = %alert.contract_key, "{}", alert.message);
                    if let Some(path) = &alerts_csv {
                        if let Err(e) = append_alert_csv(path, &alert) {
                            error!(error = %e, "Failed to append alert CSV");
                        }
                    }
                }
                Some(UiEvent::Log(line)) => info!("{}", line),
                Some(UiEvent::Snapshot(_)) => {}
                None => break,
            }
        }
    }
}

fn show_positions(config: &AppConfig, file: &Path, paste: bool, json: bool) -> Result<()> {
    let defaults = PositionDefaults::from(&config.buyback);
    let today = Utc::now().date_naive();
    let parsed: ParsedPositions = if paste {
        let text = std::fs::read_to_string(file)
            .with_context(|| format!("reading {}", file.display()))?;
        parse_positions_text(&text, &defaults, today)
    } else {
        load_positions_file(file, &defaults, today)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&parsed.positions)?);
    } else {
        for p in &parsed.positions {
            let floor = p
                .floor_price
                .map(|f| format!(" floor {}", f))
                .unwrap_or_default();
            println!(
                "{:<28} x{:<3} credit {:>8} target {}%{}",
                p.key.to_string(),
                p.quantity,
                p.credit_received,
                p.target_capture_pct,
                floor
            );
        }
    }
    for rejected in &parsed.rejected {
        eprintln!("skipped: {}", rejected);
    }
    println!(
        "{} positions, {} rows skipped",
        parsed.positions.len(),
        parsed.rejected.len()
    );
    Ok(())
}

fn show_wheel(
    strike: Decimal,
    premium: Decimal,
    dte: i64,
    spot: Option<Decimal>,
    covered_call: bool,
) -> Result<()> {
    let summary = if covered_call {
        let spot = spot.context("--spot is required for a covered call")?;
        wheel::covered_call(strike, premium, spot, dte)?
    } else {
        wheel::cash_secured_put(strike, premium, dte)?
    };

    println!("{:?}", summary.leg);
    println!("  Collateral:   ${:.2}", summary.collateral);
    println!("  Max profit:   ${:.2}", summary.max_profit);
    println!("  Breakeven:    ${:.2}", summary.breakeven);
    println!("  ROC:          {:.2}%", summary.roc_pct);
    match summary.annualized_roc_pct {
        Some(ann) => println!("  Annualized:   {:.2}%", ann),
        None => println!("  Annualized:   N/A"),
    }
    Ok(())
}
