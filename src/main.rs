mod api;
mod collector;
mod config;
mod database;
mod engine;
mod error;
mod exchange;
mod indicators;
mod monitor;
mod notifications;
mod screener;
mod tsdb;
mod types;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::Settings;
use database::Database;
use engine::PaperTradingEngine;
use exchange::{BinanceClient, Exchange};
use monitor::Monitor;
use notifications::NotificationManager;
use screener::Screener;
use tsdb::TsDb;
use types::{SimAccount, TimeFrame};

#[derive(Parser)]
#[command(name = "altcoin-screener")]
#[command(version, about = "Altcoin screening and paper-trading engine for USDT spot markets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single screening pass and print the survivors.
    Screen {
        #[arg(long, default_value = "15m")]
        timeframe: String,
        #[arg(long)]
        min_volume: Option<Decimal>,
        #[arg(long)]
        min_price_change: Option<Decimal>,
    },
    /// Run the candle collector loop only.
    Collector,
    /// Run the monitor loop (screening + paper-trading + notifications).
    Monitor,
    /// Run the monitor loop alongside the HTTP adapter.
    Serve {
        #[arg(long, default_value = "8080")]
        port: u16,
    },
    /// Manage paper-trading accounts.
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
}

#[derive(Subcommand)]
enum AccountsAction {
    List,
    Create {
        name: String,
        #[arg(long, default_value = "10000")]
        initial_balance: Decimal,
    },
    Show {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    if let Err(errors) = settings.validate() {
        return Err(anyhow!("invalid configuration: {}", errors.join(", ")));
    }

    let level = settings.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(level).with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let db = Arc::new(Database::new(&settings.database_url).await?);
    let tsdb = Arc::new(TsDb::new(&settings.tsdb_url).await?);
    let exchange: Arc<dyn Exchange> = Arc::new(BinanceClient::new(
        settings.exchange_base_url.clone(),
        settings.exchange_api_key.clone(),
        settings.exchange_api_secret.clone(),
        settings.exchange_min_call_spacing_ms,
    ));

    match cli.command {
        Commands::Screen { timeframe, min_volume, min_price_change } => {
            run_screen(&settings, exchange, tsdb, db, &timeframe, min_volume, min_price_change).await?;
        }
        Commands::Collector => {
            run_collector(&settings, exchange, tsdb).await;
        }
        Commands::Monitor => {
            run_monitor(&settings, exchange, tsdb, db).await?;
        }
        Commands::Serve { port } => {
            run_serve(&settings, exchange, tsdb, db, port).await?;
        }
        Commands::Accounts { action } => {
            run_accounts(db, action).await?;
        }
    }

    Ok(())
}

async fn run_screen(
    settings: &Settings,
    exchange: Arc<dyn Exchange>,
    tsdb: Arc<TsDb>,
    db: Arc<Database>,
    timeframe: &str,
    min_volume: Option<Decimal>,
    _min_price_change: Option<Decimal>,
) -> Result<()> {
    let timeframe = TimeFrame::from_str(timeframe).ok_or_else(|| anyhow!("unknown timeframe: {timeframe}"))?;
    let min_volume_usd = min_volume.unwrap_or(settings.min_volume_usd);
    let screener = Screener::new(exchange, tsdb, db, settings.screener_worker_pool_size, settings.screener_pass_timeout_secs, min_volume_usd);

    let survivors = screener.run_pass(timeframe).await?;
    println!("{} survivors on {timeframe}", survivors.len());
    for s in &survivors {
        println!("{:<12} total={:>6} technical={:>6} beta={:>6} volume={:>6}", s.symbol.to_string(), s.total_score, s.technical_score, s.beta_score, s.volume_score);
    }
    Ok(())
}

async fn run_collector(settings: &Settings, exchange: Arc<dyn Exchange>, tsdb: Arc<TsDb>) {
    let collector = collector::Collector::new(exchange, tsdb, settings.collector_batch_size, settings.collector_candles_per_fetch);
    info!("collector starting");
    collector.run().await;
}

fn build_monitor(settings: &Settings, exchange: Arc<dyn Exchange>, tsdb: Arc<TsDb>, db: Arc<Database>) -> Result<(Monitor, Arc<Screener>)> {
    let timeframe = TimeFrame::from_str(&settings.screen_timeframe).ok_or_else(|| anyhow!("unknown screen_timeframe: {}", settings.screen_timeframe))?;

    let screener = Arc::new(Screener::new(
        Arc::clone(&exchange),
        Arc::clone(&tsdb),
        Arc::clone(&db),
        settings.screener_worker_pool_size,
        settings.screener_pass_timeout_secs,
        settings.min_volume_usd,
    ));
    let engine = Arc::new(PaperTradingEngine::new(Arc::clone(&db)));
    let notifications = Arc::new(NotificationManager::new(Arc::clone(&db)));

    let monitor = Monitor::new(
        Arc::clone(&db),
        tsdb,
        Arc::clone(&exchange),
        Arc::clone(&screener),
        engine,
        notifications,
        settings.timezone(),
        settings.update_interval_secs,
        settings.retention_sweep_every_n_days,
        settings.candle_retention_days,
        settings.snapshot_retention_days,
        timeframe,
        settings.preferred_windows.clone(),
        settings.preferred_window_bonus,
    );

    Ok((monitor, screener))
}

async fn run_monitor(settings: &Settings, exchange: Arc<dyn Exchange>, tsdb: Arc<TsDb>, db: Arc<Database>) -> Result<()> {
    let (monitor, _screener) = build_monitor(settings, exchange, tsdb, db)?;
    info!("monitor starting");
    monitor.run().await;
    Ok(())
}

async fn run_serve(settings: &Settings, exchange: Arc<dyn Exchange>, tsdb: Arc<TsDb>, db: Arc<Database>, port: u16) -> Result<()> {
    let (monitor, screener) = build_monitor(settings, exchange, tsdb, db.clone())?;

    let api_state = api::ApiState { db, screener };
    let app = api::router(api_state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "http adapter listening");

    tokio::select! {
        result = axum::serve(listener, app) => { result?; }
        _ = monitor.run() => {}
    }

    Ok(())
}

async fn run_accounts(db: Arc<Database>, action: AccountsAction) -> Result<()> {
    match action {
        AccountsAction::List => {
            for account in db.list_accounts().await? {
                println!("{:<36} {:<20} balance={} positions<={}", account.id, account.name, account.current_balance, account.max_positions);
            }
        }
        AccountsAction::Create { name, initial_balance } => {
            let account = SimAccount::new(name, initial_balance);
            db.create_account(&account).await?;
            println!("created account {}", account.id);
        }
        AccountsAction::Show { id } => match db.get_account(&id).await? {
            Some(account) => {
                let positions = db.open_positions_for_account(&account.id).await?;
                println!("{account:#?}");
                println!("open positions: {}", positions.len());
            }
            None => println!("no such account: {id}"),
        },
    }
    Ok(())
}
