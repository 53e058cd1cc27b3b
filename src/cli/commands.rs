//! CLI command implementations

use anyhow::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::command::{CommandProcessor, CommandSource, ControlState, TelegramCommandSource};
use crate::config::Config;
use crate::engine::SnipeEngine;
use crate::exchange::{Credentials, ExchangeGateway, KucoinGateway, PaperGateway};
use crate::notify::{DedupNotifier, LogNotifier, Notifier, TelegramNotifier};
use crate::retry::RetryPolicy;
use crate::store::{PositionStore, SymbolCache, TradeLedger};
use crate::telegram::TelegramClient;

/// Start the sniper bot
pub async fn start(config: &Config, dry_run: bool) -> Result<()> {
    if dry_run {
        warn!("Running in DRY-RUN mode - orders are simulated");
    }

    info!(
        "Starting sniper: notional {} {}, trail ratio {}",
        config.trading.quote_notional, config.exchange.quote_currency, config.trading.trail_ratio
    );

    // Telegram is both the notification sink and the command source
    let telegram = if config.telegram.enabled {
        Some(Arc::new(TelegramClient::from_env(&config.telegram)?))
    } else {
        info!("Telegram disabled - notifications go to the log only");
        None
    };

    let notifier: Arc<dyn Notifier> = match &telegram {
        Some(client) => Arc::new(DedupNotifier::new(TelegramNotifier::new(client.clone()))),
        None => Arc::new(DedupNotifier::new(LogNotifier)),
    };

    // Gateway capability is decided here, once: a dry run talks to the
    // exchange read-only and fakes fills, a live run requires credentials.
    let gateway: Arc<dyn ExchangeGateway> = if dry_run {
        Arc::new(PaperGateway::new(
            KucoinGateway::read_only(&config.exchange)?,
            config.trading.paper_balance,
        ))
    } else {
        let credentials = match Credentials::from_env() {
            Ok(credentials) => credentials,
            Err(e) => {
                // Fail-fast: trading without credentials is a config error,
                // not something to limp through
                error!("Cannot trade: {}", e);
                notifier.notify(&format!("🛑 {} - shutting down.", e)).await;
                return Err(e.into());
            }
        };
        Arc::new(KucoinGateway::authenticated(&config.exchange, credentials)?)
    };

    // Durable state
    tokio::fs::create_dir_all(&config.storage.data_dir).await?;
    let position_store = PositionStore::new(&config.storage.data_dir);
    let ledger = Arc::new(TradeLedger::new(&config.storage.data_dir));
    ledger.load().await?;
    let symbols = SymbolCache::new(&config.storage.data_dir);
    symbols.load().await?;

    // Control plane
    let control = Arc::new(RwLock::new(ControlState::default()));
    let position_open = Arc::new(AtomicBool::new(false));
    let mut command_source = telegram.as_ref().map(|client| {
        TelegramCommandSource::spawn(client.clone(), config.telegram.poll_timeout_secs)
    });
    let processor = CommandProcessor::new(
        control.clone(),
        ledger.clone(),
        position_open.clone(),
        notifier.clone(),
    );

    let mut engine = SnipeEngine::new(
        gateway,
        notifier.clone(),
        control,
        position_open,
        position_store,
        ledger,
        symbols,
        RetryPolicy::from_config(&config.retry),
        config.trading.clone(),
    );

    engine.recover().await?;

    notifier
        .notify(&format!(
            "✳️ Sniper bot started with {} {} - send `set-pair <symbol>` to arm.",
            config.trading.quote_notional, config.exchange.quote_currency
        ))
        .await;

    // Control loop: drain pending commands, then one engine step per tick.
    // Commands stay responsive through every state, including long holds.
    let mut interval =
        tokio::time::interval(Duration::from_millis(config.trading.tick_interval_ms));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Some(source) = command_source.as_mut() {
                    while let Some(text) = source.next_command().await {
                        processor.process(&text).await;
                    }
                }
                engine.tick().await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupt received, shutting down");
                notifier.notify("🛑 Sniper bot stopped.").await;
                break;
            }
        }
    }

    Ok(())
}

/// Show the persisted position and traded-pairs ledger
pub async fn status(config: &Config) -> Result<()> {
    let position_store = PositionStore::new(&config.storage.data_dir);
    let ledger = Arc::new(TradeLedger::new(&config.storage.data_dir));
    ledger.load().await?;

    match position_store.load().await? {
        Some(position) => {
            println!(
                "Open position: {} qty {} @ {}",
                position.symbol, position.quantity, position.entry_price
            );
            if let Some(entry_time) = position.entry_time {
                println!("Entered at:    {}", entry_time);
            }

            // Best-effort live P&L; status must work without credentials
            let gateway = KucoinGateway::read_only(&config.exchange)?;
            match gateway.get_price(&position.symbol).await {
                Ok(price) => println!(
                    "Current price: {} ({:+.2}%)",
                    price,
                    position.unrealized_pnl_pct(price)
                ),
                Err(e) => println!("Current price: unavailable ({})", e),
            }
        }
        None => println!("No open position"),
    }

    println!("Traded pairs:  {}", ledger.len().await);
    Ok(())
}

/// Show the loaded configuration (credentials stay in the environment and
/// are never part of this struct)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{:#?}", config);
    Ok(())
}

/// Check connectivity to the exchange and Telegram
pub async fn health(config: &Config) -> Result<()> {
    let gateway = KucoinGateway::read_only(&config.exchange)?;
    match gateway.list_symbols().await {
        Ok(listing) => println!("Exchange: OK ({} tradeable symbols)", listing.len()),
        Err(e) => println!("Exchange: FAILED ({})", e),
    }

    if config.telegram.enabled {
        match TelegramClient::from_env(&config.telegram) {
            Ok(client) => match client.get_updates(0, 0).await {
                Ok(_) => println!("Telegram: OK"),
                Err(e) => println!("Telegram: FAILED ({})", e),
            },
            Err(e) => println!("Telegram: FAILED ({})", e),
        }
    } else {
        println!("Telegram: disabled");
    }

    Ok(())
}
