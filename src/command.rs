//! Remote command channel
//!
//! Commands arrive as plain text over Telegram: `set-pair <symbol>`, `pause`,
//! `resume`. Processing never blocks the trading cadence: a dedicated task
//! long-polls Telegram into a bounded channel, and the control loop drains
//! at most what is already there.
//!
//! `ControlState` has a single writer (the command processor) and a single
//! reader (the engine); the engine only resets `target_pair` when a cycle
//! completes, which cannot race a `set-pair` because those are rejected while
//! a position is open.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::notify::Notifier;
use crate::store::TradeLedger;
use crate::telegram::TelegramClient;

/// Process-wide control variables, mutated by commands, read by the engine
#[derive(Debug, Clone, Default)]
pub struct ControlState {
    /// Currently selected symbol to snipe; None means "no target"
    pub target_pair: Option<String>,
    /// When true the engine enters no new buying cycles. Open positions stay
    /// monitored regardless.
    pub paused: bool,
}

/// A recognized remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SetPair(String),
    Pause,
    Resume,
}

const USAGE: &str = "Commands: set-pair <symbol> | pause | resume";

impl Command {
    /// Parse one command message. `Err` carries the reply for an
    /// unrecognized command.
    pub fn parse(text: &str) -> Result<Command, String> {
        let mut words = text.split_whitespace();

        match words.next().map(|w| w.to_ascii_lowercase()).as_deref() {
            Some("pause") => Ok(Command::Pause),
            Some("resume") => Ok(Command::Resume),
            Some("set-pair") => match words.next() {
                Some(symbol) => Ok(Command::SetPair(normalize_symbol(symbol))),
                None => Err(format!("set-pair needs a symbol. {}", USAGE)),
            },
            _ => Err(USAGE.to_string()),
        }
    }
}

/// Exchange-native symbol format: uppercase, dash-separated ("KLCS-USDT").
/// Accepts the slash form people type by habit.
fn normalize_symbol(symbol: &str) -> String {
    symbol.to_ascii_uppercase().replace('/', "-")
}

/// Source of raw command texts. `next_command` must not block: no pending
/// command is a no-op for the tick.
#[async_trait]
pub trait CommandSource: Send {
    async fn next_command(&mut self) -> Option<String>;
}

/// Telegram long-poll source. The poller task owns the offset and survives
/// transient API failures.
pub struct TelegramCommandSource {
    rx: mpsc::Receiver<String>,
}

impl TelegramCommandSource {
    pub fn spawn(client: Arc<TelegramClient>, poll_timeout_secs: u64) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut offset = 0i64;
            loop {
                match client.get_updates(offset, poll_timeout_secs).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            if let Some(text) = client.command_text(&update) {
                                if tx.send(text).await.is_err() {
                                    return; // receiver gone, shut down
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Command poll failed: {} - backing off", e);
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Self { rx }
    }
}

#[async_trait]
impl CommandSource for TelegramCommandSource {
    async fn next_command(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }
}

/// Applies commands to the control state, enforcing the rejection rules
pub struct CommandProcessor {
    control: Arc<RwLock<ControlState>>,
    ledger: Arc<TradeLedger>,
    position_open: Arc<AtomicBool>,
    notifier: Arc<dyn Notifier>,
}

impl CommandProcessor {
    pub fn new(
        control: Arc<RwLock<ControlState>>,
        ledger: Arc<TradeLedger>,
        position_open: Arc<AtomicBool>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            control,
            ledger,
            position_open,
            notifier,
        }
    }

    pub async fn process(&self, text: &str) {
        let command = match Command::parse(text) {
            Ok(command) => command,
            Err(reply) => {
                self.notifier.notify(&reply).await;
                return;
            }
        };

        match command {
            Command::Pause => {
                self.control.write().await.paused = true;
                info!("Paused by remote command");
                self.notifier.notify("⏸ Paused. Open positions stay protected.").await;
            }
            Command::Resume => {
                self.control.write().await.paused = false;
                info!("Resumed by remote command");
                self.notifier.notify("▶️ Resumed.").await;
            }
            Command::SetPair(symbol) => self.set_pair(symbol).await,
        }
    }

    async fn set_pair(&self, symbol: String) {
        if self.position_open.load(Ordering::SeqCst) {
            warn!("Rejected set-pair {}: position open", symbol);
            self.notifier
                .notify("❌ Cannot change target while a position is open.")
                .await;
            return;
        }

        if self.ledger.contains(&symbol).await {
            warn!("Rejected set-pair {}: already traded", symbol);
            self.notifier
                .notify(&format!("❌ {} was already traded this lifetime.", symbol))
                .await;
            return;
        }

        self.control.write().await.target_pair = Some(symbol.clone());
        info!("Target pair set to {}", symbol);
        self.notifier
            .notify(&format!("🎯 Target set: {}", symbol))
            .await;
    }
}
