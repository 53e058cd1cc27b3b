//! Snipe state machine
//!
//! One position lifecycle: Idle -> Watching -> Buying -> Holding -> Selling
//! -> Idle. Pause is an overlay that only blocks entry into new buying
//! cycles; an open position is never left unmonitored.
//!
//! The machine is driven one step per tick by the outer control loop, so
//! command processing and crash-safety checkpoints stay live even through a
//! long holding episode. `tick` never returns an error: every operation
//! boundary converts failures into a taxonomy kind and the machine either
//! transitions or stays where it is for the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::command::ControlState;
use crate::config::TradingConfig;
use crate::error::{Error, Result};
use crate::exchange::{ExchangeGateway, OrderConfirmation, OrderSide};
use crate::notify::Notifier;
use crate::retry::RetryPolicy;
use crate::store::{Position, PositionStore, SymbolCache, TradeLedger};
use crate::trailing::{TrailingStopEvent, TrailingStopMonitor};

/// Lifecycle state of the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Watching,
    Buying,
    Holding,
    Selling,
}

pub struct SnipeEngine {
    gateway: Arc<dyn ExchangeGateway>,
    notifier: Arc<dyn Notifier>,
    control: Arc<RwLock<ControlState>>,
    /// Read by the command processor to reject set-pair while holding
    position_open: Arc<AtomicBool>,
    position_store: PositionStore,
    ledger: Arc<TradeLedger>,
    symbols: SymbolCache,
    retry: RetryPolicy,
    config: TradingConfig,

    state: EngineState,
    position: Option<Position>,
    monitor: Option<TrailingStopMonitor>,
    exit_price: Option<f64>,
    feed_failures: u32,
}

impl SnipeEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        notifier: Arc<dyn Notifier>,
        control: Arc<RwLock<ControlState>>,
        position_open: Arc<AtomicBool>,
        position_store: PositionStore,
        ledger: Arc<TradeLedger>,
        symbols: SymbolCache,
        retry: RetryPolicy,
        config: TradingConfig,
    ) -> Self {
        Self {
            gateway,
            notifier,
            control,
            position_open,
            position_store,
            ledger,
            symbols,
            retry,
            config,
            state: EngineState::Idle,
            position: None,
            monitor: None,
            exit_price: None,
            feed_failures: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Startup recovery. A persisted position means the process died while
    /// holding - resume straight into Holding, never re-buy. A persisted
    /// position whose symbol is already in the ledger means the sell
    /// confirmed but the crash hit between ledger append and record removal:
    /// finish that cleanup and start Idle.
    pub async fn recover(&mut self) -> Result<()> {
        let Some(position) = self.position_store.load().await? else {
            debug!("No open position on disk");
            return Ok(());
        };

        if self.ledger.contains(&position.symbol).await {
            info!(
                "Found {} already in ledger with a stale position record; completing interrupted cleanup",
                position.symbol
            );
            self.position_store.clear().await?;
            return Ok(());
        }

        warn!(
            "Resuming open position from disk: {} qty {} @ {}",
            position.symbol, position.quantity, position.entry_price
        );
        self.notifier
            .notify(&format!(
                "♻️ Resuming open position {} (qty {} @ {}). Re-arming trailing stop from the live price.",
                position.symbol, position.quantity, position.entry_price
            ))
            .await;

        self.position_open.store(true, Ordering::SeqCst);
        self.position = Some(position);
        self.monitor = None; // re-armed from the live price, not the entry
        self.state = EngineState::Holding;
        Ok(())
    }

    /// Advance the machine by one step
    pub async fn tick(&mut self) {
        let control = self.control.read().await.clone();

        match self.state {
            // Pause freezes new cycles only; Holding and Selling proceed so
            // the position stays protected.
            EngineState::Idle | EngineState::Watching | EngineState::Buying
                if control.paused =>
            {
                debug!("Paused, skipping {:?} step", self.state)
            }
            EngineState::Idle => self.tick_idle(control).await,
            EngineState::Watching => self.tick_watching(control).await,
            EngineState::Buying => self.tick_buying(control).await,
            EngineState::Holding => self.tick_holding().await,
            EngineState::Selling => self.sell_once().await,
        }
    }

    async fn tick_idle(&mut self, control: ControlState) {
        let Some(target) = control.target_pair else {
            return;
        };

        if self.ledger.contains(&target).await {
            debug!("Target {} already traded, staying idle", target);
            return;
        }

        info!("Sniper armed on {}", target);
        self.notifier
            .notify(&format!(
                "✳️ Sniper armed on {} with {} USDT, waiting for it to become tradeable...",
                target, self.config.quote_notional
            ))
            .await;
        self.state = EngineState::Watching;
    }

    async fn tick_watching(&mut self, control: ControlState) {
        let Some(symbol) = control.target_pair else {
            self.state = EngineState::Idle;
            return;
        };

        match self.ensure_listed(&symbol).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} not listed yet", symbol);
                return;
            }
            Err(e) => {
                warn!("Listing check for {} failed: {}", symbol, e);
                return;
            }
        }

        let book = {
            let gateway = self.gateway.clone();
            let symbol = symbol.clone();
            self.retry
                .execute("get_order_book", move || {
                    let gateway = gateway.clone();
                    let symbol = symbol.clone();
                    async move { gateway.get_order_book(&symbol).await }
                })
                .await
        };

        match book {
            Ok(book) if book.has_liquidity() => {
                info!("{} is listed and liquid, attempting snipe", symbol);
                self.state = EngineState::Buying;
                self.buy_once(&symbol).await;
            }
            Ok(_) => debug!("{} listed but the book is still empty", symbol),
            Err(e) => warn!("Order book check for {} failed: {}", symbol, e),
        }
    }

    async fn tick_buying(&mut self, control: ControlState) {
        let Some(symbol) = control.target_pair else {
            self.state = EngineState::Idle;
            return;
        };
        self.buy_once(&symbol).await;
    }

    /// One buy attempt. Transient failures (after retry exhaustion) leave the
    /// machine in Buying for the next tick; business-rule rejections fall
    /// back to Watching; a missing reference price is just "not this tick".
    async fn buy_once(&mut self, symbol: &str) {
        let confirmation = match self.execute_buy(symbol).await {
            Ok(confirmation) => confirmation,
            Err(Error::PriceUnavailable(_)) => {
                warn!("No reference price for {}, retrying next tick", symbol);
                return;
            }
            Err(e) if e.is_business_rule() => {
                error!("Buy rejected: {}", e);
                self.notifier.notify(&format!("❌ Buy rejected: {}", e)).await;
                self.state = EngineState::Watching;
                return;
            }
            Err(e) => {
                warn!("Buy attempt failed: {}, staying in Buying", e);
                return;
            }
        };

        let position = Position::new(symbol, confirmation.price, confirmation.quantity);

        // Durability before the next step. If this write fails we still hold
        // the coins, so enter Holding regardless and say so loudly: a restart
        // would not resume this position.
        if let Err(e) = self.position_store.save(&position).await {
            error!("Failed to persist open position: {}", e);
            self.notifier
                .notify(&format!(
                    "⚠️ Bought {} but could not persist the position record ({}). Do not restart until it is sold.",
                    symbol, e
                ))
                .await;
        }

        self.notifier
            .notify(&format!(
                "✅ Buy {} order success! qty {} @ {}",
                symbol, confirmation.quantity, confirmation.price
            ))
            .await;
        self.notifier.notify("⌛ Waiting for sell...").await;

        self.position_open.store(true, Ordering::SeqCst);
        self.position = Some(position);
        self.monitor = None; // armed from the live price on the next tick
        self.feed_failures = 0;
        self.state = EngineState::Holding;
    }

    async fn execute_buy(&self, symbol: &str) -> Result<OrderConfirmation> {
        let balance = {
            let gateway = self.gateway.clone();
            self.retry
                .execute("get_balance", move || {
                    let gateway = gateway.clone();
                    async move { gateway.get_balance().await }
                })
                .await?
        };

        let spend = self
            .config
            .quote_notional
            .min(balance * self.config.balance_fraction);
        let cost = spend * self.config.fee_buffer;
        if cost > balance {
            return Err(Error::InsufficientBalance {
                available: balance,
                required: cost,
            });
        }

        let reference_price = self.fetch_price(symbol).await?;
        if reference_price <= 0.0 {
            return Err(Error::PriceUnavailable(symbol.to_string()));
        }

        let raw_quantity = spend * self.config.fee_buffer / reference_price;
        let quantity = {
            let gateway = self.gateway.clone();
            let symbol_owned = symbol.to_string();
            self.retry
                .execute("amount_to_precision", move || {
                    let gateway = gateway.clone();
                    let symbol = symbol_owned.clone();
                    async move { gateway.amount_to_precision(&symbol, raw_quantity).await }
                })
                .await?
        };
        if quantity <= 0.0 {
            return Err(Error::InvalidOrder(format!(
                "buy amount {} rounds to zero for {}",
                raw_quantity, symbol
            )));
        }

        let gateway = self.gateway.clone();
        let symbol_owned = symbol.to_string();
        self.retry
            .execute("place_order", move || {
                let gateway = gateway.clone();
                let symbol = symbol_owned.clone();
                async move {
                    gateway
                        .place_order(&symbol, OrderSide::Buy, quantity, reference_price)
                        .await
                }
            })
            .await
    }

    async fn tick_holding(&mut self) {
        let Some(position) = self.position.clone() else {
            error!("Holding with no position record, returning to Idle");
            self.state = EngineState::Idle;
            return;
        };

        // A feed miss is "no observation this tick": never a trigger, never
        // a reset.
        let price = match self.fetch_price(&position.symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                debug!("Price fetch for {} failed: {}", position.symbol, e);
                None
            }
        };

        if self.monitor.is_none() {
            match price {
                Some(price) => {
                    self.feed_failures = 0;
                    let monitor =
                        TrailingStopMonitor::arm(price, position.entry_price, self.config.trail_ratio);
                    info!(
                        "Trailing stop armed on {} from {} (exit below {})",
                        position.symbol,
                        price,
                        monitor.threshold_price()
                    );
                    self.monitor = Some(monitor);
                }
                None => self.note_feed_miss(&position.symbol).await,
            }
            return;
        }

        let event = match self.monitor.as_mut() {
            Some(monitor) => monitor.observe(price),
            None => return,
        };

        match event {
            TrailingStopEvent::NoData => self.note_feed_miss(&position.symbol).await,
            TrailingStopEvent::Status {
                price,
                high_water_mark,
                threshold_price,
                pnl_pct,
            } => {
                self.feed_failures = 0;
                info!(
                    "{}: close {} ath {} stop {} pnl {:+.2}%",
                    position.symbol, price, high_water_mark, threshold_price, pnl_pct
                );
                self.notifier
                    .notify(&format!(
                        "Close: {} ATH: {} Stop: {} PnL: {:+.2}%",
                        price, high_water_mark, threshold_price, pnl_pct
                    ))
                    .await;
            }
            TrailingStopEvent::Triggered { exit_price } => {
                self.feed_failures = 0;
                info!(
                    "Trailing stop triggered on {} at {}",
                    position.symbol, exit_price
                );
                self.notifier
                    .notify(&format!(
                        "🔻 Trailing stop triggered on {} at {}. Selling...",
                        position.symbol, exit_price
                    ))
                    .await;
                self.exit_price = Some(exit_price);
                self.state = EngineState::Selling;
                self.sell_once().await;
            }
        }
    }

    /// One sell attempt at the trigger price. Stays in Selling on failure;
    /// there is no state regression once the stop has fired.
    async fn sell_once(&mut self) {
        let Some(position) = self.position.clone() else {
            error!("Selling with no position record, returning to Idle");
            self.state = EngineState::Idle;
            return;
        };
        let Some(exit_price) = self.exit_price else {
            // Stop fired but the exit price was lost; re-derive from the monitor
            error!("Selling without an exit price, re-entering Holding");
            self.state = EngineState::Holding;
            return;
        };

        let placed = {
            let gateway = self.gateway.clone();
            let symbol = position.symbol.clone();
            let quantity = position.quantity;
            self.retry
                .execute("place_order", move || {
                    let gateway = gateway.clone();
                    let symbol = symbol.clone();
                    async move {
                        gateway
                            .place_order(&symbol, OrderSide::Sell, quantity, exit_price)
                            .await
                    }
                })
                .await
        };

        match placed {
            Err(e) if e.is_business_rule() => {
                error!("Sell rejected: {}", e);
                self.notifier.notify(&format!("❌ Sell failed: {}", e)).await;
            }
            Err(e) => warn!("Sell attempt failed: {}, retrying next tick", e),
            Ok(confirmation) => {
                info!(
                    "Sold {} {} at {} (order {})",
                    confirmation.quantity,
                    confirmation.symbol,
                    confirmation.price,
                    confirmation.order_id
                );

                // Recovery unit: the ledger append must land before the
                // position record is removed. A crash between the two is
                // resolved at startup as a completed sale.
                if let Err(e) = self.ledger.record(&position.symbol).await {
                    error!("Failed to record {} in ledger: {}", position.symbol, e);
                    self.notifier
                        .notify(&format!(
                            "⚠️ Sold {} but could not update the traded-pairs ledger: {}",
                            position.symbol, e
                        ))
                        .await;
                }
                if let Err(e) = self.position_store.clear().await {
                    error!("Failed to clear position record: {}", e);
                }

                self.notifier
                    .notify(&format!("✅ 💯 Sell {} order success!", position.symbol))
                    .await;
                self.notifier
                    .notify(&format!("Sniping completed on {}", position.symbol))
                    .await;

                self.position = None;
                self.monitor = None;
                self.exit_price = None;
                self.feed_failures = 0;
                self.position_open.store(false, Ordering::SeqCst);
                self.control.write().await.target_pair = None;
                self.state = EngineState::Idle;
            }
        }
    }

    /// Check the symbol cache, refreshing from the exchange while the target
    /// is missing (a new listing shows up in the refresh that first carries
    /// it).
    async fn ensure_listed(&self, symbol: &str) -> Result<bool> {
        if self.symbols.contains(symbol).await {
            return Ok(true);
        }

        let gateway = self.gateway.clone();
        let fresh = self
            .retry
            .execute("list_symbols", move || {
                let gateway = gateway.clone();
                async move { gateway.list_symbols().await }
            })
            .await?;
        self.symbols.replace(fresh).await?;

        Ok(self.symbols.contains(symbol).await)
    }

    async fn fetch_price(&self, symbol: &str) -> Result<f64> {
        let gateway = self.gateway.clone();
        let symbol = symbol.to_string();
        self.retry
            .execute("get_price", move || {
                let gateway = gateway.clone();
                let symbol = symbol.clone();
                async move { gateway.get_price(&symbol).await }
            })
            .await
    }

    async fn note_feed_miss(&mut self, symbol: &str) {
        self.feed_failures += 1;
        warn!(
            "No price for {} ({} consecutive misses)",
            symbol, self.feed_failures
        );

        if self.feed_failures == self.config.max_feed_failures {
            self.notifier
                .notify(&format!(
                    "⚠️ No price data for {} for {} ticks. Still holding; the stop is unchanged.",
                    symbol, self.feed_failures
                ))
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderBook;
    use crate::notify::test_support::RecordingNotifier;
    use crate::notify::DedupNotifier;
    use async_trait::async_trait;
    use std::collections::{HashSet, VecDeque};
    use tokio::sync::Mutex;

    struct MockGateway {
        prices: Mutex<VecDeque<f64>>,
        balance: f64,
        symbols: HashSet<String>,
        liquid: bool,
        orders: Mutex<Vec<OrderConfirmation>>,
    }

    impl MockGateway {
        fn new(balance: f64, listed: &[&str], liquid: bool, prices: &[f64]) -> Self {
            Self {
                prices: Mutex::new(prices.iter().copied().collect()),
                balance,
                symbols: listed.iter().map(|s| s.to_string()).collect(),
                liquid,
                orders: Mutex::new(Vec::new()),
            }
        }

        async fn placed(&self) -> Vec<OrderConfirmation> {
            self.orders.lock().await.clone()
        }
    }

    #[async_trait]
    impl ExchangeGateway for MockGateway {
        async fn get_price(&self, symbol: &str) -> crate::error::Result<f64> {
            match self.prices.lock().await.pop_front() {
                Some(price) => Ok(price),
                None => Err(Error::PriceUnavailable(symbol.to_string())),
            }
        }

        async fn get_order_book(&self, _symbol: &str) -> crate::error::Result<OrderBook> {
            if self.liquid {
                Ok(OrderBook {
                    bids: vec![(9.9, 100.0)],
                    asks: vec![(10.1, 100.0)],
                })
            } else {
                Ok(OrderBook::default())
            }
        }

        async fn get_balance(&self) -> crate::error::Result<f64> {
            Ok(self.balance)
        }

        async fn amount_to_precision(
            &self,
            _symbol: &str,
            amount: f64,
        ) -> crate::error::Result<f64> {
            Ok(amount)
        }

        async fn place_order(
            &self,
            symbol: &str,
            side: OrderSide,
            quantity: f64,
            price: f64,
        ) -> crate::error::Result<OrderConfirmation> {
            let confirmation = OrderConfirmation {
                order_id: format!("mock-{}", self.orders.lock().await.len()),
                symbol: symbol.to_string(),
                side,
                quantity,
                price,
            };
            self.orders.lock().await.push(confirmation.clone());
            Ok(confirmation)
        }

        async fn list_symbols(&self) -> crate::error::Result<HashSet<String>> {
            Ok(self.symbols.clone())
        }
    }

    struct Harness {
        engine: SnipeEngine,
        gateway: Arc<MockGateway>,
        control: Arc<RwLock<ControlState>>,
        position_open: Arc<AtomicBool>,
        recorder: RecordingNotifier,
        _dir: tempfile::TempDir,
    }

    async fn harness(gateway: MockGateway) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(gateway);
        let control = Arc::new(RwLock::new(ControlState::default()));
        let position_open = Arc::new(AtomicBool::new(false));
        let recorder = RecordingNotifier::default();

        let ledger = Arc::new(TradeLedger::new(dir.path()));
        ledger.load().await.unwrap();

        let engine = SnipeEngine::new(
            gateway.clone(),
            Arc::new(DedupNotifier::new(recorder.clone())),
            control.clone(),
            position_open.clone(),
            PositionStore::new(dir.path()),
            ledger,
            SymbolCache::new(dir.path()),
            RetryPolicy::new(1, std::time::Duration::from_millis(1), 2.0),
            TradingConfig::default(),
        );

        Harness {
            engine,
            gateway,
            control,
            position_open,
            recorder,
            _dir: dir,
        }
    }

    async fn set_target(harness: &Harness, symbol: &str) {
        harness.control.write().await.target_pair = Some(symbol.to_string());
    }

    #[tokio::test]
    async fn test_full_cycle() {
        // Buy reference 10, arm 10, then the documented trail:
        // hwm climbs to 13, threshold 12.87, 12.85 fires the stop.
        let prices = [10.0, 10.0, 12.0, 11.9, 13.0, 12.9, 12.85];
        let mut h = harness(MockGateway::new(100.0, &["NEW-USDT"], true, &prices)).await;
        set_target(&h, "NEW-USDT").await;

        h.engine.tick().await; // Idle -> Watching
        assert_eq!(h.engine.state(), EngineState::Watching);

        h.engine.tick().await; // Watching -> Buying -> Holding (buy fills)
        assert_eq!(h.engine.state(), EngineState::Holding);
        assert!(h.position_open.load(Ordering::SeqCst));

        let orders = h.gateway.placed().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Buy);
        // spend = min(12, 100*0.95) = 12; qty = 12 * 1.3 / 10
        assert!((orders[0].quantity - 1.56).abs() < 1e-9);
        assert_eq!(orders[0].price, 10.0);

        // Arm + four status samples + trigger at 12.85
        for _ in 0..6 {
            h.engine.tick().await;
        }

        assert_eq!(h.engine.state(), EngineState::Idle);
        assert!(!h.position_open.load(Ordering::SeqCst));
        assert!(h.control.read().await.target_pair.is_none());

        let orders = h.gateway.placed().await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[1].side, OrderSide::Sell);
        assert!((orders[1].quantity - 1.56).abs() < 1e-9);
        assert_eq!(orders[1].price, 12.85);

        // Ledger excludes the pair from any further cycle
        assert!(h.engine.ledger.contains("NEW-USDT").await);
        assert!(h.engine.position_store.load().await.unwrap().is_none());

        // Re-targeting the same pair never leaves Idle again
        set_target(&h, "NEW-USDT").await;
        h.engine.tick().await;
        h.engine.tick().await;
        assert_eq!(h.engine.state(), EngineState::Idle);
        assert_eq!(h.gateway.placed().await.len(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_balance_rejects_without_order() {
        // notional 12 against a 5 USDT balance: fee-adjusted cost exceeds
        // the balance, so no order may reach the exchange
        let mut h = harness(MockGateway::new(5.0, &["NEW-USDT"], true, &[10.0])).await;
        set_target(&h, "NEW-USDT").await;

        h.engine.tick().await; // Idle -> Watching
        h.engine.tick().await; // buy attempt, rejected

        assert_eq!(h.engine.state(), EngineState::Watching);
        assert!(h.gateway.placed().await.is_empty());
        assert!(!h.position_open.load(Ordering::SeqCst));

        let messages = h.recorder.messages().await;
        assert!(messages.iter().any(|m| m.contains("Buy rejected")));

        // The same rejection next tick is de-duplicated
        let before = h.recorder.messages().await.len();
        h.engine.tick().await; // Watching -> Buying again
        assert_eq!(h.recorder.messages().await.len(), before);
    }

    #[tokio::test]
    async fn test_crash_resume_enters_holding_without_buying() {
        let prices = [50.0, 50.5];
        let mut h = harness(MockGateway::new(100.0, &["X-USDT"], true, &prices)).await;

        // Simulate a previous run that died while holding
        h.engine
            .position_store
            .save(&Position::new("X-USDT", 10.0, 5.0))
            .await
            .unwrap();

        h.engine.recover().await.unwrap();
        assert_eq!(h.engine.state(), EngineState::Holding);
        assert!(h.position_open.load(Ordering::SeqCst));
        assert_eq!(h.engine.position().unwrap().quantity, 5.0);

        // The trailing stop re-arms from the live price (50), not the entry
        h.engine.tick().await;
        h.engine.tick().await;
        assert_eq!(h.engine.state(), EngineState::Holding);
        assert!(h.gateway.placed().await.is_empty(), "no duplicate buy");
    }

    #[tokio::test]
    async fn test_recovery_completes_interrupted_sale_cleanup() {
        let mut h = harness(MockGateway::new(100.0, &[], true, &[])).await;

        // Crash happened after the ledger append but before the record clear
        h.engine
            .position_store
            .save(&Position::new("X-USDT", 10.0, 5.0))
            .await
            .unwrap();
        h.engine.ledger.record("X-USDT").await.unwrap();

        h.engine.recover().await.unwrap();

        assert_eq!(h.engine.state(), EngineState::Idle);
        assert!(!h.position_open.load(Ordering::SeqCst));
        assert!(h.engine.position_store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pause_blocks_new_cycles() {
        let mut h = harness(MockGateway::new(100.0, &["NEW-USDT"], true, &[10.0])).await;
        set_target(&h, "NEW-USDT").await;
        h.control.write().await.paused = true;

        h.engine.tick().await;
        h.engine.tick().await;

        assert_eq!(h.engine.state(), EngineState::Idle);
        assert!(h.gateway.placed().await.is_empty());
    }

    #[tokio::test]
    async fn test_pause_does_not_unmonitor_holding() {
        // Armed at 100, then a 2% drop: the stop must fire and sell even
        // while paused.
        let prices = [100.0, 98.0];
        let mut h = harness(MockGateway::new(100.0, &["X-USDT"], true, &prices)).await;

        h.engine
            .position_store
            .save(&Position::new("X-USDT", 90.0, 2.0))
            .await
            .unwrap();
        h.engine.recover().await.unwrap();
        h.control.write().await.paused = true;

        h.engine.tick().await; // arms at 100
        h.engine.tick().await; // 98 < 99 triggers, sells

        assert_eq!(h.engine.state(), EngineState::Idle);
        let orders = h.gateway.placed().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].side, OrderSide::Sell);
        assert_eq!(orders[0].price, 98.0);
    }

    #[tokio::test]
    async fn test_feed_outage_keeps_holding() {
        // Arm at 100, then the feed goes dark: no trigger, no sell, no reset
        let prices = [100.0];
        let mut h = harness(MockGateway::new(100.0, &["X-USDT"], true, &prices)).await;

        h.engine
            .position_store
            .save(&Position::new("X-USDT", 90.0, 2.0))
            .await
            .unwrap();
        h.engine.recover().await.unwrap();

        for _ in 0..15 {
            h.engine.tick().await;
        }

        assert_eq!(h.engine.state(), EngineState::Holding);
        assert!(h.gateway.placed().await.is_empty());
        // One deduped outage warning went out
        let outage_warnings = h
            .recorder
            .messages()
            .await
            .iter()
            .filter(|m| m.contains("No price data"))
            .count();
        assert_eq!(outage_warnings, 1);
    }

    #[tokio::test]
    async fn test_unlisted_symbol_waits() {
        let mut h = harness(MockGateway::new(100.0, &[], true, &[10.0])).await;
        set_target(&h, "NOTYET-USDT").await;

        h.engine.tick().await; // Idle -> Watching
        h.engine.tick().await; // listing check fails, stay Watching
        h.engine.tick().await;

        assert_eq!(h.engine.state(), EngineState::Watching);
        assert!(h.gateway.placed().await.is_empty());
    }
}
