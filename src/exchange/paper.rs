//! Paper-trading gateway for dry runs
//!
//! Delegates all market data to the wrapped gateway, but fakes fills and
//! tracks a simulated quote-currency balance. Lets the full lifecycle run
//! against live prices without real money.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{ExchangeGateway, OrderBook, OrderConfirmation, OrderSide};
use crate::error::Result;

pub struct PaperGateway<G> {
    inner: G,
    balance: RwLock<f64>,
}

impl<G: ExchangeGateway> PaperGateway<G> {
    pub fn new(inner: G, starting_balance: f64) -> Self {
        info!(
            "Paper trading enabled with simulated balance {}",
            starting_balance
        );
        Self {
            inner,
            balance: RwLock::new(starting_balance),
        }
    }
}

#[async_trait]
impl<G: ExchangeGateway> ExchangeGateway for PaperGateway<G> {
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        self.inner.get_price(symbol).await
    }

    async fn get_order_book(&self, symbol: &str) -> Result<OrderBook> {
        self.inner.get_order_book(symbol).await
    }

    async fn get_balance(&self) -> Result<f64> {
        Ok(*self.balance.read().await)
    }

    async fn amount_to_precision(&self, symbol: &str, amount: f64) -> Result<f64> {
        self.inner.amount_to_precision(symbol, amount).await
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<OrderConfirmation> {
        let notional = quantity * price;
        let mut balance = self.balance.write().await;
        match side {
            OrderSide::Buy => *balance -= notional,
            OrderSide::Sell => *balance += notional,
        }

        info!(
            "[paper] {} {} {} @ {} (balance now {})",
            side, quantity, symbol, price, *balance
        );

        Ok(OrderConfirmation {
            order_id: format!("paper-{}", Uuid::new_v4()),
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
        })
    }

    async fn list_symbols(&self) -> Result<HashSet<String>> {
        self.inner.list_symbols().await
    }
}
