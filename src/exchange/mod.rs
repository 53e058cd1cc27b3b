//! Exchange gateway
//!
//! The engine only ever talks to [`ExchangeGateway`]; the KuCoin REST client
//! and the paper-trading wrapper are the two implementations.

pub mod kucoin;
pub mod paper;

pub use kucoin::{Credentials, KucoinGateway};
pub use paper::PaperGateway;

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::Result;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated order book depth
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    /// (price, size), best bid first
    pub bids: Vec<(f64, f64)>,
    /// (price, size), best ask first
    pub asks: Vec<(f64, f64)>,
}

impl OrderBook {
    /// Existence + liquidity check used by the Watching state: a pair is
    /// tradeable once both sides of the book are populated.
    pub fn has_liquidity(&self) -> bool {
        !self.bids.is_empty() && !self.asks.is_empty()
    }

    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|(price, _)| *price)
    }
}

/// Confirmation returned by the exchange for a placed order
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: f64,
    pub price: f64,
}

/// Exchange operations the engine depends on.
///
/// Authenticated-only operations (`get_balance`, `place_order`) return
/// [`Error::AuthRequired`](crate::error::Error::AuthRequired) on a gateway
/// constructed read-only; the capability is decided at construction time,
/// not guarded per call.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Last traded price, or `Error::PriceUnavailable` on a feed miss
    async fn get_price(&self, symbol: &str) -> Result<f64>;

    /// Top-of-book depth for the pair
    async fn get_order_book(&self, symbol: &str) -> Result<OrderBook>;

    /// Free quote-currency balance of the trading account
    async fn get_balance(&self) -> Result<f64>;

    /// Round an order amount down to the pair's base increment
    async fn amount_to_precision(&self, symbol: &str, amount: f64) -> Result<f64>;

    /// Place a limit order
    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<OrderConfirmation>;

    /// All currently tradeable symbols
    async fn list_symbols(&self) -> Result<HashSet<String>>;
}
