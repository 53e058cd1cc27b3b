//! KuCoin spot REST gateway
//!
//! Public market-data endpoints work unauthenticated. Private endpoints
//! (balance, orders) require the gateway to be constructed with credentials;
//! a read-only gateway returns a typed capability error instead of guarding
//! every call at runtime.
//!
//! Request signing follows the KuCoin API key v2 scheme:
//! `KC-API-SIGN = base64(hmac_sha256(secret, timestamp + method + path + body))`
//! with the passphrase itself signed the same way.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ExchangeGateway, OrderBook, OrderConfirmation, OrderSide};
use crate::config::ExchangeConfig;
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// KuCoin API credentials, loaded from the environment
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

impl Credentials {
    /// Load KUCOIN_API_KEY / KUCOIN_API_SECRET / KUCOIN_API_PASSPHRASE.
    /// Missing credentials are fatal for authenticated operation.
    pub fn from_env() -> Result<Self> {
        let get = |name: &str| -> Result<String> {
            match std::env::var(name) {
                Ok(value) if !value.trim().is_empty() => Ok(value),
                _ => Err(Error::MissingCredential(name.to_string())),
            }
        };

        Ok(Self {
            api_key: get("KUCOIN_API_KEY")?,
            api_secret: get("KUCOIN_API_SECRET")?,
            api_passphrase: get("KUCOIN_API_PASSPHRASE")?,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .field("api_passphrase", &"***")
            .finish()
    }
}

/// KuCoin REST client
pub struct KucoinGateway {
    http: reqwest::Client,
    base_url: String,
    quote_currency: String,
    credentials: Option<Credentials>,
    /// symbol -> baseIncrement, filled lazily from /api/v1/symbols
    increments: RwLock<HashMap<String, String>>,
}

/// Standard KuCoin response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    price: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DepthData {
    #[serde(default)]
    bids: Vec<[String; 2]>,
    #[serde(default)]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    #[serde(rename = "enableTrading")]
    enable_trading: bool,
    #[serde(rename = "quoteCurrency")]
    quote_currency: String,
    #[serde(rename = "baseIncrement")]
    base_increment: String,
}

#[derive(Debug, Deserialize)]
struct AccountEntry {
    available: String,
}

#[derive(Debug, Deserialize)]
struct OrderData {
    #[serde(rename = "orderId")]
    order_id: String,
}

impl KucoinGateway {
    /// Construct a gateway without trading capability (market data only)
    pub fn read_only(config: &ExchangeConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Construct a gateway that can query balances and place orders
    pub fn authenticated(config: &ExchangeConfig, credentials: Credentials) -> Result<Self> {
        Self::build(config, Some(credentials))
    }

    fn build(config: &ExchangeConfig, credentials: Option<Credentials>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {}", e)))?;

        info!(
            "KuCoin gateway initialized for {} ({})",
            config.rest_url,
            if credentials.is_some() {
                "authenticated"
            } else {
                "read-only"
            }
        );

        Ok(Self {
            http,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            quote_currency: config.quote_currency.clone(),
            credentials,
            increments: RwLock::new(HashMap::new()),
        })
    }

    fn sign(secret: &str, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
        mac.update(payload.as_bytes());
        BASE64.encode(mac.finalize().into_bytes())
    }

    fn signed_headers(
        creds: &Credentials,
        method: &str,
        path: &str,
        body: &str,
    ) -> Vec<(&'static str, String)> {
        let timestamp = chrono::Utc::now().timestamp_millis().to_string();
        let signature = Self::sign(
            &creds.api_secret,
            &format!("{}{}{}{}", timestamp, method, path, body),
        );
        let passphrase = Self::sign(&creds.api_secret, &creds.api_passphrase);

        vec![
            ("KC-API-KEY", creds.api_key.clone()),
            ("KC-API-SIGN", signature),
            ("KC-API-TIMESTAMP", timestamp),
            ("KC-API-PASSPHRASE", passphrase),
            ("KC-API-KEY-VERSION", "2".to_string()),
        ]
    }

    /// Map transport-level failures before the envelope is even parsed
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(Error::RateLimited(status.to_string()));
        }
        if status.is_server_error() {
            return Err(Error::ExchangeUnavailable(status.to_string()));
        }
        Ok(response)
    }

    fn map_api_error(code: &str, msg: Option<String>) -> Error {
        let msg = msg.unwrap_or_default();
        match code {
            "429000" => Error::RateLimited(msg),
            "200004" => Error::ExchangeRejected(format!("insufficient funds: {}", msg)),
            "400100" => Error::InvalidOrder(msg),
            _ => Error::ExchangeRejected(format!("{}: {}", code, msg)),
        }
    }

    fn unwrap_envelope<T>(envelope: ApiResponse<T>) -> Result<Option<T>> {
        if envelope.code != "200000" {
            return Err(Self::map_api_error(&envelope.code, envelope.msg));
        }
        Ok(envelope.data)
    }

    async fn get_public<T: DeserializeOwned>(&self, path_and_query: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!("GET {}", url);

        let response = Self::check_status(self.http.get(&url).send().await?).await?;
        let envelope: ApiResponse<T> = response.json().await?;
        Self::unwrap_envelope(envelope)
    }

    async fn get_signed<T: DeserializeOwned>(
        &self,
        creds: &Credentials,
        path_and_query: &str,
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path_and_query);
        debug!("GET (signed) {}", url);

        let mut request = self.http.get(&url);
        for (name, value) in Self::signed_headers(creds, "GET", path_and_query, "") {
            request = request.header(name, value);
        }

        let response = Self::check_status(request.send().await?).await?;
        let envelope: ApiResponse<T> = response.json().await?;
        Self::unwrap_envelope(envelope)
    }

    async fn post_signed<T: DeserializeOwned>(
        &self,
        creds: &Credentials,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<Option<T>> {
        let url = format!("{}{}", self.base_url, path);
        let body_text = serde_json::to_string(body)?;
        debug!("POST (signed) {} {}", url, body_text);

        let mut request = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body_text.clone());
        for (name, value) in Self::signed_headers(creds, "POST", path, &body_text) {
            request = request.header(name, value);
        }

        let response = Self::check_status(request.send().await?).await?;
        let envelope: ApiResponse<T> = response.json().await?;
        Self::unwrap_envelope(envelope)
    }

    /// Refresh the symbol listing, remembering each pair's base increment
    async fn fetch_symbols(&self) -> Result<Vec<SymbolInfo>> {
        let listing: Vec<SymbolInfo> = self
            .get_public("/api/v1/symbols")
            .await?
            .unwrap_or_default();

        let mut increments = self.increments.write().await;
        for info in &listing {
            increments.insert(info.symbol.clone(), info.base_increment.clone());
        }

        Ok(listing)
    }
}

/// Truncate `amount` down to a multiple of the exchange's base increment,
/// expressed as a decimal string like "0.0001".
fn truncate_to_increment(amount: f64, increment: &str) -> f64 {
    let decimals = increment
        .split('.')
        .nth(1)
        .map(|fraction| fraction.trim_end_matches('0').len())
        .unwrap_or(0);

    let factor = 10f64.powi(decimals as i32);
    (amount * factor).floor() / factor
}

/// Format a price or size the way the order endpoint expects: plain decimal,
/// no exponent, no trailing zeros.
fn format_decimal(value: f64) -> String {
    let text = format!("{:.8}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text.is_empty() {
        "0".to_string()
    } else {
        text.to_string()
    }
}

fn parse_price(text: &str) -> Result<f64> {
    text.parse::<f64>()
        .map_err(|e| Error::Serialization(format!("bad decimal {:?}: {}", text, e)))
}

#[async_trait]
impl ExchangeGateway for KucoinGateway {
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let data: Option<TickerData> = self
            .get_public(&format!(
                "/api/v1/market/orderbook/level1?symbol={}",
                symbol
            ))
            .await?;

        match data.and_then(|ticker| ticker.price) {
            Some(price) => parse_price(&price),
            None => Err(Error::PriceUnavailable(symbol.to_string())),
        }
    }

    async fn get_order_book(&self, symbol: &str) -> Result<OrderBook> {
        let data: Option<DepthData> = self
            .get_public(&format!(
                "/api/v1/market/orderbook/level2_20?symbol={}",
                symbol
            ))
            .await?;

        let Some(depth) = data else {
            return Ok(OrderBook::default());
        };

        let parse_side = |levels: Vec<[String; 2]>| -> Result<Vec<(f64, f64)>> {
            levels
                .into_iter()
                .map(|[price, size]| Ok((parse_price(&price)?, parse_price(&size)?)))
                .collect()
        };

        Ok(OrderBook {
            bids: parse_side(depth.bids)?,
            asks: parse_side(depth.asks)?,
        })
    }

    async fn get_balance(&self) -> Result<f64> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(Error::AuthRequired("get_balance"))?;

        let accounts: Vec<AccountEntry> = self
            .get_signed(
                creds,
                &format!(
                    "/api/v1/accounts?currency={}&type=trade",
                    self.quote_currency
                ),
            )
            .await?
            .unwrap_or_default();

        let mut total = 0.0;
        for entry in accounts {
            total += parse_price(&entry.available)?;
        }
        Ok(total)
    }

    async fn amount_to_precision(&self, symbol: &str, amount: f64) -> Result<f64> {
        let cached = self.increments.read().await.get(symbol).cloned();

        let increment = match cached {
            Some(increment) => increment,
            None => {
                // New listings won't be in the cache yet
                self.fetch_symbols().await?;
                self.increments
                    .read()
                    .await
                    .get(symbol)
                    .cloned()
                    .ok_or_else(|| Error::SymbolNotListed(symbol.to_string()))?
            }
        };

        Ok(truncate_to_increment(amount, &increment))
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        price: f64,
    ) -> Result<OrderConfirmation> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or(Error::AuthRequired("place_order"))?;

        let body = serde_json::json!({
            "clientOid": Uuid::new_v4().to_string(),
            "side": side.as_str(),
            "symbol": symbol,
            "type": "limit",
            "price": format_decimal(price),
            "size": format_decimal(quantity),
        });

        let data: Option<OrderData> = self.post_signed(creds, "/api/v1/orders", &body).await?;
        let order = data.ok_or_else(|| {
            Error::ExchangeRejected("order accepted without an order id".to_string())
        })?;

        info!(
            "Placed {} order {} for {} {} @ {}",
            side, order.order_id, quantity, symbol, price
        );

        Ok(OrderConfirmation {
            order_id: order.order_id,
            symbol: symbol.to_string(),
            side,
            quantity,
            price,
        })
    }

    async fn list_symbols(&self) -> Result<HashSet<String>> {
        let listing = self.fetch_symbols().await?;

        Ok(listing
            .into_iter()
            .filter(|info| info.enable_trading && info.quote_currency == self.quote_currency)
            .map(|info| info.symbol)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_to_increment() {
        assert_eq!(truncate_to_increment(1.23456, "0.01"), 1.23);
        assert_eq!(truncate_to_increment(1.23456, "0.0001"), 1.2345);
        assert_eq!(truncate_to_increment(17.9, "1"), 17.0);
        // Trailing zeros in the increment don't add precision
        assert_eq!(truncate_to_increment(1.2345, "0.0100"), 1.23);
    }

    #[test]
    fn test_format_decimal() {
        assert_eq!(format_decimal(12.5), "12.5");
        assert_eq!(format_decimal(0.0000001), "0.0000001");
        assert_eq!(format_decimal(3.0), "3");
    }

    #[test]
    fn test_envelope_error_mapping() {
        let rate_limited: ApiResponse<TickerData> = serde_json::from_str(
            r#"{"code":"429000","msg":"Too Many Requests"}"#,
        )
        .unwrap();
        assert!(matches!(
            KucoinGateway::unwrap_envelope(rate_limited),
            Err(Error::RateLimited(_))
        ));

        let rejected: ApiResponse<TickerData> =
            serde_json::from_str(r#"{"code":"200004","msg":"Balance insufficient"}"#).unwrap();
        assert!(matches!(
            KucoinGateway::unwrap_envelope(rejected),
            Err(Error::ExchangeRejected(_))
        ));
    }

    #[test]
    fn test_symbol_listing_parse() {
        let payload = r#"{
            "code": "200000",
            "data": [
                {"symbol": "BTC-USDT", "enableTrading": true, "quoteCurrency": "USDT", "baseIncrement": "0.00000001"},
                {"symbol": "KLCS-USDT", "enableTrading": false, "quoteCurrency": "USDT", "baseIncrement": "0.0001"},
                {"symbol": "ETH-BTC", "enableTrading": true, "quoteCurrency": "BTC", "baseIncrement": "0.0001"}
            ]
        }"#;

        let envelope: ApiResponse<Vec<SymbolInfo>> = serde_json::from_str(payload).unwrap();
        let listing = KucoinGateway::unwrap_envelope(envelope).unwrap().unwrap();
        assert_eq!(listing.len(), 3);

        let tradeable: Vec<&SymbolInfo> = listing
            .iter()
            .filter(|info| info.enable_trading && info.quote_currency == "USDT")
            .collect();
        assert_eq!(tradeable.len(), 1);
        assert_eq!(tradeable[0].symbol, "BTC-USDT");
    }

    #[test]
    fn test_signature_is_deterministic_base64() {
        let a = KucoinGateway::sign("secret", "1700000000000GET/api/v1/accounts");
        let b = KucoinGateway::sign("secret", "1700000000000GET/api/v1/accounts");
        assert_eq!(a, b);

        // HMAC-SHA256 output is 32 bytes -> 44 base64 chars
        assert_eq!(a.len(), 44);
        assert!(BASE64.decode(&a).is_ok());
    }

    #[tokio::test]
    async fn test_read_only_gateway_lacks_trading_capability() {
        let gateway = KucoinGateway::read_only(&crate::config::ExchangeConfig::default()).unwrap();

        assert!(matches!(
            gateway.get_balance().await,
            Err(Error::AuthRequired("get_balance"))
        ));
        assert!(matches!(
            gateway
                .place_order("BTC-USDT", OrderSide::Buy, 1.0, 10.0)
                .await,
            Err(Error::AuthRequired("place_order"))
        ));
    }
}
