//! Open-position record
//!
//! At most one position exists at any time. It is persisted the instant a buy
//! is confirmed, and cleared only after the matching sell is confirmed and the
//! traded-pairs ledger updated. A record found on startup means the process
//! died while holding: the engine resumes straight into Holding and never
//! re-issues the buy.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A single open spot position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Trading pair in exchange-native format, e.g. "KLCS-USDT"
    pub symbol: String,
    /// Price paid per unit
    #[serde(rename = "buy_price")]
    pub entry_price: f64,
    /// Units held, post-fee-adjusted
    pub quantity: f64,
    /// Entry timestamp; absent in records written by older versions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<chrono::DateTime<chrono::Utc>>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, entry_price: f64, quantity: f64) -> Self {
        Self {
            symbol: symbol.into(),
            entry_price,
            quantity,
            entry_time: Some(chrono::Utc::now()),
        }
    }

    /// Unrealized P&L percentage at `current_price`
    pub fn unrealized_pnl_pct(&self, current_price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        ((current_price - self.entry_price) / self.entry_price) * 100.0
    }
}

/// Persisted record of the currently open position
pub struct PositionStore {
    path: PathBuf,
}

impl PositionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("open_position.json"),
        }
    }

    /// Durable write, overwriting any prior record
    pub async fn save(&self, position: &Position) -> Result<()> {
        let data = serde_json::to_string_pretty(position)
            .map_err(|e| Error::Persistence(e.to_string()))?;

        super::write_atomic(&self.path, &data).await?;

        info!(
            "Persisted open position: {} qty {} @ {}",
            position.symbol, position.quantity, position.entry_price
        );
        Ok(())
    }

    /// Load the persisted position, if any. Used once at startup to detect a
    /// crash while a position was open.
    pub async fn load(&self) -> Result<Option<Position>> {
        let Some(data) = super::read_optional(&self.path).await? else {
            return Ok(None);
        };

        let position: Position =
            serde_json::from_str(&data).map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(Some(position))
    }

    /// Remove the record; called only after the matching sell confirmed and
    /// the ledger was updated.
    pub async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Cleared open position record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Persistence(format!(
                "remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
