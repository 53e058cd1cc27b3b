//! Traded-pairs ledger
//!
//! Append-only set of symbols that completed a full buy -> sell cycle.
//! Presence permanently excludes a symbol from future cycles for the life of
//! the ledger file. There is no un-trade operation.

use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Persisted at-most-once-per-pair ledger
pub struct TradeLedger {
    path: PathBuf,
    symbols: RwLock<Vec<String>>,
}

impl TradeLedger {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("traded_pairs.json"),
            symbols: RwLock::new(Vec::new()),
        }
    }

    /// Merge the persisted set into memory. An absent backing file is an
    /// empty ledger, not an error.
    pub async fn load(&self) -> Result<()> {
        let Some(data) = super::read_optional(&self.path).await? else {
            debug!("No traded-pairs file, starting with empty ledger");
            return Ok(());
        };

        let persisted: Vec<String> =
            serde_json::from_str(&data).map_err(|e| Error::Persistence(e.to_string()))?;

        let mut symbols = self.symbols.write().await;
        for symbol in persisted {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        info!("Loaded {} traded pairs from ledger", symbols.len());
        Ok(())
    }

    pub async fn contains(&self, symbol: &str) -> bool {
        self.symbols.read().await.iter().any(|s| s == symbol)
    }

    /// Idempotent add; persists durably before returning. Once this returns
    /// Ok the symbol is excluded from all future cycles, across restarts.
    pub async fn record(&self, symbol: &str) -> Result<()> {
        let mut symbols = self.symbols.write().await;

        if !symbols.iter().any(|s| s == symbol) {
            symbols.push(symbol.to_string());
        }

        let data = serde_json::to_string_pretty(&*symbols)
            .map_err(|e| Error::Persistence(e.to_string()))?;
        super::write_atomic(&self.path, &data).await?;

        info!("Recorded {} in traded-pairs ledger", symbol);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.symbols.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.symbols.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_file_is_empty_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TradeLedger::new(dir.path());

        ledger.load().await.unwrap();
        assert!(ledger.is_empty().await);
        assert!(!ledger.contains("X-USDT").await);
    }

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TradeLedger::new(dir.path());

        ledger.record("X-USDT").await.unwrap();
        ledger.record("X-USDT").await.unwrap();

        assert_eq!(ledger.len().await, 1);
        assert!(ledger.contains("X-USDT").await);

        // The persisted file holds the symbol exactly once
        let data = tokio::fs::read_to_string(dir.path().join("traded_pairs.json"))
            .await
            .unwrap();
        let persisted: Vec<String> = serde_json::from_str(&data).unwrap();
        assert_eq!(persisted, vec!["X-USDT".to_string()]);
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();

        {
            let ledger = TradeLedger::new(dir.path());
            ledger.record("X-USDT").await.unwrap();
            ledger.record("Y-USDT").await.unwrap();
        }

        let ledger = TradeLedger::new(dir.path());
        ledger.load().await.unwrap();
        assert_eq!(ledger.len().await, 2);
        assert!(ledger.contains("X-USDT").await);
        assert!(ledger.contains("Y-USDT").await);
    }
}
