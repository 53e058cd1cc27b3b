//! Cached tradeable-symbols list
//!
//! The exchange's full symbol listing changes rarely; fetching it every tick
//! wastes the rate-limit budget the sniper needs for price polls. The list is
//! cached in symbols.json and refreshed only when the cache is empty.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{Error, Result};

pub struct SymbolCache {
    path: PathBuf,
    symbols: RwLock<HashSet<String>>,
}

impl SymbolCache {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join("symbols.json"),
            symbols: RwLock::new(HashSet::new()),
        }
    }

    /// Load the cached list; absent file leaves the cache empty.
    pub async fn load(&self) -> Result<()> {
        let Some(data) = super::read_optional(&self.path).await? else {
            debug!("No symbol cache file");
            return Ok(());
        };

        let persisted: Vec<String> =
            serde_json::from_str(&data).map_err(|e| Error::Persistence(e.to_string()))?;

        let mut symbols = self.symbols.write().await;
        *symbols = persisted.into_iter().collect();

        info!("Loaded {} cached symbols", symbols.len());
        Ok(())
    }

    /// Replace the cache with a fresh listing and persist it.
    pub async fn replace(&self, fresh: HashSet<String>) -> Result<()> {
        let mut listing: Vec<&String> = fresh.iter().collect();
        listing.sort();

        let data =
            serde_json::to_string_pretty(&listing).map_err(|e| Error::Persistence(e.to_string()))?;
        super::write_atomic(&self.path, &data).await?;

        let count = fresh.len();
        let mut symbols = self.symbols.write().await;
        *symbols = fresh;

        info!("Refreshed symbol cache with {} symbols", count);
        Ok(())
    }

    pub async fn contains(&self, symbol: &str) -> bool {
        self.symbols.read().await.contains(symbol)
    }

    pub async fn is_empty(&self) -> bool {
        self.symbols.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_refresh_and_reload() {
        let dir = tempfile::tempdir().unwrap();

        {
            let cache = SymbolCache::new(dir.path());
            cache.load().await.unwrap();
            assert!(cache.is_empty().await);

            let fresh: HashSet<String> =
                ["BTC-USDT", "ETH-USDT"].iter().map(|s| s.to_string()).collect();
            cache.replace(fresh).await.unwrap();
            assert!(cache.contains("BTC-USDT").await);
        }

        let cache = SymbolCache::new(dir.path());
        cache.load().await.unwrap();
        assert!(cache.contains("ETH-USDT").await);
        assert!(!cache.contains("DOGE-USDT").await);
    }
}
