//! Durable on-disk state
//!
//! Three small JSON files make restarts safe: the open-position record, the
//! traded-pairs ledger and the cached symbol list. All writes go through
//! write-then-rename so a crash mid-write can never leave a partial file;
//! readers treat a missing or empty file as "no state", never as an error.

pub mod ledger;
pub mod position;
pub mod symbols;

pub use ledger::TradeLedger;
pub use position::{Position, PositionStore};
pub use symbols::SymbolCache;

use std::path::Path;

use crate::error::{Error, Result};

/// Durable overwrite: write to a temp file in the same directory, then rename.
pub(crate) async fn write_atomic(path: &Path, data: &str) -> Result<()> {
    let tmp = path.with_extension("json.tmp");

    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| Error::Persistence(format!("write {}: {}", tmp.display(), e)))?;

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::Persistence(format!("rename to {}: {}", path.display(), e)))?;

    Ok(())
}

/// Read a state file, mapping "missing" and "empty" to `None`.
pub(crate) async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(data) if data.trim().is_empty() => Ok(None),
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Persistence(format!(
            "read {}: {}",
            path.display(),
            e
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        assert!(read_optional(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        tokio::fs::write(&path, "  \n").await.unwrap();

        assert!(read_optional(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_atomic_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        write_atomic(&path, "[\"A-USDT\"]").await.unwrap();
        assert_eq!(
            read_optional(&path).await.unwrap().unwrap(),
            "[\"A-USDT\"]"
        );

        // Overwrite replaces, never appends
        write_atomic(&path, "[]").await.unwrap();
        assert_eq!(read_optional(&path).await.unwrap().unwrap(), "[]");
    }
}
