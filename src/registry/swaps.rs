use super::RawJsonDb;
use crate::error::{Error, Result};
use crate::swap::{Coin, LockTxid};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SWAPS_DB: &str = "swaps";

/// Wallet sub-account that funds and receives a swap when nothing else was recorded.
pub const DEFAULT_ACCOUNT_INDEX: u32 = 2_147_483_643;

/// One swap's persisted metadata, stored under `"swap_" + swap_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swaps_account: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub btc_lock_txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmr_lock_txid: Option<String>,
    /// Fields written by other tools are carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistryEntry {
    pub fn lock_txid(&self, coin: Coin) -> Option<&str> {
        match coin {
            Coin::Btc => self.btc_lock_txid.as_deref(),
            Coin::Xmr => self.xmr_lock_txid.as_deref(),
        }
    }

    fn lock_txid_mut(&mut self, coin: Coin) -> &mut Option<String> {
        match coin {
            Coin::Btc => &mut self.btc_lock_txid,
            Coin::Xmr => &mut self.xmr_lock_txid,
        }
    }

    pub fn lock_txids(&self) -> BTreeMap<Coin, String> {
        [Coin::Btc, Coin::Xmr]
            .into_iter()
            .filter_map(|coin| self.lock_txid(coin).map(|txid| (coin, txid.to_string())))
            .collect()
    }
}

/// Swap metadata that must survive an application restart: the account
/// index a swap was funded from and its lock transaction ids.
pub struct SwapsRegistry {
    db: Arc<RawJsonDb>,
}

impl SwapsRegistry {
    pub fn new(db: Arc<RawJsonDb>) -> Self {
        Self { db }
    }

    fn key(swap_id: &str) -> String {
        format!("swap_{}", swap_id)
    }

    pub fn entry(&self, swap_id: &str) -> Result<Option<RegistryEntry>> {
        self.db
            .get(SWAPS_DB, &Self::key(swap_id))?
            .map(parse_entry)
            .transpose()
    }

    /// Account index recorded for the swap, or [`DEFAULT_ACCOUNT_INDEX`].
    pub fn account_index(&self, swap_id: &str) -> Result<u32> {
        Ok(self
            .entry(swap_id)?
            .and_then(|e| e.swaps_account)
            .unwrap_or(DEFAULT_ACCOUNT_INDEX))
    }

    pub fn set_account_index(&self, swap_id: &str, account_index: u32) -> Result<()> {
        self.modify(swap_id, |entry| {
            entry.swaps_account = Some(account_index);
            true
        })?;
        Ok(())
    }

    /// Record a lock txid unless the coin already has one. Returns true if written.
    pub fn append_lock_txid(&self, swap_id: &str, lock: &LockTxid) -> Result<bool> {
        let written = self.modify(swap_id, |entry| {
            let slot = entry.lock_txid_mut(lock.coin);
            match slot {
                Some(existing) => {
                    if existing.as_str() != lock.txid {
                        tracing::warn!(
                            "Swap {} already has {} lock txid {}, keeping it over {}",
                            swap_id,
                            lock.coin,
                            existing,
                            lock.txid
                        );
                    }
                    false
                }
                None => {
                    *slot = Some(lock.txid.clone());
                    true
                }
            }
        })?;
        if written {
            tracing::debug!("Persisted {} lock txid for swap {}", lock.coin, swap_id);
        }
        Ok(written)
    }

    pub fn lock_txids(&self, swap_id: &str) -> Result<BTreeMap<Coin, String>> {
        Ok(self
            .entry(swap_id)?
            .map(|e| e.lock_txids())
            .unwrap_or_default())
    }

    /// Swap ids with a registry entry.
    pub fn swap_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .db
            .keys(SWAPS_DB)?
            .into_iter()
            .filter_map(|k| k.strip_prefix("swap_").map(str::to_string))
            .collect())
    }

    /// Read-modify-write of one entry. `f` returns whether it changed anything;
    /// an unchanged entry is not rewritten.
    fn modify<F>(&self, swap_id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut RegistryEntry) -> bool,
    {
        let mut changed = false;
        let mut failure = None;
        self.db.update(SWAPS_DB, &Self::key(swap_id), |current| {
            let mut entry = match current.cloned().map(parse_entry).transpose() {
                Ok(entry) => entry.unwrap_or_default(),
                Err(e) => {
                    failure = Some(e);
                    return current.cloned().unwrap_or(Value::Null);
                }
            };
            changed = f(&mut entry);
            serde_json::to_value(&entry).unwrap_or_else(|e| {
                failure = Some(Error::Registry(format!("Failed to encode entry: {}", e)));
                current.cloned().unwrap_or(Value::Null)
            })
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(changed),
        }
    }
}

fn parse_entry(value: Value) -> Result<RegistryEntry> {
    serde_json::from_value(value)
        .map_err(|e| Error::Registry(format!("Malformed swap entry: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(dir: &tempfile::TempDir) -> SwapsRegistry {
        SwapsRegistry::new(Arc::new(RawJsonDb::open(dir.path()).unwrap()))
    }

    #[test]
    fn test_missing_entry_yields_default_account() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        assert_eq!(registry.account_index("nope").unwrap(), DEFAULT_ACCOUNT_INDEX);
        assert!(registry.lock_txids("nope").unwrap().is_empty());
    }

    #[test]
    fn test_entry_keeps_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("swaps.json"),
            r#"{"swap_a1": {"swaps_account": 4, "note": "imported"}}"#,
        )
        .unwrap();
        let registry = registry(&dir);
        registry.append_lock_txid("a1", &LockTxid::btc("deadbeef")).unwrap();

        let entry = registry.entry("a1").unwrap().unwrap();
        assert_eq!(entry.swaps_account, Some(4));
        assert_eq!(entry.extra["note"], "imported");
        assert_eq!(entry.btc_lock_txid.as_deref(), Some("deadbeef"));
    }

    #[test]
    fn test_malformed_entry_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("swaps.json"),
            r#"{"swap_a1": {"swaps_account": "four"}}"#,
        )
        .unwrap();
        let registry = registry(&dir);
        assert!(registry.set_account_index("a1", 5).is_err());
        let raw = std::fs::read_to_string(dir.path().join("swaps.json")).unwrap();
        assert!(raw.contains("four"));
    }
}
