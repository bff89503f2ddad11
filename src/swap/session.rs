use super::SwapStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Maker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Buyer => write!(f, "buyer"),
            Role::Maker => write!(f, "maker"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coin {
    Btc,
    Xmr,
}

impl Coin {
    /// Registry field holding this coin's lock transaction id.
    pub fn lock_txid_key(self) -> &'static str {
        match self {
            Coin::Btc => "btc_lock_txid",
            Coin::Xmr => "xmr_lock_txid",
        }
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Coin::Btc => write!(f, "btc"),
            Coin::Xmr => write!(f, "xmr"),
        }
    }
}

/// A lock transaction observed for a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockTxid {
    pub coin: Coin,
    pub txid: String,
}

impl LockTxid {
    pub fn btc(txid: impl Into<String>) -> Self {
        Self {
            coin: Coin::Btc,
            txid: txid.into(),
        }
    }

    pub fn xmr(txid: impl Into<String>) -> Self {
        Self {
            coin: Coin::Xmr,
            txid: txid.into(),
        }
    }
}

/// Snapshot of one swap attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapSession {
    pub swap_id: String,
    pub role: Role,
    pub status: SwapStatus,
    pub account_index: u32,
    /// Append-only: an entry is never overwritten once set.
    pub lock_txids: BTreeMap<Coin, String>,
    pub counterparty_address: Option<String>,
    pub running: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SwapSession {
    pub fn new(swap_id: impl Into<String>, role: Role, account_index: u32) -> Self {
        let now = Utc::now();
        Self {
            swap_id: swap_id.into(),
            role,
            status: SwapStatus::Started,
            account_index,
            lock_txids: BTreeMap::new(),
            counterparty_address: None,
            running: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_counterparty(mut self, address: impl Into<String>) -> Self {
        self.counterparty_address = Some(address.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Record a lock txid unless one is already set for that coin.
    /// Returns true if the txid was added.
    pub fn append_lock_txid(&mut self, lock: &LockTxid) -> bool {
        if self.lock_txids.contains_key(&lock.coin) {
            return false;
        }
        self.lock_txids.insert(lock.coin, lock.txid.clone());
        true
    }
}
