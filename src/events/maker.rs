//! Typed events from the maker engine's JSON log.

use crate::swap::{Coin, LockTxid, SwapStatus};
use serde_json::{Map, Value};

/// `state` value the engine reports for a swap that ended with our BTC redeemed.
const BTC_REDEEMED_STATE: &str = "BTC IS REDEEMED";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XmrBalance {
    /// Piconero.
    pub total: u64,
    /// Piconero spendable right now.
    pub unlocked: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Initialized,
    Syncing,
    Synced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapProgress {
    Started,
    BtcLockSeen,
    /// BTC lock never showed up in the mempool.
    BtcLockNotSeen,
    BtcLocked,
    /// BTC lock did not confirm in time.
    BtcLockUnconfirmed,
    XmrLockProof { txid: String },
    BtcRedeemFailed { error: String },
    CancelBroadcast { txid: String },
    Refunded,
    PunishBroadcast { txid: String },
    RedeemBroadcast { txid: String },
    Completed { state: String },
    Failed { error: String },
}

impl SwapProgress {
    /// Status the maker's session moves to, if this step changes it.
    pub fn status(&self) -> Option<SwapStatus> {
        match self {
            SwapProgress::Started => Some(SwapStatus::Started),
            SwapProgress::BtcLocked => Some(SwapStatus::BtcLocked),
            SwapProgress::XmrLockProof { .. } => Some(SwapStatus::XmrLocked),
            SwapProgress::CancelBroadcast { .. } => Some(SwapStatus::Cancelled),
            SwapProgress::Refunded => Some(SwapStatus::Refunded),
            SwapProgress::PunishBroadcast { .. } => Some(SwapStatus::Punished),
            SwapProgress::RedeemBroadcast { .. } => Some(SwapStatus::BtcRedeemed),
            SwapProgress::Completed { .. } if self.is_success() => Some(SwapStatus::BtcRedeemed),
            _ => None,
        }
    }

    pub fn lock_txid(&self) -> Option<LockTxid> {
        match self {
            SwapProgress::XmrLockProof { txid } => Some(LockTxid::xmr(txid.clone())),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SwapProgress::Completed { state } if state == BTC_REDEEMED_STATE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MakerEvent {
    ProxyStatus {
        proxy: Option<String>,
    },
    Initialized {
        monero_address: String,
        peer_id: String,
        multiaddr: String,
        xmr_balance: XmrBalance,
        /// Satoshi.
        btc_balance: u64,
    },
    WalletSync {
        coin: Coin,
        phase: SyncPhase,
        duration: Option<String>,
    },
    SwarmSetup,
    RendezvousRegistration {
        external_address: String,
    },
    XmrBalance(XmrBalance),
    XmrBalanceError(String),
    WalletInitFailed {
        coin: Coin,
    },
    /// Satoshi earned by a completed swap.
    EarnedBtc {
        amount: u64,
    },
    Swap {
        swap_id: String,
        progress: SwapProgress,
    },
}

/// Parse one log line. Returns None for malformed lines, lines without a
/// `message`, unknown event names, and known events missing a required field.
pub fn parse_maker_line(line: &str) -> Option<MakerEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let document: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::trace!("Skipping unparseable maker log line: {}", e);
            return None;
        }
    };
    let object = document.as_object()?;
    let fields = match object.get("fields").and_then(Value::as_object) {
        Some(fields) => fields,
        None => object,
    };
    let fields = Fields(fields);
    let message = fields.string("message")?;
    translate(&message, &fields)
}

fn translate(message: &str, fields: &Fields<'_>) -> Option<MakerEvent> {
    let event = match message {
        "Not using SOCKS5 proxy" => MakerEvent::ProxyStatus { proxy: None },
        "Using SOCKS5 proxy at" => MakerEvent::ProxyStatus {
            proxy: fields.string("proxy_string"),
        },
        "ASB_INITIALIZED" => MakerEvent::Initialized {
            monero_address: fields.string("monero_address")?,
            peer_id: fields.string("asb_peer_id")?,
            multiaddr: fields.string("multiaddr")?,
            xmr_balance: XmrBalance {
                total: fields.amount("monero_balance.balance")?,
                unlocked: fields.amount("monero_balance.unlocked_balance")?,
            },
            btc_balance: fields.amount("bitcoin_balance")?,
        },
        "ASB_SETTING_UP_LIBP2P_SWARM" => MakerEvent::SwarmSetup,
        "ASB_REGISTERING_ADDRESS_WITH_RENDEZVOUS" => MakerEvent::RendezvousRegistration {
            external_address: fields.string("external_address")?,
        },
        "ASB_XMR_BALANCE_DATA" => match fields.string("error") {
            Some(error) => MakerEvent::XmrBalanceError(error),
            None => MakerEvent::XmrBalance(XmrBalance {
                total: fields.amount("balance.balance")?,
                unlocked: fields.amount("balance.unlocked_balance")?,
            }),
        },
        "ASB_ERROR_INITIALIZING_XMR_WALLET" => MakerEvent::WalletInitFailed { coin: Coin::Xmr },
        "ASB_ERROR_INITIALIZING_BTC_WALLET" => MakerEvent::WalletInitFailed { coin: Coin::Btc },
        "ASB_EARNED_BTC" => MakerEvent::EarnedBtc {
            amount: fields.amount("earned")?,
        },
        other => {
            if let Some(sync) = wallet_sync(other, fields) {
                return Some(sync);
            }
            let progress = swap_progress(other, fields)?;
            MakerEvent::Swap {
                swap_id: fields.string("swap_id")?,
                progress,
            }
        }
    };
    Some(event)
}

fn wallet_sync(message: &str, fields: &Fields<'_>) -> Option<MakerEvent> {
    let (phase, coin) = message
        .strip_prefix("ASB_")?
        .strip_suffix("_WALLET")?
        .split_once('_')?;
    let phase = match phase {
        "INITIALIZED" => SyncPhase::Initialized,
        "SYNCING" => SyncPhase::Syncing,
        "SYNCED" => SyncPhase::Synced,
        _ => return None,
    };
    let coin = match coin {
        "MONERO" => Coin::Xmr,
        "BITCOIN" => Coin::Btc,
        _ => return None,
    };
    Some(MakerEvent::WalletSync {
        coin,
        phase,
        duration: fields.string("duration"),
    })
}

fn swap_progress(message: &str, fields: &Fields<'_>) -> Option<SwapProgress> {
    let progress = match message {
        "ASB_SWAP_STARTED" => SwapProgress::Started,
        "ASB_BTC_LOCK_SEEN" => SwapProgress::BtcLockSeen,
        "ASB_BTC_LOCK_SEEN_ERR" => SwapProgress::BtcLockNotSeen,
        "ASB_BTC_LOCK" => SwapProgress::BtcLocked,
        "ASB_BTC_LOCK_ERR" => SwapProgress::BtcLockUnconfirmed,
        "ASB_XMR_LOCK_PROOF" => SwapProgress::XmrLockProof {
            txid: fields.string("txid")?,
        },
        "ASB_BTC_REDEEM_ERR" => SwapProgress::BtcRedeemFailed {
            error: fields.string("error").unwrap_or_default(),
        },
        "ASB_CANCEL_TX" => SwapProgress::CancelBroadcast {
            txid: fields.string("txid")?,
        },
        "ASB_REFUND" => SwapProgress::Refunded,
        "ASB_PUNISH_TX" => SwapProgress::PunishBroadcast {
            txid: fields.string("txid")?,
        },
        "ASB_REDEEM_TX" => SwapProgress::RedeemBroadcast {
            txid: fields.string("txid")?,
        },
        "ASB_SWAP_COMPLETE" => SwapProgress::Completed {
            state: fields.string("state")?.to_uppercase(),
        },
        "ASB_SWAP_FAIL" => SwapProgress::Failed {
            error: fields.string("error").unwrap_or_default(),
        },
        _ => return None,
    };
    Some(progress)
}

/// The engine writes most values as strings, some as numbers.
struct Fields<'a>(&'a Map<String, Value>);

impl Fields<'_> {
    fn string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn amount(&self, key: &str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialized_with_string_amounts() {
        let line = r#"{"timestamp":"t","level":"INFO","fields":{"message":"ASB_INITIALIZED","monero_address":"4abc","asb_peer_id":"12D3KooW","multiaddr":"/onion3/x:9939","monero_balance.balance":"1000","monero_balance.unlocked_balance":"400","bitcoin_balance":"52000"}}"#;
        assert_eq!(
            parse_maker_line(line),
            Some(MakerEvent::Initialized {
                monero_address: "4abc".into(),
                peer_id: "12D3KooW".into(),
                multiaddr: "/onion3/x:9939".into(),
                xmr_balance: XmrBalance {
                    total: 1000,
                    unlocked: 400
                },
                btc_balance: 52000,
            })
        );
    }

    #[test]
    fn test_top_level_fields_are_accepted() {
        let line = r#"{"message":"ASB_EARNED_BTC","earned":1500}"#;
        assert_eq!(
            parse_maker_line(line),
            Some(MakerEvent::EarnedBtc { amount: 1500 })
        );
    }

    #[test]
    fn test_wallet_sync_phases() {
        let line = r#"{"fields":{"message":"ASB_SYNCED_BITCOIN_WALLET","duration":"3.2s"}}"#;
        assert_eq!(
            parse_maker_line(line),
            Some(MakerEvent::WalletSync {
                coin: Coin::Btc,
                phase: SyncPhase::Synced,
                duration: Some("3.2s".into()),
            })
        );
        let line = r#"{"fields":{"message":"ASB_SYNCING_MONERO_WALLET"}}"#;
        assert!(matches!(
            parse_maker_line(line),
            Some(MakerEvent::WalletSync {
                coin: Coin::Xmr,
                phase: SyncPhase::Syncing,
                ..
            })
        ));
    }

    #[test]
    fn test_proxy_status() {
        let line = r#"{"fields":{"message":"Using SOCKS5 proxy at","proxy_string":"127.0.0.1:9050"}}"#;
        assert_eq!(
            parse_maker_line(line),
            Some(MakerEvent::ProxyStatus {
                proxy: Some("127.0.0.1:9050".into())
            })
        );
        let line = r#"{"fields":{"message":"Not using SOCKS5 proxy"}}"#;
        assert_eq!(
            parse_maker_line(line),
            Some(MakerEvent::ProxyStatus { proxy: None })
        );
    }

    #[test]
    fn test_swap_complete_success_depends_on_state() {
        let line = r#"{"fields":{"message":"ASB_SWAP_COMPLETE","swap_id":"a1b2","state":"btc is redeemed"}}"#;
        let Some(MakerEvent::Swap { swap_id, progress }) = parse_maker_line(line) else {
            panic!("expected swap event");
        };
        assert_eq!(swap_id, "a1b2");
        assert!(progress.is_success());
        assert_eq!(progress.status(), Some(SwapStatus::BtcRedeemed));

        let line = r#"{"fields":{"message":"ASB_SWAP_COMPLETE","swap_id":"a1b2","state":"xmr is refunded"}}"#;
        let Some(MakerEvent::Swap { progress, .. }) = parse_maker_line(line) else {
            panic!("expected swap event");
        };
        assert!(!progress.is_success());
        assert_eq!(progress.status(), None);
    }

    #[test]
    fn test_xmr_lock_proof_carries_txid() {
        let line = r#"{"fields":{"message":"ASB_XMR_LOCK_PROOF","swap_id":"a1b2","txid":"f00d"}}"#;
        let Some(MakerEvent::Swap { progress, .. }) = parse_maker_line(line) else {
            panic!("expected swap event");
        };
        assert_eq!(progress.lock_txid(), Some(LockTxid::xmr("f00d")));
        assert_eq!(progress.status(), Some(SwapStatus::XmrLocked));
    }

    #[test]
    fn test_balance_error() {
        let line = r#"{"fields":{"message":"ASB_XMR_BALANCE_DATA","error":"wallet busy"}}"#;
        assert_eq!(
            parse_maker_line(line),
            Some(MakerEvent::XmrBalanceError("wallet busy".into()))
        );
    }

    #[test]
    fn test_unknown_and_malformed_lines_are_skipped() {
        assert_eq!(parse_maker_line(""), None);
        assert_eq!(parse_maker_line("not json"), None);
        assert_eq!(parse_maker_line("[1,2,3]"), None);
        assert_eq!(parse_maker_line(r#"{"fields":{"level":"INFO"}}"#), None);
        assert_eq!(
            parse_maker_line(r#"{"fields":{"message":"Connected to Electrum"}}"#),
            None
        );
        // Known event missing a required field
        assert_eq!(
            parse_maker_line(r#"{"fields":{"message":"ASB_SWAP_STARTED"}}"#),
            None
        );
    }
}
