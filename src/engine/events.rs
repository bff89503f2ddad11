use crate::swap::{ErrorEvent, LockTxid, SwapStatus};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Progress the engine reports while a buy or resume call runs.
///
/// Encoded as `{"event": "<Variant>", ...fields}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum BuyerEvent {
    /// Deposit address and accepted range, in satoshi.
    OrderCreated {
        btc_address: String,
        min_sats: u64,
        max_sats: u64,
    },
    BtcReceived {
        new_balance: u64,
        max_giveable: u64,
        min_quantity: u64,
    },
    SwapRunning {
        multiaddr: String,
    },
    BtcLocked {
        txid: String,
    },
    BtcLockConfirmed {
        txid: String,
    },
    XmrLockProofReceived {
        txid: String,
    },
    XmrLockConfirmation {
        txid: String,
        confirmations: u64,
    },
    EncSigSent,
    BtcRedeemed,
    StartRedeemXmrSync,
    StartXmrSweep,
    SwapCompleted,
    SwapCanceled {
        #[serde(default)]
        txid: Option<String>,
    },
    SwapRefunded,
    SwapPunished,
    SafelyAborted,
    SellerQuoteError {
        #[serde(default)]
        error: String,
    },
    Error(ErrorEvent),
    Log {
        message: String,
    },
    /// Raw status report, e.g. from a resumed swap's stored state.
    Status {
        status: SwapStatus,
        #[serde(default)]
        txid: Option<String>,
    },
}

impl BuyerEvent {
    /// Status and lock txid the tracker records for this event, if any.
    pub fn observation(&self) -> Option<(SwapStatus, Option<LockTxid>)> {
        let observed = match self {
            BuyerEvent::OrderCreated { .. } => (SwapStatus::Started, None),
            BuyerEvent::SwapRunning { .. } => (SwapStatus::SetupComplete, None),
            BuyerEvent::BtcLocked { txid } | BuyerEvent::BtcLockConfirmed { txid } => {
                (SwapStatus::BtcLocked, Some(LockTxid::btc(txid.clone())))
            }
            BuyerEvent::XmrLockProofReceived { txid } => (
                SwapStatus::XmrLockProofReceived,
                Some(LockTxid::xmr(txid.clone())),
            ),
            BuyerEvent::EncSigSent => (SwapStatus::EncSigSent, None),
            BuyerEvent::BtcRedeemed => (SwapStatus::BtcRedeemed, None),
            BuyerEvent::SwapCompleted => (SwapStatus::XmrRedeemed, None),
            BuyerEvent::SwapCanceled { .. } => (SwapStatus::Cancelled, None),
            BuyerEvent::SwapRefunded => (SwapStatus::Refunded, None),
            BuyerEvent::SwapPunished => (SwapStatus::Punished, None),
            BuyerEvent::SafelyAborted => (SwapStatus::SafelyAborted, None),
            BuyerEvent::Status { status, txid } => {
                let lock = txid.as_ref().and_then(|txid| match status {
                    SwapStatus::BtcLocked => Some(LockTxid::btc(txid.clone())),
                    SwapStatus::XmrLockProofReceived | SwapStatus::XmrLocked => {
                        Some(LockTxid::xmr(txid.clone()))
                    }
                    _ => None,
                });
                (*status, lock)
            }
            _ => return None,
        };
        Some(observed)
    }

    pub fn from_json(line: &str) -> Option<BuyerEvent> {
        match serde_json::from_str(line.trim()) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::trace!("Skipping engine output line: {}", e);
                None
            }
        }
    }
}

/// Where an engine call delivers its events, and how it learns the session
/// was stopped.
#[derive(Debug, Clone)]
pub struct EventSink {
    swap_id: String,
    events: mpsc::UnboundedSender<BuyerEvent>,
    running: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(
        swap_id: impl Into<String>,
        events: mpsc::UnboundedSender<BuyerEvent>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            swap_id: swap_id.into(),
            events,
            running,
        }
    }

    pub fn swap_id(&self) -> &str {
        &self.swap_id
    }

    /// Deliver an event. Returns false once nobody is listening.
    pub fn emit(&self, event: BuyerEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Engines poll this; false means stop as soon as possible.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swap::{Coin, ErrorKind};

    #[test]
    fn test_wire_format() {
        let event = BuyerEvent::from_json(r#"{"event":"BtcLocked","txid":"deadbeef"}"#).unwrap();
        assert_eq!(
            event,
            BuyerEvent::BtcLocked {
                txid: "deadbeef".into()
            }
        );

        let event = BuyerEvent::from_json(
            r#"{"event":"OrderCreated","btcAddress":"bc1q","minSats":1000,"maxSats":5000}"#,
        )
        .unwrap();
        assert!(matches!(event, BuyerEvent::OrderCreated { max_sats: 5000, .. }));

        let event = BuyerEvent::from_json(
            r#"{"event":"Error","swapId":"a1b2","errorType":"DeserializeCborError","errorMessage":"bad"}"#,
        )
        .unwrap();
        let BuyerEvent::Error(error) = event else {
            panic!("expected error event");
        };
        assert_eq!(error.kind, ErrorKind::DeserializeCborError);
        assert!(error.fatal);
    }

    #[test]
    fn test_unknown_event_is_skipped() {
        assert_eq!(BuyerEvent::from_json(r#"{"event":"Teleported"}"#), None);
        assert_eq!(BuyerEvent::from_json("Starting swap..."), None);
    }

    #[test]
    fn test_observation_carries_lock_txids() {
        let (status, lock) = BuyerEvent::BtcLockConfirmed {
            txid: "deadbeef".into(),
        }
        .observation()
        .unwrap();
        assert_eq!(status, SwapStatus::BtcLocked);
        assert_eq!(lock.unwrap().coin, Coin::Btc);

        let (_, lock) = BuyerEvent::Status {
            status: SwapStatus::XmrLocked,
            txid: Some("f00d".into()),
        }
        .observation()
        .unwrap();
        assert_eq!(lock, Some(LockTxid::xmr("f00d")));

        assert_eq!(BuyerEvent::StartXmrSweep.observation(), None);
        assert_eq!(
            BuyerEvent::SwapCompleted.observation(),
            Some((SwapStatus::XmrRedeemed, None))
        );
    }

    #[test]
    fn test_sink_reports_running_flag() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = Arc::new(AtomicBool::new(true));
        let sink = EventSink::new("a1b2", tx, running.clone());

        assert!(sink.emit(BuyerEvent::EncSigSent));
        assert_eq!(rx.try_recv().unwrap(), BuyerEvent::EncSigSent);
        assert!(sink.is_running());

        running.store(false, Ordering::SeqCst);
        assert!(!sink.is_running());
        drop(rx);
        assert!(!sink.emit(BuyerEvent::EncSigSent));
    }
}
