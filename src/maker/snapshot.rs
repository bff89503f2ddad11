use crate::events::{MakerEvent, SyncPhase, XmrBalance};
use crate::swap::Coin;
use std::collections::BTreeMap;

/// What is known about the running maker, folded from its event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MakerSnapshot {
    pub running: bool,
    /// SOCKS address the engine reported, None when it runs without a proxy.
    pub proxy: Option<String>,
    pub peer_id: Option<String>,
    pub multiaddr: Option<String>,
    pub monero_address: Option<String>,
    pub xmr_balance: Option<XmrBalance>,
    /// Satoshi.
    pub btc_balance: Option<u64>,
    pub sync: BTreeMap<Coin, SyncPhase>,
    pub external_address: Option<String>,
    /// Satoshi earned since the maker was started.
    pub earned_btc: u64,
    pub last_error: Option<String>,
}

impl MakerSnapshot {
    pub fn started() -> Self {
        Self {
            running: true,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, event: &MakerEvent) {
        match event {
            MakerEvent::ProxyStatus { proxy } => self.proxy = proxy.clone(),
            MakerEvent::Initialized {
                monero_address,
                peer_id,
                multiaddr,
                xmr_balance,
                btc_balance,
            } => {
                self.monero_address = Some(monero_address.clone());
                self.peer_id = Some(peer_id.clone());
                self.multiaddr = Some(multiaddr.clone());
                self.xmr_balance = Some(*xmr_balance);
                self.btc_balance = Some(*btc_balance);
            }
            MakerEvent::WalletSync { coin, phase, .. } => {
                self.sync.insert(*coin, *phase);
            }
            MakerEvent::RendezvousRegistration { external_address } => {
                self.external_address = Some(external_address.clone());
            }
            MakerEvent::XmrBalance(balance) => self.xmr_balance = Some(*balance),
            MakerEvent::XmrBalanceError(error) => self.last_error = Some(error.clone()),
            MakerEvent::WalletInitFailed { coin } => {
                self.last_error = Some(format!("{} wallet failed to initialize", coin));
            }
            MakerEvent::EarnedBtc { amount } => {
                self.earned_btc = self.earned_btc.saturating_add(*amount);
            }
            MakerEvent::Swap { .. } | MakerEvent::SwarmSetup => {}
        }
    }

    pub fn is_synced(&self) -> bool {
        [Coin::Btc, Coin::Xmr]
            .iter()
            .all(|coin| self.sync.get(coin) == Some(&SyncPhase::Synced))
    }
}

/// Broadcast to maker subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MakerUpdate {
    Started,
    Event(MakerEvent),
    /// Tearing down and starting again after `reason`.
    Restarting { reason: String },
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_events() {
        let mut snapshot = MakerSnapshot::started();
        snapshot.apply(&MakerEvent::Initialized {
            monero_address: "4abc".to_string(),
            peer_id: "12D3Koo".to_string(),
            multiaddr: "/ip4/127.0.0.1/tcp/9939".to_string(),
            xmr_balance: XmrBalance {
                total: 10,
                unlocked: 5,
            },
            btc_balance: 1000,
        });
        snapshot.apply(&MakerEvent::XmrBalance(XmrBalance {
            total: 20,
            unlocked: 20,
        }));
        snapshot.apply(&MakerEvent::EarnedBtc { amount: 300 });
        snapshot.apply(&MakerEvent::EarnedBtc { amount: 200 });

        assert_eq!(snapshot.peer_id.as_deref(), Some("12D3Koo"));
        assert_eq!(snapshot.xmr_balance.map(|b| b.total), Some(20));
        assert_eq!(snapshot.btc_balance, Some(1000));
        assert_eq!(snapshot.earned_btc, 500);
    }

    #[test]
    fn test_synced_needs_both_wallets() {
        let mut snapshot = MakerSnapshot::started();
        snapshot.apply(&MakerEvent::WalletSync {
            coin: Coin::Btc,
            phase: SyncPhase::Synced,
            duration: None,
        });
        assert!(!snapshot.is_synced());
        snapshot.apply(&MakerEvent::WalletSync {
            coin: Coin::Xmr,
            phase: SyncPhase::Synced,
            duration: Some("2s".to_string()),
        });
        assert!(snapshot.is_synced());
    }
}
