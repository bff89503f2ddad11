use super::{LockTxid, Role, SwapSession, SwapStatus};
use crate::registry::SwapsRegistry;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Result of [`StateTracker::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Status recorded; `previous` is None for a swap seen for the first time.
    Recorded { previous: Option<SwapStatus> },
    /// Same status reported again. A carried txid may still have been appended.
    Unchanged,
    /// The swap already reached a terminal status that does not accept this report.
    Rejected { current: SwapStatus },
}

/// Latest known status of every swap this process has seen.
///
/// The tracker does not reorder or deduplicate: reports are applied in the
/// order they arrive. It does refuse to move a swap out of a terminal status.
/// Lock txids carried by a report are appended to the session and, when a
/// registry is attached, persisted under the swap's registry entry.
pub struct StateTracker {
    sessions: RwLock<HashMap<String, SwapSession>>,
    registry: Option<Arc<SwapsRegistry>>,
    updates: broadcast::Sender<SwapSession>,
}

impl StateTracker {
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry: None,
            updates,
        }
    }

    pub fn with_registry(registry: Arc<SwapsRegistry>) -> Self {
        Self {
            registry: Some(registry),
            ..Self::new()
        }
    }

    /// Receive a snapshot every time a swap changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SwapSession> {
        self.updates.subscribe()
    }

    /// Start tracking a session, or refresh the bookkeeping fields of one
    /// already tracked. An existing status and lock txids are kept.
    pub fn track(&self, session: SwapSession) -> SwapSession {
        let snapshot = {
            let mut sessions = self.sessions.write();
            let entry = sessions
                .entry(session.swap_id.clone())
                .or_insert_with(|| session.clone());
            entry.role = session.role;
            entry.account_index = session.account_index;
            entry.running = session.running;
            if session.counterparty_address.is_some() {
                entry.counterparty_address = session.counterparty_address.clone();
            }
            for (coin, txid) in &session.lock_txids {
                entry.lock_txids.entry(*coin).or_insert_with(|| txid.clone());
            }
            entry.updated_at = Utc::now();
            entry.clone()
        };
        let _ = self.updates.send(snapshot.clone());
        snapshot
    }

    /// Record a status reported by the engine for `swap_id`.
    pub fn observe(
        &self,
        swap_id: &str,
        reported: SwapStatus,
        lock: Option<&LockTxid>,
    ) -> Observation {
        let (observation, appended, snapshot) = {
            let mut sessions = self.sessions.write();
            let previous = sessions.get(swap_id).map(|s| s.status);
            let session = sessions.entry(swap_id.to_string()).or_insert_with(|| {
                tracing::debug!("First report for untracked swap {}", swap_id);
                let mut fresh =
                    SwapSession::new(swap_id, Role::Buyer, crate::registry::DEFAULT_ACCOUNT_INDEX);
                fresh.status = reported;
                fresh
            });

            if let Some(current) = previous {
                if !current.accepts(reported) {
                    tracing::warn!(
                        "Ignoring {} for swap {}: already terminal at {}",
                        reported,
                        swap_id,
                        current
                    );
                    return Observation::Rejected { current };
                }
            }

            let appended = lock.filter(|l| session.append_lock_txid(l)).cloned();
            let observation = if previous == Some(reported) {
                Observation::Unchanged
            } else {
                session.status = reported;
                Observation::Recorded { previous }
            };
            if reported.is_terminal() {
                session.running = false;
            }
            session.updated_at = Utc::now();
            (observation, appended, session.clone())
        };

        if let (Some(lock), Some(registry)) = (appended, self.registry.as_ref()) {
            if let Err(e) = registry.append_lock_txid(swap_id, &lock) {
                tracing::error!(
                    "Failed to persist {} lock txid for swap {}: {}",
                    lock.coin,
                    swap_id,
                    e
                );
            }
        }

        if observation != Observation::Unchanged || lock.is_some() {
            tracing::info!("Swap {} is now {}", swap_id, snapshot.status);
            let _ = self.updates.send(snapshot);
        }
        observation
    }

    pub fn set_running(&self, swap_id: &str, running: bool) {
        let snapshot = {
            let mut sessions = self.sessions.write();
            let Some(session) = sessions.get_mut(swap_id) else {
                return;
            };
            if session.running == running {
                return;
            }
            session.running = running;
            session.updated_at = Utc::now();
            session.clone()
        };
        let _ = self.updates.send(snapshot);
    }

    pub fn get(&self, swap_id: &str) -> Option<SwapSession> {
        self.sessions.read().get(swap_id).cloned()
    }

    pub fn status(&self, swap_id: &str) -> Option<SwapStatus> {
        self.sessions.read().get(swap_id).map(|s| s.status)
    }

    pub fn sessions(&self) -> Vec<SwapSession> {
        let mut all: Vec<_> = self.sessions.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    pub fn sessions_with_role(&self, role: Role) -> Vec<SwapSession> {
        self.sessions()
            .into_iter()
            .filter(|s| s.role == role)
            .collect()
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
