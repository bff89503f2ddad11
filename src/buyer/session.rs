use crate::engine::{Engine, EngineParams, EventSink, SwapRequest};
use crate::process::{Supervisor, WalletRpc};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How a session enters the engine.
#[derive(Debug, Clone)]
pub(super) enum Entry {
    Buy(Box<SwapRequest>),
    Resume,
}

/// Resources owned by one running buyer swap.
pub(super) struct BuyerSession {
    swap_id: String,
    account_index: u32,
    running: Arc<AtomicBool>,
    endpoint: RwLock<String>,
    wallet: tokio::sync::Mutex<Option<WalletRpc>>,
}

impl BuyerSession {
    pub(super) fn new(swap_id: &str, account_index: u32, wallet: WalletRpc) -> Self {
        Self {
            swap_id: swap_id.to_string(),
            account_index,
            running: Arc::new(AtomicBool::new(true)),
            endpoint: RwLock::new(wallet.endpoint().to_string()),
            wallet: tokio::sync::Mutex::new(Some(wallet)),
        }
    }

    pub(super) fn swap_id(&self) -> &str {
        &self.swap_id
    }

    pub(super) fn account_index(&self) -> u32 {
        self.account_index
    }

    pub(super) fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub(super) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag. Returns whether it was set.
    pub(super) fn stop(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    pub(super) fn endpoint(&self) -> String {
        self.endpoint.read().clone()
    }

    /// Kill the session's wallet-RPC daemon, if it still has one.
    pub(super) async fn stop_wallet(&self, supervisor: &Supervisor) {
        let wallet = self.wallet.lock().await.take();
        if let Some(wallet) = wallet {
            wallet.stop(supervisor).await;
        }
    }

    /// Swap in a freshly launched daemon. `launch` runs while the wallet slot
    /// is locked, so two restarts cannot interleave.
    pub(super) async fn replace_wallet<F>(
        &self,
        supervisor: &Supervisor,
        launch: F,
    ) -> crate::error::Result<String>
    where
        F: FnOnce() -> crate::error::Result<WalletRpc>,
    {
        let mut slot = self.wallet.lock().await;
        if let Some(old) = slot.take() {
            old.stop(supervisor).await;
        }
        let wallet = launch()?;
        let endpoint = wallet.endpoint().to_string();
        *self.endpoint.write() = endpoint.clone();
        *slot = Some(wallet);
        Ok(endpoint)
    }

    /// Drive the engine until it finishes or the session is stopped.
    ///
    /// Runs on a blocking thread. A failed call is retried with the same entry
    /// after `retry_delay` while the session is still running.
    pub(super) fn drive(
        &self,
        engine: &dyn Engine,
        params: &EngineParams,
        entry: Entry,
        sink: &EventSink,
        retry_delay: Duration,
    ) {
        while self.is_running() {
            let endpoint = self.endpoint();
            let result = match &entry {
                Entry::Buy(request) => {
                    let mut request = request.as_ref().clone();
                    request.xmr_rpc_endpoint = endpoint;
                    engine.buy(&request, sink)
                }
                Entry::Resume => {
                    engine.resume(&params.resume(&self.swap_id, &endpoint, self.account_index), sink)
                }
            };
            match result {
                Ok(()) => {
                    tracing::debug!("Engine returned for swap {}", self.swap_id);
                    return;
                }
                Err(e) if self.is_running() => {
                    tracing::warn!(
                        "Engine call for swap {} failed: {}. Retrying in {:?}",
                        self.swap_id,
                        e,
                        retry_delay
                    );
                    std::thread::sleep(retry_delay);
                }
                Err(e) => {
                    tracing::debug!("Engine call for stopped swap {} ended: {}", self.swap_id, e);
                    return;
                }
            }
        }
    }
}
