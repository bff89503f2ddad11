//! Buyer-side swap sessions.
//!
//! Each running swap owns a wallet-RPC daemon and two tasks: a blocking
//! worker that sits in the engine call, and an async pump that applies the
//! engine's events to the state tracker and the error policy.

mod session;

use crate::context::Context;
use crate::engine::{
    BuyerEvent, CancelAndRefundResponse, Engine, EngineParams, EventSink, HistoryEntry, Seller,
    SwapRequest,
};
use crate::error::{Error, Result};
use crate::exit::ExitAction;
use crate::process::{ProcessRole, WalletRpcLauncher};
use crate::proxy;
use crate::swap::{
    validate_multiaddr, validate_swap_id, validate_xmr_address, Decision, ErrorKind, ErrorPolicy,
    LockTxid, Observation, Role, SwapSession, SwapStatus,
};
use futures::future::{BoxFuture, FutureExt};
use session::{BuyerSession, Entry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::Instrument;

const REPORT_CHANNEL_CAPACITY: usize = 64;

/// Parameters of a new buy.
#[derive(Debug, Clone)]
pub struct BuyRequest {
    pub xmr_address: String,
    /// Seller multiaddr, including `/p2p/<peer-id>`.
    pub counterparty: String,
    pub refund_address: String,
    pub account_index: u32,
}

/// How a session ended, or that it is being re-entered. Sent once per event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionReport {
    /// Torn down after a transient engine failure and re-entered by resume.
    Resuming { swap_id: String, reason: String },
    /// Reached a terminal status.
    Finished { swap_id: String, status: SwapStatus },
    /// Lost the counterparty. Funds are not at risk if the swap is resumed in time.
    Disconnected { swap_id: String, message: String },
    Failed {
        swap_id: String,
        kind: ErrorKind,
        message: String,
    },
    /// Cancelled, or the engine returned before a terminal status.
    Stopped { swap_id: String, status: SwapStatus },
}

impl SessionReport {
    pub fn swap_id(&self) -> &str {
        match self {
            SessionReport::Resuming { swap_id, .. }
            | SessionReport::Finished { swap_id, .. }
            | SessionReport::Disconnected { swap_id, .. }
            | SessionReport::Failed { swap_id, .. }
            | SessionReport::Stopped { swap_id, .. } => swap_id,
        }
    }

    /// False only for `Resuming`; every other report ends the session.
    pub fn is_final(&self) -> bool {
        !matches!(self, SessionReport::Resuming { .. })
    }
}

/// What the pump does after one event.
enum Flow {
    Continue,
    Resume(String),
    Finish(SessionReport),
}

/// Starts, resumes, cancels and monitors buyer swaps.
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct BuyerSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: Context,
    engine: Arc<dyn Engine>,
    params: EngineParams,
    launcher: parking_lot::RwLock<WalletRpcLauncher>,
    policy: ErrorPolicy,
    sessions: parking_lot::Mutex<HashMap<String, Arc<BuyerSession>>>,
    /// Claimed swaps with no registered session yet: starting, or waiting out
    /// the retry delay before a resume. Locked after `sessions`.
    pending: parking_lot::Mutex<HashSet<String>>,
    reports: broadcast::Sender<SessionReport>,
}

impl BuyerSessionManager {
    pub fn new(ctx: Context, engine: Arc<dyn Engine>) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                params: EngineParams::from_settings(&ctx.settings),
                launcher: parking_lot::RwLock::new(WalletRpcLauncher::from_settings(&ctx.settings)),
                ctx,
                engine,
                policy: ErrorPolicy,
                sessions: parking_lot::Mutex::new(HashMap::new()),
                pending: parking_lot::Mutex::new(HashSet::new()),
                reports,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionReport> {
        self.inner.reports.subscribe()
    }

    /// Start a new swap. Fails with [`Error::Busy`] while any session runs.
    pub async fn start_buy(&self, request: BuyRequest) -> Result<SwapSession> {
        let settings = &self.inner.ctx.settings;
        validate_xmr_address(&request.xmr_address, settings.network)?;
        validate_multiaddr(&request.counterparty)?;
        if request.refund_address.trim().is_empty() {
            return Err(Error::Validation("a BTC refund address is required".to_string()));
        }

        let swap_id = uuid::Uuid::new_v4().to_string();
        self.inner.ctx.active.claim_buyer(&swap_id)?;

        let params = &self.inner.params;
        let swap_request = SwapRequest {
            uuid: swap_id.clone(),
            seed_base64: params.seed_base64.clone(),
            xmr_receive_address: request.xmr_address.trim().to_string(),
            electrum_url: params.electrum_url.clone(),
            proxy: params.proxy.clone(),
            libp2p_peer_address: request.counterparty.trim().to_string(),
            xmr_rpc_endpoint: String::new(),
            testnet: params.testnet,
            proxy_port: params.proxy_port,
            refund_address: request.refund_address.trim().to_string(),
            swaps_account: request.account_index,
        };
        let entry = Entry::Buy(Box::new(swap_request));
        let span = tracing::info_span!("start_buy", swap.id = %swap_id);
        self.inner
            .launch_claimed(swap_id, request.account_index, entry, Some(request.counterparty))
            .instrument(span)
            .await
    }

    /// Re-enter a known swap. The account index comes from the registry.
    pub async fn start_resume(&self, swap_id: &str) -> Result<SwapSession> {
        let swap_id = validate_swap_id(swap_id)?;
        self.inner.ctx.active.claim_buyer(&swap_id)?;
        let account_index = match self.inner.ctx.registry.account_index(&swap_id) {
            Ok(index) => index,
            Err(e) => {
                self.inner.ctx.active.release(&swap_id);
                return Err(e);
            }
        };
        self.inner
            .launch_claimed(swap_id.clone(), account_index, Entry::Resume, None)
            .instrument(tracing::info_span!("start_resume", swap.id = %swap_id))
            .await
    }

    /// Stop a running swap and release its resources. The engine notices the
    /// lost wallet daemon and aborts on its own. A swap waiting to resume is
    /// dropped before it re-enters. Returns false if not running.
    pub async fn cancel(&self, swap_id: &str) -> bool {
        let session = {
            let sessions = self.inner.sessions.lock();
            match sessions.get(swap_id).cloned() {
                Some(session) => Some(session),
                None => {
                    if !self.inner.pending.lock().remove(swap_id) {
                        return false;
                    }
                    None
                }
            }
        };
        let Some(session) = session else {
            tracing::info!("Cancelling swap {} before its engine call started", swap_id);
            self.inner.ctx.active.release(swap_id);
            self.inner.ctx.tracker.set_running(swap_id, false);
            let status = self.inner.current_status(swap_id);
            let _ = self.inner.reports.send(SessionReport::Stopped {
                swap_id: swap_id.to_string(),
                status,
            });
            return true;
        };
        tracing::info!("Cancelling swap {}", swap_id);
        let status = self.inner.current_status(swap_id);
        self.inner
            .finish(
                &session,
                SessionReport::Stopped {
                    swap_id: swap_id.to_string(),
                    status,
                },
            )
            .await;
        true
    }

    /// Replace a running swap's wallet-RPC daemon. Only the endpoint changes.
    pub async fn restart_wallet_rpc(&self, swap_id: &str) -> Result<String> {
        let session = self
            .inner
            .sessions
            .lock()
            .get(swap_id)
            .cloned()
            .ok_or_else(|| Error::Session(format!("No running swap {}", swap_id)))?;
        self.inner.restart_wallet(&session).await
    }

    /// Point wallet-RPC daemons at another Monero node and restart the
    /// daemons of every running swap.
    pub async fn set_monero_daemon(&self, daemon_address: &str) -> Result<()> {
        self.inner.launcher.write().set_daemon_address(daemon_address);
        let running: Vec<_> = self.inner.sessions.lock().values().cloned().collect();
        for session in running {
            self.inner.restart_wallet(&session).await?;
        }
        Ok(())
    }

    pub async fn cancel_and_refund(
        &self,
        swap_id: &str,
        root_bip32_key: &str,
    ) -> Result<CancelAndRefundResponse> {
        let swap_id = validate_swap_id(swap_id)?;
        if self.inner.sessions.lock().contains_key(&swap_id) {
            return Err(Error::Busy(swap_id));
        }
        let request = self.inner.params.cancel_and_refund(&swap_id, root_bip32_key);
        let engine = self.inner.engine.clone();
        let response = run_blocking("cancel_and_refund", move || {
            engine.cancel_and_refund(&request)
        })
        .await?;

        let status = SwapStatus::parse(&response.status);
        if status != SwapStatus::InvalidState {
            self.inner.ctx.tracker.observe(&swap_id, status, None);
        }
        tracing::info!("Cancel and refund of swap {}: {}", swap_id, response.status);
        Ok(response)
    }

    /// Query sellers at `rendezvous`, or at every configured rendezvous peer.
    pub async fn list_sellers(&self, rendezvous: Option<&str>) -> Result<Vec<Seller>> {
        let peers: Vec<String> = match rendezvous {
            Some(peer) => vec![peer.to_string()],
            None => self.inner.ctx.settings.rendezvous_peers.clone(),
        };
        if peers.is_empty() {
            return Err(Error::Config("no rendezvous peers configured".to_string()));
        }
        for peer in &peers {
            validate_multiaddr(peer)?;
        }
        proxy::ensure_ready(self.inner.ctx.proxy.as_ref()).await?;

        let mut sellers: Vec<Seller> = Vec::new();
        let mut last_error = None;
        for peer in peers {
            let request = self.inner.params.list_sellers(&peer);
            let engine = self.inner.engine.clone();
            match run_blocking("list_sellers", move || engine.list_sellers(&request)).await {
                Ok(response) => {
                    for seller in response.sellers {
                        if !sellers.iter().any(|s| s.multiaddr == seller.multiaddr) {
                            sellers.push(seller);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Listing sellers at {} failed: {}", peer, e);
                    last_error = Some(e);
                }
            }
        }
        match (sellers.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(sellers),
        }
    }

    /// Swap history as the engine stores it. Swaps not currently running are
    /// refreshed in the state tracker.
    pub async fn history(&self) -> Result<Vec<HistoryEntry>> {
        let request = self.inner.params.history();
        let engine = self.inner.engine.clone();
        let response = run_blocking("get_history", move || engine.get_history(&request)).await?;
        for entry in &response.swaps {
            self.inner.refresh_from_history(entry);
        }
        Ok(response.swaps)
    }

    /// First swap in history that has not reached a terminal status.
    pub async fn incomplete_swap(&self) -> Result<Option<HistoryEntry>> {
        Ok(self
            .history()
            .await?
            .into_iter()
            .find(|entry| entry.status().is_incomplete()))
    }

    /// Resume the first incomplete swap, unless something is already running.
    pub async fn auto_resume(&self) -> Result<Option<SwapSession>> {
        if !self.inner.ctx.active.is_empty() {
            return Ok(None);
        }
        let Some(entry) = self.incomplete_swap().await? else {
            return Ok(None);
        };
        tracing::info!(
            "Resuming incomplete swap {} ({})",
            entry.swap_id,
            entry.status
        );
        self.start_resume(&entry.swap_id).await.map(Some)
    }

    pub fn running_swap(&self) -> Option<String> {
        self.inner.ctx.active.running_buyer()
    }

    pub fn exit_action(&self) -> ExitAction {
        let sessions = self.inner.sessions.lock();
        if sessions.is_empty() && self.inner.pending.lock().is_empty() {
            ExitAction::Exit(0)
        } else {
            ExitAction::KeepRunning
        }
    }

    /// Cancel every running swap, including one waiting to resume.
    pub async fn shutdown(&self) {
        let running: Vec<String> = {
            let sessions = self.inner.sessions.lock();
            let pending = self.inner.pending.lock();
            sessions.keys().chain(pending.iter()).cloned().collect()
        };
        for swap_id in running {
            self.cancel(&swap_id).await;
        }
    }
}

impl Inner {
    async fn launch_claimed(
        self: &Arc<Self>,
        swap_id: String,
        account_index: u32,
        entry: Entry,
        counterparty: Option<String>,
    ) -> Result<SwapSession> {
        self.pending.lock().insert(swap_id.clone());
        match self.launch(&swap_id, account_index, entry, counterparty).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.pending.lock().remove(&swap_id);
                self.ctx.active.release(&swap_id);
                self.ctx.tracker.set_running(&swap_id, false);
                Err(e)
            }
        }
    }

    /// Proxy check, account bookkeeping, wallet-RPC launch, then the engine.
    ///
    /// `swap_id` must be in `pending`. Fails if it was cancelled meanwhile.
    async fn launch(
        self: &Arc<Self>,
        swap_id: &str,
        account_index: u32,
        entry: Entry,
        counterparty: Option<String>,
    ) -> Result<SwapSession> {
        proxy::ensure_ready(self.ctx.proxy.as_ref()).await?;

        let registry = &self.ctx.registry;
        if let Entry::Buy(_) = entry {
            registry.set_account_index(swap_id, account_index)?;
        }

        let launcher = self.launcher.read().clone();
        let wallet = launcher.launch(&self.ctx.supervisor, ProcessRole::BuyerWalletRpc, swap_id)?;

        let mut snapshot = SwapSession::new(swap_id, Role::Buyer, account_index);
        snapshot.lock_txids = registry.lock_txids(swap_id).unwrap_or_else(|e| {
            tracing::warn!("Cannot read lock txids of swap {}: {}", swap_id, e);
            Default::default()
        });
        snapshot.counterparty_address = counterparty;
        snapshot.running = true;
        let snapshot = self.ctx.tracker.track(snapshot);

        let session = Arc::new(BuyerSession::new(swap_id, account_index, wallet));
        let registered = {
            let mut sessions = self.sessions.lock();
            let registered = self.pending.lock().remove(swap_id);
            if registered {
                sessions.insert(swap_id.to_string(), session.clone());
            }
            registered
        };
        if !registered {
            session.stop();
            session.stop_wallet(&self.ctx.supervisor).await;
            self.ctx.tracker.set_running(swap_id, false);
            return Err(Error::Session(format!(
                "Swap {} was cancelled while starting",
                swap_id
            )));
        }
        tracing::info!("Swap {} started with wallet RPC at {}", swap_id, session.endpoint());

        let settle = self.ctx.settings.buyer.settle_delay;
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(swap_id, tx, session.running_flag());
        self.spawn_worker(session.clone(), entry, sink);
        self.spawn_pump(session, rx);
        Ok(snapshot)
    }

    fn spawn_worker(&self, session: Arc<BuyerSession>, entry: Entry, sink: EventSink) {
        let engine = self.engine.clone();
        let params = self.params.clone();
        let retry_delay = self.ctx.settings.buyer.retry_delay;
        tokio::task::spawn_blocking(move || {
            session.drive(engine.as_ref(), &params, entry, &sink, retry_delay);
        });
    }

    fn spawn_pump(self: &Arc<Self>, session: Arc<BuyerSession>, mut events: mpsc::UnboundedReceiver<BuyerEvent>) {
        let inner = self.clone();
        let span = tracing::info_span!("buyer_session", swap.id = %session.swap_id());
        tokio::spawn(
            async move {
                while let Some(event) = events.recv().await {
                    match inner.handle_event(&session, event) {
                        Flow::Continue => {}
                        Flow::Resume(reason) => {
                            inner.clone().restart_resume(session, reason).await;
                            return;
                        }
                        Flow::Finish(report) => {
                            inner.finish(&session, report).await;
                            return;
                        }
                    }
                }

                // Worker returned without the engine reporting an outcome
                let swap_id = session.swap_id().to_string();
                let status = inner.current_status(&swap_id);
                let report = if status.is_terminal() {
                    SessionReport::Finished { swap_id, status }
                } else {
                    SessionReport::Stopped { swap_id, status }
                };
                inner.finish(&session, report).await;
            }
            .instrument(span),
        );
    }

    fn handle_event(&self, session: &BuyerSession, event: BuyerEvent) -> Flow {
        let swap_id = session.swap_id();
        if !session.is_running() {
            return Flow::Continue;
        }
        match event {
            BuyerEvent::Error(error) => {
                let decision = self.policy.decide(&error);
                self.policy.log(&error, decision);
                match decision {
                    Decision::Ignore => Flow::Continue,
                    Decision::Resume => Flow::Resume(error.kind.to_string()),
                    Decision::Warn => Flow::Finish(SessionReport::Disconnected {
                        swap_id: swap_id.to_string(),
                        message: error.message,
                    }),
                    Decision::Fail => Flow::Finish(SessionReport::Failed {
                        swap_id: swap_id.to_string(),
                        kind: error.kind,
                        message: error.message,
                    }),
                }
            }
            BuyerEvent::SellerQuoteError { error } => {
                tracing::warn!("Error getting quote from seller for swap {}: {}. Retrying", swap_id, error);
                Flow::Resume(format!("seller quote error: {}", error))
            }
            BuyerEvent::Log { message } => {
                tracing::info!("[engine] {}", message);
                Flow::Continue
            }
            event => {
                log_progress(swap_id, &event);
                if let BuyerEvent::SwapRunning { multiaddr } = &event {
                    if let Some(snapshot) = self.ctx.tracker.get(swap_id) {
                        self.ctx.tracker.track(snapshot.with_counterparty(multiaddr.clone()));
                    }
                }
                let Some((status, lock)) = event.observation() else {
                    return Flow::Continue;
                };
                match self.ctx.tracker.observe(swap_id, status, lock.as_ref()) {
                    Observation::Rejected { .. } => Flow::Continue,
                    // The engine keeps going after BTC is redeemed to sweep the XMR
                    _ if status.is_terminal() && status != SwapStatus::BtcRedeemed => {
                        Flow::Finish(SessionReport::Finished {
                            swap_id: swap_id.to_string(),
                            status,
                        })
                    }
                    _ => Flow::Continue,
                }
            }
        }
    }

    /// Tear the session down and re-enter it by resume with the same swap id.
    /// The busy claim is kept throughout.
    fn restart_resume(self: Arc<Self>, session: Arc<BuyerSession>, reason: String) -> BoxFuture<'static, ()> {
        async move {
            let swap_id = session.swap_id().to_string();
            if !self.teardown(&session).await {
                return;
            }
            self.pending.lock().insert(swap_id.clone());
            let _ = self.reports.send(SessionReport::Resuming {
                swap_id: swap_id.clone(),
                reason,
            });

            let retry_delay = self.ctx.settings.buyer.retry_delay;
            if !retry_delay.is_zero() {
                tokio::time::sleep(retry_delay).await;
            }
            if !self.pending.lock().contains(&swap_id) {
                tracing::info!("Swap {} was cancelled before it could resume", swap_id);
                return;
            }

            let account_index = session.account_index();
            if let Err(e) = self.launch(&swap_id, account_index, Entry::Resume, None).await {
                if !self.pending.lock().remove(&swap_id) {
                    tracing::info!("Swap {} was cancelled while resuming", swap_id);
                    return;
                }
                tracing::error!("Failed to resume swap {}: {}", swap_id, e);
                self.ctx.active.release(&swap_id);
                self.ctx.tracker.set_running(&swap_id, false);
                let status = self.current_status(&swap_id);
                let _ = self.reports.send(SessionReport::Stopped { swap_id, status });
            }
        }
        .boxed()
    }

    /// Tear down, release the busy claim and publish `report`. Only the first
    /// caller for a session reports.
    async fn finish(&self, session: &Arc<BuyerSession>, report: SessionReport) {
        if !self.teardown(session).await {
            return;
        }
        self.ctx.active.release(session.swap_id());
        let _ = self.reports.send(report);
    }

    /// Stop the session's worker loop and wallet daemon. Returns false if the
    /// session had already been torn down.
    async fn teardown(&self, session: &Arc<BuyerSession>) -> bool {
        if !session.stop() {
            return false;
        }
        let swap_id = session.swap_id();
        {
            let mut sessions = self.sessions.lock();
            if sessions
                .get(swap_id)
                .is_some_and(|current| Arc::ptr_eq(current, session))
            {
                sessions.remove(swap_id);
            }
        }
        session.stop_wallet(&self.ctx.supervisor).await;
        let removed = self.launcher.read().clone().remove_monitoring_wallets();
        if removed > 0 {
            tracing::debug!("Removed {} monitoring wallet files", removed);
        }
        self.ctx.tracker.set_running(swap_id, false);
        true
    }

    async fn restart_wallet(&self, session: &BuyerSession) -> Result<String> {
        let launcher = self.launcher.read().clone();
        let swap_id = session.swap_id();
        let endpoint = session
            .replace_wallet(&self.ctx.supervisor, || {
                launcher.launch(&self.ctx.supervisor, ProcessRole::BuyerWalletRpc, swap_id)
            })
            .await?;
        tracing::info!("Wallet RPC for swap {} restarted at {}", swap_id, endpoint);
        Ok(endpoint)
    }

    fn current_status(&self, swap_id: &str) -> SwapStatus {
        self.ctx
            .tracker
            .status(swap_id)
            .unwrap_or(SwapStatus::Started)
    }

    fn refresh_from_history(&self, entry: &HistoryEntry) {
        let status = entry.status();
        if status == SwapStatus::InvalidState || self.sessions.lock().contains_key(&entry.swap_id) {
            return;
        }
        let tracker = &self.ctx.tracker;
        if tracker.get(&entry.swap_id).is_none() {
            let account_index = self
                .ctx
                .registry
                .account_index(&entry.swap_id)
                .unwrap_or(crate::registry::DEFAULT_ACCOUNT_INDEX);
            tracker.track(SwapSession::new(&entry.swap_id, Role::Buyer, account_index));
        }
        let btc = entry.btc_lock_txid.clone().map(LockTxid::btc);
        let xmr = entry.xmr_lock_txid.clone().map(LockTxid::xmr);
        tracker.observe(&entry.swap_id, status, btc.as_ref());
        if xmr.is_some() {
            tracker.observe(&entry.swap_id, status, xmr.as_ref());
        }
    }
}

fn log_progress(swap_id: &str, event: &BuyerEvent) {
    match event {
        BuyerEvent::OrderCreated {
            btc_address,
            min_sats,
            max_sats,
        } => tracing::info!(
            "Swap {}: send between {} and {} sats to {}",
            swap_id,
            min_sats,
            max_sats,
            btc_address
        ),
        BuyerEvent::BtcReceived { new_balance, .. } => {
            tracing::info!("Swap {}: deposit balance is now {} sats", swap_id, new_balance)
        }
        BuyerEvent::XmrLockConfirmation { txid, confirmations } => tracing::info!(
            "Swap {}: XMR lock {} has {} confirmations",
            swap_id,
            txid,
            confirmations
        ),
        BuyerEvent::StartRedeemXmrSync => tracing::info!("Swap {}: syncing wallet to redeem XMR", swap_id),
        BuyerEvent::StartXmrSweep => tracing::info!("Swap {}: sweeping redeemed XMR", swap_id),
        other => tracing::debug!("Swap {}: {:?}", swap_id, other),
    }
}

/// Run a blocking engine call off the async workers.
async fn run_blocking<T, F>(call: &str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::engine(call, format!("worker thread failed: {}", e)))?
}
