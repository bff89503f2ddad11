//! The maker: one long-running engine process that sells XMR for BTC.
//!
//! At most one maker runs per orchestrator. Starting it writes the seed and
//! config files, launches a dedicated wallet-RPC daemon, then the engine,
//! whose JSON log on stderr is folded into a [`MakerSnapshot`] and the
//! state tracker for as long as the engine lives.

mod config;
mod snapshot;

pub use config::{config_path, network_dir, MakerConfig, SeedFile, CONFIG_FILE_NAME, SEED_FILE_NAME};
pub use snapshot::{MakerSnapshot, MakerUpdate};

use crate::config::Settings;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::events::{event_stream, parse_maker_line, MakerEvent, SwapProgress};
use crate::exit::ExitAction;
use crate::process::{
    Capture, ManagedProcess, ProcessRole, SpawnRequest, WalletRpc, WalletRpcLauncher, MAKER_OWNER,
};
use crate::proxy;
use crate::registry::DEFAULT_ACCOUNT_INDEX;
use crate::swap::{ErrorEvent, ErrorKind, ErrorPolicy, Role, SwapSession};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::ChildStderr;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub const MAKER_ENGINE_BINARY: &str = "asb";

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Settings the maker launches with, swapped as a whole on a settings change.
#[derive(Clone)]
struct Setup {
    settings: Arc<Settings>,
    launcher: WalletRpcLauncher,
    engine_binary: PathBuf,
}

impl Setup {
    fn new(settings: Arc<Settings>) -> Self {
        Self {
            launcher: WalletRpcLauncher::from_settings(&settings),
            engine_binary: settings.binary(MAKER_ENGINE_BINARY),
            settings,
        }
    }
}

/// Processes and files owned by a started maker.
struct Running {
    engine: ManagedProcess,
    wallet: WalletRpc,
    seed: SeedFile,
    events: CancellationToken,
}

/// Start, stop and observe the maker.
///
/// Cheap to clone; clones control the same maker.
#[derive(Clone)]
pub struct MakerSessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: Context,
    setup: parking_lot::RwLock<Setup>,
    policy: ErrorPolicy,
    /// Held across the whole of start and stop, so they never interleave.
    running: tokio::sync::Mutex<Option<Running>>,
    /// Mirrors `running.is_some()` for the event pump, which must not wait on the mutex.
    active: AtomicBool,
    snapshot: parking_lot::RwLock<MakerSnapshot>,
    updates: broadcast::Sender<MakerUpdate>,
    exit: watch::Sender<Option<ExitAction>>,
}

impl MakerSessionManager {
    pub fn new(ctx: Context) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        let (exit, _) = watch::channel(Some(ExitAction::Exit(0)));
        Self {
            inner: Arc::new(Inner {
                setup: parking_lot::RwLock::new(Setup::new(ctx.settings.clone())),
                ctx,
                policy: ErrorPolicy,
                running: tokio::sync::Mutex::new(None),
                active: AtomicBool::new(false),
                snapshot: parking_lot::RwLock::new(MakerSnapshot::default()),
                updates,
                exit,
            }),
        }
    }

    /// Start the maker. Fails with [`Error::MakerAlreadyRunning`] if it runs.
    pub async fn start(&self) -> Result<()> {
        self.inner.start().instrument(tracing::info_span!("maker_start")).await
    }

    /// Stop the maker. Returns whether it was running.
    pub async fn stop(&self) -> bool {
        self.inner.stop(true).await
    }

    /// Stop and start again, picking up the current settings. Does nothing
    /// if the maker is not running.
    pub async fn restart(&self) -> Result<()> {
        self.inner.restart("restart requested").await
    }

    /// Replace the maker's settings and restart it if it is running, so the
    /// engine config and wallet daemon are regenerated from them.
    pub async fn apply_settings(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        *self.inner.setup.write() = Setup::new(Arc::new(settings));
        self.inner.restart("settings changed").await
    }

    /// The settings the next start will use.
    pub fn settings(&self) -> Arc<Settings> {
        self.inner.setup.read().settings.clone()
    }

    pub fn is_running(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> MakerSnapshot {
        self.inner.snapshot.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MakerUpdate> {
        self.inner.updates.subscribe()
    }

    /// Resolves once the supervising loop should act: `Restart` when the
    /// engine exited on its own, `Exit(0)` after an explicit stop.
    pub async fn wait_exit(&self) -> ExitAction {
        let mut exit = self.inner.exit.subscribe();
        loop {
            if let Some(action) = *exit.borrow_and_update() {
                return action;
            }
            if exit.changed().await.is_err() {
                return ExitAction::Exit(0);
            }
        }
    }

    /// The current exit signal without waiting.
    pub fn exit_action(&self) -> ExitAction {
        (*self.inner.exit.borrow()).unwrap_or(ExitAction::KeepRunning)
    }
}

impl Inner {
    async fn start(self: &Arc<Self>) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::MakerAlreadyRunning);
        }
        self.ctx.active.claim_maker(MAKER_OWNER)?;
        match self.launch().await {
            Ok(started) => {
                *running = Some(started);
                Ok(())
            }
            Err(e) => {
                self.ctx.active.release(MAKER_OWNER);
                Err(e)
            }
        }
    }

    async fn launch(self: &Arc<Self>) -> Result<Running> {
        let setup = self.setup.read().clone();
        let settings = setup.settings.clone();
        proxy::ensure_ready(self.ctx.proxy.as_ref()).await?;

        let seed_base64 = settings
            .maker
            .seed_base64
            .as_deref()
            .or(settings.buyer.seed_base64.as_deref())
            .ok_or_else(|| Error::Config("no maker seed configured (maker.seed_base64)".to_string()))?;
        let seed = SeedFile::for_settings(&settings);
        seed.write(seed_base64)?;

        let wallet = match setup
            .launcher
            .launch(&self.ctx.supervisor, ProcessRole::MakerWalletRpc, MAKER_OWNER)
        {
            Ok(wallet) => wallet,
            Err(e) => {
                seed.remove();
                return Err(e);
            }
        };

        match self.launch_engine(&setup, &wallet).await {
            Ok((engine, events)) => {
                tracing::info!("Maker started (engine pid {})", engine.pid());
                Ok(Running {
                    engine,
                    wallet,
                    seed,
                    events,
                })
            }
            Err(e) => {
                wallet.stop(&self.ctx.supervisor).await;
                seed.remove();
                Err(e)
            }
        }
    }

    async fn launch_engine(
        self: &Arc<Self>,
        setup: &Setup,
        wallet: &WalletRpc,
    ) -> Result<(ManagedProcess, CancellationToken)> {
        let settings = &setup.settings;
        let path = config_path(settings);
        MakerConfig::from_settings(settings, wallet.endpoint()).write(&path)?;

        let settle = settings.maker.settle_delay;
        if !settle.is_zero() {
            tracing::debug!("Waiting {:?} for the maker wallet RPC", settle);
            tokio::time::sleep(settle).await;
        }

        let mut args = Vec::new();
        if settings.network.is_testnet() {
            args.push("--testnet".to_string());
        }
        args.extend([
            "--json".to_string(),
            "--config".to_string(),
            path.to_string_lossy().into_owned(),
            "start".to_string(),
        ]);
        let request = SpawnRequest::new(ProcessRole::MakerEngine, &setup.engine_binary)
            .args(args)
            .owner(MAKER_OWNER)
            .capture(Capture::Stderr);
        let engine = self.ctx.supervisor.spawn(request)?;
        let stderr = engine.take_stderr().ok_or_else(|| Error::Spawn {
            role: ProcessRole::MakerEngine.to_string(),
            reason: "stderr was not captured".to_string(),
        })?;

        *self.snapshot.write() = MakerSnapshot::started();
        self.active.store(true, Ordering::SeqCst);
        self.exit.send_replace(None);
        let _ = self.updates.send(MakerUpdate::Started);

        let token = CancellationToken::new();
        self.spawn_pump(stderr, token.clone());
        Ok((engine, token))
    }

    fn spawn_pump(self: &Arc<Self>, stderr: ChildStderr, token: CancellationToken) {
        let inner = self.clone();
        tokio::spawn(
            async move {
                let events = event_stream(tokio::io::BufReader::new(stderr), parse_maker_line);
                futures::pin_mut!(events);
                loop {
                    let event = tokio::select! {
                        _ = token.cancelled() => return,
                        event = events.next() => event,
                    };
                    let Some(event) = event else {
                        break;
                    };
                    if let Some(reason) = inner.handle_event(event) {
                        let inner = inner.clone();
                        tokio::spawn(async move {
                            if let Err(e) = inner.restart(&reason).await {
                                tracing::error!("Maker restart failed: {}", e);
                            }
                        });
                        return;
                    }
                }

                if inner.active.load(Ordering::SeqCst) && !token.is_cancelled() {
                    tracing::warn!("Maker engine output ended while the maker was running");
                    inner.exit.send_replace(Some(ExitAction::Restart));
                }
            }
            .instrument(tracing::info_span!("maker_events")),
        );
    }

    /// Apply one engine event. Returns a reason when the maker must restart.
    fn handle_event(&self, event: MakerEvent) -> Option<String> {
        self.snapshot.write().apply(&event);
        let mut restart = None;
        match &event {
            MakerEvent::Initialized {
                peer_id, multiaddr, ..
            } => tracing::info!("Maker initialized as {} at {}", peer_id, multiaddr),
            MakerEvent::WalletSync { coin, phase, duration } => {
                tracing::info!("Maker {} wallet {:?} {}", coin, phase, duration.as_deref().unwrap_or(""))
            }
            MakerEvent::RendezvousRegistration { external_address } => {
                tracing::info!("Registering {} with rendezvous peers", external_address)
            }
            MakerEvent::XmrBalanceError(error) => tracing::warn!("Maker XMR balance: {}", error),
            MakerEvent::WalletInitFailed { coin } => {
                let kind = match coin {
                    crate::swap::Coin::Btc => ErrorKind::FailedToInitAsbBitcoinWallet,
                    crate::swap::Coin::Xmr => ErrorKind::FailedToInitAsbMoneroWallet,
                };
                tracing::warn!("Maker hit {}, restarting", kind);
                restart = Some(kind.to_string());
            }
            MakerEvent::EarnedBtc { amount } => tracing::info!("Maker earned {} sats", amount),
            MakerEvent::Swap { swap_id, progress } => self.record_swap(swap_id, progress),
            MakerEvent::ProxyStatus { .. } | MakerEvent::SwarmSetup | MakerEvent::XmrBalance(_) => {
                tracing::debug!("{:?}", event)
            }
        }
        let _ = self.updates.send(MakerUpdate::Event(event));
        restart
    }

    fn record_swap(&self, swap_id: &str, progress: &SwapProgress) {
        let tracker = &self.ctx.tracker;
        if tracker.get(swap_id).is_none() || *progress == SwapProgress::Started {
            let mut session = SwapSession::new(swap_id, Role::Maker, DEFAULT_ACCOUNT_INDEX);
            session.running = true;
            tracker.track(session);
        }
        if let Some(status) = progress.status() {
            tracker.observe(swap_id, status, progress.lock_txid().as_ref());
        }

        match progress {
            SwapProgress::Failed { error } => {
                let event = ErrorEvent::new(swap_id, ErrorKind::UnknownError, error.clone());
                self.policy.log(&event, self.policy.decide(&event));
                self.snapshot.write().last_error = Some(error.clone());
                tracker.set_running(swap_id, false);
            }
            SwapProgress::BtcRedeemFailed { error } => {
                tracing::error!("Maker swap {}: BTC redeem failed: {}", swap_id, error)
            }
            SwapProgress::BtcLockNotSeen | SwapProgress::BtcLockUnconfirmed => {
                tracing::warn!("Maker swap {}: BTC lock {:?}", swap_id, progress);
                tracker.set_running(swap_id, false);
            }
            SwapProgress::Completed { state } => {
                if progress.is_success() {
                    tracing::info!("Maker swap {} completed", swap_id);
                } else {
                    tracing::warn!("Maker swap {} ended in state {}", swap_id, state);
                }
                tracker.set_running(swap_id, false);
            }
            other => tracing::info!("Maker swap {}: {:?}", swap_id, other),
        }
    }

    /// Kill the engine, delete the seed, kill the wallet RPC and clear both pids.
    async fn stop(&self, signal_exit: bool) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            return false;
        };
        self.active.store(false, Ordering::SeqCst);
        running.events.cancel();

        let supervisor = &self.ctx.supervisor;
        supervisor.shutdown(&running.engine).await;
        running.seed.remove();
        running.wallet.stop(supervisor).await;
        supervisor.release(&running.engine);

        for session in self.ctx.tracker.sessions_with_role(Role::Maker) {
            if session.running {
                self.ctx.tracker.set_running(&session.swap_id, false);
            }
        }
        self.ctx.active.release(MAKER_OWNER);
        self.snapshot.write().running = false;
        let _ = self.updates.send(MakerUpdate::Stopped);
        if signal_exit {
            self.exit.send_replace(Some(ExitAction::Exit(0)));
        }
        tracing::info!("Maker stopped");
        true
    }

    /// Stop and start again. A maker that is stopped, or gets stopped before
    /// the restart reaches it, stays stopped.
    async fn restart(self: &Arc<Self>, reason: &str) -> Result<()> {
        if !self.active.load(Ordering::SeqCst) {
            tracing::debug!("Maker not running, skipping restart ({})", reason);
            return Ok(());
        }
        tracing::info!("Restarting maker: {}", reason);
        let _ = self.updates.send(MakerUpdate::Restarting {
            reason: reason.to_string(),
        });
        if !self.stop(false).await {
            tracing::info!("Maker was stopped before it could restart");
            return Ok(());
        }
        self.start().await
    }
}
