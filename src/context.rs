//! Shared state owned by one orchestrator instance.

use crate::config::Settings;
use crate::error::Result;
use crate::process::{DataDirLock, PidStore, PropertiesPidStore, Supervisor};
use crate::proxy::{ProxyGate, TcpProxyGate};
use crate::registry::{RawJsonDb, SwapsRegistry};
use crate::swap::{ActiveSessions, StateTracker};
use std::sync::Arc;

/// Everything the session managers share: the settings, the process
/// supervisor and its pid table, the swap registry, the state tracker and
/// the table of running sessions.
#[derive(Clone)]
pub struct Context {
    pub settings: Arc<Settings>,
    pub supervisor: Arc<Supervisor>,
    pub registry: Arc<SwapsRegistry>,
    pub tracker: Arc<StateTracker>,
    pub active: Arc<ActiveSessions>,
    pub proxy: Arc<dyn ProxyGate>,
}

impl Context {
    pub fn new(
        settings: Settings,
        pids: Arc<dyn PidStore>,
        db: Arc<RawJsonDb>,
        proxy: Arc<dyn ProxyGate>,
    ) -> Self {
        let supervisor = Supervisor::new(pids).with_log_dir(settings.data_dir.join("logs"));
        let registry = Arc::new(SwapsRegistry::new(db));
        Self {
            settings: Arc::new(settings),
            supervisor: Arc::new(supervisor),
            tracker: Arc::new(StateTracker::with_registry(registry.clone())),
            registry,
            active: Arc::new(ActiveSessions::new()),
            proxy,
        }
    }

    /// Open the on-disk state under `settings.data_dir`.
    ///
    /// The returned lock must be kept alive for as long as the context is used.
    pub fn open(settings: Settings) -> Result<(Self, DataDirLock)> {
        let lock = DataDirLock::acquire(&settings.data_dir)?;
        let pids: Arc<dyn PidStore> = Arc::new(PropertiesPidStore::new(settings.pid_table_path()));
        let db = Arc::new(RawJsonDb::open(&settings.data_dir)?);
        let proxy: Arc<dyn ProxyGate> = Arc::new(TcpProxyGate::from_settings(&settings));
        tracing::debug!("Using data directory {}", settings.data_dir.display());
        Ok((Self::new(settings, pids, db, proxy), lock))
    }
}
