//! Shared fixtures: a throwaway data directory with fake external binaries,
//! and a scripted engine.
#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use swap_orchestrator::engine::{
    BuyerEvent, CancelAndRefundRequest, CancelAndRefundResponse, Engine, EventSink,
    GetHistoryRequest, GetHistoryResponse, ListSellersRequest, ListSellersResponse, ResumeRequest,
    SwapRequest,
};
use swap_orchestrator::process::MemoryPidStore;
use swap_orchestrator::proxy::{ProxyGate, StaticProxyGate};
use swap_orchestrator::registry::RawJsonDb;
use swap_orchestrator::swap::{ErrorEvent, ErrorKind};
use swap_orchestrator::{Context, Error, Settings};
use tempfile::TempDir;

/// A valid mainnet primary address shape (95 base58 characters).
pub const XMR_ADDRESS: &str = "44AFFq5kSiGBoZ4NMDwYtN18obc8AemS33DBLWs3H7otXft3XjrpDtQGv7SqSsaBYBb98uNbr2VBBEt7f2wfn3RVGQBEP3A";
pub const SELLER: &str = "/ip4/127.0.0.1/tcp/9939/p2p/12D3KooWCdMKjesXMJz1SiZ7HgotrxuqhQJbP5sgBm2BwP1cqThi";
pub const REFUND_ADDRESS: &str = "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4";

/// Data and bin directories for one test.
pub struct TestEnv {
    pub dir: TempDir,
    pub settings: Settings,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();

        let mut settings = Settings::default();
        settings.data_dir = dir.path().join("data");
        settings.bin_dir = bin_dir;
        settings.buyer.retry_delay = Duration::from_millis(50);
        settings.buyer.settle_delay = Duration::ZERO;
        settings.maker.settle_delay = Duration::ZERO;
        settings.maker.seed_base64 = Some("c2VjcmV0IHNlZWQ=".to_string());
        settings.rendezvous_peers = vec![SELLER.to_string()];
        std::fs::create_dir_all(&settings.data_dir).unwrap();

        let env = Self { dir, settings };
        env.install_script("monero-wallet-rpc", "exec sleep 60");
        env
    }

    /// Write an executable `/bin/sh` script into the bin directory.
    pub fn install_script(&self, name: &str, body: &str) -> PathBuf {
        write_script(&self.settings.bin_dir.join(name), body)
    }

    pub fn context(&self) -> Context {
        self.context_with_proxy(Arc::new(StaticProxyGate::direct()))
    }

    pub fn context_with_proxy(&self, proxy: Arc<dyn ProxyGate>) -> Context {
        let db = Arc::new(RawJsonDb::open(&self.settings.data_dir).expect("open registry"));
        Context::new(
            self.settings.clone(),
            Arc::new(MemoryPidStore::new()),
            db,
            proxy,
        )
    }
}

pub fn write_script(path: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    std::fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_path_buf()
}

/// Poll `condition` every 20ms until it holds or `timeout` passes.
pub async fn wait_for<F: FnMut() -> bool>(mut condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// One step of a scripted buy/resume call.
#[derive(Debug, Clone)]
pub enum Step {
    Emit(BuyerEvent),
    /// Emit an error event for the swap being driven.
    Error(ErrorKind),
    /// Return Ok immediately.
    Return,
    Fail(String),
}

#[derive(Debug, Clone)]
pub enum EngineCall {
    Buy(SwapRequest),
    Resume(ResumeRequest),
}

impl EngineCall {
    pub fn swap_id(&self) -> &str {
        match self {
            EngineCall::Buy(r) => &r.uuid,
            EngineCall::Resume(r) => &r.swap_id,
        }
    }
}

/// Engine that plays back one script per buy/resume call, then blocks until
/// the session is stopped, like a real swap in progress.
#[derive(Default)]
pub struct MockEngine {
    scripts: Mutex<VecDeque<Vec<Step>>>,
    pub calls: Mutex<Vec<EngineCall>>,
    pub history: Mutex<GetHistoryResponse>,
    pub sellers: Mutex<ListSellersResponse>,
    pub refund_status: Mutex<String>,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_scripts(scripts: Vec<Vec<Step>>) -> Arc<Self> {
        let engine = Self::default();
        *engine.scripts.lock() = scripts.into();
        Arc::new(engine)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    fn play(&self, sink: &EventSink) -> swap_orchestrator::Result<()> {
        let script = self.scripts.lock().pop_front().unwrap_or_default();
        for step in script {
            match step {
                Step::Emit(event) => {
                    sink.emit(event);
                }
                Step::Error(kind) => {
                    sink.emit(BuyerEvent::Error(ErrorEvent::new(
                        sink.swap_id(),
                        kind,
                        format!("{} in test", kind),
                    )));
                }
                Step::Return => return Ok(()),
                Step::Fail(reason) => {
                    return Err(Error::Engine {
                        call: "mock".to_string(),
                        reason,
                    })
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        while sink.is_running() {
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(())
    }
}

impl Engine for MockEngine {
    fn buy(&self, request: &SwapRequest, sink: &EventSink) -> swap_orchestrator::Result<()> {
        self.calls.lock().push(EngineCall::Buy(request.clone()));
        self.play(sink)
    }

    fn resume(&self, request: &ResumeRequest, sink: &EventSink) -> swap_orchestrator::Result<()> {
        self.calls.lock().push(EngineCall::Resume(request.clone()));
        self.play(sink)
    }

    fn cancel_and_refund(
        &self,
        request: &CancelAndRefundRequest,
    ) -> swap_orchestrator::Result<CancelAndRefundResponse> {
        Ok(CancelAndRefundResponse {
            swap_id: request.swap_id.clone(),
            status: self.refund_status.lock().clone(),
            txid: Some("refundtx".to_string()),
        })
    }

    fn list_sellers(
        &self,
        _request: &ListSellersRequest,
    ) -> swap_orchestrator::Result<ListSellersResponse> {
        Ok(self.sellers.lock().clone())
    }

    fn get_history(
        &self,
        _request: &GetHistoryRequest,
    ) -> swap_orchestrator::Result<GetHistoryResponse> {
        Ok(self.history.lock().clone())
    }
}
