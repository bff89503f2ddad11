use super::{probe_open_port, ManagedProcess, ProcessRole, SpawnRequest, Supervisor, RPC_PORT_RANGE};
use crate::config::{Network, Settings};
use crate::error::Result;
use std::path::{Path, PathBuf};

pub const WALLET_RPC_BINARY: &str = "monero-wallet-rpc";

/// Wallet files the engine creates for watching a swap's XMR lock.
pub const MONITORING_WALLET_MARKER: &str = "-monitoring-wallet";

/// A running `monero-wallet-rpc` daemon.
pub struct WalletRpc {
    process: ManagedProcess,
    port: u16,
}

impl WalletRpc {
    pub fn endpoint(&self) -> &str {
        self.process.endpoint().unwrap_or_default()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn process(&self) -> &ManagedProcess {
        &self.process
    }

    /// Force-kill the daemon and forget its pid.
    pub async fn stop(&self, supervisor: &Supervisor) -> bool {
        let killed = supervisor.shutdown(&self.process).await;
        supervisor.release(&self.process);
        killed
    }
}

/// Builds the command line for wallet-RPC daemons from settings.
#[derive(Debug, Clone)]
pub struct WalletRpcLauncher {
    binary: PathBuf,
    daemon_address: String,
    wallet_dir: PathBuf,
    network: Network,
    proxy_port: Option<u16>,
}

impl WalletRpcLauncher {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.binary(WALLET_RPC_BINARY),
            daemon_address: settings.monero_daemon.clone(),
            wallet_dir: settings.wallet_dir(),
            network: settings.network,
            proxy_port: settings.proxy.socks_port,
        }
    }

    pub fn wallet_dir(&self) -> &Path {
        &self.wallet_dir
    }

    /// Point new daemons at a different Monero node.
    pub fn set_daemon_address(&mut self, daemon_address: impl Into<String>) {
        self.daemon_address = daemon_address.into();
    }

    pub fn args(&self, port: u16) -> Vec<String> {
        let mut args = vec![
            "--daemon-address".to_string(),
            self.daemon_address.clone(),
            "--rpc-bind-port".to_string(),
            port.to_string(),
            "--disable-rpc-login".to_string(),
            "--wallet-dir".to_string(),
            self.wallet_dir.to_string_lossy().into_owned(),
        ];
        if self.network.is_testnet() {
            args.push("--stagenet".to_string());
        }
        if let Some(proxy_port) = self.proxy_port {
            args.push("--proxy".to_string());
            args.push(format!("127.0.0.1:{}", proxy_port));
            args.push("--daemon-ssl-allow-any-cert".to_string());
        }
        args
    }

    pub fn endpoint_for(port: u16) -> String {
        format!("http://127.0.0.1:{}/json_rpc", port)
    }

    /// Probe a port and start a daemon for `role`, owned by `owner`.
    pub fn launch(
        &self,
        supervisor: &Supervisor,
        role: ProcessRole,
        owner: &str,
    ) -> Result<WalletRpc> {
        std::fs::create_dir_all(&self.wallet_dir)?;
        let port = probe_open_port(RPC_PORT_RANGE)?;
        let request = SpawnRequest::new(role, &self.binary)
            .args(self.args(port))
            .owner(owner)
            .endpoint(Self::endpoint_for(port));
        let process = supervisor.spawn(request)?;
        tracing::info!(
            "Wallet RPC for {} listening at {}",
            owner,
            Self::endpoint_for(port)
        );
        Ok(WalletRpc { process, port })
    }

    /// Remove the per-swap monitoring wallets left in the wallet directory.
    pub fn remove_monitoring_wallets(&self) -> usize {
        let entries = match std::fs::read_dir(&self.wallet_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                tracing::warn!(
                    "Cannot list {}: {}",
                    self.wallet_dir.display(),
                    e
                );
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let name = entry.file_name();
            if !name.to_string_lossy().contains(MONITORING_WALLET_MARKER) {
                continue;
            }
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => tracing::warn!("Failed to delete {}: {}", entry.path().display(), e),
            }
        }
        removed
    }
}
