//! Supervision of the external binaries the orchestrator depends on.
//!
//! - `supervisor` - spawn with crash cleanup, forced shutdown, kill by pid
//! - `pid_store` - persisted pid table keyed by [`ProcessRole`]
//! - `port` - open-port probing for RPC daemons
//! - `wallet_rpc` - launching a `monero-wallet-rpc` daemon
//! - `lock` - advisory lock on the data directory

mod lock;
mod pid_store;
mod port;
mod supervisor;
mod wallet_rpc;

pub use lock::DataDirLock;
pub use pid_store::{MemoryPidStore, PidStore, PropertiesPidStore};
pub use port::{is_port_free, probe_open_port, RPC_PORT_RANGE};
pub use supervisor::{Capture, ManagedProcess, SpawnRequest, Supervisor};
pub use wallet_rpc::{WalletRpc, WalletRpcLauncher, MONITORING_WALLET_MARKER};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Owner label for processes that belong to the maker rather than a swap.
pub const MAKER_OWNER: &str = "maker-singleton";

/// What a supervised process is for. Each role has one slot in the pid table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessRole {
    BuyerWalletRpc,
    MakerWalletRpc,
    MakerEngine,
    PriceFeed,
}

impl ProcessRole {
    pub const ALL: [ProcessRole; 4] = [
        ProcessRole::BuyerWalletRpc,
        ProcessRole::MakerWalletRpc,
        ProcessRole::MakerEngine,
        ProcessRole::PriceFeed,
    ];

    /// Key under which the role's pid is persisted.
    pub fn pid_key(self) -> &'static str {
        match self {
            ProcessRole::BuyerWalletRpc => "rpc_swapclient_pid",
            ProcessRole::MakerWalletRpc => "rpc_asb_pid",
            ProcessRole::MakerEngine => "asb_pid",
            ProcessRole::PriceFeed => "price_ticker_pid",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ProcessRole::BuyerWalletRpc => 0,
            ProcessRole::MakerWalletRpc => 1,
            ProcessRole::MakerEngine => 2,
            ProcessRole::PriceFeed => 3,
        }
    }
}

impl fmt::Display for ProcessRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessRole::BuyerWalletRpc => write!(f, "buyer wallet-rpc"),
            ProcessRole::MakerWalletRpc => write!(f, "maker wallet-rpc"),
            ProcessRole::MakerEngine => write!(f, "maker engine"),
            ProcessRole::PriceFeed => write!(f, "price feed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Starting,
    Running,
    Stopped,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessState::Starting => write!(f, "starting"),
            ProcessState::Running => write!(f, "running"),
            ProcessState::Stopped => write!(f, "stopped"),
        }
    }
}
