use super::duration::serde_duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Which chain pair the orchestrator talks to.
///
/// Testnet means Bitcoin testnet paired with Monero stagenet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    pub fn is_testnet(self) -> bool {
        self == Network::Testnet
    }

    /// Directory component used under `asb/` and `monero-data/`.
    pub fn dir_name(self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Top-level settings, loaded from `swapd.yaml`.
///
/// Every field has a default so an empty document is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub network: Network,
    /// Root for the pid table, the registry and engine state.
    pub data_dir: PathBuf,
    /// Directory holding `monero-wallet-rpc`, `asb`, `price_ticker` and `swap-engine`.
    pub bin_dir: PathBuf,
    /// Monero daemon the wallet-RPC processes connect to.
    pub monero_daemon: String,
    pub electrum_url: String,
    pub proxy: ProxySettings,
    pub rendezvous_peers: Vec<String>,
    pub maker: MakerSettings,
    pub buyer: BuyerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            network: Network::default(),
            data_dir: default_data_dir(),
            bin_dir: default_data_dir().join("bin"),
            monero_daemon: "http://127.0.0.1:18081".to_string(),
            electrum_url: "ssl://electrum.blockstream.info:50002".to_string(),
            proxy: ProxySettings::default(),
            rendezvous_peers: Vec::new(),
            maker: MakerSettings::default(),
            buyer: BuyerSettings::default(),
        }
    }
}

impl Settings {
    pub fn binary(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    /// `<data_dir>/monero-data/<network>`, shared by every wallet-RPC instance.
    pub fn wallet_dir(&self) -> PathBuf {
        self.data_dir
            .join("monero-data")
            .join(self.network.dir_name())
    }

    /// `<data_dir>/asb`
    pub fn maker_root(&self) -> PathBuf {
        self.data_dir.join("asb")
    }

    pub fn pid_table_path(&self) -> PathBuf {
        self.data_dir.join("atomic-swaps.properties")
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".swapd")
}

/// Anonymizing network (Tor) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// SOCKS5 port. Unset means connections go out directly.
    pub socks_port: Option<u16>,
    pub control_port: u16,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            socks_port: None,
            control_port: 9051,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MakerSettings {
    pub min_quantity_btc: f64,
    pub max_quantity_btc: f64,
    /// Spread over the market price, in percent.
    pub fee_percent: f64,
    /// Onion host (with or without `.onion`) the maker advertises.
    pub onion_address: Option<String>,
    /// Pause between launching the maker's wallet-RPC and the engine.
    #[serde(with = "serde_duration")]
    pub settle_delay: Duration,
    pub seed_base64: Option<String>,
}

impl Default for MakerSettings {
    fn default() -> Self {
        Self {
            min_quantity_btc: 0.001,
            max_quantity_btc: 0.05,
            fee_percent: 5.0,
            onion_address: None,
            settle_delay: Duration::from_secs(4),
            seed_base64: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuyerSettings {
    /// Wait before re-entering a swap whose engine call returned an error.
    #[serde(with = "serde_duration")]
    pub retry_delay: Duration,
    /// Pause between launching the session's wallet-RPC and the engine call.
    #[serde(with = "serde_duration")]
    pub settle_delay: Duration,
    pub seed_base64: Option<String>,
}

impl Default for BuyerSettings {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            settle_delay: Duration::ZERO,
            seed_base64: None,
        }
    }
}
