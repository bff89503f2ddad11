//! Files the maker engine reads at startup: its seed and its TOML config.

use crate::config::{Network, Settings};
use crate::error::{Error, Result};
use crate::registry::atomic_write;
use base64::Engine as _;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const SEED_FILE_NAME: &str = "seed.pem";

const LISTEN_PORT: u16 = 9939;
const PRICE_TICKER_WS_URL: &str = "wss://ws.featherwallet.org/ws";
const PRICE_TICKER_ONION_WS_URL: &str =
    "ws://7e6egbawekbkxzkv4244pqeqgoo4axko2imgjbedwnn6s5yb6b7oliqd.onion/ws";

/// The maker engine's configuration, one struct per TOML section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MakerConfig {
    pub data: DataSection,
    pub network: NetworkSection,
    pub bitcoin: BitcoinSection,
    pub monero: MoneroSection,
    pub tor: TorSection,
    pub maker: MakerSection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSection {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkSection {
    pub rendezvous_point: Vec<String>,
    pub listen: Vec<String>,
    pub external_addresses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BitcoinSection {
    pub electrum_rpc_url: String,
    pub target_block: u32,
    pub network: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoneroSection {
    pub wallet_rpc_url: String,
    pub network: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TorSection {
    pub control_port: u16,
    pub socks5_port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MakerSection {
    pub min_buy_btc: f64,
    pub max_buy_btc: f64,
    pub ask_spread: f64,
    pub price_ticker_ws_url: String,
}

impl MakerConfig {
    /// Build the config for a maker whose wallet RPC listens at `wallet_rpc_url`.
    pub fn from_settings(settings: &Settings, wallet_rpc_url: &str) -> Self {
        let network = settings.network;
        let external_addresses = settings
            .maker
            .onion_address
            .as_deref()
            .map(|onion| onion.trim().trim_end_matches(".onion"))
            .filter(|onion| !onion.is_empty())
            .map(|onion| vec![format!("/onion3/{}:{}", onion, LISTEN_PORT)])
            .unwrap_or_default();
        let ws_url = if settings.proxy.socks_port.is_some() {
            PRICE_TICKER_ONION_WS_URL
        } else {
            PRICE_TICKER_WS_URL
        };

        Self {
            data: DataSection {
                dir: network_dir(settings),
            },
            network: NetworkSection {
                rendezvous_point: settings.rendezvous_peers.clone(),
                listen: vec![format!("/ip4/127.0.0.1/tcp/{}", LISTEN_PORT)],
                external_addresses,
            },
            bitcoin: BitcoinSection {
                electrum_rpc_url: settings.electrum_url.clone(),
                target_block: 1,
                network: match network {
                    Network::Mainnet => "Mainnet",
                    Network::Testnet => "Testnet",
                },
            },
            monero: MoneroSection {
                wallet_rpc_url: wallet_rpc_url.to_string(),
                network: match network {
                    Network::Mainnet => "Mainnet",
                    Network::Testnet => "Stagenet",
                },
            },
            tor: TorSection {
                control_port: settings.proxy.control_port,
                socks5_port: settings.proxy.socks_port.unwrap_or(0),
            },
            maker: MakerSection {
                min_buy_btc: settings.maker.min_quantity_btc,
                max_buy_btc: settings.maker.max_quantity_btc,
                ask_spread: settings.maker.fee_percent / 100.0,
                price_ticker_ws_url: ws_url.to_string(),
            },
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Replace whatever config exists at `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        atomic_write(path, &self.to_toml()?)
    }
}

/// `<data_dir>/asb/<network>`
pub fn network_dir(settings: &Settings) -> PathBuf {
    settings.maker_root().join(settings.network.dir_name())
}

pub fn config_path(settings: &Settings) -> PathBuf {
    settings.maker_root().join(CONFIG_FILE_NAME)
}

/// The maker's wallet seed as the engine expects it on disk.
#[derive(Debug, Clone)]
pub struct SeedFile {
    path: PathBuf,
}

impl SeedFile {
    pub fn for_settings(settings: &Settings) -> Self {
        Self {
            path: network_dir(settings).join(SEED_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the seed file with `seed_base64`.
    pub fn write(&self, seed_base64: &str) -> Result<()> {
        let seed = seed_base64.trim();
        base64::engine::general_purpose::STANDARD
            .decode(seed)
            .map_err(|e| Error::Config(format!("maker seed is not valid base64: {}", e)))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = format!("-----BEGIN SEED-----\n{}\n-----END SEED-----", seed);
        atomic_write(&self.path, &contents)?;
        restrict_permissions(&self.path)
    }

    /// Returns false if there was nothing to delete.
    pub fn remove(&self) -> bool {
        match std::fs::remove_file(&self.path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", self.path.display(), e);
                false
            }
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.data_dir = dir.path().to_path_buf();
        settings.rendezvous_peers = vec!["/dns4/rendezvous.example/tcp/8888/p2p/12D3Koo".to_string()];
        settings
    }

    #[test]
    fn test_config_sections() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.network = Network::Testnet;
        settings.maker.fee_percent = 2.0;
        settings.maker.onion_address = Some("abcdef.onion".to_string());

        let config = MakerConfig::from_settings(&settings, "http://127.0.0.1:5001/json_rpc");
        assert_eq!(config.data.dir, dir.path().join("asb").join("testnet"));
        assert_eq!(config.network.external_addresses, vec!["/onion3/abcdef:9939"]);
        assert_eq!(config.bitcoin.network, "Testnet");
        assert_eq!(config.monero.network, "Stagenet");
        assert_eq!(config.maker.ask_spread, 0.02);
        assert_eq!(config.maker.price_ticker_ws_url, PRICE_TICKER_WS_URL);

        let text = config.to_toml().unwrap();
        assert!(text.contains("[maker]"));
        assert!(text.contains("wallet_rpc_url = \"http://127.0.0.1:5001/json_rpc\""));
        assert!(text.contains("target_block = 1"));
    }

    #[test]
    fn test_proxy_switches_ticker_url() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        settings.proxy.socks_port = Some(9050);
        let config = MakerConfig::from_settings(&settings, "");
        assert_eq!(config.tor.socks5_port, 9050);
        assert_eq!(config.maker.price_ticker_ws_url, PRICE_TICKER_ONION_WS_URL);
        assert!(config.network.external_addresses.is_empty());
    }

    #[test]
    fn test_write_regenerates_config() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(&dir);
        let path = config_path(&settings);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[stale]\nkey = 1\n").unwrap();

        settings.maker.max_quantity_btc = 0.5;
        MakerConfig::from_settings(&settings, "").write(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(!text.contains("stale"));
        assert!(text.contains("max_buy_btc = 0.5"));
    }

    #[test]
    fn test_seed_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let seed = SeedFile::for_settings(&settings(&dir));
        seed.write("c2VlZA==").unwrap();
        assert_eq!(
            std::fs::read_to_string(seed.path()).unwrap(),
            "-----BEGIN SEED-----\nc2VlZA==\n-----END SEED-----"
        );
        seed.write("b3RoZXI=").unwrap();
        assert!(std::fs::read_to_string(seed.path()).unwrap().contains("b3RoZXI="));
        assert!(seed.remove());
        assert!(!seed.remove());
    }

    #[test]
    fn test_seed_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let seed = SeedFile::for_settings(&settings(&dir));
        assert!(matches!(seed.write("not base64!"), Err(Error::Config(_))));
        assert!(!seed.exists());
    }
}
