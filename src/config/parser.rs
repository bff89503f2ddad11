use super::Settings;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "swapd.yaml";

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// `~/.swapd/swapd.yaml`
    pub fn default_settings_path() -> PathBuf {
        Settings::default().data_dir.join(SETTINGS_FILE_NAME)
    }

    /// Load settings from a file path.
    pub fn load_settings<P: AsRef<Path>>(&self, path: P) -> Result<Settings> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read settings file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;

        self.parse_settings(&content)
    }

    /// Load settings if the file exists, defaults otherwise.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> Result<Settings> {
        if path.as_ref().exists() {
            self.load_settings(path)
        } else {
            tracing::debug!(
                "No settings at {}, using defaults",
                path.as_ref().display()
            );
            Ok(Settings::default())
        }
    }

    pub fn parse_settings(&self, content: &str) -> Result<Settings> {
        // An empty document deserializes to unit, not a mapping
        let settings: Settings = if content.trim().is_empty() {
            Settings::default()
        } else {
            serde_yaml::from_str(content)?
        };
        settings.validate()?;
        Ok(settings)
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use std::time::Duration;

    #[test]
    fn test_empty_document_is_defaults() {
        let settings = Parser::new().parse_settings("").expect("defaults");
        assert_eq!(settings.network, Network::Mainnet);
        assert_eq!(settings.maker.fee_percent, 5.0);
        assert_eq!(settings.maker.settle_delay, Duration::from_secs(4));
        assert!(settings.proxy.socks_port.is_none());
    }

    #[test]
    fn test_parse_partial_document() {
        let yaml = r#"
network: testnet
data_dir: /tmp/swapd-test
proxy:
  socks_port: 9050
maker:
  min_quantity_btc: 0.002
  settle_delay: 500ms
rendezvous_peers:
  - /dns4/rendezvous.example.org/tcp/8888/p2p/12D3KooWExample
"#;
        let settings = Parser::new().parse_settings(yaml).expect("valid settings");
        assert!(settings.network.is_testnet());
        assert_eq!(settings.proxy.socks_port, Some(9050));
        assert_eq!(settings.proxy.control_port, 9051);
        assert_eq!(settings.maker.min_quantity_btc, 0.002);
        assert_eq!(settings.maker.max_quantity_btc, 0.05);
        assert_eq!(settings.maker.settle_delay, Duration::from_millis(500));
        assert_eq!(settings.rendezvous_peers.len(), 1);
        assert_eq!(
            settings.wallet_dir(),
            PathBuf::from("/tmp/swapd-test/monero-data/testnet")
        );
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        let yaml = "buyer:\n  retry_delay: soon\n";
        assert!(Parser::new().parse_settings(yaml).is_err());
    }
}
