//! XMR/BTC price from the external `price_ticker` daemon.

use crate::config::Settings;
use crate::error::Result;
use crate::events::event_stream;
use crate::process::{Capture, ManagedProcess, ProcessRole, SpawnRequest, Supervisor};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const PRICE_TICKER_BINARY: &str = "price_ticker";

const UPDATE_MARKER: &str = "PRICE_TICKER_UPDATE";

/// Extract the BTC price of one XMR from a ticker output line.
///
/// Update lines look like `... PRICE_TICKER_UPDATE price=0.00271 BTC\x1b[0m`.
pub fn parse_price_line(line: &str) -> Option<f64> {
    if !line.contains(UPDATE_MARKER) {
        return None;
    }
    let value = line.split('=').nth(1)?;
    let value = value
        .replace("\u{1b}[0m", "")
        .replace("[0m", "")
        .replace("BTC", "");
    let value = value.trim_matches(|c: char| c.is_whitespace() || c.is_control());
    match value.parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Some(price),
        _ => {
            tracing::debug!("Ignoring price update '{}'", line);
            None
        }
    }
}

struct Running {
    process: ManagedProcess,
    reader: JoinHandle<()>,
}

/// Owns the price ticker process and publishes every price it prints.
pub struct PriceFeed {
    supervisor: Arc<Supervisor>,
    binary: PathBuf,
    proxy_port: Option<u16>,
    running: tokio::sync::Mutex<Option<Running>>,
    latest: watch::Sender<Option<f64>>,
}

impl PriceFeed {
    pub fn new(settings: &Settings, supervisor: Arc<Supervisor>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            supervisor,
            binary: settings.binary(PRICE_TICKER_BINARY),
            proxy_port: settings.proxy.socks_port,
            running: tokio::sync::Mutex::new(None),
            latest,
        }
    }

    fn args(&self) -> Vec<String> {
        match self.proxy_port {
            Some(port) => vec!["--proxy".to_string(), port.to_string()],
            None => Vec::new(),
        }
    }

    /// Start the ticker. Does nothing if it is already running.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let request = SpawnRequest::new(ProcessRole::PriceFeed, &self.binary)
            .args(self.args())
            .capture(Capture::Stdout);
        let process = self.supervisor.spawn(request)?;

        let reader = match process.take_stdout() {
            Some(stdout) => {
                let latest = self.latest.clone();
                tokio::spawn(async move {
                    let prices = event_stream(tokio::io::BufReader::new(stdout), parse_price_line);
                    futures::pin_mut!(prices);
                    while let Some(price) = prices.next().await {
                        tracing::debug!("XMR price: {} BTC", price);
                        latest.send_replace(Some(price));
                    }
                    tracing::debug!("Price ticker output closed");
                })
            }
            None => tokio::spawn(async {}),
        };

        *running = Some(Running { process, reader });
        Ok(())
    }

    /// Kill the ticker. Returns false if it was not running.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.running.lock().await.take() else {
            return false;
        };
        running.reader.abort();
        self.supervisor.shutdown(&running.process).await;
        self.supervisor.release(&running.process);
        true
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub fn latest(&self) -> Option<f64> {
        *self.latest.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<f64>> {
        self.latest.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::PidStore;
    use std::time::Duration;

    #[test]
    fn test_parse_update_line() {
        let line = "2024-01-01 INFO PRICE_TICKER_UPDATE price=0.00271 BTC\u{1b}[0m";
        assert_eq!(parse_price_line(line), Some(0.00271));
        assert_eq!(parse_price_line("PRICE_TICKER_UPDATE=0.5BTC"), Some(0.5));
    }

    #[test]
    fn test_other_lines_are_ignored() {
        assert_eq!(parse_price_line("connecting to websocket"), None);
        assert_eq!(parse_price_line("PRICE_TICKER_UPDATE without value"), None);
        assert_eq!(parse_price_line("PRICE_TICKER_UPDATE=abc BTC"), None);
    }

    #[test]
    fn test_proxy_arg() {
        let mut settings = Settings::default();
        let supervisor = Arc::new(Supervisor::new(Arc::new(
            crate::process::MemoryPidStore::default(),
        )));
        assert!(PriceFeed::new(&settings, supervisor.clone()).args().is_empty());

        settings.proxy.socks_port = Some(9050);
        assert_eq!(PriceFeed::new(&settings, supervisor).args(), vec!["--proxy", "9050"]);
    }

    #[tokio::test]
    async fn test_feed_publishes_ticker_output() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let ticker = dir.path().join(PRICE_TICKER_BINARY);
        std::fs::write(
            &ticker,
            "#!/bin/sh\necho connecting\necho 'PRICE_TICKER_UPDATE price=0.0031 BTC'\nexec sleep 60\n",
        )
        .unwrap();
        std::fs::set_permissions(&ticker, std::fs::Permissions::from_mode(0o755)).unwrap();

        let settings = Settings {
            bin_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let pids = Arc::new(crate::process::MemoryPidStore::default());
        let feed = PriceFeed::new(&settings, Arc::new(Supervisor::new(pids.clone())));
        let mut prices = feed.subscribe();

        feed.start().await.unwrap();
        assert!(feed.is_running().await);
        tokio::time::timeout(Duration::from_secs(5), prices.changed())
            .await
            .expect("no price published")
            .unwrap();
        assert_eq!(feed.latest(), Some(0.0031));

        assert!(feed.stop().await);
        assert!(!feed.stop().await);
        assert_eq!(pids.load(ProcessRole::PriceFeed).unwrap(), None);
    }
}
