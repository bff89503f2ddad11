use super::Settings;
use crate::error::{Error, Result};

/// Smallest trade the maker may advertise, in BTC.
pub const MIN_MAKER_QUANTITY_BTC: f64 = 0.0005;

impl Settings {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        let maker = &self.maker;

        if maker.min_quantity_btc < MIN_MAKER_QUANTITY_BTC {
            return Err(Error::Config(format!(
                "maker.min_quantity_btc {} is below the minimum of {}",
                maker.min_quantity_btc, MIN_MAKER_QUANTITY_BTC
            )));
        }

        if maker.min_quantity_btc > maker.max_quantity_btc {
            return Err(Error::Config(format!(
                "maker.min_quantity_btc {} exceeds maker.max_quantity_btc {}",
                maker.min_quantity_btc, maker.max_quantity_btc
            )));
        }

        if maker.fee_percent < 0.0 || !maker.fee_percent.is_finite() {
            return Err(Error::Config(format!(
                "maker.fee_percent must be a non-negative number, got {}",
                maker.fee_percent
            )));
        }

        if self.proxy.socks_port == Some(0) {
            return Err(Error::Config("proxy.socks_port cannot be 0".to_string()));
        }

        for peer in &self.rendezvous_peers {
            crate::swap::validate_multiaddr(peer)
                .map_err(|e| Error::Config(format!("rendezvous_peers: {}", e)))?;
        }

        Ok(())
    }
}
