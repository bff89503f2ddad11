//! Request-boundary checks: swap ids, peer multiaddrs and Monero addresses.

use crate::config::Network;
use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

static XMR_ADDRESS_REGEX: OnceLock<Regex> = OnceLock::new();

fn xmr_address_regex() -> &'static Regex {
    // Monero base58 alphabet; 95 chars standard/subaddress, 106 integrated
    XMR_ADDRESS_REGEX.get_or_init(|| {
        Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{95}$|^[1-9A-HJ-NP-Za-km-z]{106}$")
            .expect("static regex pattern is valid")
    })
}

const TRANSPORT_PROTOCOLS: &[&str] = &["ip4", "ip6", "dns", "dns4", "dns6", "onion3"];

/// Swap ids are UUIDs; returns the canonical hyphenated lowercase form.
pub fn validate_swap_id(swap_id: &str) -> Result<String> {
    uuid::Uuid::parse_str(swap_id.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| Error::InvalidSwapId(swap_id.to_string()))
}

pub fn validate_xmr_address(address: &str, network: Network) -> Result<()> {
    let address = address.trim();
    if !xmr_address_regex().is_match(address) {
        return Err(Error::InvalidAddress(format!(
            "'{}' is not a base58 address of 95 or 106 characters",
            address
        )));
    }
    let prefixes: &[char] = match network {
        Network::Mainnet => &['4', '8'],
        Network::Testnet => &['5', '7'],
    };
    if !address.starts_with(prefixes) {
        return Err(Error::InvalidAddress(format!(
            "address does not belong to {}",
            network
        )));
    }
    Ok(())
}

/// Structural check of a libp2p multiaddr string.
pub fn validate_multiaddr(addr: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidMultiaddr {
        addr: addr.to_string(),
        reason: reason.to_string(),
    };

    let rest = addr
        .strip_prefix('/')
        .ok_or_else(|| invalid("must start with '/'"))?;
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
        return Err(invalid("expected /<protocol>/<value> components"));
    }
    if !TRANSPORT_PROTOCOLS.contains(&parts[0]) {
        return Err(invalid("unsupported transport protocol"));
    }
    if let Some(pos) = parts.iter().position(|p| *p == "p2p") {
        if pos + 2 != parts.len() {
            return Err(invalid("/p2p/<peer-id> must be the last component"));
        }
    }
    if parts.len() % 2 != 0 {
        return Err(invalid("dangling protocol without a value"));
    }
    Ok(())
}

/// Builds a multiaddr the way sellers advertise themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multiaddr {
    pub protocol: String,
    pub address: String,
    pub port: Option<u16>,
    pub peer_id: Option<String>,
}

impl Multiaddr {
    pub fn new(protocol: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            address: address.into(),
            port: None,
            peer_id: None,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn peer(mut self, peer_id: impl Into<String>) -> Self {
        self.peer_id = Some(peer_id.into());
        self
    }
}

impl fmt::Display for Multiaddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.protocol == "onion3" {
            let host = self
                .address
                .strip_suffix(".onion")
                .unwrap_or(&self.address);
            write!(f, "/onion3/{}", host)?;
            if let Some(port) = self.port {
                write!(f, ":{}", port)?;
            }
        } else {
            write!(f, "/{}/{}", self.protocol, self.address)?;
            if let Some(port) = self.port {
                write!(f, "/tcp/{}", port)?;
            }
        }
        if let Some(ref peer) = self.peer_id {
            write!(f, "/p2p/{}", peer)?;
        }
        Ok(())
    }
}
