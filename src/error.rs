// Struct-variant fields read only by the derived Display trip unused_assignments.
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(
        code(swapd::config::error),
        help("Check swapd.yaml in your data directory")
    )]
    Config(String),

    #[error("Invalid request: {0}")]
    #[diagnostic(code(swapd::request::invalid))]
    Validation(String),

    #[error("Invalid swap id '{0}'")]
    #[diagnostic(
        code(swapd::request::invalid_swap_id),
        help("Swap ids are UUIDs, list them with `swapd history`")
    )]
    InvalidSwapId(String),

    #[error("Invalid Monero address: {0}")]
    #[diagnostic(code(swapd::request::invalid_address))]
    InvalidAddress(String),

    #[error("Invalid multiaddr '{addr}': {reason}")]
    #[diagnostic(
        code(swapd::request::invalid_multiaddr),
        help("Expected something like /onion3/<host>:<port>/p2p/<peer-id>")
    )]
    InvalidMultiaddr { addr: String, reason: String },

    #[error("A swap is already running ({0})")]
    #[diagnostic(
        code(swapd::session::busy),
        help("Wait for the running swap to finish")
    )]
    Busy(String),

    #[error("Maker is already running")]
    #[diagnostic(code(swapd::maker::already_running))]
    MakerAlreadyRunning,

    #[error("Proxy on port {0} is not ready")]
    #[diagnostic(
        code(swapd::proxy::not_ready),
        help("Start Tor (or the configured SOCKS proxy) before starting a swap")
    )]
    ProxyNotReady(u16),

    #[error("Failed to spawn {role}: {reason}")]
    #[diagnostic(
        code(swapd::process::spawn_failed),
        help("Check that the binary exists in bin_dir and is executable")
    )]
    Spawn { role: String, reason: String },

    #[error("Process error: {0}")]
    #[diagnostic(code(swapd::process::error))]
    Process(String),

    #[error("Port allocation failed: {0}")]
    #[diagnostic(code(swapd::port::allocation_failed))]
    PortAllocation(String),

    #[error("Registry error: {0}")]
    #[diagnostic(code(swapd::registry::error))]
    Registry(String),

    #[error("Engine call '{call}' failed: {reason}")]
    #[diagnostic(code(swapd::engine::call_failed))]
    Engine { call: String, reason: String },

    #[error("Session error: {0}")]
    #[diagnostic(code(swapd::session::error))]
    Session(String),

    #[error("Invalid PID {pid}: {reason}")]
    InvalidPid { pid: u32, reason: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn engine(call: &str, reason: impl ToString) -> Self {
        Error::Engine {
            call: call.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::Busy(swap_id) => Some(format!(
                "Swap {} is still running. Wait for it to finish, or interrupt it and later run `swapd resume {}`.",
                swap_id, swap_id
            )),
            Error::MakerAlreadyRunning => Some(
                "Stop the running maker first, or kill leftovers with `swapd kill-orphans`".to_string(),
            ),
            Error::ProxyNotReady(port) => Some(format!(
                "Nothing is accepting SOCKS connections on 127.0.0.1:{}. Start Tor or unset proxy.socks_port.",
                port
            )),
            Error::Spawn { .. } => {
                Some("Check that bin_dir in swapd.yaml points at the external binaries".to_string())
            }
            Error::InvalidSwapId(_) => Some("List known swaps with: swapd history".to_string()),
            Error::Config(_) => Some("Validate your settings file (swapd.yaml)".to_string()),
            Error::PortAllocation(_) => Some(
                "No free port in 5000..65000 could be bound on 127.0.0.1. Check for port exhaustion."
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

/// Validates and converts a u32 PID to nix::unistd::Pid safely.
/// Returns Err for PID 0 (process group), PID 1 (init), or values > i32::MAX.
pub fn validate_pid(pid: u32, role: &str) -> Result<nix::unistd::Pid> {
    if pid == 0 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID 0 is invalid for {} (refers to process group, not a process)",
                role
            ),
        });
    }
    if pid == 1 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!("refusing to signal PID 1 (init) for {}", role),
        });
    }
    if pid > i32::MAX as u32 {
        return Err(Error::InvalidPid {
            pid,
            reason: format!(
                "PID {} exceeds i32::MAX for {}, cannot convert safely",
                pid, role
            ),
        });
    }
    Ok(nix::unistd::Pid::from_raw(pid as i32))
}

/// Same as validate_pid but allows PID 1 for read-only existence checks.
pub fn validate_pid_for_check(pid: u32) -> Option<nix::unistd::Pid> {
    if pid == 0 || pid > i32::MAX as u32 {
        return None;
    }
    Some(nix::unistd::Pid::from_raw(pid as i32))
}
