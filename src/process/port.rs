use crate::error::{Error, Result};
use rand::Rng;
use std::net::TcpListener;
use std::ops::Range;

/// Ports handed to wallet-RPC daemons are drawn from here.
pub const RPC_PORT_RANGE: Range<u16> = 5000..65000;

const MAX_PROBE_ATTEMPTS: usize = 50;

/// Pick a random port in `range` that can currently be bound on 127.0.0.1.
///
/// The probe listener is dropped before returning, so another process can
/// still take the port before the daemon binds it; the daemon then fails to
/// start and the caller sees a spawn error.
pub fn probe_open_port(range: Range<u16>) -> Result<u16> {
    if range.is_empty() {
        return Err(Error::PortAllocation(format!(
            "empty port range {}..{}",
            range.start, range.end
        )));
    }
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_PROBE_ATTEMPTS {
        let port = rng.gen_range(range.clone());
        if is_port_free(port) {
            return Ok(port);
        }
        tracing::debug!("Port {} is taken, probing another", port);
    }
    Err(Error::PortAllocation(format!(
        "no bindable port in {}..{} after {} attempts",
        range.start, range.end, MAX_PROBE_ATTEMPTS
    )))
}

pub fn is_port_free(port: u16) -> bool {
    TcpListener::bind(("127.0.0.1", port)).is_ok()
}
