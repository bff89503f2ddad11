//! Swap domain: protocol statuses, per-swap session snapshots, the state
//! tracker and the error policy.

mod active;
mod error_policy;
mod session;
mod status;
mod tracker;
mod validation;

pub use active::ActiveSessions;
pub use error_policy::{Decision, ErrorEvent, ErrorKind, ErrorPolicy};
pub use session::{Coin, LockTxid, Role, SwapSession};
pub use status::{Outcome, SwapStatus};
pub use tracker::{Observation, StateTracker};
pub use validation::{validate_multiaddr, validate_swap_id, validate_xmr_address, Multiaddr};
