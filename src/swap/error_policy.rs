//! Classification of engine-reported swap failures.
//!
//! The engine raises an [`ErrorEvent`] per failure; [`ErrorPolicy::decide`]
//! turns it into what the owning session does next.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of failure kinds the engine reports.
///
/// Serialized with the engine's own names (`"DeserializeCborError"`, ...).
/// Unrecognized names deserialize to `UnknownError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    SellerInsufficientBalance,
    SwapPunished,
    FailedToInitBitcoinWallet,
    FailedToInitRefundBitcoinWallet,
    FailedToInitMoneroWallet,
    EventLoopPanic,
    DeserializeCborError,
    EncryptedSignatureTransferError,
    EncryptedSignatureAckError,
    SellerEncounteredProblemError,
    FailedToInitAsbMoneroWallet,
    FailedToInitAsbBitcoinWallet,
    FailedToLoadSwapDatabase,
    FailedToLoadAsbDatabase,
    SwapDisconnected,
    FailedToReceiveTransferProof,
    ElectrumMissingTransaction,
    ElectrumFailedToSubscribeToHeaders,
    #[serde(other)]
    UnknownError,
}

impl ErrorKind {
    /// Kinds that are transient on the engine side: tear down and re-enter by resume.
    pub fn should_restart(self) -> bool {
        matches!(
            self,
            ErrorKind::FailedToInitMoneroWallet
                | ErrorKind::FailedToInitBitcoinWallet
                | ErrorKind::DeserializeCborError
                | ErrorKind::EncryptedSignatureTransferError
                | ErrorKind::SellerEncounteredProblemError
                | ErrorKind::EncryptedSignatureAckError
                | ErrorKind::FailedToReceiveTransferProof
                | ErrorKind::ElectrumMissingTransaction
                | ErrorKind::ElectrumFailedToSubscribeToHeaders
        )
    }

    /// Kinds that end the session without implying lost funds.
    pub fn is_warning(self) -> bool {
        self == ErrorKind::SwapDisconnected
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A failure the engine attributed to one swap. Consumed immediately, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEvent {
    pub swap_id: String,
    #[serde(rename = "errorType")]
    pub kind: ErrorKind,
    #[serde(rename = "errorMessage", default)]
    pub message: String,
    /// Always set by current engines, but not relied on.
    #[serde(default = "default_fatal")]
    pub fatal: bool,
}

fn default_fatal() -> bool {
    true
}

impl ErrorEvent {
    pub fn new(swap_id: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            swap_id: swap_id.into(),
            kind,
            message: message.into(),
            fatal: true,
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// What the owning session does with an [`ErrorEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Tear the session down and immediately re-enter it by resume, same swap id.
    Resume,
    /// Tear down; report once at warning level. Funds are not at risk.
    Warn,
    /// Tear down; report once as the swap's terminal failure.
    Fail,
    /// Log and keep the session running.
    Ignore,
}

impl Decision {
    pub fn tears_down(self) -> bool {
        !matches!(self, Decision::Ignore)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ErrorPolicy;

impl ErrorPolicy {
    pub fn decide(&self, event: &ErrorEvent) -> Decision {
        if !event.fatal {
            return Decision::Ignore;
        }
        if event.kind.should_restart() {
            Decision::Resume
        } else if event.kind.is_warning() {
            Decision::Warn
        } else {
            Decision::Fail
        }
    }

    /// Emit the log line matching the decision, exactly once per event.
    pub fn log(&self, event: &ErrorEvent, decision: Decision) {
        match decision {
            Decision::Resume => tracing::info!(
                "Swap {} hit {} ({}), restarting wallet and resuming",
                event.swap_id,
                event.kind,
                event.message
            ),
            Decision::Warn => tracing::warn!(
                "Disconnected from swap {}: {}. Resume soon or risk being punished",
                event.swap_id,
                event.message
            ),
            Decision::Fail => tracing::error!(
                "Swap {} failed with {}: {}",
                event.swap_id,
                event.kind,
                event.message
            ),
            Decision::Ignore if event.kind.should_restart() => tracing::info!(
                "Non-fatal {} on swap {}: {}",
                event.kind,
                event.swap_id,
                event.message
            ),
            Decision::Ignore => tracing::warn!(
                "Non-fatal {} on swap {}: {}",
                event.kind,
                event.swap_id,
                event.message
            ),
        }
    }
}
