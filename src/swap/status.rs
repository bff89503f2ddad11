use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol status of a swap, as reported by the engine.
///
/// Buyer-side forward order:
///
/// ```text
/// Started ─► SetupComplete ─► BtcLocked ─► XmrLockProofReceived ─► XmrLocked
///     ─► EncSigSent ─► BtcRedeemed ─► XmrRedeemed
///
/// any non-terminal ─► CancelTimelockExpired ─► Cancelled ─► Refunded | Punished
/// any non-terminal ─► SafelyAborted
/// ```
///
/// The engine is the authority on which transitions are legal; this type only
/// knows which statuses end a swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStatus {
    Started,
    SetupComplete,
    BtcLocked,
    XmrLockProofReceived,
    XmrLocked,
    EncSigSent,
    BtcRedeemed,
    CancelTimelockExpired,
    Cancelled,
    Refunded,
    Punished,
    SafelyAborted,
    XmrRedeemed,
    /// Sentinel for a status string this build does not recognize.
    #[serde(other)]
    InvalidState,
}

/// How a terminal status ended the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
    Neutral,
}

impl SwapStatus {
    pub const ALL: [SwapStatus; 14] = [
        SwapStatus::Started,
        SwapStatus::SetupComplete,
        SwapStatus::BtcLocked,
        SwapStatus::XmrLockProofReceived,
        SwapStatus::XmrLocked,
        SwapStatus::EncSigSent,
        SwapStatus::BtcRedeemed,
        SwapStatus::CancelTimelockExpired,
        SwapStatus::Cancelled,
        SwapStatus::Refunded,
        SwapStatus::Punished,
        SwapStatus::SafelyAborted,
        SwapStatus::XmrRedeemed,
        SwapStatus::InvalidState,
    ];

    /// Map an engine status string. Unknown strings become `InvalidState`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "STARTED" => SwapStatus::Started,
            "SETUP_COMPLETE" => SwapStatus::SetupComplete,
            "BTC_LOCKED" => SwapStatus::BtcLocked,
            "XMR_LOCK_PROOF_RECEIVED" => SwapStatus::XmrLockProofReceived,
            "XMR_LOCKED" => SwapStatus::XmrLocked,
            "ENC_SIG_SENT" => SwapStatus::EncSigSent,
            "BTC_REDEEMED" => SwapStatus::BtcRedeemed,
            "CANCEL_TIMELOCK_EXPIRED" => SwapStatus::CancelTimelockExpired,
            "CANCELLED" => SwapStatus::Cancelled,
            "REFUNDED" => SwapStatus::Refunded,
            "PUNISHED" => SwapStatus::Punished,
            "SAFELY_ABORTED" => SwapStatus::SafelyAborted,
            "XMR_REDEEMED" => SwapStatus::XmrRedeemed,
            _ => SwapStatus::InvalidState,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwapStatus::Started => "STARTED",
            SwapStatus::SetupComplete => "SETUP_COMPLETE",
            SwapStatus::BtcLocked => "BTC_LOCKED",
            SwapStatus::XmrLockProofReceived => "XMR_LOCK_PROOF_RECEIVED",
            SwapStatus::XmrLocked => "XMR_LOCKED",
            SwapStatus::EncSigSent => "ENC_SIG_SENT",
            SwapStatus::BtcRedeemed => "BTC_REDEEMED",
            SwapStatus::CancelTimelockExpired => "CANCEL_TIMELOCK_EXPIRED",
            SwapStatus::Cancelled => "CANCELLED",
            SwapStatus::Refunded => "REFUNDED",
            SwapStatus::Punished => "PUNISHED",
            SwapStatus::SafelyAborted => "SAFELY_ABORTED",
            SwapStatus::XmrRedeemed => "XMR_REDEEMED",
            SwapStatus::InvalidState => "INVALID_STATE",
        }
    }

    /// The five statuses after which no further protocol progress occurs.
    ///
    /// `BtcRedeemed` counts: once the seller has redeemed, the engine finishes
    /// the XMR redemption within the same call and history never needs to
    /// resume it.
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            SwapStatus::XmrRedeemed | SwapStatus::BtcRedeemed => Some(Outcome::Success),
            SwapStatus::Refunded | SwapStatus::Punished => Some(Outcome::Failure),
            SwapStatus::SafelyAborted => Some(Outcome::Neutral),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.outcome().is_some()
    }

    /// Eligible for auto-resume on startup.
    pub fn is_incomplete(self) -> bool {
        !self.is_terminal()
    }

    pub fn is_terminal_success(self) -> bool {
        self.outcome() == Some(Outcome::Success)
    }

    /// Whether a tracker holding `self` may record `next`.
    ///
    /// Non-terminal statuses accept anything. A terminal status only moves on
    /// to `XmrRedeemed` from `BtcRedeemed`; everything else is sticky.
    pub fn accepts(self, next: SwapStatus) -> bool {
        if !self.is_terminal() {
            return true;
        }
        self == next || (self == SwapStatus::BtcRedeemed && next == SwapStatus::XmrRedeemed)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SwapStatus {
    fn from(s: &str) -> Self {
        SwapStatus::parse(s)
    }
}
