use std::fmt;

/// What the supervising loop should do once a session manager settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAction {
    KeepRunning,
    /// Tear everything down and start the orchestration again.
    Restart,
    Exit(i32),
}

impl ExitAction {
    pub fn is_exit(self) -> bool {
        matches!(self, ExitAction::Exit(_))
    }
}

impl fmt::Display for ExitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitAction::KeepRunning => write!(f, "keep-running"),
            ExitAction::Restart => write!(f, "restart"),
            ExitAction::Exit(code) => write!(f, "exit-with-code {}", code),
        }
    }
}
