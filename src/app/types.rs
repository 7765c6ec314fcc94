/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
}

impl ShutdownReason {
    /// Process exit code reported once shutdown completes
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Signal(_) => 0,
            ShutdownReason::Error(_) => 1,
        }
    }
}

pub(super) const ALERTS: &str = "alerts";
pub(super) const SESSIONS: &str = "sessions";
pub(super) const STREAMING: &str = "streaming";
