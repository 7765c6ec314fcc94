//! Per-camera stream sessions

mod pipeline;
mod registry;
mod supervisor;
#[cfg(test)]
mod tests;

pub use pipeline::Pipeline;
pub use registry::{SessionRegistry, StreamSession, Viewer};

use serde::Serialize;

/// `Idle → Connecting → Streaming → (ReadError → Connecting) | Stopped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    ReadError,
    Stopped,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Streaming => "streaming",
            SessionState::ReadError => "read_error",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
