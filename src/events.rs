use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationState {
    Active,
    Paused,
}

impl RotationState {
    pub fn toggled(self) -> Self {
        match self {
            Self::Active => Self::Paused,
            Self::Paused => Self::Active,
        }
    }

    /// Glyph shown by front-ends for this state.
    pub fn icon(self) -> &'static str {
        match self {
            Self::Active => "♻️",
            Self::Paused => "🧱",
        }
    }

    /// Label of the action that would leave this state.
    pub fn toggle_label(self) -> &'static str {
        match self {
            Self::Active => "Pause",
            Self::Paused => "Resume",
        }
    }
}

/// Commands accepted on the control socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum ControlCommand {
    ToggleState,
    RotateNow,
    #[serde(rename_all = "kebab-case")]
    SetConfig {
        directory: PathBuf,
        interval_secs: u64,
    },
    Status,
    Quit,
}

/// Snapshot published by the scheduler after every state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SchedulerStatus {
    pub state: RotationState,
    pub icon: String,
    pub toggle_label: String,
    pub directory: PathBuf,
    pub interval_secs: u64,
    pub last_dispatched: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ControlResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SchedulerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ControlResponse {
    pub fn ok(status: SchedulerStatus) -> Self {
        Self {
            ok: true,
            status: Some(status),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            status: None,
            error: Some(message.into()),
        }
    }
}

/// Control command in flight from the socket server to the scheduler task.
#[derive(Debug)]
pub struct ControlRequest {
    pub command: ControlCommand,
    pub reply: oneshot::Sender<ControlResponse>,
}
