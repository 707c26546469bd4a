use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::endpoint::DeviceEndpoint;
use crate::app::error::AppError;

/// Decoded output of one bridge invocation. A process that could not be started at all has
/// `launched == false`, empty stdout and the failure description in stderr.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub launched: bool,
}

impl BridgeOutput {
    pub fn completed(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            launched: true,
        }
    }

    pub fn not_launched(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: None,
            launched: false,
        }
    }

    /// Timed out or killed: launched, but treated downstream as "no output".
    pub fn timed_out(reason: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason.into(),
            exit_code: None,
            launched: true,
        }
    }

    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    pub fn detail(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ConnectOutcome {
    Connected,
    AlreadyConnected,
    Failed(String),
}

impl ConnectOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ConnectOutcome::Failed(_))
    }
}

/// Everything reachable right now, as produced by one refresh cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconciledDeviceList {
    pub devices: Vec<DeviceEndpoint>,
    pub promoted: Vec<DeviceEndpoint>,
    pub saved: bool,
}


#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReconnectSummary {
    pub attempted: Vec<DeviceEndpoint>,
    pub reconnected: Vec<DeviceEndpoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeInfo {
    pub available: bool,
    pub version_output: String,
    pub command_path: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandResponse<T> {
    pub trace_id: String,
    pub data: T,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Refresh,
    Connect,
    Reconnect,
    RestartServer,
    AddByAddress,
    ListKnown,
    CheckBridge,
}

/// Completion notice delivered to the control surface for every submitted task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskReport {
    pub kind: TaskKind,
    pub trace_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<AppError>,
}

impl TaskReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}
