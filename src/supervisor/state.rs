//! Process lifecycle states and exit reporting.

use std::fmt;
use std::process::ExitStatus;

/// Lifecycle state of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Error,
}

impl ProcessState {
    /// Whether `start` is allowed from this state
    pub fn can_start(&self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Error => "error",
        }
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the child ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitInfo {
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }

    /// Exit that could not be observed (wait itself failed)
    pub fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }

    /// Clean exit with status 0
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Diagnostic recorded when the exit is treated as a failure
    pub fn describe(&self) -> String {
        format!(
            "Process exited with code {}, signal {}",
            show(self.code),
            show(self.signal)
        )
    }
}

fn show(value: Option<i32>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}
