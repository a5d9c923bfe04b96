//! Subprocess lifecycle supervisor
//!
//! Used by a parent application to run the gateway as a child process and observe its health.
//! Never touches protocol traffic.

mod observers;
mod process;
mod state;

use std::time::Duration;

pub use observers::Subscription;
pub use process::{ProcessSupervisor, SpawnOptions};
pub use state::{ExitInfo, ProcessState};

/// Time allowed for spawn confirmation before the child is assumed to be running
pub const START_GRACE: Duration = Duration::from_secs(5);

/// Time allowed for a graceful exit before SIGKILL
pub const STOP_GRACE: Duration = Duration::from_secs(5);
