//! Child process ownership and the lifecycle state machine.

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio::time::timeout;

use super::observers::{ObserverList, Subscription};
use super::state::{ExitInfo, ProcessState};
use super::{START_GRACE, STOP_GRACE};
use crate::error::{GatewayError, Result};

/// Working directory and extra environment for the child
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    pub cwd: Option<PathBuf>,
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

/// What the supervisor keeps of a live child; the child itself lives in its watcher task
struct ChildHandle {
    pid: Option<u32>,
    control: mpsc::UnboundedSender<Signal>,
    exited: watch::Receiver<Option<ExitInfo>>,
    _stdin: Option<ChildStdin>,
}

struct Inner {
    state: ProcessState,
    error_message: Option<String>,
    /// Bumped by start, stop and destroy. Events from an older epoch are ignored.
    epoch: u64,
    child: Option<ChildHandle>,
}

struct Shared {
    /// Held from a state change until its observers return, so notifications arrive in the
    /// order the changes were made. Always taken before `inner`.
    transitions: Mutex<()>,
    inner: Mutex<Inner>,
    observers: ObserverList,
    start_grace: Duration,
    stop_grace: Duration,
}

/// Starts, watches and terminates one child process at a time.
///
/// Cloning yields another handle to the same supervisor. Observers run while a transition is
/// in progress and must not call `start`, `stop` or `destroy` synchronously.
#[derive(Clone)]
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSupervisor {
    pub fn new() -> Self {
        Self::with_grace_periods(START_GRACE, STOP_GRACE)
    }

    fn with_grace_periods(start_grace: Duration, stop_grace: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                transitions: Mutex::new(()),
                inner: Mutex::new(Inner {
                    state: ProcessState::Stopped,
                    error_message: None,
                    epoch: 0,
                    child: None,
                }),
                observers: ObserverList::default(),
                start_grace,
                stop_grace,
            }),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.shared.lock().state
    }

    /// Message recorded by the last failure, cleared on each start
    pub fn error_message(&self) -> Option<String> {
        self.shared.lock().error_message.clone()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessState::Running
    }

    /// OS pid of the owned child, if any
    pub fn pid(&self) -> Option<u32> {
        self.shared.lock().child.as_ref().and_then(|child| child.pid)
    }

    /// Register `callback` for every state transition
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ProcessState) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(callback)
    }

    /// Returns false if `subscription` was not registered
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.shared.observers.unsubscribe(subscription)
    }

    /// Spawn `command` (program followed by its arguments).
    ///
    /// Resolves once the OS confirms the spawn. If no confirmation arrives within the start grace
    /// period the process is assumed to be running; a spawn failure reported after that still
    /// moves the state to error.
    pub async fn start(&self, command: &[String], options: SpawnOptions) -> Result<()> {
        let epoch = {
            let _transition = self.shared.begin_transition();
            let epoch = {
                let mut inner = self.shared.lock();
                if !inner.state.can_start() {
                    return Err(GatewayError::StateConflict(format!(
                        "Cannot start process: already {}",
                        inner.state
                    )));
                }
                inner.epoch += 1;
                inner.error_message = None;
                inner.state = ProcessState::Starting;
                inner.epoch
            };
            self.shared.observers.notify(ProcessState::Starting);
            epoch
        };

        let Some((program, args)) = command.split_first() else {
            let message = "Cannot start process: empty command".to_string();
            self.fail(epoch, &message);
            return Err(GatewayError::Spawn(message));
        };

        log::info!("Starting process: {}", command.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&options.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        let mut spawning = tokio::task::spawn_blocking(move || cmd.spawn());
        match timeout(self.shared.start_grace, &mut spawning).await {
            Ok(outcome) => self.finish_spawn(epoch, flatten(outcome)),
            Err(_) => {
                log::warn!(
                    "No spawn confirmation within {:?}, assuming the process is running",
                    self.shared.start_grace
                );
                self.transition(epoch, ProcessState::Starting, ProcessState::Running);

                let supervisor = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = supervisor.finish_spawn(epoch, flatten(spawning.await)) {
                        log::error!("Late spawn failure: {}", e);
                    }
                });
                Ok(())
            }
        }
    }

    /// Terminate the child gracefully, escalating to SIGKILL after the stop grace period.
    ///
    /// No-op when already stopped or stopping.
    pub async fn stop(&self) -> Result<()> {
        let (epoch, signals) = {
            let _transition = self.shared.begin_transition();
            let stopping = {
                let mut inner = self.shared.lock();
                if matches!(inner.state, ProcessState::Stopped | ProcessState::Stopping) {
                    return Ok(());
                }
                inner.epoch += 1;
                inner.state = ProcessState::Stopping;
                let signals = inner
                    .child
                    .as_ref()
                    .map(|child| (child.control.clone(), child.exited.clone()));
                (inner.epoch, signals)
            };
            self.shared.observers.notify(ProcessState::Stopping);
            stopping
        };

        if let Some((control, mut exited)) = signals {
            let _ = control.send(Signal::Terminate);
            let exited_in_time = timeout(self.shared.stop_grace, exited.wait_for(Option::is_some))
                .await
                .is_ok();
            if !exited_in_time {
                log::warn!(
                    "Process did not exit within {:?}, sending SIGKILL",
                    self.shared.stop_grace
                );
                let _ = control.send(Signal::Kill);
            }
        }

        let _transition = self.shared.begin_transition();
        let stopped = {
            let mut inner = self.shared.lock();
            if inner.epoch == epoch {
                inner.child = None;
                inner.state = ProcessState::Stopped;
                true
            } else {
                false
            }
        };
        if stopped {
            log::info!("Process stopped");
            self.shared.observers.notify(ProcessState::Stopped);
        }
        Ok(())
    }

    /// Kill the child immediately, drop every observer and force the stopped state
    pub fn destroy(&self) {
        // No notification, so no transition lock; observers may call this.
        self.shared.observers.clear();
        let child = {
            let mut inner = self.shared.lock();
            inner.epoch += 1;
            inner.state = ProcessState::Stopped;
            inner.child.take()
        };
        if let Some(child) = child {
            log::info!("Destroying process (pid {:?})", child.pid);
            let _ = child.control.send(Signal::Kill);
        }
    }

    /// Record the outcome of a spawn started under `epoch`
    fn finish_spawn(&self, epoch: u64, outcome: io::Result<Child>) -> Result<()> {
        let mut child = match outcome {
            Ok(child) => child,
            Err(e) => {
                let message = format!("Failed to spawn process: {}", e);
                self.fail(epoch, &message);
                return Err(GatewayError::Spawn(message));
            }
        };

        let _transition = self.shared.begin_transition();
        let mut inner = self.shared.lock();
        if inner.epoch != epoch {
            drop(inner);
            let _ = child.start_kill();
            return Err(GatewayError::Supervisor(
                "Process start was cancelled".to_string(),
            ));
        }

        let pid = child.id();
        let stdin = child.stdin.take();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (exited_tx, exited_rx) = watch::channel(None);
        tokio::spawn(watch_child(
            Arc::clone(&self.shared),
            epoch,
            child,
            control_rx,
            exited_tx,
        ));
        inner.child = Some(ChildHandle {
            pid,
            control: control_tx,
            exited: exited_rx,
            _stdin: stdin,
        });
        let promoted = inner.state == ProcessState::Starting;
        if promoted {
            inner.state = ProcessState::Running;
        }
        drop(inner);

        log::info!("Process started (pid {:?})", pid);
        if promoted {
            self.shared.observers.notify(ProcessState::Running);
        }
        Ok(())
    }

    fn fail(&self, epoch: u64, message: &str) {
        log::error!("{}", message);
        let _transition = self.shared.begin_transition();
        {
            let mut inner = self.shared.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.state = ProcessState::Error;
            inner.error_message = Some(message.to_string());
            inner.child = None;
        }
        self.shared.observers.notify(ProcessState::Error);
    }

    fn transition(&self, epoch: u64, from: ProcessState, to: ProcessState) {
        let _transition = self.shared.begin_transition();
        {
            let mut inner = self.shared.lock();
            if inner.epoch != epoch || inner.state != from {
                return;
            }
            inner.state = to;
        }
        self.shared.observers.notify(to);
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_transition(&self) -> MutexGuard<'_, ()> {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Exit observed by the watcher of `epoch`
    fn on_exit(&self, epoch: u64, exit: &ExitInfo) {
        let _transition = self.begin_transition();
        let next = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.child = None;
            match inner.state {
                ProcessState::Starting | ProcessState::Running => {
                    if exit.success() {
                        inner.state = ProcessState::Stopped;
                    } else {
                        inner.state = ProcessState::Error;
                        inner.error_message = Some(exit.describe());
                    }
                    inner.state
                }
                _ => return,
            }
        };

        if next == ProcessState::Error {
            log::error!("{}", exit.describe());
        } else {
            log::info!("Process exited cleanly");
        }
        self.observers.notify(next);
    }
}

fn flatten(outcome: std::result::Result<io::Result<Child>, JoinError>) -> io::Result<Child> {
    outcome.unwrap_or_else(|e| Err(io::Error::other(e.to_string())))
}

/// Own the child until it exits, relaying control signals to it
async fn watch_child(
    shared: Arc<Shared>,
    epoch: u64,
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<Signal>,
    exited: watch::Sender<Option<ExitInfo>>,
) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(drain(stdout));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(drain(stderr));
    }

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            signal = control.recv() => match signal {
                Some(Signal::Terminate) => terminate(&mut child),
                Some(Signal::Kill) => {
                    let _ = child.start_kill();
                }
                None => {
                    let _ = child.start_kill();
                    break child.wait().await;
                }
            },
        }
    };

    let exit = match status {
        Ok(status) => ExitInfo::from_status(status),
        Err(e) => {
            log::warn!("Failed to wait for process: {}", e);
            ExitInfo::unknown()
        }
    };
    log::debug!("Child exited: {:?}", exit);
    let _ = exited.send(Some(exit.clone()));
    shared.on_exit(epoch, &exit);
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    match child.id() {
        Some(pid) => {
            // SAFETY: plain signal delivery to a pid we spawned and have not reaped yet
            let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
            if rc != 0 {
                let _ = child.start_kill();
            }
        }
        None => {
            let _ = child.start_kill();
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    let _ = child.start_kill();
}

async fn drain<R: AsyncRead + Unpin>(mut stream: R) {
    let _ = tokio::io::copy(&mut stream, &mut tokio::io::sink()).await;
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn record(supervisor: &ProcessSupervisor) -> Arc<Mutex<Vec<ProcessState>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        supervisor.subscribe(move |state| sink.lock().unwrap().push(state));
        seen
    }

    async fn wait_for_state(supervisor: &ProcessSupervisor, expected: ProcessState) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.state() != expected {
            assert!(
                Instant::now() < deadline,
                "state stuck at {} waiting for {}",
                supervisor.state(),
                expected
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let supervisor = ProcessSupervisor::new();
        let seen = record(&supervisor);

        supervisor
            .start(&sh("sleep 30"), SpawnOptions::default())
            .await
            .unwrap();
        assert!(supervisor.is_running());
        assert!(supervisor.pid().is_some());

        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
        assert!(supervisor.pid().is_none());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ProcessState::Starting,
                ProcessState::Running,
                ProcessState::Stopping,
                ProcessState::Stopped,
            ]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fast_exit_notifies_in_order() {
        for _ in 0..100 {
            let supervisor = ProcessSupervisor::new();
            let seen = record(&supervisor);
            supervisor
                .start(&["true".to_string()], SpawnOptions::default())
                .await
                .unwrap();

            let deadline = Instant::now() + Duration::from_secs(5);
            while seen.lock().unwrap().len() < 3 {
                assert!(Instant::now() < deadline, "saw {:?}", seen.lock().unwrap());
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
            assert_eq!(
                *seen.lock().unwrap(),
                vec![
                    ProcessState::Starting,
                    ProcessState::Running,
                    ProcessState::Stopped,
                ]
            );
            assert_eq!(supervisor.state(), ProcessState::Stopped);
        }
    }

    #[tokio::test]
    async fn test_concurrent_start_conflicts() {
        let supervisor = ProcessSupervisor::new();
        let command = sh("sleep 30");
        let (first, second) = tokio::join!(
            supervisor.start(&command, SpawnOptions::default()),
            supervisor.start(&command, SpawnOptions::default())
        );
        assert!(first.is_ok());
        match second {
            Err(GatewayError::StateConflict(message)) => {
                assert_eq!(message, "Cannot start process: already starting")
            }
            other => panic!("expected state conflict, got {:?}", other),
        }
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_while_running_conflicts() {
        let supervisor = ProcessSupervisor::new();
        supervisor
            .start(&sh("sleep 30"), SpawnOptions::default())
            .await
            .unwrap();
        let pid = supervisor.pid();

        let err = supervisor
            .start(&sh("sleep 30"), SpawnOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already running"));
        assert_eq!(supervisor.pid(), pid);
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_clean_exit_moves_to_stopped() {
        let supervisor = ProcessSupervisor::new();
        supervisor
            .start(&sh("exit 0"), SpawnOptions::default())
            .await
            .unwrap();
        wait_for_state(&supervisor, ProcessState::Stopped).await;
        assert!(supervisor.error_message().is_none());
        assert!(supervisor.pid().is_none());
    }

    #[tokio::test]
    async fn test_failed_exit_moves_to_error() {
        let supervisor = ProcessSupervisor::new();
        supervisor
            .start(&sh("exit 3"), SpawnOptions::default())
            .await
            .unwrap();
        wait_for_state(&supervisor, ProcessState::Error).await;
        let message = supervisor.error_message().unwrap();
        assert!(message.contains("code 3"), "{}", message);
    }

    #[tokio::test]
    async fn test_spawn_failure_then_restart_clears_error() {
        let supervisor = ProcessSupervisor::new();
        let missing = vec!["/nonexistent/siyuan-mcp-binary".to_string()];
        let err = supervisor
            .start(&missing, SpawnOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Spawn(_)));
        assert_eq!(supervisor.state(), ProcessState::Error);
        assert!(supervisor.error_message().is_some());

        supervisor
            .start(&sh("sleep 30"), SpawnOptions::default())
            .await
            .unwrap();
        assert!(supervisor.error_message().is_none());
        supervisor.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_command_is_spawn_failure() {
        let supervisor = ProcessSupervisor::new();
        let err = supervisor.start(&[], SpawnOptions::default()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Spawn(_)));
        assert_eq!(supervisor.state(), ProcessState::Error);
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_noop() {
        let supervisor = ProcessSupervisor::new();
        let seen = record(&supervisor);
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_escalates_to_kill() {
        let supervisor =
            ProcessSupervisor::with_grace_periods(START_GRACE, Duration::from_millis(200));
        supervisor
            .start(&sh("trap '' TERM; sleep 5"), SpawnOptions::default())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = Instant::now();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_late_spawn_failure_reaches_error() {
        let supervisor = ProcessSupervisor::with_grace_periods(Duration::ZERO, STOP_GRACE);
        let missing = vec!["/nonexistent/siyuan-mcp-binary".to_string()];
        let _ = supervisor.start(&missing, SpawnOptions::default()).await;
        wait_for_state(&supervisor, ProcessState::Error).await;
    }

    #[tokio::test]
    async fn test_panicking_observer_does_not_break_transitions() {
        let supervisor = ProcessSupervisor::new();
        supervisor.subscribe(|_| panic!("observer failure"));
        let seen = record(&supervisor);

        supervisor
            .start(&sh("sleep 30"), SpawnOptions::default())
            .await
            .unwrap();
        supervisor.stop().await.unwrap();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_notifications() {
        let supervisor = ProcessSupervisor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = supervisor.subscribe(move |state| sink.lock().unwrap().push(state));
        assert!(supervisor.unsubscribe(subscription));

        supervisor
            .start(&sh("exit 0"), SpawnOptions::default())
            .await
            .unwrap();
        wait_for_state(&supervisor, ProcessState::Stopped).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_destroy_clears_observers_and_child() {
        let supervisor = ProcessSupervisor::new();
        let seen = record(&supervisor);
        supervisor
            .start(&sh("sleep 30"), SpawnOptions::default())
            .await
            .unwrap();

        supervisor.destroy();
        assert_eq!(supervisor.state(), ProcessState::Stopped);
        assert!(supervisor.pid().is_none());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProcessState::Starting, ProcessState::Running]
        );

        // A later exit event from the killed child must not move the state.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(supervisor.state(), ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_spawn_options_env_and_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("SIYUAN_MCP_TEST_CODE".to_string(), "4".to_string());
        let options = SpawnOptions {
            cwd: Some(dir.path().to_path_buf()),
            env,
        };

        let supervisor = ProcessSupervisor::new();
        supervisor
            .start(&sh("test -d . && exit $SIYUAN_MCP_TEST_CODE"), options)
            .await
            .unwrap();
        wait_for_state(&supervisor, ProcessState::Error).await;
        assert!(supervisor.error_message().unwrap().contains("code 4"));
    }
}
