//! Engine process supervisor.
//!
//! Owns at most one live worker process and runs the readiness protocol:
//!
//! 1. Spawn the worker with piped stdio and unbuffered output.
//! 2. Read stdout line-by-line; a sentinel substring means the embedded HTTP
//!    server is listening and `start()` resolves immediately (fast path).
//! 3. If the process exits first, `start()` fails with `WorkerExited`.
//! 4. If the platform readiness timeout fires first, fall back to one health
//!    probe — and resolve ready either way (optimistic-ready): the engine may
//!    still be downloading models, and the resilient client masks the
//!    remaining warm-up window.
//!
//! Process events (stdout line, exit) are typed and funneled through a single
//! event loop task, so state transitions are serialized instead of racing
//! across stream callbacks. `start()` and `stop()` share one lifecycle lock:
//! a second `start()` issued mid-flight awaits the in-flight attempt and then
//! observes its outcome, and `stop()` cannot interleave with the spawn
//! window.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::{Mutex, mpsc, oneshot};
use url::Url;

use crate::launch::{EngineSpawner, ProcessSpawner, WorkerSpec};
use crate::platform::{PlatformProfile, Termination};
use crate::probe::HealthProbe;

/// Fixed loopback address of the engine's embedded HTTP server.
pub const ENGINE_HOST: &str = "127.0.0.1";
pub const ENGINE_PORT: u16 = 5000;

/// Stdout substrings that signal the embedded server has bound its port and
/// finished application startup.
const READY_SENTINELS: [&str; 2] = ["Uvicorn running on", "Application startup complete"];

/// Lines of worker stdout retained for diagnostics.
const STDOUT_TAIL_LINES: usize = 100;

/// Readiness of the supervised worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    Stopped,
    Starting,
    /// Readiness timer fired; one health probe is in flight.
    ProbingHealth,
    Ready,
    Stopping,
    /// The worker could not be spawned at the OS level.
    Failed,
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("engine executable not found: {0}")]
    ExecutableNotFound(PathBuf),

    #[error("engine API script not found: {0}")]
    ScriptNotFound(PathBuf),

    #[error("failed to spawn engine process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    #[error("engine exited before becoming ready (exit code {code:?})")]
    WorkerExited { code: Option<i32> },
}

/// Typed events the worker monitor feeds into the readiness event loop.
#[derive(Debug)]
enum WorkerEvent {
    StdoutLine(String),
    Exited(Option<i32>),
}

enum WorkerCommand {
    Terminate(Termination),
}

/// The live OS process, exclusively owned by the supervisor.
struct WorkerHandle {
    pid: u32,
    control: mpsc::UnboundedSender<WorkerCommand>,
    stdout_tail: Arc<StdMutex<VecDeque<String>>>,
}

struct SupervisorInner {
    state: StdMutex<ReadinessState>,
    handle: StdMutex<Option<WorkerHandle>>,
}

impl SupervisorInner {
    fn set_state(&self, state: ReadinessState) {
        *self.state.lock().unwrap() = state;
    }

    fn state(&self) -> ReadinessState {
        *self.state.lock().unwrap()
    }

    /// Clear the handle if it still belongs to the worker identified by
    /// `pid`. A monitor from an earlier generation must not clobber a newer
    /// worker's handle or state.
    fn clear_handle_for(&self, pid: u32) -> bool {
        let mut handle = self.handle.lock().unwrap();
        if handle.as_ref().is_some_and(|h| h.pid == pid) {
            *handle = None;
            true
        } else {
            false
        }
    }
}

/// Supervises the out-of-process compute engine reachable over loopback HTTP.
pub struct EngineSupervisor {
    spec: WorkerSpec,
    platform: PlatformProfile,
    spawner: Arc<dyn EngineSpawner>,
    probe: HealthProbe,
    endpoint: Url,
    inner: Arc<SupervisorInner>,
    /// Serializes start/stop so lifecycle operations cannot race.
    lifecycle: Mutex<()>,
}

impl EngineSupervisor {
    pub fn new(spec: WorkerSpec) -> Self {
        Self::with_spawner(spec, PlatformProfile::native(), Arc::new(ProcessSpawner))
    }

    pub fn with_spawner(
        spec: WorkerSpec,
        platform: PlatformProfile,
        spawner: Arc<dyn EngineSpawner>,
    ) -> Self {
        let endpoint = Url::parse(&format!("http://{ENGINE_HOST}:{ENGINE_PORT}"))
            .expect("engine endpoint constant is a valid URL");
        Self {
            spec,
            platform,
            spawner,
            probe: HealthProbe::new(),
            endpoint,
            inner: Arc::new(SupervisorInner {
                state: StdMutex::new(ReadinessState::Stopped),
                handle: StdMutex::new(None),
            }),
            lifecycle: Mutex::new(()),
        }
    }

    /// Override the endpoint the supervisor advertises and probes. Intended
    /// for tests; production uses the fixed loopback constant.
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_probe(mut self, probe: HealthProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Base URL of the engine's HTTP API. Deterministic and available
    /// regardless of readiness; callers consult [`Self::is_ready`] or rely on
    /// the resilient client to mask transient unavailability.
    pub fn endpoint_url(&self) -> Url {
        self.endpoint.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state() == ReadinessState::Ready
    }

    pub fn state(&self) -> ReadinessState {
        self.inner.state()
    }

    /// Last stdout lines from the current worker, oldest first. Empty when no
    /// worker is running.
    pub fn stdout_tail(&self) -> Vec<String> {
        self.inner
            .handle
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.stdout_tail.lock().unwrap().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Start the worker and wait for readiness.
    ///
    /// Idempotent: if a worker is already running (or another `start()` just
    /// brought one up), returns Ok without spawning again.
    pub async fn start(&self) -> Result<(), StartError> {
        let _lifecycle = self.lifecycle.lock().await;

        if self.inner.handle.lock().unwrap().is_some() {
            tracing::debug!("engine already running, start is a no-op");
            return Ok(());
        }

        if !self.spec.executable.exists() {
            return Err(StartError::ExecutableNotFound(self.spec.executable.clone()));
        }
        if let Some(ref script) = self.spec.script {
            if !script.exists() {
                return Err(StartError::ScriptNotFound(script.clone()));
            }
        }

        tracing::info!(
            executable = %self.spec.executable.display(),
            timeout_secs = self.platform.readiness_timeout.as_secs(),
            "starting engine worker"
        );
        self.inner.set_state(ReadinessState::Starting);

        let mut child = match self.spawner.spawn(&self.spec) {
            Ok(child) => child,
            Err(e) => {
                self.inner.set_state(ReadinessState::Failed);
                return Err(StartError::SpawnFailed(e));
            }
        };

        let pid = child.id().unwrap_or(0);
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            // Should not happen with ProcessSpawner, which always pipes
            // stdout. Kill the orphan rather than leak it.
            None => {
                if let Err(e) = child.start_kill() {
                    tracing::warn!(error = %e, "failed to kill worker without piped stdout");
                }
                self.inner.set_state(ReadinessState::Failed);
                return Err(StartError::SpawnFailed(std::io::Error::other(
                    "worker stdout not captured",
                )));
            }
        };
        let stderr = child.stderr.take();

        let stdout_tail = Arc::new(StdMutex::new(VecDeque::with_capacity(STDOUT_TAIL_LINES)));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump_stdout(stdout, Arc::clone(&stdout_tail), event_tx.clone()));
        if let Some(stderr) = stderr {
            tokio::spawn(pump_stderr(stderr));
        }
        tokio::spawn(monitor_worker(child, control_rx, event_tx));

        *self.inner.handle.lock().unwrap() = Some(WorkerHandle {
            pid,
            control: control_tx,
            stdout_tail,
        });

        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(readiness_loop(
            Arc::clone(&self.inner),
            event_rx,
            ready_tx,
            self.probe.clone(),
            self.endpoint.clone(),
            self.platform.readiness_timeout,
            pid,
        ));

        tracing::debug!(pid, "engine worker spawned, waiting for readiness");
        match ready_rx.await {
            Ok(result) => result,
            // Event loop dropped the sender without resolving; treat as an
            // exit with unknown code.
            Err(_) => Err(StartError::WorkerExited { code: None }),
        }
    }

    /// Terminate the worker. Fire-and-forget: sends the platform termination
    /// signal and returns without waiting for exit confirmation. No-op when
    /// nothing is running.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;

        let handle = self.inner.handle.lock().unwrap().take();
        let Some(handle) = handle else {
            return;
        };

        tracing::info!(pid = handle.pid, "stopping engine worker");
        self.inner.set_state(ReadinessState::Stopping);
        let _ = handle
            .control
            .send(WorkerCommand::Terminate(self.platform.termination));
        self.inner.set_state(ReadinessState::Stopped);
    }
}

fn is_ready_line(line: &str) -> bool {
    READY_SENTINELS.iter().any(|s| line.contains(s))
}

async fn pump_stdout(
    stdout: ChildStdout,
    tail: Arc<StdMutex<VecDeque<String>>>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::debug!(target: "quicktrans::engine", "{line}");
        {
            let mut tail = tail.lock().unwrap();
            if tail.len() == STDOUT_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line.clone());
        }
        if events.send(WorkerEvent::StdoutLine(line)).is_err() {
            break;
        }
    }
}

/// Stderr is diagnostics only and never used to infer readiness. Uvicorn
/// request logging arrives here prefixed with `INFO:`; keep it below warn.
async fn pump_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.contains("INFO:") {
            tracing::debug!(target: "quicktrans::engine", "{line}");
        } else {
            tracing::warn!(target: "quicktrans::engine", "{line}");
        }
    }
}

/// Owns the child: forwards termination commands and reports process exit.
async fn monitor_worker(
    mut child: Child,
    mut control: mpsc::UnboundedReceiver<WorkerCommand>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    let mut control_open = true;
    loop {
        tokio::select! {
            cmd = control.recv(), if control_open => {
                match cmd {
                    Some(WorkerCommand::Terminate(kind)) => terminate(&mut child, kind),
                    None => control_open = false,
                }
            }
            status = child.wait() => {
                let code = status.ok().and_then(|s| s.code());
                tracing::info!(exit_code = ?code, "engine worker exited");
                let _ = events.send(WorkerEvent::Exited(code));
                break;
            }
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child, kind: Termination) {
    match kind {
        Termination::Graceful => {
            if let Some(pid) = child.id() {
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
                    tracing::warn!(error = %e, "failed to send SIGTERM to engine worker");
                }
            }
        }
        Termination::Forceful => {
            if let Err(e) = child.start_kill() {
                tracing::warn!(error = %e, "failed to kill engine worker");
            }
        }
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child, _kind: Termination) {
    // No graceful signal to send here; TerminateProcess is all we have.
    if let Err(e) = child.start_kill() {
        tracing::warn!(error = %e, "failed to kill engine worker");
    }
}

/// Single serialized consumer of worker events during and after startup.
///
/// Resolves the pending `start()` exactly once, through `ready_tx`. An
/// observed exit always takes precedence over a later readiness signal: once
/// the exit event is processed the loop ends and no `Ready` transition can
/// follow.
async fn readiness_loop(
    inner: Arc<SupervisorInner>,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    ready_tx: oneshot::Sender<Result<(), StartError>>,
    probe: HealthProbe,
    endpoint: Url,
    timeout: std::time::Duration,
    pid: u32,
) {
    let mut pending = Some(ready_tx);
    let timer = tokio::time::sleep(timeout);
    tokio::pin!(timer);

    loop {
        tokio::select! {
            _ = &mut timer, if pending.is_some() => {
                // No sentinel within the window. Ask the engine directly,
                // then resolve ready either way: a cold start may still be
                // loading models, and blocking application startup
                // indefinitely is worse than letting the resilient client
                // absorb the warm-up.
                inner.set_state(ReadinessState::ProbingHealth);
                let healthy = probe.check(endpoint.clone()).await;
                if healthy {
                    tracing::info!("engine ready (health probe)");
                } else {
                    tracing::warn!(
                        "engine not confirmed ready after timeout, continuing optimistically"
                    );
                }
                inner.set_state(ReadinessState::Ready);
                if let Some(tx) = pending.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            event = events.recv() => {
                match event {
                    Some(WorkerEvent::StdoutLine(line)) => {
                        if pending.is_some() && is_ready_line(&line) {
                            tracing::info!("engine ready (startup sentinel)");
                            inner.set_state(ReadinessState::Ready);
                            if let Some(tx) = pending.take() {
                                let _ = tx.send(Ok(()));
                            }
                        }
                    }
                    Some(WorkerEvent::Exited(code)) => {
                        if inner.clear_handle_for(pid) {
                            inner.set_state(ReadinessState::Stopped);
                        }
                        if let Some(tx) = pending.take() {
                            let _ = tx.send(Err(StartError::WorkerExited { code }));
                        }
                        break;
                    }
                    None => break,
                }
            }
        }
    }
}
