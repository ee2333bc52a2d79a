//! Host-side sandbox executor
//!
//! The executor never shares memory with the code it runs. Requests leave as
//! `run` envelopes on an outbound line channel; a listener task reads `result`
//! envelopes off the inbound channel and completes the matching pending call
//! through a correlation map keyed by request id.
//!
//! ```text
//! execute(code) ──run──▶ outbound ──▶ guest (thread or child process)
//!      ▲                                   │
//!      └── oneshot ◀── pending[id] ◀── listener ◀──result── inbound
//! ```
//!
//! A guest that overruns a call's timeout or goes away is replaced before the
//! next call reaches it. A child process is killed; a guest thread cannot be
//! interrupted, so it is cut loose and exits once its current script ends.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::guest::{self, GuestLimits, GUEST_STACK_SIZE};
use super::protocol::{Envelope, ExecutionOutcome};
use crate::config::{SandboxBackend, SandboxConfig};
use crate::metrics::{CODE_EXECUTIONS, CODE_EXECUTION_DURATION, SANDBOX_RESTARTS};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ExecutionOutcome>>>>;

/// Starts a fresh guest and hands back its end of the channels
type Launcher = Arc<dyn Fn() -> Result<GuestLink, SandboxError> + Send + Sync>;

/// Error type for bringing up a sandbox backend
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to start sandbox guest: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("sandbox guest has no {0} pipe")]
    MissingPipe(&'static str),
    #[error("cannot locate the sandbox_guest binary")]
    GuestNotFound,
}

/// Host end of a freshly started guest
struct GuestLink {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<String>,
    /// Firing or dropping this kills a child process guest
    kill: Option<oneshot::Sender<()>>,
}

/// The guest currently serving calls, with the calls waiting on it
struct Guest {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    pending: PendingMap,
    /// Cleared by the listener once the guest stops answering
    connected: Arc<AtomicBool>,
    _kill: Option<oneshot::Sender<()>>,
}

impl Guest {
    /// Start the listener task for `link`
    fn attach(link: GuestLink, generation: u64) -> Self {
        let GuestLink {
            outbound,
            mut inbound,
            kill,
        } = link;
        let pending: PendingMap = Arc::default();
        let connected = Arc::new(AtomicBool::new(true));
        let listener_pending = Arc::clone(&pending);
        let listener_connected = Arc::clone(&connected);

        tokio::spawn(async move {
            while let Some(line) = inbound.recv().await {
                match Envelope::decode(&line) {
                    Ok(Envelope::Reply {
                        id,
                        logs,
                        result,
                        error,
                    }) => {
                        let waiter = listener_pending.lock().await.remove(&id);
                        match waiter {
                            Some(tx) => {
                                let _ = tx.send(ExecutionOutcome { logs, result, error });
                            }
                            None => debug!(id = %id, "Dropping reply for unknown or expired request"),
                        }
                    }
                    Ok(Envelope::Run { id, .. }) => {
                        warn!(id = %id, "Ignoring run envelope sent by the guest");
                    }
                    Err(e) => warn!(error = %e, "Malformed envelope from sandbox guest"),
                }
            }

            listener_connected.store(false, Ordering::SeqCst);
            let mut waiting = listener_pending.lock().await;
            if !waiting.is_empty() {
                warn!(generation, pending = waiting.len(), "Sandbox guest disconnected with calls in flight");
            }
            for (_, tx) in waiting.drain() {
                let _ = tx.send(ExecutionOutcome::failed("sandbox guest disconnected"));
            }
        });

        Self {
            generation,
            outbound,
            pending,
            connected,
            _kill: kill,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.outbound.is_closed()
    }
}

/// Client for running code across the isolation boundary
///
/// Cheap to clone; clones share the boundary and the correlation map, so one
/// executor can serve several conversations at once.
#[derive(Clone)]
pub struct SandboxExecutor {
    guest: Arc<Mutex<Guest>>,
    /// `None` for executors over caller-provided channels, which are never replaced
    launcher: Option<Launcher>,
    timeout: Duration,
}

impl SandboxExecutor {
    /// Start the backend selected by `config`
    pub fn spawn(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let limits = GuestLimits {
            loop_iteration_limit: config.loop_iteration_limit,
            recursion_limit: config.recursion_limit,
        };
        match config.backend {
            SandboxBackend::Thread => Self::spawn_thread(limits, config.timeout()),
            SandboxBackend::Process => {
                let program = match &config.guest_path {
                    Some(path) => path.clone(),
                    None => default_guest_path()?,
                };
                Self::spawn_process(&program, limits, config.timeout())
            }
        }
    }

    /// Run the guest on a dedicated OS thread with its own interpreter
    ///
    /// The thread shares the host's address space. Prefer the process backend
    /// for code nobody has looked at.
    pub fn spawn_thread(limits: GuestLimits, timeout: Duration) -> Result<Self, SandboxError> {
        let launcher: Launcher = Arc::new(move || launch_thread(limits));
        let executor = Self::launch(launcher, timeout)?;
        info!(backend = "thread", timeout_ms = timeout.as_millis() as u64, "Sandbox guest started");
        Ok(executor)
    }

    /// Run the guest as a child process speaking envelopes over stdin/stdout
    ///
    /// The child is killed once every clone of the executor is dropped, and
    /// whenever it has to be replaced.
    pub fn spawn_process(
        program: &Path,
        limits: GuestLimits,
        timeout: Duration,
    ) -> Result<Self, SandboxError> {
        let program_path = program.to_path_buf();
        let launcher: Launcher = Arc::new(move || launch_process(&program_path, limits));
        let executor = Self::launch(launcher, timeout)?;
        info!(
            backend = "process",
            program = %program.display(),
            timeout_ms = timeout.as_millis() as u64,
            "Sandbox guest started"
        );
        Ok(executor)
    }

    fn launch(launcher: Launcher, timeout: Duration) -> Result<Self, SandboxError> {
        let link = launcher()?;
        Ok(Self {
            guest: Arc::new(Mutex::new(Guest::attach(link, 0))),
            launcher: Some(launcher),
            timeout,
        })
    }

    /// Build an executor over any pair of line channels
    ///
    /// `outbound` carries encoded `run` envelopes to the guest and `inbound`
    /// carries its `result` envelopes back. Must be called inside a Tokio
    /// runtime; the listener task ends when `inbound` closes, failing every
    /// call still waiting. The executor has no way to start another guest on
    /// these channels, so it never restarts one.
    pub fn over_channel(
        outbound: mpsc::UnboundedSender<String>,
        inbound: mpsc::UnboundedReceiver<String>,
        timeout: Duration,
    ) -> Self {
        let link = GuestLink {
            outbound,
            inbound,
            kill: None,
        };
        Self {
            guest: Arc::new(Mutex::new(Guest::attach(link, 0))),
            launcher: None,
            timeout,
        }
    }

    /// Upper bound on a single call
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `code` as a function body in the sandbox
    ///
    /// Never fails: boundary faults and timeouts come back as an outcome with
    /// `error` set.
    pub async fn execute(&self, code: &str) -> ExecutionOutcome {
        let id = Uuid::now_v7().to_string();
        let start = Instant::now();

        let (outcome, status) = match self.submit(&id, code).await {
            Err(outcome) => (outcome, "error"),
            Ok((generation, pending, rx)) => match tokio::time::timeout(self.timeout, rx).await {
                Ok(Ok(outcome)) => {
                    let status = if outcome.is_success() { "success" } else { "error" };
                    (outcome, status)
                }
                Ok(Err(_)) => (
                    ExecutionOutcome::failed("sandbox guest dropped the request"),
                    "error",
                ),
                Err(_) => {
                    pending.lock().await.remove(&id);
                    warn!(id = %id, timeout_ms = self.timeout.as_millis() as u64, "Sandbox execution timed out");
                    self.replace_guest(generation, "timeout").await;
                    (
                        ExecutionOutcome::failed(format!(
                            "execution timed out after {} ms",
                            self.timeout.as_millis()
                        )),
                        "timeout",
                    )
                }
            },
        };

        let elapsed = start.elapsed();
        CODE_EXECUTIONS.with_label_values(&[status]).inc();
        CODE_EXECUTION_DURATION.observe(elapsed.as_secs_f64());
        debug!(
            id = %id,
            status,
            logs = outcome.logs.len(),
            duration_ms = elapsed.as_secs_f64() * 1000.0,
            "Sandbox execution finished"
        );

        outcome
    }

    /// Register the call and hand it to a live guest, starting a new one if
    /// the current guest has gone away
    async fn submit(
        &self,
        id: &str,
        code: &str,
    ) -> Result<(u64, PendingMap, oneshot::Receiver<ExecutionOutcome>), ExecutionOutcome> {
        let envelope = Envelope::Run {
            id: id.to_string(),
            code: code.to_string(),
        };
        let line = envelope.encode().map_err(|e| {
            warn!(id = %id, error = %e, "Failed to encode run envelope");
            ExecutionOutcome::failed(format!("could not encode request: {}", e))
        })?;

        let mut guest = self.guest.lock().await;
        if !guest.is_connected() {
            self.relaunch(&mut guest, "exited").await?;
        }

        let (tx, rx) = oneshot::channel();
        guest.pending.lock().await.insert(id.to_string(), tx);
        if guest.outbound.send(line).is_err() {
            guest.pending.lock().await.remove(id);
            return Err(ExecutionOutcome::failed("sandbox guest is not running"));
        }
        Ok((guest.generation, Arc::clone(&guest.pending), rx))
    }

    /// Replace the guest unless another call already has
    async fn replace_guest(&self, generation: u64, reason: &'static str) {
        let mut guest = self.guest.lock().await;
        if guest.generation == generation {
            // Failures are logged; the next call retries the launch
            let _ = self.relaunch(&mut guest, reason).await;
        }
    }

    /// Swap in a fresh guest and fail every call still waiting on the old one
    async fn relaunch(&self, guest: &mut Guest, reason: &'static str) -> Result<(), ExecutionOutcome> {
        let Some(launcher) = &self.launcher else {
            return Ok(());
        };
        let link = launcher().map_err(|e| {
            warn!(error = %e, reason, "Failed to restart sandbox guest");
            ExecutionOutcome::failed(format!("sandbox guest could not be restarted: {}", e))
        })?;

        let next = guest.generation + 1;
        let retired = std::mem::replace(guest, Guest::attach(link, next));
        for (_, tx) in retired.pending.lock().await.drain() {
            let _ = tx.send(ExecutionOutcome::failed("sandbox guest was restarted"));
        }
        SANDBOX_RESTARTS.with_label_values(&[reason]).inc();
        info!(generation = guest.generation, reason, "Sandbox guest restarted");
        Ok(())
    }

    /// Number of calls currently waiting on the guest
    pub async fn in_flight(&self) -> usize {
        let guest = self.guest.lock().await;
        let waiting = guest.pending.lock().await.len();
        waiting
    }

    /// How many times the guest has been replaced
    pub async fn restarts(&self) -> u64 {
        self.guest.lock().await.generation
    }
}

fn launch_thread(limits: GuestLimits) -> Result<GuestLink, SandboxError> {
    let (to_guest, guest_inbound) = mpsc::unbounded_channel();
    let (guest_outbound, from_guest) = mpsc::unbounded_channel();

    std::thread::Builder::new()
        .name("sandbox-guest".to_string())
        .stack_size(GUEST_STACK_SIZE)
        .spawn(move || guest::serve_channel(guest_inbound, guest_outbound, limits))
        .map_err(SandboxError::Spawn)?;

    Ok(GuestLink {
        outbound: to_guest,
        inbound: from_guest,
        kill: None,
    })
}

fn launch_process(program: &Path, limits: GuestLimits) -> Result<GuestLink, SandboxError> {
    let mut child = Command::new(program)
        .arg("--loop-iteration-limit")
        .arg(limits.loop_iteration_limit.to_string())
        .arg("--recursion-limit")
        .arg(limits.recursion_limit.to_string())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .map_err(SandboxError::Spawn)?;

    let mut stdin = child.stdin.take().ok_or(SandboxError::MissingPipe("stdin"))?;
    let stdout = child.stdout.take().ok_or(SandboxError::MissingPipe("stdout"))?;

    let (to_guest, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let (inbound_tx, from_guest) = mpsc::unbounded_channel();
    let (kill_tx, mut kill_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        while let Some(line) = outbound_rx.recv().await {
            let written = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.write_all(b"\n").await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                warn!(error = %e, "Failed to write to sandbox guest");
                break;
            }
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                read = lines.next_line() => match read {
                    Ok(Some(line)) => {
                        if inbound_tx.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Failed to read from sandbox guest");
                        break;
                    }
                },
                // Fired or dropped: the executor is done with this child
                _ = &mut kill_rx => {
                    if let Err(e) = child.start_kill() {
                        warn!(error = %e, "Failed to kill sandbox guest");
                    }
                    break;
                }
            }
        }
        drop(inbound_tx);
        match child.wait().await {
            Ok(status) => debug!(%status, "Sandbox guest exited"),
            Err(e) => warn!(error = %e, "Failed to reap sandbox guest"),
        }
    });

    Ok(GuestLink {
        outbound: to_guest,
        inbound: from_guest,
        kill: Some(kill_tx),
    })
}

/// `sandbox_guest` next to the running executable, or one directory up
/// (test binaries live in `target/<profile>/deps`)
fn default_guest_path() -> Result<PathBuf, SandboxError> {
    let exe = std::env::current_exe().map_err(SandboxError::Spawn)?;
    let name = format!("sandbox_guest{}", std::env::consts::EXE_SUFFIX);
    exe.ancestors()
        .skip(1)
        .take(2)
        .map(|dir| dir.join(&name))
        .find(|candidate| candidate.is_file())
        .ok_or(SandboxError::GuestNotFound)
}
