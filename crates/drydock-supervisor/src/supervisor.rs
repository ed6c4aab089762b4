//! Supervisor — live child process management.
//!
//! One map entry per instance that has been started since the daemon came
//! up. `start` inserts the entry in an "initializing" state before any
//! validation runs, so a concurrent second start observes it and is
//! rejected; the spawn itself happens on a detached task after `start`
//! has already answered. Stdout and stderr are drained into the entry's
//! console ring and broadcast channel by reader tasks. `stop` writes the
//! configured graceful line, waits out the stop timeout, then force
//! kills.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, broadcast};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use drydock_core::config::SupervisorConfig;
use drydock_core::{InstanceId, InstanceRecord, JavaSpec};
use drydock_store::Store;

use crate::command;
use crate::error::{SupervisorError, SupervisorResult};
use crate::ring::LogRing;

/// Capacity of each per-instance console broadcast channel. Slow
/// subscribers lag rather than blocking the reader tasks.
const CONSOLE_CAPACITY: usize = 256;

/// How often stop and shutdown sweeps re-check child liveness.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

type ConsoleRing = Arc<StdMutex<LogRing>>;

/// Everything the supervisor tracks for one instance.
struct ProcessContext {
    /// Distinguishes this context from any later one under the same id,
    /// so a stale start task never attaches its child to a replacement.
    generation: u64,
    /// True between context insertion and the end of the async start
    /// step; counts as running so concurrent starts are rejected.
    initializing: bool,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    ring: ConsoleRing,
    console: broadcast::Sender<String>,
    /// Graceful shutdown line, captured from the record at start time.
    stop_command: String,
}

impl ProcessContext {
    fn new(generation: u64, log_capacity: usize, stop_command: String) -> Self {
        let (console, _) = broadcast::channel(CONSOLE_CAPACITY);
        Self {
            generation,
            initializing: true,
            child: None,
            stdin: None,
            ring: Arc::new(StdMutex::new(LogRing::new(log_capacity))),
            console,
            stop_command,
        }
    }

    /// Live means "a start was accepted and the child has not exited".
    fn is_live(&self) -> bool {
        self.initializing || self.child.is_some()
    }

    /// Append to the ring and fan out to subscribers.
    fn emit(&self, line: String) {
        self.ring.lock().unwrap().push(line.clone());
        // No subscribers is the normal case.
        let _ = self.console.send(line);
    }
}

/// Shared process supervisor. `Clone` hands out another reference to the
/// same state; there is exactly one per daemon.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    store: Store,
    log_capacity: usize,
    stop_timeout: Duration,
    shutdown_timeout: Duration,
    /// Live and recently-live contexts, keyed by instance id. Liveness
    /// checks and transitions are read-then-write under this one lock.
    live: Mutex<HashMap<InstanceId, ProcessContext>>,
    /// Instances with a deployment in flight; `start` rejects these.
    deploying: StdMutex<HashSet<InstanceId>>,
    /// Source of context generation stamps.
    generation: AtomicU64,
}

impl Supervisor {
    pub fn new(store: Store, config: &SupervisorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                log_capacity: config.log_capacity,
                stop_timeout: Duration::from_secs(config.stop_timeout_secs),
                shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
                live: Mutex::new(HashMap::new()),
                deploying: StdMutex::new(HashSet::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Whether the instance currently has a live (or still-initializing)
    /// child. Reaps exited children as a side effect.
    pub async fn is_running(&self, id: InstanceId) -> bool {
        let mut live = self.inner.live.lock().await;
        reap_exited(&mut live);
        live.get(&id).is_some_and(ProcessContext::is_live)
    }

    /// Begin starting an instance. Returns as soon as the start is
    /// accepted; validation and the spawn itself continue on a detached
    /// task, reporting problems into the instance's console ring.
    pub async fn start(&self, id: InstanceId) -> SupervisorResult<()> {
        if self.inner.deploying.lock().unwrap().contains(&id) {
            return Err(SupervisorError::Deploying(id));
        }
        let record = self
            .inner
            .store
            .get_instance(id)?
            .ok_or(SupervisorError::InstanceNotFound(id))?;

        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed);
        {
            let mut live = self.inner.live.lock().await;
            reap_exited(&mut live);
            if live.get(&id).is_some_and(ProcessContext::is_live) {
                return Err(SupervisorError::AlreadyRunning(id));
            }
            // Replaces any exited or failed-start leftover for this id.
            live.insert(
                id,
                ProcessContext::new(generation, self.inner.log_capacity, record.stop_command.clone()),
            );
        }
        info!(instance = id, name = %record.name, "start accepted");

        let supervisor = self.clone();
        tokio::spawn(async move {
            supervisor.initialize(id, generation, record).await;
        });
        Ok(())
    }

    /// Async half of `start`: validate, spawn, wire stdio. Failures land
    /// in the console ring, not in a return value, because `start` has
    /// already answered.
    async fn initialize(&self, id: InstanceId, generation: u64, record: InstanceRecord) {
        if let Err(reason) = self.spawn_child(id, generation, &record).await {
            warn!(instance = id, %reason, "start aborted");
            let mut live = self.inner.live.lock().await;
            if let Some(ctx) = live.get_mut(&id).filter(|ctx| ctx.generation == generation) {
                ctx.initializing = false;
                ctx.emit(format!("start aborted: {reason}"));
            }
        }
    }

    async fn spawn_child(
        &self,
        id: InstanceId,
        generation: u64,
        record: &InstanceRecord,
    ) -> Result<(), String> {
        let plan = command::build_plan(record)?;
        if record.java_spec() != JavaSpec::Shell {
            if !record.core_path().is_file() {
                return Err(format!("core file {} is missing", record.core_path().display()));
            }
            if !plan.program.is_file() {
                return Err(format!(
                    "java executable {} is missing",
                    plan.program.display()
                ));
            }
        }
        if !record.base_path.is_dir() {
            return Err(format!(
                "instance directory {} is missing",
                record.base_path.display()
            ));
        }
        grant_execute(&record.base_path);

        let mut child = Command::new(&plan.program)
            .args(&plan.args)
            .current_dir(&record.base_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| format!("spawn {} failed: {err}", plan.program.display()))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let mut live = self.inner.live.lock().await;
        let Some(ctx) = live.get_mut(&id).filter(|ctx| ctx.generation == generation) else {
            // Stopped (and possibly restarted) while we were spawning;
            // this child belongs to nobody now.
            debug!(instance = id, "context replaced mid-start, discarding child");
            let _ = child.kill().await;
            return Ok(());
        };
        if let Some(out) = stdout {
            spawn_reader(out, ctx.ring.clone(), ctx.console.clone());
        }
        if let Some(err) = stderr {
            spawn_reader(err, ctx.ring.clone(), ctx.console.clone());
        }
        ctx.stdin = stdin;
        ctx.child = Some(child);
        ctx.initializing = false;
        info!(instance = id, pid = pid.unwrap_or_default(), "instance started");
        Ok(())
    }

    /// Stop an instance: graceful line, bounded wait, then force kill.
    /// Returns false when nothing was running under this id.
    pub async fn stop(&self, id: InstanceId) -> bool {
        {
            let mut live = self.inner.live.lock().await;
            reap_exited(&mut live);
            let Some(ctx) = live.get_mut(&id) else { return false };
            if !ctx.is_live() {
                return false;
            }
            let stop_command = ctx.stop_command.clone();
            if let Some(stdin) = ctx.stdin.as_mut() {
                write_line(stdin, &stop_command).await;
            }
            info!(instance = id, command = %stop_command, "graceful stop requested");
        }

        let deadline = Instant::now() + self.inner.stop_timeout;
        loop {
            {
                let mut live = self.inner.live.lock().await;
                let Some(ctx) = live.get_mut(&id) else { return true };
                let exited = match ctx.child.as_mut() {
                    None => true,
                    Some(child) => !matches!(child.try_wait(), Ok(None)),
                };
                if exited {
                    live.remove(&id);
                    info!(instance = id, "instance stopped");
                    return true;
                }
                if Instant::now() >= deadline {
                    if let Some(child) = ctx.child.as_mut() {
                        warn!(instance = id, "graceful stop timed out, killing");
                        let _ = child.kill().await;
                    }
                    live.remove(&id);
                    return true;
                }
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Inject a console command line into the instance's stdin. Returns
    /// false when the instance is not running or the write failed.
    pub async fn send_command(&self, id: InstanceId, text: &str) -> bool {
        let mut live = self.inner.live.lock().await;
        let Some(ctx) = live.get_mut(&id) else { return false };
        let Some(stdin) = ctx.stdin.as_mut() else { return false };
        write_line(stdin, text).await
    }

    /// Snapshot of the instance's console ring, oldest line first. Empty
    /// when the id has no context.
    pub async fn logs(&self, id: InstanceId) -> Vec<String> {
        let live = self.inner.live.lock().await;
        live.get(&id)
            .map(|ctx| ctx.ring.lock().unwrap().snapshot())
            .unwrap_or_default()
    }

    /// Subscribe to live console lines. `None` when the id has no context.
    pub async fn subscribe(&self, id: InstanceId) -> Option<broadcast::Receiver<String>> {
        let live = self.inner.live.lock().await;
        live.get(&id).map(|ctx| ctx.console.subscribe())
    }

    /// Mark an instance as having a deployment in flight. While the
    /// returned guard lives, `start` for this id is rejected; the queue
    /// worker holds it from before the first stage until the terminal
    /// status is out.
    pub fn begin_deploy(&self, id: InstanceId) -> DeployGuard {
        self.inner.deploying.lock().unwrap().insert(id);
        debug!(instance = id, "deploy guard engaged");
        DeployGuard {
            inner: self.inner.clone(),
            id,
        }
    }

    /// Graceful sweep at daemon shutdown: write every live instance its
    /// stop line, wait out the collective timeout, kill stragglers, and
    /// clear all state.
    pub async fn shutdown_all(&self) {
        let pending = {
            let mut live = self.inner.live.lock().await;
            reap_exited(&mut live);
            let mut pending = Vec::new();
            for (id, ctx) in live.iter_mut() {
                if !ctx.is_live() {
                    continue;
                }
                let stop_command = ctx.stop_command.clone();
                if let Some(stdin) = ctx.stdin.as_mut() {
                    write_line(stdin, &stop_command).await;
                }
                pending.push(*id);
            }
            pending
        };
        if pending.is_empty() {
            self.inner.live.lock().await.clear();
            return;
        }
        info!(count = pending.len(), "waiting for instances to stop");

        let deadline = Instant::now() + self.inner.shutdown_timeout;
        while Instant::now() < deadline {
            {
                let mut live = self.inner.live.lock().await;
                reap_exited(&mut live);
                let all_stopped = pending
                    .iter()
                    .all(|id| !live.get(id).is_some_and(ProcessContext::is_live));
                if all_stopped {
                    break;
                }
            }
            sleep(POLL_INTERVAL).await;
        }

        let mut live = self.inner.live.lock().await;
        for (id, ctx) in live.iter_mut() {
            if let Some(child) = ctx.child.as_mut() {
                warn!(instance = *id, "killing instance at shutdown");
                let _ = child.kill().await;
            }
        }
        live.clear();
        info!("supervisor shut down");
    }
}

/// RAII marker for an in-flight deployment; see [`Supervisor::begin_deploy`].
pub struct DeployGuard {
    inner: Arc<Inner>,
    id: InstanceId,
}

impl Drop for DeployGuard {
    fn drop(&mut self) {
        self.inner.deploying.lock().unwrap().remove(&self.id);
        debug!(instance = self.id, "deploy guard released");
    }
}

/// Drop exited children from their contexts so the entries stop counting
/// as running. The entries themselves stay, with their final log lines
/// pollable, until the next start replaces them.
fn reap_exited(live: &mut HashMap<InstanceId, ProcessContext>) {
    for (id, ctx) in live.iter_mut() {
        let Some(child) = ctx.child.as_mut() else { continue };
        match child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                info!(instance = *id, %status, "instance exited");
                ctx.emit(format!("process exited: {status}"));
                ctx.child = None;
                ctx.stdin = None;
            }
            Err(err) => {
                warn!(instance = *id, error = %err, "wait failed, dropping child");
                ctx.child = None;
                ctx.stdin = None;
            }
        }
    }
}

/// Drain one stdio stream into the console ring and broadcast channel.
/// Ends when the stream closes at child exit, and the task with it.
fn spawn_reader<R>(stream: R, ring: ConsoleRing, console: broadcast::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            ring.lock().unwrap().push(line.clone());
            let _ = console.send(line);
        }
    });
}

/// Write one line into a child's stdin, best-effort.
async fn write_line(stdin: &mut ChildStdin, text: &str) -> bool {
    let line = format!("{text}\n");
    if let Err(err) = stdin.write_all(line.as_bytes()).await {
        debug!(error = %err, "stdin write failed");
        return false;
    }
    if let Err(err) = stdin.flush().await {
        debug!(error = %err, "stdin flush failed");
        return false;
    }
    true
}

/// Add execute bits throughout the instance tree; zip-sourced packages
/// lose them at unpack.
#[cfg(unix)]
fn grant_execute(root: &Path) {
    use std::os::unix::fs::PermissionsExt;

    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(Result::ok) {
        let Ok(meta) = entry.metadata() else { continue };
        let mode = meta.permissions().mode();
        if mode & 0o111 == 0o111 {
            continue;
        }
        let mut perms = meta.permissions();
        perms.set_mode(mode | 0o111);
        if let Err(err) = std::fs::set_permissions(entry.path(), perms) {
            debug!(path = %entry.path().display(), error = %err, "chmod failed");
        }
    }
}

#[cfg(not(unix))]
fn grant_execute(_root: &Path) {}
