//! Process execution gateway.
//!
//! # Responsibilities
//! - Spawn one interpreter process per request, rooted at the interpreter root
//! - Stream the payload on stdin; never on the command line
//! - Hand the raw request body over in a temporary file named by `REQUEST_BODY_FILE`
//! - Capture stdout/stderr (capped) and the exit status
//! - Enforce the script timeout and the concurrency cap
//!
//! # Design Decisions
//! - Failures never escape as errors; they come back inside [`ExecutionResult`]
//!   and the synthesizer decides the HTTP outcome
//! - `kill_on_drop(true)`: if the request future is dropped (client went away,
//!   outer timeout) the child is killed with it
//! - On Unix the interpreter leads its own process group; the group is killed
//!   when the run ends, so backgrounded descendants do not outlive the request
//! - The child's environment is cleared and rebuilt from an allow-list plus
//!   the ambient environment, so nothing from the server process leaks in
//!
//! # Cancel Safety
//! Cancel safe. Dropping [`ProcessGateway::execute`] kills the subordinate and
//! its process group, and removes the body file.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tempfile::NamedTempFile;

use crate::bridge::body::{BodyInstall, BODY_FILE_VAR};
use crate::bridge::environment::AmbientEnvironment;
use crate::bridge::script::ScriptPayload;
use crate::config::BridgeConfig;
use crate::observability::metrics;

/// Exit status reported when the process never produced one.
pub const NO_EXIT_STATUS: i32 = -1;

/// Why a run did not complete normally.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutionFailure {
    /// The interpreter could not be started.
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The script ran past its budget and was killed.
    #[error("script exceeded {}s", .limit.as_secs_f64())]
    Timeout { limit: Duration },

    /// Waiting on the child failed.
    #[error("I/O error while waiting for script: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutionFailure {
    /// Label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionFailure::Spawn { .. } => "spawn_failure",
            ExecutionFailure::Timeout { .. } => "timeout",
            ExecutionFailure::Io(_) => "io_error",
        }
    }
}

/// What one script run produced.
#[derive(Debug)]
pub struct ExecutionResult {
    pub exit_status: i32,
    pub stdout: Bytes,
    pub stderr: Bytes,
    pub elapsed: Duration,
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionResult {
    fn failed(failure: ExecutionFailure, elapsed: Duration) -> Self {
        Self {
            exit_status: NO_EXIT_STATUS,
            stdout: Bytes::new(),
            stderr: Bytes::new(),
            elapsed,
            failure: Some(failure),
        }
    }

    /// Ran to completion with exit status 0.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.exit_status == 0
    }

    fn outcome(&self) -> &'static str {
        match &self.failure {
            Some(failure) => failure.kind(),
            None if self.exit_status == 0 => "success",
            None => "non_zero_exit",
        }
    }
}

/// Runs payloads through the configured interpreter.
#[derive(Debug, Clone)]
pub struct ProcessGateway {
    program: String,
    args: Vec<String>,
    root: PathBuf,
    inherit_env: Vec<String>,
    timeout: Duration,
    max_output_bytes: usize,
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl ProcessGateway {
    pub fn new(config: &BridgeConfig) -> Self {
        let capacity = config.max_concurrent_scripts.max(1);
        Self::with_permits(config, Arc::new(Semaphore::new(capacity)), capacity)
    }

    fn with_permits(config: &BridgeConfig, permits: Arc<Semaphore>, capacity: usize) -> Self {
        Self {
            program: config.interpreter.clone(),
            args: config.interpreter_args.clone(),
            root: resolve_root(&config.interpreter_root),
            inherit_env: config.inherit_env.clone(),
            timeout: Duration::from_secs(config.script_timeout_secs),
            max_output_bytes: config.max_output_bytes,
            permits,
            capacity,
        }
    }

    /// A gateway for `config` that shares this gateway's concurrency permits.
    ///
    /// Runs still in flight here keep counting against the cap, so a reload
    /// never lets more than `max_concurrent_scripts` interpreters run at once.
    pub fn reconfigured(&self, config: &BridgeConfig) -> Self {
        let capacity = config.max_concurrent_scripts.max(1);
        resize_permits(&self.permits, self.capacity, capacity);
        Self::with_permits(config, self.permits.clone(), capacity)
    }

    /// Override the script timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute working directory of every run.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scripts that could start right now without waiting.
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one payload to completion, failure or timeout.
    ///
    /// The timeout covers the whole run: waiting for the interpreter and
    /// draining its output. Anything still alive in the run's process group
    /// when the run ends is killed.
    pub async fn execute(
        &self,
        payload: &ScriptPayload,
        env: &AmbientEnvironment,
        body: Option<&BodyInstall>,
    ) -> ExecutionResult {
        // The semaphore is never closed, so this only fails if that changes.
        let _permit = self.permits.acquire().await.ok();
        let _active = metrics::ActiveScriptGuard::new();

        let start = Instant::now();

        let body_file = match body {
            Some(body) => match write_body_file(body).await {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to write request body file");
                    return self.finish(ExecutionResult::failed(ExecutionFailure::Io(e), start.elapsed()));
                }
            },
            None => None,
        };

        let mut cmd = self.command(env);
        if let Some(file) = &body_file {
            cmd.env(BODY_FILE_VAR, file.path());
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                tracing::error!(program = %self.program, error = %source, "Failed to spawn interpreter");
                let failure = ExecutionFailure::Spawn {
                    program: self.program.clone(),
                    source,
                };
                return self.finish(ExecutionResult::failed(failure, start.elapsed()));
            }
        };
        let mut group = ProcessGroup::new(child.id());

        tracing::debug!(pid = ?child.id(), payload_bytes = payload.len(), "Interpreter started");

        let stdin_task = child.stdin.take().map(|mut stdin| {
            let bytes = Bytes::copy_from_slice(payload.as_bytes());
            tokio::spawn(async move {
                // A script may exit without reading its program; that is not our error.
                if let Err(e) = stdin.write_all(&bytes).await {
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        tracing::debug!(error = %e, "Failed to write payload to interpreter");
                    }
                }
                drop(stdin);
            })
        });
        let mut stdout_task = tokio::spawn(read_stream(child.stdout.take(), self.max_output_bytes));
        let mut stderr_task = tokio::spawn(read_stream(child.stderr.take(), self.max_output_bytes));

        // Output pipes stay open while any descendant holds them, so draining
        // is part of the budget too.
        let run = async {
            let status = child.wait().await?;
            let stdout = collect(&mut stdout_task, "stdout").await;
            let stderr = collect(&mut stderr_task, "stderr").await;
            Ok::<_, std::io::Error>((status, stdout, stderr))
        };

        let outcome = tokio::time::timeout(self.timeout, run).await;
        let result = match outcome {
            Ok(Ok((status, stdout, stderr))) => {
                if let Some(task) = stdin_task {
                    task.abort();
                }
                ExecutionResult {
                    exit_status: status.code().unwrap_or(NO_EXIT_STATUS),
                    stdout: Bytes::from(stdout),
                    stderr: Bytes::from(stderr),
                    elapsed: start.elapsed(),
                    failure: None,
                }
            }
            Ok(Err(e)) => {
                abort_all(stdin_task, stdout_task, stderr_task);
                tracing::error!(error = %e, "Failed waiting for interpreter");
                ExecutionResult::failed(ExecutionFailure::Io(e), start.elapsed())
            }
            Err(_elapsed) => {
                tracing::warn!(
                    pid = ?group.pgid,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Script timed out, killing interpreter"
                );
                group.kill();
                // kill() also reaps, so no zombie is left behind. It errors
                // when the interpreter already exited and only descendants ran on.
                if let Err(e) = child.kill().await {
                    tracing::debug!(error = %e, "Interpreter already gone");
                }
                abort_all(stdin_task, stdout_task, stderr_task);
                ExecutionResult::failed(ExecutionFailure::Timeout { limit: self.timeout }, start.elapsed())
            }
        };

        drop(group);
        drop(body_file);
        self.finish(result)
    }

    fn finish(&self, result: ExecutionResult) -> ExecutionResult {
        tracing::info!(
            exit_status = result.exit_status,
            outcome = result.outcome(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            stdout_bytes = result.stdout.len(),
            stderr_bytes = result.stderr.len(),
            "Script finished"
        );
        metrics::record_execution(result.outcome(), result.elapsed);
        result
    }

    fn command(&self, env: &AmbientEnvironment) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .current_dir(&self.root)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // The interpreter leads a fresh group, so its descendants can be killed with it.
        #[cfg(unix)]
        cmd.process_group(0);

        for key in &self.inherit_env {
            if let Some(value) = std::env::var_os(key) {
                cmd.env(key, value);
            }
        }
        cmd.envs(env.iter());
        cmd
    }
}

/// Make `root` absolute against the server's working directory.
///
/// The payload `chdir`s and `include`s through this path after the process
/// already started inside it, so a relative root would resolve twice.
pub fn resolve_root(root: &Path) -> PathBuf {
    match std::path::absolute(root) {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!(root = ?root, error = %e, "Could not resolve interpreter root");
            root.to_path_buf()
        }
    }
}

fn resize_permits(permits: &Arc<Semaphore>, from: usize, to: usize) {
    if to > from {
        permits.add_permits(to - from);
        return;
    }
    let excess = from - to;
    let owed = excess - permits.forget_permits(excess);
    if owed == 0 {
        return;
    }

    // The rest are held by running scripts; retire them as they come back.
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let permits = permits.clone();
            let owed = u32::try_from(owed).unwrap_or(u32::MAX);
            handle.spawn(async move {
                if let Ok(permit) = permits.acquire_many_owned(owed).await {
                    permit.forget();
                }
            });
        }
        Err(_) => tracing::warn!(owed, "Concurrency cap stays raised until restart"),
    }
}

/// Kills every process left in one run's process group when dropped.
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_process_group(pgid);
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = i32::try_from(pgid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers; a negative pid addresses the group.
    let result = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if result != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group is already empty.
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!(pgid, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

/// Write the raw body next to the run, for scripts that read it directly.
async fn write_body_file(body: &BodyInstall) -> std::io::Result<NamedTempFile> {
    let bytes = body.raw();
    tokio::task::spawn_blocking(move || -> std::io::Result<NamedTempFile> {
        let mut file = tempfile::Builder::new().prefix("cgi-body-").tempfile()?;
        file.write_all(&bytes)?;
        file.flush()?;
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)?
}

async fn collect(task: &mut JoinHandle<Vec<u8>>, stream: &'static str) -> Vec<u8> {
    match task.await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(stream, error = %e, "Output reader failed");
            Vec::new()
        }
    }
}

fn abort_all(stdin: Option<JoinHandle<()>>, stdout: JoinHandle<Vec<u8>>, stderr: JoinHandle<Vec<u8>>) {
    if let Some(task) = stdin {
        task.abort();
    }
    stdout.abort();
    stderr.abort();
}

/// Read a stream to its end, keeping at most `limit` bytes.
///
/// The remainder is drained and discarded so a chatty child never blocks on
/// a full pipe.
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>, limit: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h).take(limit as u64).read_to_end(&mut buf).await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}
