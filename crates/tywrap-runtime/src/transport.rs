//! Subprocess JSONL transport.
//!
//! One transport owns one Python bridge subprocess: newline-delimited JSON
//! requests over stdin, responses over stdout, diagnostics over stderr.
//! Correlation is by the numeric `id` embedded in each line, extracted with
//! a cheap regex rather than a full parse. Responses for unknown ids are
//! dropped silently; that is the correctness condition that makes timeout
//! recovery safe.

use crate::context::{BoundedContext, ManagedResource};
use async_trait::async_trait;
use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use tywrap_core::error::{BridgeError, BridgeResult};

/// Environment keys that are never allowed through from caller config.
const DANGEROUS_ENV_KEYS: &[&str] = &["__proto__", "prototype", "constructor"];

/// Remediation hint attached to framing violations caused by stdout noise.
const STDOUT_HINT: &str =
    "the Python process must not print to stdout outside the bridge protocol";

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#""id"\s*:\s*(\d+)"#).expect("static pattern"))
}

/// Extracts the correlation id from a JSONL message without a full parse.
fn extract_id(line: &str) -> Option<u64> {
    id_pattern()
        .captures(line)
        .and_then(|captures| captures.get(1))
        .and_then(|digits| digits.as_str().parse().ok())
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub python_executable: PathBuf,
    /// Bridge entry point handed to the executable as its first argument.
    pub bridge_script: PathBuf,
    pub extra_args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Caller environment, merged last. Dangerous keys are rejected.
    pub env: IndexMap<String, String>,
    /// Inherit the full parent environment. When disabled, only
    /// `env_passthrough_prefix`-matched variables pass through.
    pub inherit_env: bool,
    pub env_passthrough_prefix: Option<String>,
    /// When set, `VIRTUAL_ENV` is exported and its `bin` directory is
    /// prepended to `PATH`.
    pub virtual_env: Option<PathBuf>,
    pub max_line_length: usize,
    pub default_timeout: Duration,
    /// Per-queued-write timeout on the stdin path.
    pub write_timeout: Duration,
    /// Recycle the subprocess after this many requests.
    pub restart_after_requests: Option<u64>,
    pub stderr_tail_bytes: usize,
    /// SIGTERM-to-SIGKILL grace window during restart and disposal.
    pub graceful_shutdown: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            python_executable: PathBuf::from(
                std::env::var("TYWRAP_PYTHON").unwrap_or_else(|_| "python3".to_string()),
            ),
            bridge_script: PathBuf::from("tywrap_bridge.py"),
            extra_args: Vec::new(),
            cwd: None,
            env: IndexMap::new(),
            inherit_env: true,
            env_passthrough_prefix: None,
            virtual_env: None,
            max_line_length: 100 * 1024 * 1024,
            default_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            restart_after_requests: None,
            stderr_tail_bytes: 8 * 1024,
            graceful_shutdown: Duration::from_secs(1),
        }
    }
}

impl TransportConfig {
    /// Resolved child environment: base (inherited or prefix-scoped), then
    /// caller entries, then the venv exports, then the non-negotiable
    /// UTF-8/unbuffered trio.
    fn build_env(&self) -> BridgeResult<IndexMap<String, String>> {
        let mut env: IndexMap<String, String> = if self.inherit_env {
            std::env::vars().collect()
        } else if let Some(prefix) = &self.env_passthrough_prefix {
            std::env::vars()
                .filter(|(key, _)| key.starts_with(prefix))
                .collect()
        } else {
            IndexMap::new()
        };

        for (key, value) in &self.env {
            if DANGEROUS_ENV_KEYS.contains(&key.as_str()) {
                return Err(BridgeError::protocol(format!(
                    "environment key \"{key}\" is not allowed"
                )));
            }
            env.insert(key.clone(), value.clone());
        }

        if let Some(venv) = &self.virtual_env {
            env.insert("VIRTUAL_ENV".to_string(), venv.display().to_string());
            let bin = venv.join("bin");
            let path = env.get("PATH").cloned().unwrap_or_default();
            env.insert("PATH".to_string(), format!("{}:{path}", bin.display()));
        }

        env.insert("PYTHONUTF8".to_string(), "1".to_string());
        env.insert("PYTHONIOENCODING".to_string(), "UTF-8".to_string());
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        Ok(env)
    }
}

type Responder = oneshot::Sender<BridgeResult<String>>;

/// State shared with the reader/writer/stderr tasks.
struct Shared {
    pending: Mutex<HashMap<u64, Responder>>,
    stderr_tail: Mutex<Vec<u8>>,
    stderr_tail_bytes: usize,
    needs_restart: AtomicBool,
}

impl Shared {
    fn new(stderr_tail_bytes: usize) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            stderr_tail: Mutex::new(Vec::new()),
            stderr_tail_bytes,
            needs_restart: AtomicBool::new(false),
        }
    }

    fn tail(&self) -> Option<String> {
        let tail = self.stderr_tail.lock().unwrap_or_else(|e| e.into_inner());
        if tail.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&tail).into_owned())
        }
    }

    fn append_stderr(&self, sanitized: &[u8]) {
        let mut tail = self.stderr_tail.lock().unwrap_or_else(|e| e.into_inner());
        tail.extend_from_slice(sanitized);
        let len = tail.len();
        if len > self.stderr_tail_bytes {
            tail.drain(..len - self.stderr_tail_bytes);
        }
    }

    fn take_responder(&self, id: u64) -> Option<Responder> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }

    /// Rejects every pending request with a protocol error carrying the
    /// given reason and the current stderr tail.
    fn fail_all(&self, reason: &str) {
        let responders: Vec<(u64, Responder)> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        if responders.is_empty() {
            return;
        }
        let tail = self.tail();
        warn!(count = responders.len(), reason, "rejecting pending bridge requests");
        for (_, responder) in responders {
            let _ = responder.send(Err(BridgeError::protocol_with_tail(
                reason.to_string(),
                tail.clone(),
            )));
        }
    }
}

struct ProcHandles {
    pid: Option<u32>,
    /// Owns the `Child`; waits for exit and rejects pending requests with
    /// the exit status.
    monitor: JoinHandle<()>,
    write_tx: mpsc::Sender<WriteRequest>,
    reader: JoinHandle<()>,
    stderr_reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct WriteRequest {
    line: String,
    ack: oneshot::Sender<BridgeResult<()>>,
}

/// A lifecycle-managed subprocess JSONL transport.
pub struct PythonTransport {
    config: TransportConfig,
    ctx: BoundedContext,
    shared: Arc<Shared>,
    proc: tokio::sync::Mutex<Option<ProcHandles>>,
    requests_since_spawn: AtomicU64,
}

impl PythonTransport {
    pub fn new(config: TransportConfig) -> Self {
        let shared = Arc::new(Shared::new(config.stderr_tail_bytes));
        Self {
            config,
            ctx: BoundedContext::new("python-transport"),
            shared,
            proc: tokio::sync::Mutex::new(None),
            requests_since_spawn: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn context(&self) -> &BoundedContext {
        &self.ctx
    }

    /// The sanitized rolling stderr tail, for diagnostics.
    pub fn stderr_tail(&self) -> Option<String> {
        self.shared.tail()
    }

    pub async fn init(&self) -> BridgeResult<()> {
        self.ctx
            .init(|| async {
                let handles = self.spawn_process()?;
                *self.proc.lock().await = Some(handles);
                self.requests_since_spawn.store(0, Ordering::SeqCst);
                self.shared.needs_restart.store(false, Ordering::SeqCst);
                Ok(())
            })
            .await
    }

    pub async fn dispose(&self) -> BridgeResult<()> {
        self.ctx
            .dispose(|| async {
                self.shared.fail_all("transport disposed");
                let handles = self.proc.lock().await.take();
                if let Some(handles) = handles {
                    shutdown_child(handles, self.config.graceful_shutdown).await;
                }
                Ok(())
            })
            .await
    }

    /// Sends one JSONL message and awaits the correlated response line.
    ///
    /// The message must carry a top-level numeric `id`. A timeout or abort
    /// removes the pending entry before rejecting, so the late response is
    /// dropped instead of leaking; it does not restart the subprocess.
    pub async fn send(
        &self,
        line: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> BridgeResult<String> {
        self.init().await?;
        if self.ctx.is_disposed_like() {
            return Err(BridgeError::disposed("transport has been disposed"));
        }

        let id = extract_id(line).ok_or_else(|| {
            BridgeError::protocol("outgoing message is missing a top-level numeric \"id\"")
        })?;

        let write_tx = self.checkout_writer().await?;

        let (responder, response_rx) = oneshot::channel();
        {
            let mut pending = self
                .shared
                .pending
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if pending.contains_key(&id) {
                return Err(BridgeError::protocol(format!(
                    "request id {id} is already pending; ids must be unique per transport"
                )));
            }
            pending.insert(id, responder);
        }
        self.requests_since_spawn.fetch_add(1, Ordering::SeqCst);

        if let Err(err) = self.queue_write(&write_tx, line).await {
            self.shared.take_responder(id);
            return Err(err);
        }

        let armed = (!timeout.is_zero()).then_some(timeout);
        let outcome = tokio::select! {
            biased;
            () = async { cancel.expect("guarded").cancelled().await }, if cancel.is_some() => {
                self.shared.take_responder(id);
                Err(BridgeError::timeout(format!("request {id} aborted")))
            }
            () = async { tokio::time::sleep(armed.expect("guarded")).await }, if armed.is_some() => {
                self.shared.take_responder(id);
                Err(BridgeError::timeout(format!(
                    "request {id} timed out after {} ms",
                    timeout.as_millis()
                )))
            }
            received = response_rx => match received {
                Ok(result) => result,
                Err(_) => Err(BridgeError::protocol_with_tail(
                    format!("transport dropped request {id} before a response arrived"),
                    self.shared.tail(),
                )),
            },
        };
        outcome
    }

    /// Grabs the stdin queue handle, restarting the subprocess first when a
    /// restart is armed or the recycle threshold was reached.
    async fn checkout_writer(&self) -> BridgeResult<mpsc::Sender<WriteRequest>> {
        let mut slot = self.proc.lock().await;

        let recycle_due = self.config.restart_after_requests.is_some_and(|limit| {
            self.requests_since_spawn.load(Ordering::SeqCst) >= limit
        });
        let forced = self.shared.needs_restart.load(Ordering::SeqCst);
        let dead = slot.is_none();

        if forced || recycle_due || dead {
            if let Some(handles) = slot.take() {
                debug!(forced, recycle_due, "restarting python subprocess");
                shutdown_child(handles, self.config.graceful_shutdown).await;
            }
            self.shared
                .fail_all("python subprocess restarted; request abandoned");
            let handles = self
                .spawn_process()
                .map_err(|err| tywrap_core::error::classify_error(err, false))?;
            *slot = Some(handles);
            self.requests_since_spawn.store(0, Ordering::SeqCst);
            self.shared.needs_restart.store(false, Ordering::SeqCst);
        }

        let handles = slot
            .as_ref()
            .ok_or_else(|| BridgeError::protocol("python subprocess is not running"))?;
        Ok(handles.write_tx.clone())
    }

    async fn queue_write(
        &self,
        write_tx: &mpsc::Sender<WriteRequest>,
        line: &str,
    ) -> BridgeResult<()> {
        let (ack, ack_rx) = oneshot::channel();
        write_tx
            .send(WriteRequest {
                line: line.to_string(),
                ack,
            })
            .await
            .map_err(|_| {
                self.shared.needs_restart.store(true, Ordering::SeqCst);
                BridgeError::protocol_with_tail(
                    "stdin writer is gone; transport will restart",
                    self.shared.tail(),
                )
            })?;
        match tokio::time::timeout(self.config.write_timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.shared.needs_restart.store(true, Ordering::SeqCst);
                Err(BridgeError::protocol_with_tail(
                    "stdin write was abandoned; transport will restart",
                    self.shared.tail(),
                ))
            }
            Err(_) => {
                self.shared.needs_restart.store(true, Ordering::SeqCst);
                Err(BridgeError::timeout(format!(
                    "stdin write timed out after {} ms",
                    self.config.write_timeout.as_millis()
                )))
            }
        }
    }

    fn spawn_process(&self) -> anyhow::Result<ProcHandles> {
        let env = self.config.build_env()?;
        let mut command = Command::new(&self.config.python_executable);
        command
            .arg(&self.config.bridge_script)
            .args(&self.config.extra_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env_clear()
            .envs(&env)
            .kill_on_drop(true);
        if let Some(cwd) = &self.config.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|err| {
            anyhow::anyhow!(
                "failed to spawn {}: {err}",
                self.config.python_executable.display()
            )
        })?;
        debug!(
            executable = %self.config.python_executable.display(),
            script = %self.config.bridge_script.display(),
            "spawned python bridge subprocess"
        );

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stdout was not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow::anyhow!("child stderr was not piped"))?;

        let (write_tx, write_rx) = mpsc::channel(64);
        let writer = tokio::spawn(write_loop(
            stdin,
            write_rx,
            Arc::clone(&self.shared),
            self.config.write_timeout,
        ));
        let reader = tokio::spawn(read_loop(
            stdout,
            Arc::clone(&self.shared),
            self.config.max_line_length,
        ));
        let stderr_reader = tokio::spawn(stderr_loop(stderr, Arc::clone(&self.shared)));
        let pid = child.id();
        let monitor = tokio::spawn(monitor_loop(child, Arc::clone(&self.shared)));

        Ok(ProcHandles {
            pid,
            monitor,
            write_tx,
            reader,
            stderr_reader,
            writer,
        })
    }
}

/// Owns the child for its whole life: waits for exit and rejects whatever
/// is still pending with the exit code or signal plus the stderr tail.
async fn monitor_loop(mut child: Child, shared: Arc<Shared>) {
    let reason = match child.wait().await {
        Ok(status) => format!("python subprocess exited ({})", describe_exit(&status)),
        Err(err) => format!("failed waiting for python subprocess: {err}"),
    };
    shared.needs_restart.store(true, Ordering::SeqCst);
    shared.fail_all(&reason);
}

fn describe_exit(status: &std::process::ExitStatus) -> String {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {signal}");
        }
    }
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "unknown exit status".to_string(),
    }
}

#[async_trait]
impl ManagedResource for PythonTransport {
    fn resource_name(&self) -> &str {
        "python-transport"
    }

    async fn dispose(&self) -> anyhow::Result<()> {
        PythonTransport::dispose(self).await?;
        Ok(())
    }
}

/// Graceful kill-then-respawn half: close stdin, SIGTERM, bounded wait,
/// SIGKILL.
async fn shutdown_child(handles: ProcHandles, grace: Duration) {
    // Dropping the queue ends the writer loop, which drops stdin and lets a
    // well-behaved bridge exit on EOF.
    drop(handles.write_tx);
    let _ = tokio::time::timeout(Duration::from_millis(50), handles.writer).await;

    signal_child(handles.pid, false);

    let mut monitor = handles.monitor;
    if tokio::time::timeout(grace, &mut monitor).await.is_err() {
        warn!("python subprocess ignored SIGTERM; escalating to SIGKILL");
        signal_child(handles.pid, true);
        // The monitor owns the child with kill_on_drop, so aborting it is
        // the portable backstop.
        if tokio::time::timeout(Duration::from_secs(1), &mut monitor)
            .await
            .is_err()
        {
            monitor.abort();
        }
    }

    handles.reader.abort();
    handles.stderr_reader.abort();
}

#[cfg(unix)]
fn signal_child(pid: Option<u32>, force: bool) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    if let Some(pid) = pid {
        let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
        let _ = kill(Pid::from_raw(pid as i32), signal);
    }
}

#[cfg(not(unix))]
fn signal_child(_pid: Option<u32>, _force: bool) {}

/// Writer task: applies queued writes to stdin with per-entry timeouts.
async fn write_loop(
    mut stdin: ChildStdin,
    mut rx: mpsc::Receiver<WriteRequest>,
    shared: Arc<Shared>,
    write_timeout: Duration,
) {
    while let Some(request) = rx.recv().await {
        let attempt = tokio::time::timeout(write_timeout, async {
            stdin.write_all(request.line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        })
        .await;
        let outcome = match attempt {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                shared.needs_restart.store(true, Ordering::SeqCst);
                Err(BridgeError::protocol_with_tail(
                    format!("stdin write failed: {err}"),
                    shared.tail(),
                ))
            }
            Err(_) => {
                shared.needs_restart.store(true, Ordering::SeqCst);
                Err(BridgeError::timeout(format!(
                    "stdin write timed out after {} ms waiting for the pipe to drain",
                    write_timeout.as_millis()
                )))
            }
        };
        let failed = outcome.is_err();
        let _ = request.ack.send(outcome);
        if failed {
            break;
        }
    }
}

/// Reader task: assembles stdout lines, enforces the length cap, resolves
/// pending requests by id.
async fn read_loop(mut stdout: ChildStdout, shared: Arc<Shared>, max_line_length: usize) {
    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 16 * 1024];
    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => {
                // EOF: the monitor task rejects pending requests with the
                // actual exit status; this task only arms the restart.
                shared.needs_restart.store(true, Ordering::SeqCst);
                return;
            }
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                    if newline > max_line_length {
                        oversized_line(&shared, &buffer, max_line_length);
                        return;
                    }
                    let line_bytes: Vec<u8> = buffer.drain(..=newline).collect();
                    let line = String::from_utf8_lossy(&line_bytes[..newline]);
                    handle_line(line.trim_end_matches('\r'), &shared);
                }
                // A partial line buffers until its terminator arrives, but
                // never past the framing cap.
                if buffer.len() > max_line_length {
                    oversized_line(&shared, &buffer, max_line_length);
                    return;
                }
            }
            Err(err) => {
                shared.needs_restart.store(true, Ordering::SeqCst);
                shared.fail_all(&format!("stdout stream error: {err}"));
                return;
            }
        }
    }
}

fn oversized_line(shared: &Shared, buffer: &[u8], max_line_length: usize) {
    shared.needs_restart.store(true, Ordering::SeqCst);
    let snippet: String = String::from_utf8_lossy(&buffer[..64.min(buffer.len())]).into_owned();
    shared.fail_all(&format!(
        "stdout line exceeded {max_line_length} bytes (starts with {snippet:?}); {STDOUT_HINT}"
    ));
}

fn handle_line(line: &str, shared: &Shared) {
    if line.is_empty() {
        return;
    }
    match extract_id(line) {
        Some(id) => match shared.take_responder(id) {
            Some(responder) => {
                let _ = responder.send(Ok(line.to_string()));
            }
            None => {
                // Late arrival for a request whose timer already fired.
                trace!(id, "dropping response for unknown request id");
            }
        },
        None => {
            trace!(
                line = %&line[..line.len().min(80)],
                "dropping un-correlatable stdout line"
            );
        }
    }
}

/// Stderr task: sanitizes and retains a rolling diagnostic tail.
async fn stderr_loop(mut stderr: ChildStderr, shared: Arc<Shared>) {
    let mut chunk = [0u8; 4096];
    loop {
        match stderr.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => {
                let sanitized = sanitize_stderr(&chunk[..n]);
                shared.append_stderr(&sanitized);
            }
        }
    }
}

/// Strips ANSI escape sequences and control bytes (newline and tab kept).
fn sanitize_stderr(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let byte = raw[i];
        if byte == 0x1b {
            // CSI sequence: skip to its final byte.
            i += 1;
            if i < raw.len() && raw[i] == b'[' {
                i += 1;
                while i < raw.len() && !raw[i].is_ascii_alphabetic() {
                    i += 1;
                }
            }
            i += 1;
            continue;
        }
        if byte == b'\n' || byte == b'\t' || !byte.is_ascii_control() {
            out.push(byte);
        }
        i += 1;
    }
    out
}
