use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use crate::config::SessionConfig;
use crate::event::Event;
use crate::launcher::{kill_process_group, ContainerLauncher, LaunchedChild};
use crate::tools::read_output::ReadOutputResult;
use crate::tools::send_input::SendInputResult;
use crate::tools::stop_session::StopSessionResult;

const READ_CHUNK_BYTES: usize = 1024;
const WATCHER_TICK: Duration = Duration::from_millis(200);
const STOP_PHASE_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle state of a session. Transitions Starting→Running happen before
/// a `Supervisor` is ever handed back to the registry (no readiness probe is
/// required), so callers only ever observe Running, Stopping, or Exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Stopping,
    Exited,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

struct Inner {
    id: String,
    command: String,
    state_tx: watch::Sender<SessionState>,
    stdin: AsyncMutex<Option<tokio::process::ChildStdin>>,
    stdout_bytes: AtomicU64,
    stderr_bytes: AtomicU64,
    last_activity: StdMutex<Instant>,
    deadline: Option<Instant>,
    idle_timeout: Duration,
    session_timeout_secs: u64,
    idle_timeout_secs: u64,
    output_limit: u64,
    terminal_fired: AtomicBool,
    pid: u32,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: AsyncMutex<mpsc::UnboundedReceiver<Event>>,
    stop_lock: AsyncMutex<()>,
}

/// Owns one running child program: its pipes, its event queue, and the
/// reader/watcher tasks that drain and police it. Cheap to clone — every
/// clone shares the same underlying session via `Arc`.
#[derive(Clone)]
pub struct Supervisor(Arc<Inner>);

impl Supervisor {
    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn command(&self) -> &str {
        &self.0.command
    }

    /// Spawn the container, then the two stream drains and the watcher.
    /// Returns once the child has been spawned — state is already Running.
    pub async fn launch(
        id: String,
        command: String,
        launcher: Arc<dyn ContainerLauncher>,
        cfg: Arc<SessionConfig>,
    ) -> Result<Self, crate::error::SandboxError> {
        let LaunchedChild { child, stdin, stdout, stderr, pid } = launcher.launch(&cfg, &command).await?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) = watch::channel(SessionState::Running);
        let now = Instant::now();
        let deadline = (cfg.session_timeout > 0).then(|| now + Duration::from_secs(cfg.session_timeout));

        let inner = Arc::new(Inner {
            id,
            command,
            state_tx,
            stdin: AsyncMutex::new(Some(stdin)),
            stdout_bytes: AtomicU64::new(0),
            stderr_bytes: AtomicU64::new(0),
            last_activity: StdMutex::new(now),
            deadline,
            idle_timeout: Duration::from_secs(cfg.idle_timeout),
            session_timeout_secs: cfg.session_timeout,
            idle_timeout_secs: cfg.idle_timeout,
            output_limit: cfg.output_limit,
            terminal_fired: AtomicBool::new(false),
            pid,
            events_tx,
            events_rx: AsyncMutex::new(events_rx),
            stop_lock: AsyncMutex::new(()),
        });

        tokio::spawn(drain_stream(inner.clone(), stdout, Stream::Stdout));
        tokio::spawn(drain_stream(inner.clone(), stderr, Stream::Stderr));
        tokio::spawn(watch_child(inner.clone(), child));

        Ok(Self(inner))
    }

    /// Appends `text` (plus exactly one trailing newline, unless already
    /// present) to the child's stdin. Never blocks the transport: failures
    /// are returned as a structured result, not an error.
    pub async fn send(&self, text: &str) -> SendInputResult {
        if *self.0.state_tx.borrow() != SessionState::Running {
            return SendInputResult { ok: false, error: Some("process not running".to_string()) };
        }

        let mut guard = self.0.stdin.lock().await;
        let Some(stdin) = guard.as_mut() else {
            return SendInputResult { ok: false, error: Some("process already exited".to_string()) };
        };

        let mut payload = text.to_string();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }

        match stdin.write_all(payload.as_bytes()).await {
            Ok(()) => {
                *self.0.last_activity.lock().unwrap() = Instant::now();
                SendInputResult { ok: true, error: None }
            }
            Err(_) => {
                *guard = None;
                SendInputResult { ok: false, error: Some("process already exited".to_string()) }
            }
        }
    }

    /// Drains whatever is queued; if empty and `wait_ms > 0`, waits for the
    /// first event up to `wait_ms`, then drains anything that arrived
    /// without further waiting. Never blocks longer than `wait_ms`.
    pub async fn read(&self, wait_ms: u64) -> ReadOutputResult {
        let mut rx = self.0.events_rx.lock().await;
        let mut events = Vec::new();

        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }

        if events.is_empty() && wait_ms > 0 {
            if let Ok(Some(ev)) = tokio::time::timeout(Duration::from_millis(wait_ms), rx.recv()).await {
                events.push(ev);
                while let Ok(ev) = rx.try_recv() {
                    events.push(ev);
                }
            }
        }

        ReadOutputResult {
            events,
            alive: *self.0.state_tx.borrow() != SessionState::Exited,
            stdout_bytes: self.0.stdout_bytes.load(Ordering::Relaxed),
            stderr_bytes: self.0.stderr_bytes.load(Ordering::Relaxed),
            error: None,
        }
    }

    /// Requests termination, escalating to the strongest signal if the
    /// child hasn't exited within two seconds, and returning at most two
    /// seconds after that regardless of outcome. Idempotent.
    pub async fn stop(&self, kill: bool) -> StopSessionResult {
        let _guard = self.0.stop_lock.lock().await;

        if *self.0.state_tx.borrow() == SessionState::Exited {
            return StopSessionResult { ok: true, message: Some("already stopped".to_string()), error: None };
        }

        let _ = self.0.state_tx.send(SessionState::Stopping);
        let sig = if kill { libc::SIGKILL } else { libc::SIGTERM };
        kill_process_group(self.0.pid, sig);

        let mut rx = self.0.state_tx.subscribe();
        if tokio::time::timeout(STOP_PHASE_TIMEOUT, wait_for_exited(&mut rx)).await.is_err() {
            kill_process_group(self.0.pid, libc::SIGKILL);
            let _ = tokio::time::timeout(STOP_PHASE_TIMEOUT, wait_for_exited(&mut rx)).await;
        }

        StopSessionResult { ok: true, message: Some("stopped".to_string()), error: None }
    }
}

async fn wait_for_exited(rx: &mut watch::Receiver<SessionState>) {
    loop {
        if *rx.borrow() == SessionState::Exited {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Claims the terminal-event slot exactly once. Whichever task — a stream
/// reader noticing the output limit, or the watcher noticing a timeout or
/// exit — wins the race enqueues the terminal event; the loser still kills
/// and reaps the child but stays silent, satisfying "exactly one terminal
/// event" even though limit detection and the watcher run concurrently.
fn claim_terminal(inner: &Inner) -> bool {
    inner.terminal_fired.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_ok()
}

async fn drain_stream(inner: Arc<Inner>, mut pipe: impl tokio::io::AsyncRead + Unpin, stream: Stream) {
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let n = match pipe.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };

        *inner.last_activity.lock().unwrap() = Instant::now();
        let text = String::from_utf8_lossy(&buf[..n]).into_owned();

        let counter = match stream {
            Stream::Stdout => &inner.stdout_bytes,
            Stream::Stderr => &inner.stderr_bytes,
        };
        counter.fetch_add(n as u64, Ordering::Relaxed);

        let event = match stream {
            Stream::Stdout => Event::Stdout { data: text },
            Stream::Stderr => Event::Stderr { data: text },
        };
        let _ = inner.events_tx.send(event);

        let total = inner.stdout_bytes.load(Ordering::Relaxed) + inner.stderr_bytes.load(Ordering::Relaxed);
        if total > inner.output_limit && claim_terminal(&inner) {
            tracing::warn!(session_id = %inner.id, limit = inner.output_limit, "output limit exceeded");
            let _ = inner.events_tx.send(Event::Limit { limit: inner.output_limit });
            kill_process_group(inner.pid, libc::SIGKILL);
        }
    }

    let closed = match stream {
        Stream::Stdout => Event::StdoutClosed,
        Stream::Stderr => Event::StderrClosed,
    };
    let _ = inner.events_tx.send(closed);
}

async fn watch_child(inner: Arc<Inner>, mut child: tokio::process::Child) {
    loop {
        if let Some(deadline) = inner.deadline
            && Instant::now() >= deadline
        {
            tracing::warn!(session_id = %inner.id, seconds = inner.session_timeout_secs, "session wall time exceeded");
            if claim_terminal(&inner) {
                let _ = inner.events_tx.send(Event::Timeout { seconds: inner.session_timeout_secs as f64 });
            }
            kill_process_group(inner.pid, libc::SIGKILL);
            let _ = child.wait().await;
            finish(&inner);
            return;
        }

        if inner.idle_timeout > Duration::ZERO {
            let idle = inner.last_activity.lock().unwrap().elapsed();
            if idle > inner.idle_timeout {
                tracing::warn!(session_id = %inner.id, seconds = inner.idle_timeout_secs, "session idle timeout exceeded");
                if claim_terminal(&inner) {
                    let _ = inner.events_tx.send(Event::IdleTimeout { seconds: inner.idle_timeout_secs as f64 });
                }
                kill_process_group(inner.pid, libc::SIGKILL);
                let _ = child.wait().await;
                finish(&inner);
                return;
            }
        }

        match child.try_wait() {
            Ok(Some(status)) => {
                let code = status.code();
                if code.is_some_and(|c| c != 0) {
                    tracing::warn!(session_id = %inner.id, exit_code = ?code, "session exited with non-zero status");
                }
                if claim_terminal(&inner) {
                    let _ = inner.events_tx.send(Event::Exit { code });
                }
                finish(&inner);
                return;
            }
            Ok(None) => {}
            Err(_) => {
                finish(&inner);
                return;
            }
        }

        tokio::time::sleep(WATCHER_TICK).await;
    }
}

fn finish(inner: &Inner) {
    let _ = inner.state_tx.send(SessionState::Exited);
}
