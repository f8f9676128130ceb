//! Managed background subprocess API (spec.md §4.8 `spawn_process` /
//! `poll_process` / `wait_process` / `close_process`; data shape per spec.md
//! §3 "Managed subprocess").
//!
//! SPEC_FULL.md fixes the wire contract the distilled spec left implicit: an
//! opaque `u64` handle per process, and an idempotent `close`.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, watch};

use crate::policy::ExecPolicy;
use crate::{Error, Result};

/// Opaque handle returned by [`ProcessTable::spawn`].
pub type ManagedProcessHandle = u64;

/// Snapshot returned by `poll`/`wait`: running state, undelivered output
/// since the last call, and the exit code once known.
#[derive(Debug, Clone)]
pub struct ManagedStatus {
    pub running: bool,
    pub stdout_delta: String,
    pub stderr_delta: String,
    pub exit_code: Option<i32>,
}

pub struct ManagedProcess {
    stdout_buffer: Mutex<String>,
    stderr_buffer: Mutex<String>,
    stdout_cursor: AtomicUsize,
    stderr_cursor: AtomicUsize,
    exited: AtomicBool,
    exit_code: AtomicI32,
    exited_rx: watch::Receiver<bool>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
    closed: AtomicBool,
}

impl ManagedProcess {
    fn delta(buffer: &Mutex<String>, cursor: &AtomicUsize) -> String {
        let buf = buffer.lock();
        let start = cursor.load(Ordering::Acquire).min(buf.len());
        let delta = buf[start..].to_string();
        cursor.store(buf.len(), Ordering::Release);
        delta
    }

    fn status(&self) -> ManagedStatus {
        ManagedStatus {
            running: !self.exited.load(Ordering::Acquire),
            stdout_delta: Self::delta(&self.stdout_buffer, &self.stdout_cursor),
            stderr_delta: Self::delta(&self.stderr_buffer, &self.stderr_cursor),
            exit_code: self.exited.load(Ordering::Acquire).then(|| self.exit_code.load(Ordering::Acquire)),
        }
    }
}

/// Registry of in-flight and completed managed processes for one engine
/// session.
#[derive(Default)]
pub struct ProcessTable {
    next_id: AtomicU64,
    processes: DashMap<ManagedProcessHandle, Arc<ManagedProcess>>,
}

impl ProcessTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `argv` as a managed background process, subject to the
    /// executable allow-list.
    pub fn spawn(&self, argv: &[String], exec_policy: &ExecPolicy) -> Result<ManagedProcessHandle> {
        let exe = argv.first().ok_or_else(|| Error::SpawnFailed("empty argv".to_string()))?;
        exec_policy.check(exe).map_err(Error::DisallowedExecutable)?;

        let mut command = Command::new(exe);
        command
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::SpawnFailed(format!("{exe}: {e}")))?;

        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let (exited_tx, exited_rx) = watch::channel(false);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();

        let process = Arc::new(ManagedProcess {
            stdout_buffer: Mutex::new(String::new()),
            stderr_buffer: Mutex::new(String::new()),
            stdout_cursor: AtomicUsize::new(0),
            stderr_cursor: AtomicUsize::new(0),
            exited: AtomicBool::new(false),
            exit_code: AtomicI32::new(-1),
            exited_rx,
            kill_tx: Mutex::new(Some(kill_tx)),
            closed: AtomicBool::new(false),
        });

        spawn_appender(BufReader::new(stdout), process.clone(), true);
        spawn_appender(BufReader::new(stderr), process.clone(), false);

        let waiter = process.clone();
        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
                    waiter.exit_code.store(code, Ordering::Release);
                }
                _ = kill_rx => {
                    let _ = child.start_kill();
                    let status = child.wait().await;
                    let code = status.ok().and_then(|s| s.code()).unwrap_or(-1);
                    waiter.exit_code.store(code, Ordering::Release);
                }
            }
            waiter.exited.store(true, Ordering::Release);
            let _ = exited_tx.send(true);
        });

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.processes.insert(id, process);
        Ok(id)
    }

    /// Non-blocking status snapshot with delta output since the last
    /// poll/wait call.
    pub fn poll(&self, handle: ManagedProcessHandle) -> Result<ManagedStatus> {
        let process = self.get(handle)?;
        Ok(process.status())
    }

    /// Block (up to `timeout`, if given) until the process exits, returning
    /// the same shape as [`ProcessTable::poll`].
    pub async fn wait(&self, handle: ManagedProcessHandle, timeout: Option<Duration>) -> Result<ManagedStatus> {
        let process = self.get(handle)?;
        let mut rx = process.exited_rx.clone();

        if !*rx.borrow() {
            let wait_fut = async {
                while !*rx.borrow() {
                    if rx.changed().await.is_err() {
                        break;
                    }
                }
            };
            match timeout {
                Some(d) => {
                    let _ = tokio::time::timeout(d, wait_fut).await;
                }
                None => wait_fut.await,
            }
        }

        Ok(process.status())
    }

    /// Idempotent: closing an already-closed or unknown handle is a no-op
    /// success, not an error (spec.md §5 "cursor advancement is atomic";
    /// SPEC_FULL.md supplement on idempotent close).
    pub fn close(&self, handle: ManagedProcessHandle) {
        if let Some((_, process)) = self.processes.remove(&handle) {
            if !process.closed.swap(true, Ordering::AcqRel) {
                if let Some(tx) = process.kill_tx.lock().take() {
                    let _ = tx.send(());
                }
            }
        }
    }

    fn get(&self, handle: ManagedProcessHandle) -> Result<Arc<ManagedProcess>> {
        self.processes
            .get(&handle)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::Config(format!("unknown managed process handle {handle}")))
    }
}

fn spawn_appender<R>(reader: BufReader<R>, process: Arc<ManagedProcess>, is_stdout: bool)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let buffer = if is_stdout {
                &process.stdout_buffer
            } else {
                &process.stderr_buffer
            };
            let mut buf = buffer.lock();
            buf.push_str(&line);
            buf.push('\n');
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echo_process_reports_delta_and_exit_code() {
        let table = ProcessTable::new();
        let policy = ExecPolicy::new(["echo".to_string()]);
        let handle = table
            .spawn(&["echo".to_string(), "hi".to_string()], &policy)
            .unwrap();

        let status = table.wait(handle, Some(Duration::from_secs(5))).await.unwrap();
        assert!(!status.running);
        assert_eq!(status.exit_code, Some(0));
        assert_eq!(status.stdout_delta, "hi\n");

        // Second poll after exit returns no new delta, cursor already advanced.
        let status2 = table.poll(handle).unwrap();
        assert_eq!(status2.stdout_delta, "");
    }

    #[test]
    fn disallowed_executable_fails_to_spawn() {
        let table = ProcessTable::new();
        let err = table.spawn(&["tar".to_string()], &ExecPolicy::default()).unwrap_err();
        assert!(matches!(err, Error::DisallowedExecutable(_)));
    }

    #[test]
    fn close_on_unknown_handle_is_a_no_op() {
        let table = ProcessTable::new();
        table.close(999);
    }

    #[tokio::test]
    async fn double_close_is_idempotent() {
        let table = ProcessTable::new();
        let policy = ExecPolicy::new(["sleep".to_string()]);
        let handle = table.spawn(&["sleep".to_string(), "5".to_string()], &policy).unwrap();
        table.close(handle);
        table.close(handle);
    }
}
