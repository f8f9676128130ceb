//! Process helpers exposed to embedded scripts (spec.md §4.8): `exec`,
//! `run_process`, and the `spawn_process`/`poll_process`/`wait_process`/
//! `close_process` managed-subprocess quartet.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::EventSink;
use crate::event::{Event, Stream};
use crate::policy::ExecPolicy;
use crate::process::{run, ManagedProcessHandle, ManagedStatus, ProcessTable, RunCallbacks, RunOptions};
use crate::Result;

/// Captured result of [`run_process`].
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// `exec(argv, opts)`: stream output/events straight to the host sink
/// (spec.md §4.8).
pub async fn exec(argv: &[String], sink: Arc<dyn EventSink>, exec_policy: &ExecPolicy) -> bool {
    run(argv, RunOptions::new("sdk.exec"), Arc::new(SinkCallbacks(sink)), exec_policy).await
}

struct SinkCallbacks(Arc<dyn EventSink>);

#[async_trait]
impl RunCallbacks for SinkCallbacks {
    async fn on_output(&self, line: &str, stream: Stream) {
        self.0
            .emit(Event::new("print").with("message", line.to_string()).with("stream", stream.as_str()))
            .await;
    }

    async fn on_event(&self, event: Event) {
        self.0.emit(event).await;
    }
}

/// `run_process(argv, opts)`: capture stdout/stderr rather than streaming
/// them, with an optional timeout (spec.md §4.8, §5 "Timeouts").
pub async fn run_process(
    argv: &[String],
    exec_policy: &ExecPolicy,
    timeout: Option<Duration>,
) -> Result<CapturedOutput> {
    let table = ProcessTable::new();
    let handle = table.spawn(argv, exec_policy)?;
    let status = table.wait(handle, timeout).await?;
    table.close(handle);

    if status.running {
        return Err(crate::Error::Timeout);
    }

    Ok(CapturedOutput {
        success: status.exit_code == Some(0),
        stdout: status.stdout_delta,
        stderr: status.stderr_delta,
        exit_code: status.exit_code,
    })
}

pub fn spawn_process(
    table: &ProcessTable,
    argv: &[String],
    exec_policy: &ExecPolicy,
) -> Result<ManagedProcessHandle> {
    table.spawn(argv, exec_policy)
}

pub fn poll_process(table: &ProcessTable, handle: ManagedProcessHandle) -> Result<ManagedStatus> {
    table.poll(handle)
}

pub async fn wait_process(
    table: &ProcessTable,
    handle: ManagedProcessHandle,
    timeout: Option<Duration>,
) -> Result<ManagedStatus> {
    table.wait(handle, timeout).await
}

pub fn close_process(table: &ProcessTable, handle: ManagedProcessHandle) {
    table.close(handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_process_captures_output() {
        let policy = ExecPolicy::new(["echo".to_string()]);
        let out = run_process(&["echo".to_string(), "hi".to_string()], &policy, None)
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "hi\n");
    }

    #[tokio::test]
    async fn run_process_honors_timeout() {
        let policy = ExecPolicy::new(["sleep".to_string()]);
        let err = run_process(
            &["sleep".to_string(), "5".to_string()],
            &policy,
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, crate::Error::Timeout));
    }
}
