//! Host SDK exposed inside embedded script hosts (spec.md §4.8).
//!
//! Every operation here passes through the executable allow-list and/or
//! path-access policy before touching the filesystem or spawning a process.
//! The SDK is deliberately runtime-agnostic: [`HostSdk`] is constructed once
//! per operation run and handed to whichever script host (`lua`/`js`) is
//! dispatched, so both hosts share one policy-enforcing implementation
//! rather than duplicating it.

pub mod archive;
pub mod data;
pub mod fs;
pub mod process;
pub mod sql;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::event::Event;
use crate::policy::{ExecPolicy, PathPolicy};
use crate::process::ProcessTable;

/// Sink for events raised by the SDK's output/control/prompt/progress
/// surface (spec.md §4.8). The dispatcher wires this to whatever the
/// front-end's `onEvent`/`stdinProvider` callbacks are for the current run.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: Event);
    /// Request one line of input from the caller (used by `prompt` and by
    /// the path-policy's out-of-workspace confirmation).
    async fn read_line(&self, message: &str) -> String;
}

/// A no-op sink for contexts (tests, `init` operations with no front-end
/// attached) that never prompt and discard emitted events.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn emit(&self, _event: Event) {}
    async fn read_line(&self, _message: &str) -> String {
        String::new()
    }
}

/// Process-wide table of preseeded prompt answers (spec.md §4.8 "Auto-
/// response table"). Mutated only by test/orchestration code between runs
/// (spec.md §5 "Shared-resource policy").
#[derive(Debug, Default, Clone)]
pub struct AutoResponses {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl AutoResponses {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: impl Into<String>, value: impl Into<String>) {
        self.inner.lock().insert(id.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<String> {
        self.inner.lock().get(id).cloned()
    }
}

/// Live progress handle returned by [`HostSdk::progress`]; `update` re-emits
/// a `progress` event with the new `current`.
pub struct ProgressHandle {
    sink: Arc<dyn EventSink>,
    id: String,
    label: Option<String>,
    total: u64,
    current: Arc<Mutex<u64>>,
}

impl ProgressHandle {
    pub async fn update(&self, inc: u64) {
        let current = {
            let mut c = self.current.lock();
            *c = (*c + inc).min(self.total);
            *c
        };
        let mut event = Event::new("progress")
            .with("id", self.id.clone())
            .with("current", current)
            .with("total", self.total);
        if let Some(label) = &self.label {
            event = event.with("label", label.clone());
        }
        self.sink.emit(event).await;
    }
}

/// Bundled, policy-gated surface handed to a script host for one operation
/// run.
pub struct HostSdk {
    pub sink: Arc<dyn EventSink>,
    pub exec_policy: Arc<ExecPolicy>,
    pub path_policy: Arc<PathPolicy>,
    pub processes: Arc<ProcessTable>,
    pub auto_responses: AutoResponses,
}

impl HostSdk {
    #[must_use]
    pub fn new(
        sink: Arc<dyn EventSink>,
        exec_policy: Arc<ExecPolicy>,
        path_policy: Arc<PathPolicy>,
        processes: Arc<ProcessTable>,
        auto_responses: AutoResponses,
    ) -> Self {
        Self {
            sink,
            exec_policy,
            path_policy,
            processes,
            auto_responses,
        }
    }

    pub async fn print(&self, message: &str, color: Option<&str>, newline: bool) {
        let mut event = Event::new("print")
            .with("message", message.to_string())
            .with("newline", newline);
        if let Some(c) = color {
            event = event.with("color", c.to_string());
        }
        self.sink.emit(event).await;
    }

    pub async fn warn(&self, message: &str) {
        self.sink.emit(Event::new("warning").with("message", message.to_string())).await;
    }

    pub async fn error(&self, message: &str) {
        self.sink.emit(Event::error(message.to_string())).await;
    }

    pub async fn info(&self, message: &str) {
        self.print(message, None, true).await;
    }

    pub async fn success(&self, message: &str) {
        self.print(message, Some("green"), true).await;
    }

    pub async fn start(&self, op: Option<&str>) {
        let mut event = Event::new("start");
        if let Some(op) = op {
            event = event.with("op", op.to_string());
        }
        self.sink.emit(event).await;
    }

    pub async fn end(&self, success: bool, exit_code: i32) {
        self.sink
            .emit(Event::new("end").with("success", success).with("exit_code", exit_code))
            .await;
    }

    /// `prompt(message, id?, secret?) → string` (spec.md §4.8).
    ///
    /// If `id` matches a preseeded auto-response, returns it without I/O,
    /// emitting two informational `print` events instead of a real prompt.
    pub async fn prompt(&self, message: &str, id: Option<&str>, secret: bool) -> String {
        if let Some(id) = id {
            if let Some(answer) = self.auto_responses.get(id) {
                self.print(&format!("(auto) {message}"), None, true).await;
                self.print(&format!("(auto) -> {}", if secret { "***" } else { &answer }), None, true)
                    .await;
                return answer;
            }
        }

        let mut event = Event::new("prompt").with("message", message.to_string());
        if let Some(id) = id {
            event = event.with("id", id.to_string());
        }
        event = event.with("secret", secret);
        self.sink.emit(event).await;
        self.sink.read_line(message).await
    }

    /// `progress(total, id?, label?) → handle` (spec.md §4.8).
    #[must_use]
    pub fn progress(&self, total: u64, id: Option<String>, label: Option<String>) -> ProgressHandle {
        ProgressHandle {
            sink: self.sink.clone(),
            id: id.unwrap_or_else(|| "progress".to_string()),
            label,
            total,
            current: Arc::new(Mutex::new(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recording(StdMutex<Vec<Event>>);

    #[async_trait]
    impl EventSink for Recording {
        async fn emit(&self, event: Event) {
            self.0.lock().unwrap().push(event);
        }
        async fn read_line(&self, _message: &str) -> String {
            "typed-answer".to_string()
        }
    }

    fn sdk(sink: Arc<dyn EventSink>) -> HostSdk {
        HostSdk::new(
            sink,
            Arc::new(ExecPolicy::default()),
            Arc::new(PathPolicy::new(std::env::temp_dir(), vec![])),
            Arc::new(ProcessTable::new()),
            AutoResponses::new(),
        )
    }

    #[tokio::test]
    async fn prompt_without_auto_response_reads_a_line() {
        let recording = Arc::new(Recording::default());
        let sdk = sdk(recording.clone());
        let answer = sdk.prompt("Name?", None, false).await;
        assert_eq!(answer, "typed-answer");
        assert_eq!(recording.0.lock().unwrap()[0].event, "prompt");
    }

    #[tokio::test]
    async fn prompt_with_matching_auto_response_skips_io() {
        let recording = Arc::new(Recording::default());
        let sdk = sdk(recording.clone());
        sdk.auto_responses.set("confirm-id", "yes");
        let answer = sdk.prompt("Confirm?", Some("confirm-id"), false).await;
        assert_eq!(answer, "yes");
        let events = recording.0.lock().unwrap();
        assert!(events.iter().all(|e| e.event == "print"));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn progress_handle_clamps_to_total() {
        let recording = Arc::new(Recording::default());
        let sdk = sdk(recording.clone());
        let handle = sdk.progress(10, Some("p".to_string()), None);
        handle.update(7).await;
        handle.update(7).await;
        let events = recording.0.lock().unwrap();
        assert_eq!(events[1].fields["current"], 10);
    }
}
