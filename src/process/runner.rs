//! Foreground process runner (spec.md §4.6), grounded on the teacher
//! crate's stdio transport: piped child I/O, concurrent line readers, and a
//! single sequencer that serializes callbacks.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::event::{parse_line, Event, ParsedLine, Stream};
use crate::policy::ExecPolicy;

/// Caller-supplied sinks for a single process run. Implementors need not be
/// reentrant; the runner invokes them from one logical sequencer (spec.md §5).
#[async_trait]
pub trait RunCallbacks: Send + Sync {
    async fn on_output(&self, line: &str, stream: Stream);
    async fn on_event(&self, event: Event);
    /// Called when a `prompt` event is observed and a reply is needed.
    /// Returning `None` leaves the child's stdin untouched.
    async fn provide_stdin(&self) -> Option<String> {
        None
    }
}

/// Per-run options for [`run`].
pub struct RunOptions {
    pub title: String,
    pub env: HashMap<String, String>,
    pub cancel: CancelToken,
}

impl RunOptions {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            env: HashMap::new(),
            cancel: CancelToken::never(),
        }
    }
}

enum Line {
    Data(Stream, String),
    Eof(Stream),
}

/// Execute `argv`, streaming output and events to `callbacks`.
///
/// Returns `true` iff the child exited with code 0 and was not cancelled.
/// Enforcement and runtime failures never panic; they return `false` after
/// emitting a descriptive line/event, per spec.md §4.6.
pub async fn run(
    argv: &[String],
    opts: RunOptions,
    callbacks: Arc<dyn RunCallbacks>,
    exec_policy: &ExecPolicy,
) -> bool {
    let Some(exe) = argv.first() else {
        return true; // empty argv is the command builder's no-op convention
    };

    if let Err(reason) = exec_policy.check(exe) {
        callbacks
            .on_output(&format!("SECURITY: Executable {exe} not approved"), Stream::Stderr)
            .await;
        tracing::warn!(executable = %exe, reason, "blocked executable spawn");
        return false;
    }

    if opts.cancel.is_cancelled() {
        tracing::info!(title = %opts.title, "run cancelled before spawn");
        return false;
    }

    let mut command = Command::new(exe);
    command
        .args(&argv[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (k, v) in &opts.env {
        command.env(k, v);
    }

    let mut child = match command.spawn() {
        Ok(c) => c,
        Err(e) => {
            let message = format!("failed to spawn '{exe}': {e}");
            callbacks.on_event(Event::error(message.clone())).await;
            tracing::error!(executable = %exe, error = %e, "spawn failed");
            return false;
        }
    };

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");
    let mut stdin = child.stdin.take().expect("piped stdin");

    let (tx, mut rx) = mpsc::unbounded_channel::<Line>();
    spawn_reader(BufReader::new(stdout), Stream::Stdout, tx.clone());
    spawn_reader(BufReader::new(stderr), Stream::Stderr, tx.clone());
    drop(tx);

    let mut cancel = opts.cancel.clone();
    let mut cancelled = false;
    let mut eof_count = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled(), if !cancelled => {
                cancelled = true;
                let _ = child.start_kill();
            }
            line = rx.recv() => {
                match line {
                    Some(Line::Data(stream, text)) => {
                        dispatch_line(&text, stream, &callbacks, &mut stdin).await;
                    }
                    Some(Line::Eof(_)) => {
                        eof_count += 1;
                        if eof_count == 2 {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }

    let status = if cancelled {
        let _ = child.wait().await;
        None
    } else {
        match child.wait().await {
            Ok(status) => Some(status),
            Err(e) => {
                callbacks
                    .on_event(Event::error(format!("wait failed: {e}")))
                    .await;
                None
            }
        }
    };

    if cancelled {
        tracing::info!(title = %opts.title, "run cancelled");
        return false;
    }

    let Some(status) = status else {
        return false;
    };

    let exit_code = status.code().unwrap_or(-1);
    callbacks.on_event(Event::end(exit_code)).await;
    exit_code == 0
}

fn spawn_reader<R>(reader: BufReader<R>, stream: Stream, tx: mpsc::UnboundedSender<Line>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(Line::Data(stream, line)).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = tx.send(Line::Eof(stream));
                    break;
                }
                Err(_) => {
                    let _ = tx.send(Line::Eof(stream));
                    break;
                }
            }
        }
    });
}

async fn dispatch_line(
    text: &str,
    stream: Stream,
    callbacks: &Arc<dyn RunCallbacks>,
    stdin: &mut tokio::process::ChildStdin,
) {
    match parse_line(text) {
        ParsedLine::Event(event) => {
            let is_prompt = event.event == "prompt";
            callbacks.on_event(event).await;
            if is_prompt {
                if let Some(reply) = callbacks.provide_stdin().await {
                    let _ = stdin.write_all(reply.as_bytes()).await;
                    let _ = stdin.write_all(b"\n").await;
                }
            }
        }
        ParsedLine::Output(line) => {
            callbacks.on_output(&line, stream).await;
        }
    }
}
