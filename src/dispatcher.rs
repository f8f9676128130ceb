//! Operation dispatcher (spec.md §4.9): the sole place that turns a resolved
//! [`Operation`] into one of a script-host run, a built-in action, or a
//! spawned external process, and the sole place that wires a caller's
//! `onOutput`/`onEvent`/`stdinProvider` callbacks into whichever of those it
//! picks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use remake_core::placeholder::resolve;
use remake_core::{ModuleDescriptor, Operation};
use serde_json::{Map, Value};

use crate::builtin::{self, Action, ActionRequest};
use crate::cancel::CancelToken;
use crate::command::{self, Answers};
use crate::config::EngineConfig;
use crate::event::Event;
use crate::policy::{ExecPolicy, PathPolicy};
use crate::process::{self, ProcessTable, RunCallbacks, RunOptions};
use crate::sdk::{AutoResponses, EventSink, HostSdk};
use crate::script::{self, ScriptContext};
use crate::tool_resolver::ToolMap;
use crate::{Error, Result};

/// Shared state that outlives any single dispatch call: the executable
/// allow-list, path-access policy, managed-process table, auto-response
/// table, and tool map. Owned by the facade and handed down so managed
/// background processes started by one operation can be polled/closed by a
/// later, unrelated dispatch call.
pub struct EngineRuntime {
    pub exec_policy: Arc<ExecPolicy>,
    pub path_policy: Arc<PathPolicy>,
    pub processes: Arc<ProcessTable>,
    pub auto_responses: AutoResponses,
    pub tools: Arc<ToolMap>,
}

/// Adapts a dispatch caller's [`RunCallbacks`] into the [`EventSink`]
/// consumed by [`HostSdk`] and the embedded script hosts, so both the
/// external-process path and the script/built-in paths deliver events
/// through the same caller-supplied sink.
struct CallbackSink(Arc<dyn RunCallbacks>);

#[async_trait]
impl EventSink for CallbackSink {
    async fn emit(&self, event: Event) {
        self.0.on_event(event).await;
    }

    async fn read_line(&self, _message: &str) -> String {
        self.0.provide_stdin().await.unwrap_or_default()
    }
}

/// Run one operation. Returns `Ok(true)` iff it completed successfully;
/// policy/dispatch errors that spec.md §7 treats as hard failures (unknown
/// module, unknown script type) are returned as `Err`, while a script
/// raising or a built-in action failing is folded into `Ok(false)` per
/// spec.md §4.9 step 2's per-branch completion contracts.
pub async fn run(
    module_name: &str,
    modules: &HashMap<String, ModuleDescriptor>,
    engine_cfg: &EngineConfig,
    operation: &Operation,
    answers: &Answers,
    runtime: &EngineRuntime,
    callbacks: Arc<dyn RunCallbacks>,
    cancel: CancelToken,
) -> Result<bool> {
    let module = modules
        .get(module_name)
        .ok_or_else(|| Error::UnknownModule(module_name.to_string()))?;

    let argv = command::build(module_name, modules, engine_cfg, operation, answers)?;
    if argv.is_empty() {
        return Ok(true);
    }

    let marker = argv[0].as_str();
    let sdk = Arc::new(HostSdk::new(
        Arc::new(CallbackSink(callbacks.clone())),
        runtime.exec_policy.clone(),
        runtime.path_policy.clone(),
        runtime.processes.clone(),
        runtime.auto_responses.clone(),
    ));

    match marker {
        command::MARKER_LUA => run_lua(module, &argv, sdk, runtime.tools.clone()).await,
        command::MARKER_JS => run_js(module, &argv, sdk, runtime.tools.clone()).await,
        command::MARKER_BMS => run_bms(module, engine_cfg, operation, answers, &argv, sdk).await,
        command::MARKER_ENGINE => run_engine_action(module, engine_cfg, operation, answers, &argv, sdk).await,
        _ => run_external(marker, &argv, runtime, callbacks, cancel).await,
    }
}

fn script_path(module: &ModuleDescriptor, resolved_script: &str) -> PathBuf {
    let path = Path::new(resolved_script);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        module.root.join(path)
    }
}

async fn run_lua(module: &ModuleDescriptor, argv: &[String], sdk: Arc<HostSdk>, tools: Arc<ToolMap>) -> Result<bool> {
    let path = script_path(module, &argv[1]);
    let ctx = ScriptContext {
        argv: argv[2..].to_vec(),
        sdk,
        tools,
    };
    script::lua::run(&path, ctx).await
}

async fn run_js(module: &ModuleDescriptor, argv: &[String], sdk: Arc<HostSdk>, tools: Arc<ToolMap>) -> Result<bool> {
    let path = script_path(module, &argv[1]);
    let ctx = ScriptContext {
        argv: argv[2..].to_vec(),
        sdk,
        tools,
    };
    script::js::run(&path, ctx).await
}

/// Resolve an operation's unknown-key bag against its placeholder context,
/// for use as a built-in action's named arguments (spec.md §4.9: the `bms`
/// and `engine` branches synthesize their arguments "from `args`" — here
/// `operation.extra`, since named keys land there rather than in the
/// positional `args` list used by external-process operations).
fn resolve_action_args(
    module: &ModuleDescriptor,
    engine_cfg: &EngineConfig,
    operation: &Operation,
    answers: &Answers,
    resolved_script: &str,
) -> Map<String, Value> {
    let ctx = command::build_context(module, engine_cfg, operation, answers);
    let resolved = resolve(&Value::Object(operation.extra.clone()), &ctx);
    let mut args = match resolved {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    args.insert("script".to_string(), Value::String(resolved_script.to_string()));
    args
}

async fn run_bms(
    module: &ModuleDescriptor,
    engine_cfg: &EngineConfig,
    operation: &Operation,
    answers: &Answers,
    argv: &[String],
    sdk: Arc<HostSdk>,
) -> Result<bool> {
    let args = resolve_action_args(module, engine_cfg, operation, answers, &argv[1]);
    let request = ActionRequest {
        args,
        module_root: module.root.clone(),
        project_root: engine_cfg.project_root.clone(),
    };
    builtin::run(Action::FormatExtract, request, sdk).await
}

async fn run_engine_action(
    module: &ModuleDescriptor,
    engine_cfg: &EngineConfig,
    operation: &Operation,
    answers: &Answers,
    argv: &[String],
    sdk: Arc<HostSdk>,
) -> Result<bool> {
    let action_name = &argv[1];
    let Some(action) = Action::parse(action_name) else {
        sdk.error(&format!("unknown engine action '{action_name}'")).await;
        return Ok(false);
    };

    let args = resolve_action_args(module, engine_cfg, operation, answers, action_name);
    let request = ActionRequest {
        args,
        module_root: module.root.clone(),
        project_root: engine_cfg.project_root.clone(),
    };
    builtin::run(action, request, sdk).await
}

/// Reshape the builder's marker-prefixed argv into a real executable
/// invocation: drop the marker, and for the legacy `.py` path prepend the
/// resolved `python3` interpreter ahead of the script file (spec.md §4.5
/// step 3 / §4.9's "otherwise" branch).
async fn run_external(
    marker: &str,
    argv: &[String],
    runtime: &EngineRuntime,
    callbacks: Arc<dyn RunCallbacks>,
    cancel: CancelToken,
) -> Result<bool> {
    let reshaped = if marker == command::MARKER_PYTHON_LEGACY {
        let mut out = vec![runtime.tools.resolve(command::MARKER_PYTHON_LEGACY)];
        out.extend_from_slice(&argv[1..]);
        out
    } else {
        let mut out = argv[1..].to_vec();
        if let Some(exe) = out.first_mut() {
            *exe = runtime.tools.resolve(exe);
        }
        out
    };

    let mut opts = RunOptions::new("operation");
    opts.cancel = cancel;
    Ok(process::run(&reshaped, opts, callbacks, &runtime.exec_policy).await)
}
