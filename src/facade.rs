//! Engine facade (spec.md §4.11): the minimal surface a front-end (or the
//! developer CLI) drives. Owns the long-lived shared state — policies, the
//! tool map, the managed-process table, the auto-response table — so a
//! background process spawned by one call can be polled by a later,
//! unrelated one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use remake_core::{manifest, ModuleDescriptor, Operation};

use crate::cancel::CancelToken;
use crate::command::{self, Answers};
use crate::config::EngineConfig;
use crate::dispatcher::EngineRuntime;
use crate::group;
use crate::policy::{ExecPolicy, PathPolicy};
use crate::process::{ProcessTable, RunCallbacks};
use crate::registry;
use crate::sdk::AutoResponses;
use crate::tool_resolver::ToolMap;
use crate::Result;

/// The engine's long-lived shared state, constructed once per project.
pub struct Engine {
    config: EngineConfig,
    runtime: EngineRuntime,
}

impl Engine {
    /// Build an engine from a loaded config, resolving the tool map and
    /// constructing the policy/process/auto-response state it carries for
    /// the rest of its lifetime. Every id the tool map resolves is folded
    /// into the executable allow-list, so a `default-external` operation
    /// naming a known tool id needs no separate `extra_allowed_executables`
    /// entry.
    ///
    /// # Errors
    ///
    /// Propagates `ToolMap::load`'s error for a malformed (present but
    /// unparseable) tool map file.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let tools = ToolMap::load(&config.tool_map_abs_path())?;
        let allowed = config
            .policy
            .extra_allowed_executables
            .iter()
            .cloned()
            .chain(tools.tool_ids().map(str::to_string));
        let runtime = EngineRuntime {
            exec_policy: Arc::new(ExecPolicy::new(allowed)),
            path_policy: Arc::new(PathPolicy::new(
                config.project_root.clone(),
                config.policy.extra_allowed_roots.clone(),
            )),
            processes: Arc::new(ProcessTable::new()),
            auto_responses: AutoResponses::new(),
            tools: Arc::new(tools),
        };
        Ok(Self { config, runtime })
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// `listModules() → { name → descriptor }` (spec.md §4.11).
    ///
    /// # Errors
    ///
    /// Only if the modules root exists but cannot be read.
    pub fn list_modules(&self) -> Result<HashMap<String, ModuleDescriptor>> {
        registry::discover(&self.config.modules_root())
    }

    /// `listInstalled() → subset`.
    ///
    /// # Errors
    ///
    /// Only if the modules root exists but cannot be read.
    pub fn list_installed(&self) -> Result<HashMap<String, ModuleDescriptor>> {
        registry::discover_installed(&self.config.modules_root())
    }

    /// `loadOps(path) → grouped map`.
    ///
    /// # Errors
    ///
    /// Propagates the manifest loader's parse error.
    pub fn load_ops(&self, path: &Path) -> Result<HashMap<String, Vec<Operation>>> {
        Ok(manifest::load(path)?)
    }

    /// `loadOpsFlat(path) → list`.
    ///
    /// # Errors
    ///
    /// Propagates the manifest loader's parse error.
    pub fn load_ops_flat(&self, path: &Path) -> Result<Vec<Operation>> {
        Ok(manifest::load_flat(path)?)
    }

    /// `runSingle(module, modules, op, answers, callbacks, cancel) → bool`.
    ///
    /// Per spec.md §7's propagation policy, no error type escapes this
    /// boundary: an internal fault is reported as an `error` event through
    /// `callbacks` and folded into `false`. Callers that want the fault
    /// itself should use [`Self::run_single_checked`] instead.
    pub async fn run_single(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        operation: &Operation,
        answers: &Answers,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancelToken,
    ) -> bool {
        report_facade_result(
            self.run_single_checked(module_name, modules, operation, answers, callbacks.clone(), cancel)
                .await,
            &callbacks,
        )
        .await
    }

    /// Throwing variant of [`Self::run_single`] for callers that explicitly
    /// want the error instead of a boolean (spec.md §7: "MAY throw for
    /// developer-CLI callers that explicitly request throwing behavior").
    ///
    /// # Errors
    ///
    /// See [`crate::dispatcher::run`].
    pub async fn run_single_checked(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        operation: &Operation,
        answers: &Answers,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancelToken,
    ) -> Result<bool> {
        group::run_operation(
            module_name,
            modules,
            &self.config,
            operation,
            answers,
            &self.runtime,
            callbacks,
            cancel,
        )
        .await
    }

    /// `runGroup(module, modules, groupName, ops, answers, callbacks, cancel) → bool`.
    /// See [`Self::run_single`]'s doc comment for the error-swallowing
    /// contract this follows.
    pub async fn run_group(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        operations: &[Operation],
        answers: &Answers,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancelToken,
    ) -> bool {
        report_facade_result(
            self.run_group_checked(module_name, modules, operations, answers, callbacks.clone(), cancel)
                .await,
            &callbacks,
        )
        .await
    }

    /// Throwing variant of [`Self::run_group`].
    ///
    /// # Errors
    ///
    /// See [`crate::group::run_group`].
    pub async fn run_group_checked(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        operations: &[Operation],
        answers: &Answers,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancelToken,
    ) -> Result<bool> {
        group::run_group(
            module_name,
            modules,
            &self.config,
            operations,
            answers,
            &self.runtime,
            callbacks,
            cancel,
        )
        .await
    }

    /// `runInstall(module) → bool` (spec.md §4.10): the manifest's `run-all`
    /// group if present, else its first declared group, all prompts
    /// defaulted.
    pub async fn run_install(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancelToken,
    ) -> bool {
        report_facade_result(
            self.run_install_checked(module_name, modules, callbacks.clone(), cancel).await,
            &callbacks,
        )
        .await
    }

    /// Throwing variant of [`Self::run_install`].
    ///
    /// # Errors
    ///
    /// `Error::UnknownModule` if `module_name` isn't in `modules`, plus
    /// whatever the manifest loader or group runner surface.
    pub async fn run_install_checked(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancelToken,
    ) -> Result<bool> {
        let module = modules
            .get(module_name)
            .ok_or_else(|| crate::Error::UnknownModule(module_name.to_string()))?;
        let ops_path = module
            .ops_file
            .clone()
            .unwrap_or_else(|| module.root.join(registry::OPS_FILE_NAME));
        let groups = self.load_ops(&ops_path)?;

        let operations = groups
            .get("run-all")
            .or_else(|| groups.values().next())
            .cloned()
            .unwrap_or_default();

        let answers = default_answers(&operations);

        self.run_group_checked(module_name, modules, &operations, &answers, callbacks, cancel)
            .await
    }

    /// `buildCommand` (spec.md §4.11): developer-CLI direct command build,
    /// without dispatching. A pure query, not a run, so it throws rather
    /// than folding to a boolean.
    ///
    /// # Errors
    ///
    /// See [`crate::command::build`].
    pub fn build_command(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        operation: &Operation,
        answers: &Answers,
    ) -> Result<Vec<String>> {
        command::build(module_name, modules, &self.config, operation, answers)
    }

    /// `executeCommand` (spec.md §4.11): build and dispatch in one call.
    pub async fn execute_command(
        &self,
        module_name: &str,
        modules: &HashMap<String, ModuleDescriptor>,
        operation: &Operation,
        answers: &Answers,
        callbacks: Arc<dyn RunCallbacks>,
        cancel: CancelToken,
    ) -> bool {
        self.run_single(module_name, modules, operation, answers, callbacks, cancel)
            .await
    }
}

/// Shared tail of every boolean-default facade method: log+emit on error,
/// fold to `false`.
async fn report_facade_result(result: Result<bool>, callbacks: &Arc<dyn RunCallbacks>) -> bool {
    match result {
        Ok(ok) => ok,
        Err(e) => {
            tracing::error!(error = %e, "operation failed at the facade boundary");
            callbacks.on_event(crate::event::Event::error(e.to_string())).await;
            false
        }
    }
}

/// Every prompt across `operations` answered with its declared default
/// (spec.md §4.10 "`runInstall` ... with all prompts answered by their
/// defaults"); prompts with no default are left unanswered, matching the
/// command builder's fallback of omitting the corresponding flag.
fn default_answers(operations: &[Operation]) -> Answers {
    let mut answers = Answers::new();
    for op in operations {
        for prompt in &op.prompts {
            if let Some(default) = &prompt.default {
                answers.insert(prompt.name.clone(), default.clone());
            }
        }
    }
    answers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Stream};
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;

    struct Recorder;

    #[async_trait]
    impl RunCallbacks for Recorder {
        async fn on_output(&self, _line: &str, _stream: Stream) {}
        async fn on_event(&self, _event: Event) {}
    }

    fn engine(project_root: &Path) -> Engine {
        let mut cfg = EngineConfig::default();
        cfg.project_root = project_root.to_path_buf();
        Engine::new(cfg).unwrap()
    }

    #[test]
    fn list_modules_is_empty_for_missing_modules_dir() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(dir.path());
        assert!(e.list_modules().unwrap().is_empty());
    }

    #[test]
    fn tool_map_entries_are_approved_without_a_separate_allow_list_entry() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("tools.json"), r#"{"my-tool": "/opt/tools/my-tool"}"#).unwrap();

        let mut cfg = EngineConfig::default();
        cfg.project_root = dir.path().to_path_buf();
        let e = Engine::new(cfg).unwrap();

        assert!(e.runtime.exec_policy.is_allowed("my-tool"));
    }

    #[tokio::test]
    async fn run_install_uses_run_all_group_when_present() {
        let dir = tempfile::tempdir().unwrap();
        let module_dir = dir.path().join("modules").join("G1");
        fs::create_dir_all(&module_dir).unwrap();
        fs::write(
            module_dir.join(registry::OPS_FILE_NAME),
            r#"
            [[other]]
            Name = "ShouldNotRun"
            script = "rsync"
            script_type = "default"

            [[run-all]]
            Name = "Noop"
            script = ""
            "#,
        )
        .unwrap();

        let e = engine(dir.path());
        let modules = e.list_modules().unwrap();
        let ok = e
            .run_install("G1", &modules, Arc::new(Recorder), CancelToken::never())
            .await;
        assert!(ok);
    }

    #[test]
    fn default_answers_collects_prompt_defaults() {
        let op = Operation::from_value(
            &json!({
                "script": "",
                "prompts": [{"Name": "Mode", "type": "text", "default": "fast"}],
            }),
            "t.json",
        )
        .unwrap();
        let answers = default_answers(std::slice::from_ref(&op));
        assert_eq!(answers.get("Mode").unwrap(), "fast");
    }
}
