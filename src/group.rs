//! Group/sequence runner (spec.md §4.10) and the `onsuccess` child-operation
//! chaining described in SPEC_FULL.md §3's data-model supplement.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use remake_core::{ModuleDescriptor, Operation};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::command::Answers;
use crate::config::EngineConfig;
use crate::dispatcher::{self, EngineRuntime};
use crate::process::RunCallbacks;
use crate::{Error, Result};

/// Dependency DAG over an operation group's `id`s (spec.md §4.10). Exposed
/// as layers (operations whose dependencies are all in earlier layers) so a
/// future scheduler can run a layer's operations concurrently without
/// changing this type; v1 flattens the layers and executes sequentially
/// (Open Question decision, recorded in DESIGN.md).
pub struct Graph {
    /// Declaration-order indices, grouped into dependency layers.
    pub layers: Vec<Vec<usize>>,
}

impl Graph {
    /// Build the dependency graph for `operations`. Rejects cycles and
    /// references to ids absent from the group, both surfaced as
    /// `Error::InvalidDependency` (spec.md §4.10 names cycles explicitly;
    /// an unresolved `depends-on` id is treated the same way since both
    /// leave the DAG impossible to schedule).
    pub fn build(operations: &[Operation]) -> Result<Self> {
        let id_to_index: HashMap<i64, usize> = operations
            .iter()
            .enumerate()
            .filter_map(|(i, op)| op.id.map(|id| (id, i)))
            .collect();

        let mut indegree = vec![0usize; operations.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); operations.len()];

        for (i, op) in operations.iter().enumerate() {
            for dep_id in &op.depends_on {
                let &dep_index = id_to_index.get(dep_id).ok_or_else(|| {
                    Error::InvalidDependency(format!("operation '{}' depends on unknown id {dep_id}", op.name))
                })?;
                dependents[dep_index].push(i);
                indegree[i] += 1;
            }
        }

        let mut layers = Vec::new();
        let mut remaining = indegree.clone();
        let mut scheduled = vec![false; operations.len()];
        let mut scheduled_count = 0;

        while scheduled_count < operations.len() {
            let ready: Vec<usize> = (0..operations.len())
                .filter(|&i| !scheduled[i] && remaining[i] == 0)
                .collect();
            if ready.is_empty() {
                return Err(Error::InvalidDependency("cycle detected among depends-on edges".to_string()));
            }
            for &i in &ready {
                scheduled[i] = true;
                scheduled_count += 1;
                for &dependent in &dependents[i] {
                    remaining[dependent] -= 1;
                }
            }
            layers.push(ready);
        }

        Ok(Self { layers })
    }

    /// Flatten layers into one topological order, declaration-order
    /// tie-break already satisfied since each layer is built from an
    /// ascending-index scan.
    #[must_use]
    pub fn order(&self) -> Vec<usize> {
        self.layers.iter().flatten().copied().collect()
    }
}

/// Run `operations` (one manifest group) as a unit.
///
/// # Errors
///
/// `Error::UnknownModule` if `module_name` is absent from `modules`;
/// `Error::InvalidDependency` if the group's `depends-on` edges form a cycle
/// or reference an unknown id.
pub async fn run_group(
    module_name: &str,
    modules: &HashMap<String, ModuleDescriptor>,
    engine_cfg: &EngineConfig,
    operations: &[Operation],
    answers: &Answers,
    runtime: &EngineRuntime,
    callbacks: Arc<dyn RunCallbacks>,
    cancel: CancelToken,
) -> Result<bool> {
    if !modules.contains_key(module_name) {
        return Err(Error::UnknownModule(module_name.to_string()));
    }

    let order = if operations.iter().any(|op| !op.depends_on.is_empty()) {
        Graph::build(operations)?.order()
    } else {
        (0..operations.len()).collect()
    };

    let id_to_index: HashMap<i64, usize> = operations
        .iter()
        .enumerate()
        .filter_map(|(i, op)| op.id.map(|id| (id, i)))
        .collect();

    let mut failed_or_skipped: HashSet<usize> = HashSet::new();
    let mut overall = true;

    for index in order {
        let op = &operations[index];

        let blocked = op.depends_on.iter().any(|dep_id| {
            id_to_index
                .get(dep_id)
                .is_some_and(|&dep_index| failed_or_skipped.contains(&dep_index))
        });

        if blocked {
            failed_or_skipped.insert(index);
            overall = false;
            warn!(operation = %op.name, "skipped: upstream dependency failed");
            continue;
        }

        if cancel.is_cancelled() {
            failed_or_skipped.insert(index);
            overall = false;
            continue;
        }

        let ok = run_operation(
            module_name,
            modules,
            engine_cfg,
            op,
            answers,
            runtime,
            callbacks.clone(),
            cancel.clone(),
        )
        .await?;

        if !ok {
            failed_or_skipped.insert(index);
        }
        overall &= ok;
    }

    Ok(overall)
}

/// Run a single operation, then best-effort run its `onsuccess` children if
/// it succeeded. Child failures are logged and do not change the parent's
/// result (SPEC_FULL.md §3 supplement).
pub async fn run_operation(
    module_name: &str,
    modules: &HashMap<String, ModuleDescriptor>,
    engine_cfg: &EngineConfig,
    operation: &Operation,
    answers: &Answers,
    runtime: &EngineRuntime,
    callbacks: Arc<dyn RunCallbacks>,
    cancel: CancelToken,
) -> Result<bool> {
    let ok = dispatcher::run(
        module_name,
        modules,
        engine_cfg,
        operation,
        answers,
        runtime,
        callbacks.clone(),
        cancel.clone(),
    )
    .await?;

    if ok {
        let mut queue: VecDeque<&Operation> = operation.onsuccess.iter().collect();
        while let Some(child) = queue.pop_front() {
            match dispatcher::run(
                module_name,
                modules,
                engine_cfg,
                child,
                answers,
                runtime,
                callbacks.clone(),
                cancel.clone(),
            )
            .await
            {
                Ok(true) => queue.extend(child.onsuccess.iter()),
                Ok(false) => warn!(operation = %child.name, "onsuccess child failed"),
                Err(e) => warn!(operation = %child.name, error = %e, "onsuccess child errored"),
            }
        }
    }

    Ok(ok)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Stream};
    use crate::policy::{ExecPolicy, PathPolicy};
    use crate::process::ProcessTable;
    use crate::sdk::AutoResponses;
    use crate::tool_resolver::ToolMap;
    use async_trait::async_trait;
    use remake_core::ModuleState;
    use serde_json::json;
    use std::path::PathBuf;

    struct Recorder;

    #[async_trait]
    impl RunCallbacks for Recorder {
        async fn on_output(&self, _line: &str, _stream: Stream) {}
        async fn on_event(&self, _event: Event) {}
    }

    fn module() -> ModuleDescriptor {
        ModuleDescriptor {
            name: "Mod1".to_string(),
            root: PathBuf::from("/tmp/mod1"),
            ops_file: None,
            exe: None,
            title: None,
            state: ModuleState::Installed,
        }
    }

    fn runtime() -> EngineRuntime {
        EngineRuntime {
            exec_policy: Arc::new(ExecPolicy::default()),
            path_policy: Arc::new(PathPolicy::new(PathBuf::from("/tmp/mod1"), vec![])),
            processes: Arc::new(ProcessTable::new()),
            auto_responses: AutoResponses::new(),
            tools: Arc::new(ToolMap::default()),
        }
    }

    fn op(id: i64, depends_on: Vec<i64>) -> Operation {
        Operation::from_value(
            &json!({"id": id, "script": "", "depends-on": depends_on}),
            "t.json",
        )
        .unwrap()
    }

    #[test]
    fn graph_orders_dependents_after_dependencies() {
        let ops = vec![op(1, vec![2]), op(2, vec![])];
        let order = Graph::build(&ops).unwrap().order();
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn graph_rejects_cycles() {
        let ops = vec![op(1, vec![2]), op(2, vec![1])];
        assert!(matches!(Graph::build(&ops), Err(Error::InvalidDependency(_))));
    }

    #[test]
    fn graph_rejects_unknown_dependency_id() {
        let ops = vec![op(1, vec![99])];
        assert!(matches!(Graph::build(&ops), Err(Error::InvalidDependency(_))));
    }

    #[test]
    fn graph_ties_break_by_declaration_order() {
        let ops = vec![op(1, vec![]), op(2, vec![]), op(3, vec![1, 2])];
        let order = Graph::build(&ops).unwrap().order();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn empty_script_operations_all_run_as_no_ops() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let ops = vec![op(1, vec![]), op(2, vec![1])];
        let rt = runtime();
        let ok = run_group(
            "Mod1",
            &modules,
            &cfg,
            &ops,
            &Answers::new(),
            &rt,
            Arc::new(Recorder),
            CancelToken::never(),
        )
        .await
        .unwrap();
        assert!(ok);
    }

    #[tokio::test]
    async fn unknown_module_is_rejected() {
        let modules = HashMap::new();
        let cfg = EngineConfig::default();
        let ops = vec![op(1, vec![])];
        let rt = runtime();
        let err = run_group(
            "Mod1",
            &modules,
            &cfg,
            &ops,
            &Answers::new(),
            &rt,
            Arc::new(Recorder),
            CancelToken::never(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UnknownModule(_)));
    }

    #[tokio::test]
    async fn dependent_of_disallowed_executable_is_skipped() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let failing = Operation::from_value(
            &json!({"id": 1, "script": "rsync", "script_type": "default"}),
            "t.json",
        )
        .unwrap();
        let dependent = op(2, vec![1]);
        let ops = vec![failing, dependent];
        let rt = runtime();
        let ok = run_group(
            "Mod1",
            &modules,
            &cfg,
            &ops,
            &Answers::new(),
            &rt,
            Arc::new(Recorder),
            CancelToken::never(),
        )
        .await
        .unwrap();
        assert!(!ok);
    }
}
