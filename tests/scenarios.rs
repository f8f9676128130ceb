//! End-to-end scenarios from spec.md §8, driven through the public facade
//! API rather than any module's internals.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use async_trait::async_trait;
use remake_core::{ModuleDescriptor, ModuleState, Operation};
use serde_json::json;

use remake_engine::cancel::CancelToken;
use remake_engine::command::{self, Answers};
use remake_engine::config::EngineConfig;
use remake_engine::event::{Event, Stream};
use remake_engine::facade::Engine;
use remake_engine::process::RunCallbacks;
use remake_engine::registry;

struct Recorder {
    output: std::sync::Mutex<Vec<(Stream, String)>>,
    events: std::sync::Mutex<Vec<Event>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            output: std::sync::Mutex::new(Vec::new()),
            events: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RunCallbacks for Recorder {
    async fn on_output(&self, line: &str, stream: Stream) {
        self.output.lock().unwrap().push((stream, line.to_string()));
    }
    async fn on_event(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

fn module(root: std::path::PathBuf) -> ModuleDescriptor {
    ModuleDescriptor {
        name: "G1".to_string(),
        root,
        ops_file: None,
        exe: None,
        title: None,
        state: ModuleState::Installed,
    }
}

// Scenario 2: command build, prompt-to-CLI mapping.
#[test]
fn scenario_command_build_prompt_to_cli_mapping() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.project_root = dir.path().to_path_buf();
    let mods = HashMap::from([("G1".to_string(), module(std::path::PathBuf::from("/g")))]);

    let op = Operation::from_value(
        &json!({
            "script_type": "lua",
            "script": "{{Game_Root}}/run.lua",
            "args": ["--base", "{{OutputBase}}"],
            "prompts": [
                {"Name": "DoIt", "type": "confirm", "cli_arg": "--go"},
                {"Name": "Items", "type": "checkbox", "cli_prefix": "--mods"},
                {"Name": "Path", "type": "text", "cli_arg_prefix": "--path", "default": "C:/default"},
                {"Name": "Sub", "type": "text", "cli_arg": "--sub", "condition": "DoIt"}
            ],
        }),
        "ops.json",
    )
    .unwrap();

    cfg.overlay = json!({"OutputBase": "/out"});

    let answers: Answers = HashMap::from([
        ("DoIt".to_string(), json!(true)),
        ("Items".to_string(), json!(["a", "b"])),
        ("Sub".to_string(), json!("fine")),
    ]);

    let argv = command::build("G1", &mods, &cfg, &op, &answers).unwrap();
    assert_eq!(
        argv,
        vec![
            "lua", "/g/run.lua", "--base", "/out", "--go", "--mods", "a", "b", "--path", "C:/default", "--sub",
            "fine",
        ]
    );
}

// Scenario 5: group with a dependency failure skips the dependent and still
// runs the unrelated sibling; overall result is false.
#[tokio::test]
async fn scenario_group_dependency_failure_skips_dependent() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.project_root = dir.path().to_path_buf();
    let engine = Engine::new(cfg).unwrap();
    let mods = HashMap::from([("G1".to_string(), module(dir.path().to_path_buf()))]);

    let a = Operation::from_value(
        &json!({"id": 1, "script": "rsync", "script_type": "default"}),
        "ops.json",
    )
    .unwrap();
    let b = Operation::from_value(
        &json!({"id": 2, "script": "", "depends-on": [1]}),
        "ops.json",
    )
    .unwrap();
    let c = Operation::from_value(&json!({"id": 3, "script": ""}), "ops.json").unwrap();

    let recorder = Arc::new(Recorder::new());
    let ok = engine
        .run_group_checked(
            "G1",
            &mods,
            &[a, b, c],
            &Answers::new(),
            recorder,
            CancelToken::never(),
        )
        .await
        .unwrap();

    assert!(!ok);
}

// Scenario 6: installed-module discovery, excluding modules without a valid
// exe.
#[test]
fn scenario_installed_module_discovery() {
    let dir = tempfile::tempdir().unwrap();
    let modules_root = dir.path().join("modules");

    let g1 = modules_root.join("G1");
    fs::create_dir_all(g1.join("bin")).unwrap();
    fs::write(g1.join(registry::OPS_FILE_NAME), "").unwrap();
    fs::write(g1.join(registry::GAME_FILE_NAME), r#"title = "T"
exe = "bin/g.exe"
"#)
        .unwrap();
    fs::write(g1.join("bin").join("g.exe"), b"stub").unwrap();

    let g2 = modules_root.join("G2");
    fs::create_dir_all(&g2).unwrap();
    fs::write(g2.join(registry::GAME_FILE_NAME), r#"title = "Incomplete"
exe = "bin/missing.exe"
"#)
        .unwrap();

    let installed = registry::discover_installed(&modules_root).unwrap();

    assert_eq!(installed.len(), 1);
    let g1_descriptor = installed.get("G1").unwrap();
    assert_eq!(g1_descriptor.title.as_deref(), Some("T"));
    assert!(g1_descriptor.exe.as_ref().unwrap().is_absolute());
}

// Boundary: empty manifest yields empty grouped/flat results.
#[test]
fn boundary_empty_manifest_yields_empty_results() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("operations.toml");
    fs::write(&path, "").unwrap();

    let mut cfg = EngineConfig::default();
    cfg.project_root = dir.path().to_path_buf();
    let engine = Engine::new(cfg).unwrap();

    assert!(engine.load_ops(&path).unwrap().is_empty());
    assert!(engine.load_ops_flat(&path).unwrap().is_empty());
}

// Boundary: cancellation fired before the facade ever dispatches returns
// false and performs no work.
#[tokio::test]
async fn boundary_cancellation_before_run_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.project_root = dir.path().to_path_buf();
    let engine = Engine::new(cfg).unwrap();
    let mods = HashMap::from([("G1".to_string(), module(dir.path().to_path_buf()))]);

    let op = Operation::from_value(
        &json!({"script": "rsync", "script_type": "default"}),
        "ops.json",
    )
    .unwrap();

    let (source, token) = remake_engine::cancel::CancelSource::new();
    source.cancel();

    let recorder = Arc::new(Recorder::new());
    let ok = engine
        .run_single_checked("G1", &mods, &op, &Answers::new(), recorder, token)
        .await
        .unwrap();

    assert!(!ok);
}

// Facade error-propagation default: an internal fault (here, an unknown
// module name) is folded to `false` plus a reported `error` event rather
// than bubbling the error type out of `run_single`.
#[tokio::test]
async fn facade_default_run_single_folds_errors_to_false_with_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = EngineConfig::default();
    cfg.project_root = dir.path().to_path_buf();
    let engine = Engine::new(cfg).unwrap();
    let mods: HashMap<String, ModuleDescriptor> = HashMap::new();

    let op = Operation::from_value(&json!({"script": ""}), "ops.json").unwrap();

    let recorder = Arc::new(Recorder::new());
    let ok = engine
        .run_single("UnknownModule", &mods, &op, &Answers::new(), recorder.clone(), CancelToken::never())
        .await;

    assert!(!ok);
    assert!(!recorder.events.lock().unwrap().is_empty());
}
