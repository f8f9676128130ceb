//! Command builder (spec.md §4.5): turns an [`Operation`] plus prompt
//! answers into a concrete argv.

use std::collections::HashMap;

use remake_core::placeholder::{merge_contexts, resolve};
use remake_core::{ModuleDescriptor, Operation, PromptType};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::{Error, Result};

/// Prompt answers: `name → value` (bool / string / sequence-of-string),
/// spec.md §6.
pub type Answers = HashMap<String, Value>;

/// Marker returned in place of a real executable for script-hosted and
/// built-in operations; the dispatcher (§4.9) switches on this rather than
/// spawning a process.
pub const MARKER_LUA: &str = "lua";
pub const MARKER_JS: &str = "js";
pub const MARKER_ENGINE: &str = "engine";
pub const MARKER_BMS: &str = "bms";

/// Compose the placeholder context for `operation` within `module`, per
/// spec.md §3's precedence (highest wins): operation answers → operation
/// descriptor fields → module config overlay → engine config →
/// module-derived built-ins → project-derived built-ins.
#[must_use]
pub fn build_context(
    module: &ModuleDescriptor,
    engine_cfg: &EngineConfig,
    operation: &Operation,
    answers: &Answers,
) -> Value {
    let project_builtins = Value::Object(Map::from_iter([(
        "Project_Root".to_string(),
        Value::String(engine_cfg.project_root.display().to_string()),
    )]));

    let module_builtins = Value::Object(Map::from_iter([
        (
            "Game_Root".to_string(),
            Value::String(module.root.display().to_string()),
        ),
        (
            "Game".to_string(),
            Value::Object(Map::from_iter([(
                "RootPath".to_string(),
                Value::String(module.root.display().to_string()),
            )])),
        ),
    ]));

    let module_overlay = load_module_config_overlay(module);

    let operation_fields = operation_fields_as_value(operation);

    let answers_value = Value::Object(answers.iter().map(|(k, v)| (k.clone(), v.clone())).collect());

    merge_contexts(&[
        &answers_value,
        &operation_fields,
        &module_overlay,
        &engine_cfg.overlay,
        &module_builtins,
        &project_builtins,
    ])
}

fn load_module_config_overlay(module: &ModuleDescriptor) -> Value {
    let path = module.root.join("config.toml");
    let Ok(text) = std::fs::read_to_string(&path) else {
        return Value::Object(Map::new());
    };
    toml::from_str::<toml::Value>(&text)
        .ok()
        .and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or_else(|| Value::Object(Map::new()))
}

fn operation_fields_as_value(operation: &Operation) -> Value {
    serde_json::to_value(operation).unwrap_or_else(|_| Value::Object(Map::new()))
}

pub const MARKER_DEFAULT_EXTERNAL: &str = "default-external";
pub const MARKER_PYTHON_LEGACY: &str = "python3";

/// Select the exe marker for `operation`'s effective `script_type`.
///
/// Resolved per the Open Question decision recorded in DESIGN.md: an
/// absent `script_type` is an error except the legacy `.py` heuristic
/// (spec.md §4.5 step 3).
///
/// # Errors
///
/// `Error::UnknownScriptType` when `script_type` is absent and `script`
/// does not end in `.py`.
pub fn exe_marker(operation: &Operation) -> Result<String> {
    use remake_core::ScriptType;

    match operation.script_type {
        Some(ScriptType::Lua) => Ok(MARKER_LUA.to_string()),
        Some(ScriptType::Js) => Ok(MARKER_JS.to_string()),
        Some(ScriptType::Engine) => Ok(MARKER_ENGINE.to_string()),
        Some(ScriptType::Bms) => Ok(MARKER_BMS.to_string()),
        Some(ScriptType::DefaultExternal) => Ok(MARKER_DEFAULT_EXTERNAL.to_string()),
        None if operation
            .script
            .as_deref()
            .is_some_and(|s| s.to_ascii_lowercase().ends_with(".py")) =>
        {
            Ok(MARKER_PYTHON_LEGACY.to_string())
        }
        None => Err(Error::UnknownScriptType(if operation.name.is_empty() {
            "<unnamed>".to_string()
        } else {
            operation.name.clone()
        })),
    }
}

/// Build the argv for `operation` in `module_name`.
///
/// # Errors
///
/// `Error::UnknownModule` if `module_name` is not in `modules`;
/// `Error::NoModuleLoaded` if `modules` is empty.
pub fn build(
    module_name: &str,
    modules: &HashMap<String, ModuleDescriptor>,
    engine_cfg: &EngineConfig,
    operation: &Operation,
    answers: &Answers,
) -> Result<Vec<String>> {
    if modules.is_empty() {
        return Err(Error::NoModuleLoaded);
    }
    let module = modules
        .get(module_name)
        .ok_or_else(|| Error::UnknownModule(module_name.to_string()))?;

    let raw_script = operation.script.clone().unwrap_or_default();
    if raw_script.is_empty() {
        return Ok(Vec::new());
    }

    let ctx = build_context(module, engine_cfg, operation, answers);
    let exe = exe_marker(operation)?;

    let script = stringify(&resolve(&Value::String(raw_script), &ctx));
    let args: Vec<String> = operation
        .args
        .iter()
        .map(|a| stringify(&resolve(a, &ctx)))
        .collect();

    let mut argv = vec![exe, script];
    argv.extend(args);
    argv.extend(prompt_args(operation, answers));

    Ok(argv)
}

/// Apply the prompt-to-CLI mapping in declaration order (spec.md §4.5 step 5).
fn prompt_args(operation: &Operation, answers: &Answers) -> Vec<String> {
    let mut out = Vec::new();

    for prompt in &operation.prompts {
        if let Some(cond) = &prompt.condition {
            let gate_truthy = answers.get(cond).is_some_and(is_truthy);
            if !gate_truthy {
                continue;
            }
        }

        let effective = answers.get(&prompt.name).cloned().or_else(|| prompt.default.clone());

        match prompt.prompt_type {
            PromptType::Confirm => {
                if effective.as_ref().is_some_and(is_truthy) {
                    if let Some(flag) = &prompt.cli_arg {
                        out.push(flag.clone());
                    }
                }
            }
            PromptType::Text => {
                if let Some(Value::String(s)) = &effective {
                    if !s.is_empty() {
                        if let Some(flag) = prompt.cli_arg_prefix.as_ref().or(prompt.cli_arg.as_ref()) {
                            out.push(flag.clone());
                            out.push(s.clone());
                        } else {
                            out.push(s.clone());
                        }
                    }
                }
            }
            PromptType::Checkbox => {
                if let Some(Value::Array(items)) = &effective {
                    if !items.is_empty() {
                        if let Some(prefix) = &prompt.cli_prefix {
                            out.push(prefix.clone());
                        }
                        for item in items {
                            out.push(stringify(item));
                        }
                    }
                }
            }
        }
    }

    out
}

fn is_truthy(v: &Value) -> bool {
    match v {
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::Array(a) => !a.is_empty(),
        Value::Null => false,
        Value::Object(o) => !o.is_empty(),
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remake_core::ModuleState;
    use serde_json::json;
    use std::path::PathBuf;

    fn module() -> ModuleDescriptor {
        ModuleDescriptor {
            name: "Mod1".to_string(),
            root: PathBuf::from("/games/mod1"),
            ops_file: None,
            exe: None,
            title: None,
            state: ModuleState::Installed,
        }
    }

    fn op_from(value: Value) -> Operation {
        Operation::from_value(&value, "test.json").unwrap()
    }

    #[test]
    fn unknown_module_fails() {
        let modules = HashMap::from([("Other".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({"script": "x"}));
        let err = build("Mod1", &modules, &cfg, &op, &Answers::new()).unwrap_err();
        assert!(matches!(err, Error::UnknownModule(_)));
    }

    #[test]
    fn empty_modules_is_no_module_loaded() {
        let cfg = EngineConfig::default();
        let op = op_from(json!({"script": "x"}));
        let err = build("Mod1", &HashMap::new(), &cfg, &op, &Answers::new()).unwrap_err();
        assert!(matches!(err, Error::NoModuleLoaded));
    }

    #[test]
    fn empty_script_is_no_op() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({"script": ""}));
        let argv = build("Mod1", &modules, &cfg, &op, &Answers::new()).unwrap();
        assert!(argv.is_empty());
    }

    #[test]
    fn default_external_resolves_script_and_args_with_placeholders() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({
            "script": "tool.exe",
            "script_type": "default",
            "args": ["--root", "{{Game_Root}}"],
        }));
        let argv = build("Mod1", &modules, &cfg, &op, &Answers::new()).unwrap();
        assert_eq!(argv, vec!["default-external", "tool.exe", "--root", "/games/mod1"]);
    }

    #[test]
    fn confirm_prompt_appends_flag_when_truthy() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({
            "script": "tool.exe",
            "script_type": "default",
            "prompts": [{"Name": "Verbose", "type": "confirm", "cli_arg": "--verbose"}],
        }));
        let answers = Answers::from([("Verbose".to_string(), json!(true))]);
        let argv = build("Mod1", &modules, &cfg, &op, &answers).unwrap();
        assert_eq!(argv, vec!["default-external", "tool.exe", "--verbose"]);
    }

    #[test]
    fn text_prompt_uses_prefix_as_separate_flag_token() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({
            "script": "tool.exe",
            "script_type": "default",
            "prompts": [{"Name": "Out", "type": "text", "cli_arg_prefix": "--out"}],
        }));
        let answers = Answers::from([("Out".to_string(), json!("result.png"))]);
        let argv = build("Mod1", &modules, &cfg, &op, &answers).unwrap();
        assert_eq!(argv, vec!["default-external", "tool.exe", "--out", "result.png"]);
    }

    #[test]
    fn checkbox_prompt_expands_each_selection_in_order() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({
            "script": "tool.exe",
            "script_type": "default",
            "prompts": [{"Name": "Flags", "type": "checkbox", "cli_prefix": "--mods"}],
        }));
        let answers = Answers::from([("Flags".to_string(), json!(["a", "b"]))]);
        let argv = build("Mod1", &modules, &cfg, &op, &answers).unwrap();
        assert_eq!(
            argv,
            vec!["default-external", "tool.exe", "--mods", "a", "b"]
        );
    }

    #[test]
    fn conditional_prompt_is_skipped_when_gate_is_falsy() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({
            "script": "tool.exe",
            "script_type": "default",
            "prompts": [
                {"Name": "Advanced", "type": "confirm", "cli_arg": "--adv"},
                {"Name": "Level", "type": "text", "condition": "Advanced", "cli_arg_prefix": "--level"}
            ],
        }));
        let answers = Answers::from([("Level".to_string(), json!("5"))]);
        let argv = build("Mod1", &modules, &cfg, &op, &answers).unwrap();
        assert_eq!(argv, vec!["default-external", "tool.exe"]);
    }

    #[test]
    fn absent_answer_falls_back_to_default() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({
            "script": "tool.exe",
            "script_type": "default",
            "prompts": [{"Name": "Mode", "type": "text", "cli_arg_prefix": "--mode", "default": "fast"}],
        }));
        let argv = build("Mod1", &modules, &cfg, &op, &Answers::new()).unwrap();
        assert_eq!(argv, vec!["default-external", "tool.exe", "--mode", "fast"]);
    }

    #[test]
    fn lua_script_type_uses_lua_marker() {
        let modules = HashMap::from([("Mod1".to_string(), module())]);
        let cfg = EngineConfig::default();
        let op = op_from(json!({"script": "install.lua", "script_type": "lua"}));
        let argv = build("Mod1", &modules, &cfg, &op, &Answers::new()).unwrap();
        assert_eq!(argv[0], "lua");
    }

    #[test]
    fn legacy_py_script_without_script_type_uses_python3() {
        let op = op_from(json!({"script": "legacy.py"}));
        assert_eq!(exe_marker(&op).unwrap(), "python3");
    }

    #[test]
    fn missing_script_type_non_py_is_unknown_script_type_error() {
        let op = op_from(json!({"script": "tool.exe"}));
        assert!(matches!(exe_marker(&op), Err(Error::UnknownScriptType(_))));
    }
}
