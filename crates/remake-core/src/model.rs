//! Operation / Prompt / Module descriptor data model (spec.md §3).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// How an operation's `script` is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptType {
    /// Run inside the embedded Lua host.
    Lua,
    /// Run inside the embedded JS host.
    Js,
    /// Resolve to a named built-in action (`engine::Action`).
    Engine,
    /// Run through the built-in archive-extractor action.
    Bms,
    /// Spawn an external process. Carries the legacy `.py` heuristic as a
    /// distinct variant so the command builder can special-case it without
    /// re-deriving the extension at build time.
    DefaultExternal,
}

impl ScriptType {
    /// Parse a manifest's `script_type` string. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lua" => Some(Self::Lua),
            "js" | "javascript" => Some(Self::Js),
            "engine" => Some(Self::Engine),
            "bms" => Some(Self::Bms),
            "default" | "default-external" | "default_external" => Some(Self::DefaultExternal),
            _ => None,
        }
    }
}

/// A prompt's answer-collection widget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptType {
    /// Yes/no question.
    Confirm,
    /// Free-text input.
    Text,
    /// Multi-select from `choices`.
    Checkbox,
}

impl PromptType {
    /// Parse a manifest's `type` string. Case-insensitive.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "confirm" => Some(Self::Confirm),
            "text" => Some(Self::Text),
            "checkbox" => Some(Self::Checkbox),
            _ => None,
        }
    }
}

/// A single interactive prompt attached to an operation (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    /// Unique (within the operation) prompt name.
    pub name: String,
    /// Widget kind.
    #[serde(rename = "type")]
    pub prompt_type: PromptType,
    /// Display text shown to the user.
    pub message: Option<String>,
    /// Fallback value used when no answer is supplied.
    pub default: Option<Value>,
    /// Candidate values for `checkbox` prompts.
    pub choices: Option<Vec<Value>>,
    /// Name of another prompt whose truthy answer gates this one.
    pub condition: Option<String>,
    /// Whether an answer must be supplied (advisory; not enforced by the core).
    pub required: Option<bool>,
    /// Free-form validation hint consumed by front-ends.
    pub validation: Option<String>,
    /// `confirm`/`text` CLI flag emitted verbatim when truthy/non-empty.
    pub cli_arg: Option<String>,
    /// `text` CLI flag prefix; value is appended as the next argv element.
    pub cli_arg_prefix: Option<String>,
    /// `checkbox` CLI flag prefix; each selected value becomes its own argv element.
    pub cli_prefix: Option<String>,
}

impl Prompt {
    /// Parse a `Prompt` from a generic JSON object, case/hyphen-insensitively,
    /// preserving the spec's open-key rule for everything this type doesn't
    /// recognize would be meaningless for prompts (they have no `extra` bag
    /// in the spec), so unrecognized keys are simply ignored here.
    pub fn from_value(v: &Value, manifest_path: &str) -> Result<Self> {
        let obj = v.as_object().ok_or_else(|| CoreError::Parse {
            path: manifest_path.to_string(),
            reason: "prompt entry is not an object".to_string(),
        })?;

        let name = ci_get(obj, "name")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Parse {
                path: manifest_path.to_string(),
                reason: "prompt missing required `Name`".to_string(),
            })?
            .to_string();

        let type_str = ci_get(obj, "type")
            .and_then(Value::as_str)
            .ok_or_else(|| CoreError::Parse {
                path: manifest_path.to_string(),
                reason: format!("prompt '{name}' missing required `type`"),
            })?;
        let prompt_type = PromptType::parse(type_str).ok_or_else(|| CoreError::Parse {
            path: manifest_path.to_string(),
            reason: format!("prompt '{name}' has unknown type '{type_str}'"),
        })?;

        Ok(Self {
            name,
            prompt_type,
            message: ci_get(obj, "message").and_then(Value::as_str).map(String::from),
            default: ci_get(obj, "default").cloned(),
            choices: ci_get(obj, "choices")
                .and_then(Value::as_array)
                .map(|a| a.clone()),
            condition: ci_get(obj, "condition").and_then(Value::as_str).map(String::from),
            required: ci_get(obj, "required").and_then(Value::as_bool),
            validation: ci_get(obj, "validation").and_then(Value::as_str).map(String::from),
            cli_arg: ci_get(obj, "cli_arg").and_then(Value::as_str).map(String::from),
            cli_arg_prefix: ci_get(obj, "cli_arg_prefix").and_then(Value::as_str).map(String::from),
            cli_prefix: ci_get(obj, "cli_prefix").and_then(Value::as_str).map(String::from),
        })
    }
}

/// A named, executable unit inside a module (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    /// Optional stable id, used by `depends-on`.
    pub id: Option<i64>,
    /// Display name; unique within its group.
    pub name: String,
    /// Path or logical id of the script/executable to run.
    pub script: Option<String>,
    /// How `script` should be dispatched.
    pub script_type: Option<ScriptType>,
    /// Ordered static argument list (before placeholder expansion).
    #[serde(default)]
    pub args: Vec<Value>,
    /// Ordered prompts collected before running.
    #[serde(default)]
    pub prompts: Vec<Prompt>,
    /// Ids of operations in the same group that must complete first.
    #[serde(default)]
    pub depends_on: Vec<i64>,
    /// Auto-run at module init; hidden from interactive menus.
    #[serde(default)]
    pub init: bool,
    /// Included in the group's default ("run all") sequence.
    #[serde(default)]
    pub run_all: bool,
    /// Child operations run (best-effort) after this one succeeds.
    #[serde(default)]
    pub onsuccess: Vec<Operation>,
    /// Unknown manifest keys, preserved verbatim for placeholder resolution.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl Operation {
    /// Parse an `Operation` from a generic JSON object produced by the
    /// manifest loader, case/hyphen-insensitively, stashing anything
    /// unrecognized into `extra` (spec.md §3 invariant).
    pub fn from_value(v: &Value, manifest_path: &str) -> Result<Self> {
        let obj = v.as_object().ok_or_else(|| CoreError::Parse {
            path: manifest_path.to_string(),
            reason: "operation entry is not an object".to_string(),
        })?;

        const KNOWN: &[&str] = &[
            "id", "name", "script", "script_type", "args", "prompts",
            "depends_on", "init", "run_all", "onsuccess",
        ];

        let name = ci_get(obj, "name")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_default();

        let script_type = match ci_get(obj, "script_type").and_then(Value::as_str) {
            Some(s) => Some(ScriptType::parse(s).ok_or_else(|| CoreError::Parse {
                path: manifest_path.to_string(),
                reason: format!("operation '{name}' has unknown script_type '{s}'"),
            })?),
            None => None,
        };

        let args = ci_get(obj, "args")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let prompts = match ci_get(obj, "prompts").and_then(Value::as_array) {
            Some(arr) => arr
                .iter()
                .map(|p| Prompt::from_value(p, manifest_path))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let depends_on = match ci_get(obj, "depends_on") {
            Some(Value::Array(arr)) => arr
                .iter()
                .filter_map(Value::as_i64)
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };

        let onsuccess = match ci_get(obj, "onsuccess").and_then(Value::as_array) {
            Some(arr) => arr
                .iter()
                .map(|o| Operation::from_value(o, manifest_path))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let mut extra = Map::new();
        for (k, val) in obj {
            let canonical = canonicalize_key(k);
            if !KNOWN.contains(&canonical.as_str()) {
                extra.insert(k.clone(), val.clone());
            }
        }

        Ok(Self {
            id: ci_get(obj, "id").and_then(Value::as_i64),
            name,
            script: ci_get(obj, "script").and_then(Value::as_str).map(String::from),
            script_type,
            args,
            prompts,
            depends_on,
            init: ci_get(obj, "init").and_then(Value::as_bool).unwrap_or(false),
            run_all: ci_get(obj, "run_all").and_then(Value::as_bool).unwrap_or(false),
            onsuccess,
            extra,
        })
    }
}

/// Normalize a manifest key for case/separator-insensitive matching:
/// lowercase, with `-` treated the same as `_`.
#[must_use]
pub fn canonicalize_key(k: &str) -> String {
    k.chars()
        .map(|c| if c == '-' { '_' } else { c.to_ascii_lowercase() })
        .collect()
}

/// Case/hyphen-insensitive lookup into a JSON object.
#[must_use]
pub fn ci_get<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    let canonical = canonicalize_key(key);
    obj.iter()
        .find(|(k, _)| canonicalize_key(k) == canonical)
        .map(|(_, v)| v)
}

/// Derived install state of a module (spec.md §3: "State is derived, not stored").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleState {
    /// Has a descriptor naming an executable that exists on disk.
    Installed,
    /// Has an ops file but no valid executable.
    Downloaded,
    /// Neither an ops file nor a valid executable.
    NotDownloaded,
}

/// A discovered module (game) directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Directory name / logical module id.
    pub name: String,
    /// Absolute path to the module's root directory.
    pub root: PathBuf,
    /// Absolute path to the module's operations manifest, if present.
    pub ops_file: Option<PathBuf>,
    /// Absolute path to the module's executable, if resolved and present.
    pub exe: Option<PathBuf>,
    /// Human-readable title from the game descriptor, if any.
    pub title: Option<String>,
    /// Derived install state.
    pub state: ModuleState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operation_preserves_unknown_keys() {
        let v = json!({
            "Name": "Extract",
            "script_type": "lua",
            "script": "extract.lua",
            "CustomThing": "value",
        });
        let op = Operation::from_value(&v, "test.json").unwrap();
        assert_eq!(op.name, "Extract");
        assert_eq!(op.script_type, Some(ScriptType::Lua));
        assert_eq!(op.extra.get("CustomThing"), Some(&json!("value")));
    }

    #[test]
    fn operation_case_insensitive_keys() {
        let v = json!({
            "NAME": "Build",
            "Script-Type": "js",
            "Depends-On": [1, 2],
        });
        let op = Operation::from_value(&v, "test.json").unwrap();
        assert_eq!(op.name, "Build");
        assert_eq!(op.script_type, Some(ScriptType::Js));
        assert_eq!(op.depends_on, vec![1, 2]);
    }

    #[test]
    fn prompt_condition_and_cli_mapping() {
        let v = json!({
            "Name": "DoIt",
            "type": "confirm",
            "cli_arg": "--go",
            "condition": "Other",
        });
        let p = Prompt::from_value(&v, "test.json").unwrap();
        assert_eq!(p.prompt_type, PromptType::Confirm);
        assert_eq!(p.cli_arg.as_deref(), Some("--go"));
        assert_eq!(p.condition.as_deref(), Some("Other"));
    }

    #[test]
    fn unknown_script_type_errors() {
        let v = json!({"Name": "X", "script_type": "python3"});
        let err = Operation::from_value(&v, "test.json").unwrap_err();
        assert!(matches!(err, CoreError::Parse { .. }));
    }
}
