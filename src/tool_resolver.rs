//! Tool id → executable path resolution (spec.md §4.4).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::Result;

/// `{ tool_id → absolute_path }`, loaded once from a JSON file if present;
/// otherwise the identity mapping (spec.md §3 "Tool map").
#[derive(Debug, Clone, Default)]
pub struct ToolMap {
    entries: HashMap<String, PathBuf>,
}

impl ToolMap {
    /// Load a tool map from `path`. A missing file yields the identity
    /// mapping, not an error, mirroring [`crate::registry::discover`]'s
    /// "absent means empty" convention.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| crate::Error::Config(format!("invalid tool map {}: {e}", path.display())))?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut entries = HashMap::new();

        if let Value::Object(map) = value {
            for (tool_id, entry) in map {
                if let Some(resolved) = extract_path(&entry) {
                    let resolved = if resolved.is_absolute() {
                        resolved
                    } else {
                        base_dir.join(resolved)
                    };
                    entries.insert(tool_id, resolved);
                }
                // Unknown/unsupported entry shapes are ignored silently, per spec.md §4.4.
            }
        }

        Ok(Self { entries })
    }

    /// Resolve a tool id to a path. Unknown ids return the id unchanged, so
    /// callers can pass the result straight to the process runner and rely
    /// on `PATH` lookup.
    #[must_use]
    pub fn resolve(&self, tool_id: &str) -> String {
        self.entries
            .get(tool_id)
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| tool_id.to_string())
    }

    #[must_use]
    pub fn contains(&self, tool_id: &str) -> bool {
        self.entries.contains_key(tool_id)
    }

    /// Every tool id this map has an explicit mapping for, for folding into
    /// the executable allow-list: spec.md §4.7 approves "any value returned
    /// by the tool resolver for a known tool id" without requiring a
    /// separate, duplicate entry in the config's extra-allowed list.
    pub fn tool_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// A mapping value may be a bare string, or an object with one of `exe`,
/// `path`, `command` (first present wins).
fn extract_path(value: &Value) -> Option<PathBuf> {
    match value {
        Value::String(s) => Some(PathBuf::from(s)),
        Value::Object(obj) => ["exe", "path", "command"]
            .iter()
            .find_map(|key| obj.get(*key))
            .and_then(Value::as_str)
            .map(PathBuf::from),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_file_is_identity_mapping() {
        let map = ToolMap::load(Path::new("/no/such/tools.json")).unwrap();
        assert_eq!(map.resolve("ffmpeg"), "ffmpeg");
        assert!(!map.contains("ffmpeg"));
    }

    #[test]
    fn bare_string_entry_resolves_relative_to_map_dir() {
        let dir = tempfile::tempdir().unwrap();
        let tool_map = dir.path().join("tools.json");
        fs::write(&tool_map, r#"{"ffmpeg": "bin/ffmpeg.exe"}"#).unwrap();

        let map = ToolMap::load(&tool_map).unwrap();
        assert_eq!(map.resolve("ffmpeg"), dir.path().join("bin/ffmpeg.exe").to_string_lossy());
    }

    #[test]
    fn object_entry_prefers_exe_over_path_and_command() {
        let dir = tempfile::tempdir().unwrap();
        let tool_map = dir.path().join("tools.json");
        fs::write(
            &tool_map,
            r#"{"ffmpeg": {"path": "wrong", "exe": "right.exe", "command": "also-wrong"}}"#,
        )
        .unwrap();

        let map = ToolMap::load(&tool_map).unwrap();
        assert!(map.resolve("ffmpeg").ends_with("right.exe"));
    }

    #[test]
    fn unknown_entry_shape_is_ignored_silently() {
        let dir = tempfile::tempdir().unwrap();
        let tool_map = dir.path().join("tools.json");
        fs::write(&tool_map, r#"{"ffmpeg": 42}"#).unwrap();

        let map = ToolMap::load(&tool_map).unwrap();
        assert_eq!(map.resolve("ffmpeg"), "ffmpeg");
    }

    #[test]
    fn absolute_entry_is_not_rejoined() {
        let dir = tempfile::tempdir().unwrap();
        let tool_map = dir.path().join("tools.json");
        fs::write(&tool_map, r#"{"git": "/usr/bin/git"}"#).unwrap();

        let map = ToolMap::load(&tool_map).unwrap();
        assert_eq!(map.resolve("git"), "/usr/bin/git");
    }
}
