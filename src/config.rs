//! Engine-wide configuration (spec.md §6: "Engine project configuration file").

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Top-level engine configuration, layered from a JSON file and
/// `REMAKE_` prefixed environment variables (later layers win), mirroring
/// the teacher crate's `Figment::new().merge(Json::file(...)).merge(Env::prefixed(...))`
/// pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root directory the engine was launched from; `{{Project_Root}}`.
    pub project_root: PathBuf,
    /// Directory containing module subdirectories (default: `modules`, relative
    /// to `project_root` unless absolute).
    pub modules_dir: PathBuf,
    /// Path to the tool map JSON file (spec.md §4.4), relative to `project_root`
    /// unless absolute.
    pub tool_map_path: PathBuf,
    /// Executable allow-list and path-access policy configuration.
    pub policy: PolicyConfig,
    /// Embedded script host configuration.
    pub scripting: ScriptingConfig,
    /// Free-form overlay merged into the placeholder context under its own
    /// top-level keys (spec.md §3: "engine config").
    #[serde(default)]
    pub overlay: Value,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            modules_dir: PathBuf::from("modules"),
            tool_map_path: PathBuf::from("tools.json"),
            policy: PolicyConfig::default(),
            scripting: ScriptingConfig::default(),
            overlay: Value::Object(serde_json::Map::new()),
        }
    }
}

/// Executable allow-list / path-access policy knobs (spec.md §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Extra executable names to approve, beyond the built-in default set.
    pub extra_allowed_executables: Vec<String>,
    /// Extra path roots to treat as allowed without prompting.
    pub extra_allowed_roots: Vec<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            extra_allowed_executables: Vec::new(),
            extra_allowed_roots: Vec::new(),
        }
    }
}

/// Embedded script host limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptingConfig {
    /// Maximum wall-clock time a single script invocation may run.
    #[serde(with = "humantime_seconds")]
    pub script_timeout: std::time::Duration,
}

impl Default for ScriptingConfig {
    fn default() -> Self {
        Self {
            script_timeout: std::time::Duration::from_secs(300),
        }
    }
}

mod humantime_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

impl EngineConfig {
    /// Load configuration from an optional JSON file, overlaid with
    /// `REMAKE_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `path` is given but does not exist, or the merged
    /// configuration does not deserialize into [`EngineConfig`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Json::file(p));
        }

        figment = figment.merge(Env::prefixed("REMAKE_").split("__"));

        figment.extract().map_err(|e| Error::Config(e.to_string()))
    }

    /// Absolute modules directory (resolved against `project_root`).
    #[must_use]
    pub fn modules_root(&self) -> PathBuf {
        if self.modules_dir.is_absolute() {
            self.modules_dir.clone()
        } else {
            self.project_root.join(&self.modules_dir)
        }
    }

    /// Absolute tool map path (resolved against `project_root`).
    #[must_use]
    pub fn tool_map_abs_path(&self) -> PathBuf {
        if self.tool_map_path.is_absolute() {
            self.tool_map_path.clone()
        } else {
            self.project_root.join(&self.tool_map_path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_paths() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.modules_dir, PathBuf::from("modules"));
        assert_eq!(cfg.modules_root(), PathBuf::from("./modules"));
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = EngineConfig::load(Some(Path::new("/no/such/config.json"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn absolute_tool_map_path_is_not_rejoined() {
        let mut cfg = EngineConfig::default();
        cfg.tool_map_path = PathBuf::from("/abs/tools.json");
        assert_eq!(cfg.tool_map_abs_path(), PathBuf::from("/abs/tools.json"));
    }
}
