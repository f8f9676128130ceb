//! TOML/JSON read-write helpers exposed to embedded scripts (spec.md §4.8).

use std::path::Path;

use serde_json::Value;

use super::fs::authorize;
use super::EventSink;
use crate::policy::PathPolicy;
use crate::{Error, Result};

pub async fn read_json(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<Value> {
    authorize(policy, sink, path).await?;
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| Error::ActionError(format!("invalid JSON in '{}': {e}", path.display())))
}

pub async fn write_json(policy: &PathPolicy, sink: &dyn EventSink, path: &Path, value: &Value) -> Result<()> {
    authorize(policy, sink, path).await?;
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| Error::ActionError(format!("failed to serialize JSON: {e}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

pub async fn read_toml(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<Value> {
    authorize(policy, sink, path).await?;
    let text = std::fs::read_to_string(path)?;
    let parsed: toml::Value =
        toml::from_str(&text).map_err(|e| Error::ActionError(format!("invalid TOML in '{}': {e}", path.display())))?;
    serde_json::to_value(parsed).map_err(|e| Error::ActionError(format!("TOML to JSON conversion failed: {e}")))
}

pub async fn write_toml(policy: &PathPolicy, sink: &dyn EventSink, path: &Path, value: &Value) -> Result<()> {
    authorize(policy, sink, path).await?;
    let as_toml: toml::Value = serde_json::from_value(value.clone())
        .map_err(|e| Error::ActionError(format!("JSON to TOML conversion failed: {e}")))?;
    let text =
        toml::to_string_pretty(&as_toml).map_err(|e| Error::ActionError(format!("failed to serialize TOML: {e}")))?;
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::PathPolicy;
    use crate::sdk::NullSink;
    use serde_json::json;

    #[tokio::test]
    async fn json_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), vec![]);
        let sink = NullSink;
        let path = dir.path().join("data.json");

        let value = json!({"name": "G1", "count": 3});
        write_json(&policy, &sink, &path, &value).await.unwrap();
        let read_back = read_json(&policy, &sink, &path).await.unwrap();
        assert_eq!(read_back, value);
    }

    #[tokio::test]
    async fn toml_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), vec![]);
        let sink = NullSink;
        let path = dir.path().join("data.toml");

        let value = json!({"name": "G1", "count": 3});
        write_toml(&policy, &sink, &path, &value).await.unwrap();
        let read_back = read_toml(&policy, &sink, &path).await.unwrap();
        assert_eq!(read_back, value);
    }

    #[tokio::test]
    async fn malformed_toml_is_an_action_error() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), vec![]);
        let sink = NullSink;
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not = [valid").unwrap();

        let err = read_toml(&policy, &sink, &path).await.unwrap_err();
        assert!(matches!(err, Error::ActionError(_)));
    }
}
