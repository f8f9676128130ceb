//! Built-in engine actions (spec.md §4.9 `engine` dispatch; SPEC_FULL.md
//! fixes the set as the closed enum below rather than an open string
//! registry, since the distilled spec names exactly these three and no
//! plugin mechanism is in scope).

mod bms;
mod convert;
mod download_tools;

pub use bms::extract_archive;

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::sdk::HostSdk;

/// Resolved built-in action names (spec.md §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    DownloadTools,
    FormatExtract,
    FormatConvert,
}

impl Action {
    /// Parse an `engine` operation's action name. Case-insensitive; accepts
    /// both `-` and `_` as the word separator.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "download_tools" => Some(Self::DownloadTools),
            "format_extract" => Some(Self::FormatExtract),
            "format_convert" => Some(Self::FormatConvert),
            _ => None,
        }
    }
}

/// Already-placeholder-resolved arguments for one built-in action run.
pub struct ActionRequest {
    pub args: Map<String, Value>,
    pub module_root: PathBuf,
    pub project_root: PathBuf,
}

impl ActionRequest {
    fn str_arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }

    /// A path-valued argument, resolved relative to the module root if not
    /// already absolute — the same rule the dispatcher applies to `lua`/`js`
    /// script paths, so a manifest can write `script`, `input_dir`,
    /// `dest_dir`, etc. the same way regardless of which branch dispatches
    /// the operation.
    fn path_arg(&self, key: &str) -> Option<PathBuf> {
        self.str_arg(key).map(|s| {
            let path = PathBuf::from(s);
            if path.is_absolute() {
                path
            } else {
                self.module_root.join(path)
            }
        })
    }
}

/// Dispatch a built-in `engine` action. Unknown actions are handled by the
/// caller via [`Action::parse`] returning `None`; this function only runs
/// known ones.
pub async fn run(action: Action, request: ActionRequest, sdk: Arc<HostSdk>) -> crate::Result<bool> {
    match action {
        Action::DownloadTools => download_tools::run(request, sdk).await,
        Action::FormatExtract => bms::run_as_action(request, sdk).await,
        Action::FormatConvert => convert::run(request, sdk).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_hyphen_and_underscore_and_is_case_insensitive() {
        assert_eq!(Action::parse("download_tools"), Some(Action::DownloadTools));
        assert_eq!(Action::parse("format-extract"), Some(Action::FormatExtract));
        assert_eq!(Action::parse("FORMAT_CONVERT"), Some(Action::FormatConvert));
    }

    #[test]
    fn unknown_action_name_is_none() {
        assert_eq!(Action::parse("delete_everything"), None);
    }
}
