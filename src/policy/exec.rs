//! Executable allow-list (spec.md §4.7).

use std::collections::HashSet;

/// System copy/move/archive utilities that are explicitly blocked even if
/// named in the extra-allowed list, because the host SDK provides an
/// in-process equivalent (spec.md §4.7, §4.8).
const BLOCKED: &[(&str, &str)] = &[
    ("xcopy", "sdk.copy_dir / sdk.copy_file"),
    ("robocopy", "sdk.copy_dir"),
    ("cp", "sdk.copy_file"),
    ("mv", "sdk.move_file"),
    ("rsync", "sdk.copy_dir"),
    ("tar", "sdk.archive.extract / sdk.archive.create"),
    ("zip", "sdk.archive.create"),
    ("unzip", "sdk.archive.extract"),
    ("7z", "sdk.archive.extract"),
    ("7za", "sdk.archive.extract"),
];

/// Built-in approved executables, beyond those reachable via the tool
/// resolver (spec.md §4.4) or an explicit config extension.
const DEFAULT_ALLOWED: &[&str] = &[
    "ffmpeg", "ffprobe", "convert", "magick", "git", "python3", "node",
];

/// Executable name allow-list with a fixed deny set for utilities that
/// shadow an in-process SDK equivalent.
#[derive(Debug, Clone, Default)]
pub struct ExecPolicy {
    extra_allowed: HashSet<String>,
}

impl ExecPolicy {
    #[must_use]
    pub fn new(extra_allowed: impl IntoIterator<Item = String>) -> Self {
        Self {
            extra_allowed: extra_allowed.into_iter().map(|s| normalize(&s)).collect(),
        }
    }

    /// Decide whether `exe` (as it would appear in `argv[0]`) may be
    /// spawned. `exe` may include a path and/or platform extension; only the
    /// file stem is compared, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `Err(message)` naming the SDK equivalent when `exe` matches
    /// the fixed deny set, or a generic not-approved message otherwise.
    pub fn check(&self, exe: &str) -> Result<(), String> {
        let stem = normalize(exe);

        if let Some((_, replacement)) = BLOCKED.iter().find(|(name, _)| *name == stem) {
            return Err(format!(
                "executable '{exe}' is blocked; use {replacement} instead"
            ));
        }

        if DEFAULT_ALLOWED.contains(&stem.as_str()) || self.extra_allowed.contains(&stem) {
            return Ok(());
        }

        Err(format!("executable '{exe}' is not approved"))
    }

    #[must_use]
    pub fn is_allowed(&self, exe: &str) -> bool {
        self.check(exe).is_ok()
    }
}

/// Lowercase file stem, stripping a trailing `.exe`/`.bat`/`.cmd`/`.sh`.
fn normalize(exe: &str) -> String {
    let file_name = std::path::Path::new(exe)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(exe);
    let lower = file_name.to_ascii_lowercase();
    for ext in [".exe", ".bat", ".cmd", ".sh"] {
        if let Some(stripped) = lower.strip_suffix(ext) {
            return stripped.to_string();
        }
    }
    lower
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_allowed_executable_passes() {
        let policy = ExecPolicy::default();
        assert!(policy.is_allowed("ffmpeg"));
        assert!(policy.is_allowed("FFMPEG.EXE"));
    }

    #[test]
    fn blocked_utility_names_sdk_equivalent() {
        let policy = ExecPolicy::default();
        let err = policy.check("cp").unwrap_err();
        assert!(err.contains("sdk.copy_file"));
    }

    #[test]
    fn unknown_executable_is_rejected() {
        let policy = ExecPolicy::default();
        assert!(!policy.is_allowed("totally-unknown-tool"));
    }

    #[test]
    fn extra_allowed_executable_is_recognized_with_path_and_extension() {
        let policy = ExecPolicy::new(["MyTool".to_string()]);
        assert!(policy.is_allowed(r"C:\tools\mytool.exe"));
    }

    #[test]
    fn blocked_list_takes_precedence_over_extra_allow() {
        let policy = ExecPolicy::new(["tar".to_string()]);
        assert!(policy.check("tar").is_err());
    }
}
