//! Path-access policy (spec.md §4.7).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

/// Unix directories that are always forbidden, regardless of prompts.
#[cfg(unix)]
const FORBIDDEN_ROOTS: &[&str] = &["/etc", "/bin", "/sbin", "/usr/bin", "/usr/sbin", "/sys", "/proc", "/dev"];

/// Windows directories that are always forbidden.
#[cfg(windows)]
const FORBIDDEN_ROOTS: &[&str] = &["C:\\Windows", "C:\\Windows\\System32"];

/// Conventional subfolders of the working directory that are allowed
/// without prompting.
const ALLOWED_SUBFOLDERS: &[&str] = &["modules", "tools", "cache", "logs", "downloads", "temp", "tmp"];

/// Outcome of classifying a path against the policy, before any
/// session-wide grants are consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathDecision {
    Allowed,
    Forbidden,
    NeedsPrompt,
}

/// Path-access policy with a session-wide grant cache for roots the caller
/// approved via the prompt channel (spec.md §4.7, §5 "shared-resource
/// policy").
#[derive(Debug, Default)]
pub struct PathPolicy {
    extra_allowed_roots: Vec<PathBuf>,
    granted_roots: Mutex<HashSet<PathBuf>>,
    cwd: PathBuf,
}

impl PathPolicy {
    #[must_use]
    pub fn new(cwd: PathBuf, extra_allowed_roots: Vec<PathBuf>) -> Self {
        Self {
            extra_allowed_roots,
            granted_roots: Mutex::new(HashSet::new()),
            cwd,
        }
    }

    /// Classify `path` without consulting or mutating the grant cache.
    #[must_use]
    pub fn classify(&self, path: &Path) -> PathDecision {
        if path.is_relative() {
            return PathDecision::Allowed;
        }

        let canonical = canonicalize_best_effort(path);

        for root in FORBIDDEN_ROOTS {
            if canonical.starts_with(root) {
                return PathDecision::Forbidden;
            }
        }

        if canonical.starts_with(&self.cwd) {
            return PathDecision::Allowed;
        }

        for sub in ALLOWED_SUBFOLDERS {
            if canonical.starts_with(self.cwd.join(sub)) {
                return PathDecision::Allowed;
            }
        }

        if canonical.starts_with(std::env::temp_dir()) {
            return PathDecision::Allowed;
        }

        if let Some(home) = dirs::home_dir() {
            if canonical.starts_with(&home) {
                return PathDecision::Allowed;
            }
        }
        if let Some(docs) = dirs::document_dir() {
            if canonical.starts_with(&docs) {
                return PathDecision::Allowed;
            }
        }

        for root in &self.extra_allowed_roots {
            if canonical.starts_with(root) {
                return PathDecision::Allowed;
            }
        }

        PathDecision::NeedsPrompt
    }

    /// Full decision including the session grant cache. For a
    /// [`PathDecision::NeedsPrompt`] path already granted earlier this
    /// session, returns `true` without re-prompting.
    #[must_use]
    pub fn is_granted(&self, path: &Path) -> bool {
        let canonical = canonicalize_best_effort(path);
        self.granted_roots
            .lock()
            .iter()
            .any(|root| canonical.starts_with(root))
    }

    /// Record an affirmative prompt answer, granting the path's root for
    /// the remainder of the session.
    pub fn grant(&self, path: &Path) {
        let canonical = canonicalize_best_effort(path);
        self.granted_roots.lock().insert(canonical);
    }

    /// The root that a prompt question should identify for `path`
    /// (the path itself; front-ends may choose to display a shorter form).
    #[must_use]
    pub fn prompt_subject(path: &Path) -> PathBuf {
        canonicalize_best_effort(path)
    }
}

/// Canonicalize without dereferencing symlink targets for classification
/// purposes (spec.md §4.7: "Symbolic-link targets are not dereferenced").
fn canonicalize_best_effort(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_is_always_allowed() {
        let policy = PathPolicy::new(PathBuf::from("/work"), vec![]);
        assert_eq!(policy.classify(Path::new("foo/bar.txt")), PathDecision::Allowed);
    }

    #[test]
    fn cwd_subtree_is_allowed() {
        let policy = PathPolicy::new(PathBuf::from("/work"), vec![]);
        assert_eq!(policy.classify(Path::new("/work/modules/x")), PathDecision::Allowed);
    }

    #[cfg(unix)]
    #[test]
    fn system_directory_is_forbidden() {
        let policy = PathPolicy::new(PathBuf::from("/work"), vec![]);
        assert_eq!(policy.classify(Path::new("/etc/passwd")), PathDecision::Forbidden);
    }

    #[test]
    fn unrelated_absolute_path_needs_prompt_until_granted() {
        let policy = PathPolicy::new(PathBuf::from("/work"), vec![]);
        let target = Path::new("/opt/other/thing.txt");
        assert_eq!(policy.classify(target), PathDecision::NeedsPrompt);
        assert!(!policy.is_granted(target));
        policy.grant(Path::new("/opt/other"));
        assert!(policy.is_granted(target));
    }
}
