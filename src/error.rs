//! Error types for the remake engine (spec.md §7).

use thiserror::Error;

/// Result type alias for the remake engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy (kinds, not type names) from spec.md §7.
#[derive(Error, Debug)]
pub enum Error {
    /// No module has been loaded for an operation that requires one.
    #[error("no module loaded")]
    NoModuleLoaded,

    /// The requested module name is not in the registry.
    #[error("unknown module: {0}")]
    UnknownModule(String),

    /// The requested operation name/id does not exist in the group.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// `script_type` is missing or unrecognized.
    #[error("unknown script type: {0}")]
    UnknownScriptType(String),

    /// Manifest failed to parse.
    #[error("manifest parse error: {0}")]
    ParseError(#[from] remake_core::CoreError),

    /// `depends-on` names an unknown id or forms a cycle.
    #[error("invalid dependency graph: {0}")]
    InvalidDependency(String),

    /// The requested built-in `engine` action name is not in the closed enum.
    #[error("unknown built-in action: {0}")]
    UnknownAction(String),

    /// argv[0] is not on the executable allow-list.
    #[error("executable not approved: {0}")]
    DisallowedExecutable(String),

    /// A path lies under a forbidden system directory.
    #[error("path access denied: {0}")]
    DisallowedPath(String),

    /// An out-of-workspace path was offered to the user and they declined.
    #[error("path access denied by user: {0}")]
    PathDenied(String),

    /// The child process could not be spawned.
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    /// An operation exceeded its configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// A cancellation signal tripped before or during execution.
    #[error("operation cancelled")]
    Cancelled,

    /// Filesystem or pipe I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// An embedded script host raised an error while executing a script.
    #[error("script error: {0}")]
    ScriptError(String),

    /// A built-in action failed.
    #[error("built-in action failed: {0}")]
    ActionError(String),

    /// Catch-all for configuration problems (bad tool map, bad config file).
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// True for errors that the group runner should treat as this
    /// operation's own failure rather than an engine-level fault (used to
    /// decide whether to keep running independent branches).
    #[must_use]
    pub fn is_operation_failure(&self) -> bool {
        !matches!(self, Error::NoModuleLoaded | Error::UnknownModule(_))
    }
}
