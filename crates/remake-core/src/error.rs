//! Error types for the pure core (parsing and resolution only).

use thiserror::Error;

/// Result type alias for `remake-core`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing manifests or resolving operation shapes.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A manifest file exists but is not valid JSON/TOML, or a recognized
    /// key has the wrong shape (e.g. `depends-on` is not a list of integers).
    #[error("failed to parse manifest {path}: {reason}")]
    Parse {
        /// Path of the manifest that failed to parse.
        path: String,
        /// Human-readable reason.
        reason: String,
    },

    /// Reading the manifest file from disk failed (for a reason other than
    /// the file simply not existing, which `load`/`load_flat` treat as empty).
    #[error("failed to read manifest {path}: {source}")]
    Io {
        /// Path of the manifest.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
