//! Module/game registry (spec.md §4.3).
//!
//! Discovers modules on disk by enumerating direct children of the
//! conventional `modules` directory, and classifies each as installed,
//! downloaded, or not-downloaded. State is derived fresh on every call —
//! nothing here is cached across calls, matching the spec's "Results are not
//! cached across calls."

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use remake_core::{ModuleDescriptor, ModuleState};
use serde::Deserialize;

use crate::Result;

/// Conventional manifest file name inside a module directory.
pub const OPS_FILE_NAME: &str = "operations.toml";
/// Conventional game descriptor file name inside a module directory.
pub const GAME_FILE_NAME: &str = "game.toml";

/// Minimal shape of a module's `game.toml` descriptor (spec.md §6).
#[derive(Debug, Deserialize)]
struct GameDescriptor {
    title: Option<String>,
    exe: Option<String>,
}

/// Discover all modules under `modules_root`, classifying each by state.
///
/// # Errors
///
/// Returns an error only if `modules_root` exists but cannot be read (a
/// missing directory yields an empty map, not an error).
pub fn discover(modules_root: &Path) -> Result<HashMap<String, ModuleDescriptor>> {
    let mut out = HashMap::new();

    if !modules_root.is_dir() {
        return Ok(out);
    }

    for entry in std::fs::read_dir(modules_root)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let descriptor = describe_module(&name, &path)?;
        out.insert(name, descriptor);
    }

    Ok(out)
}

/// [`discover`] restricted to modules whose state is
/// [`ModuleState::Installed`].
pub fn discover_installed(modules_root: &Path) -> Result<HashMap<String, ModuleDescriptor>> {
    Ok(discover(modules_root)?
        .into_iter()
        .filter(|(_, d)| d.state == ModuleState::Installed)
        .collect())
}

fn describe_module(name: &str, root: &Path) -> Result<ModuleDescriptor> {
    let ops_candidates = [root.join(OPS_FILE_NAME), root.join("operations.json")];
    let ops_file = ops_candidates.into_iter().find(|p| p.is_file());

    let game_file = root.join(GAME_FILE_NAME);
    let mut title = None;
    let mut exe = None;

    if game_file.is_file() {
        let text = std::fs::read_to_string(&game_file)?;
        if let Ok(descriptor) = toml::from_str::<GameDescriptor>(&text) {
            title = descriptor.title;
            exe = descriptor.exe.map(|e| resolve_exe_path(root, &e));
        }
    }

    let exe_exists = exe.as_ref().is_some_and(|p: &PathBuf| p.is_file());

    let state = if exe_exists {
        ModuleState::Installed
    } else if ops_file.is_some() {
        ModuleState::Downloaded
    } else {
        ModuleState::NotDownloaded
    };

    Ok(ModuleDescriptor {
        name: name.to_string(),
        root: root.to_path_buf(),
        ops_file,
        exe: if exe_exists { exe } else { None },
        title,
        state,
    })
}

fn resolve_exe_path(root: &Path, exe: &str) -> PathBuf {
    let p = Path::new(exe);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        root.join(p)
    }
}
