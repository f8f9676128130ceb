//! Built-in archive-extractor action (spec.md §4.9: "`bms` → invoke the
//! built-in archive-extractor action with `(script, moduleRoot,
//! projectRoot, inputDir, outputDir, ext?)` synthesized from `args`").
//!
//! `script` names the archive (or a directory of archives) to extract
//! relative to the module root; `ext` restricts which file extension is
//! treated as an archive when `script` is a directory (default `zip`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::sdk::archive;
use crate::sdk::HostSdk;
use crate::Result;

use super::ActionRequest;

/// Extract one archive, or every matching archive in a directory, into
/// `output_dir`.
pub async fn extract_archive(
    sdk: &HostSdk,
    script: &Path,
    input_dir: &Path,
    output_dir: &Path,
    ext: &str,
) -> Result<bool> {
    let candidates: Vec<PathBuf> = if script.is_dir() {
        std::fs::read_dir(script)?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(ext))
            .collect()
    } else {
        vec![input_dir.join(script)]
    };

    if candidates.is_empty() {
        sdk.warn(&format!("no .{ext} archives found under {}", script.display())).await;
        return Ok(false);
    }

    let mut all_ok = true;
    for archive_path in candidates {
        sdk.start(Some(&archive_path.display().to_string())).await;
        match archive::extract(&sdk.path_policy, sdk.sink.as_ref(), &archive_path, output_dir).await {
            Ok(()) => sdk.success(&format!("extracted {}", archive_path.display())).await,
            Err(e) => {
                all_ok = false;
                sdk.error(&format!("failed to extract {}: {e}", archive_path.display())).await;
            }
        }
    }

    Ok(all_ok)
}

/// Entry point when `format-extract` is dispatched as a named `engine`
/// action rather than via `script_type = bms` directly; both paths share
/// [`extract_archive`].
pub async fn run_as_action(request: ActionRequest, sdk: Arc<HostSdk>) -> Result<bool> {
    let script = request.path_arg("script").unwrap_or_default();
    let input_dir = request.path_arg("input_dir").unwrap_or_else(|| request.module_root.clone());
    let output_dir = request.path_arg("output_dir").unwrap_or_else(|| request.module_root.clone());
    let ext = request.str_arg("ext").unwrap_or("zip").to_string();

    extract_archive(&sdk, &script, &input_dir, &output_dir, &ext).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ExecPolicy, PathPolicy};
    use crate::process::ProcessTable;
    use crate::sdk::{AutoResponses, NullSink};

    fn sdk(root: &Path) -> HostSdk {
        HostSdk::new(
            Arc::new(NullSink),
            Arc::new(ExecPolicy::default()),
            Arc::new(PathPolicy::new(root.to_path_buf(), vec![])),
            Arc::new(ProcessTable::new()),
            AutoResponses::new(),
        )
    }

    #[tokio::test]
    async fn missing_archives_report_failure_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let sdk = sdk(dir.path());
        let ok = extract_archive(
            &sdk,
            &dir.path().join("missing.zip"),
            dir.path(),
            dir.path(),
            "zip",
        )
        .await;
        assert!(!ok.unwrap());
    }
}
