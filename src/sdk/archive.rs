//! In-process zip archive helpers (spec.md §4.8: "in-process zip
//! create/extract; other formats require an approved external tool").

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use super::EventSink;
use super::fs::authorize;
use crate::policy::PathPolicy;
use crate::{Error, Result};

/// Create a zip archive at `dst` containing every file under `src`
/// (recursively), with archive entry names relative to `src`.
pub async fn create(policy: &PathPolicy, sink: &dyn EventSink, src: &Path, dst: &Path) -> Result<()> {
    authorize(policy, sink, src).await?;
    authorize(policy, sink, dst).await?;

    let file = File::create(dst)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(src)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let relative = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let name = relative.to_string_lossy().replace('\\', "/");
        writer
            .start_file(name, options)
            .map_err(|e| Error::ActionError(format!("zip write error: {e}")))?;
        let mut buf = Vec::new();
        File::open(entry.path())?.read_to_end(&mut buf)?;
        writer.write_all(&buf)?;
    }

    writer
        .finish()
        .map_err(|e| Error::ActionError(format!("zip finish error: {e}")))?;
    Ok(())
}

/// Extract `src` (a zip archive) into `dst_dir`, recreating its directory
/// structure.
pub async fn extract(policy: &PathPolicy, sink: &dyn EventSink, src: &Path, dst_dir: &Path) -> Result<()> {
    authorize(policy, sink, src).await?;
    authorize(policy, sink, dst_dir).await?;

    let file = File::open(src)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| Error::ActionError(format!("zip read error: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::ActionError(format!("zip entry error: {e}")))?;
        let Some(relative) = entry.enclosed_name() else {
            continue; // reject entries that escape the destination via `..`
        };
        let out_path = dst_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf)?;
        std::fs::File::create(&out_path)?.write_all(&buf)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::NullSink;

    #[tokio::test]
    async fn create_then_extract_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), vec![]);
        let sink = NullSink;

        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/file.txt"), b"payload").unwrap();

        let archive_path = dir.path().join("out.zip");
        create(&policy, &sink, &src, &archive_path).await.unwrap();
        assert!(archive_path.is_file());

        let extracted = dir.path().join("extracted");
        extract(&policy, &sink, &archive_path, &extracted).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(extracted.join("nested/file.txt")).unwrap(),
            "payload"
        );
    }
}
