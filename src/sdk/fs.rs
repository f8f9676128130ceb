//! Filesystem helpers exposed to embedded scripts (spec.md §4.8), all gated
//! by [`PathPolicy`].

use std::path::{Path, PathBuf};

use md5::{Digest as Md5Digest, Md5};
use sha1::{Digest as Sha1Digest, Sha1};
use walkdir::WalkDir;

use super::EventSink;
use crate::policy::{PathDecision, PathPolicy};
use crate::{Error, Result};

/// Run the path-access policy for `path`, prompting through `sink` when the
/// path is neither clearly allowed nor clearly forbidden (spec.md §4.7).
pub async fn authorize(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<()> {
    match policy.classify(path) {
        PathDecision::Allowed => Ok(()),
        PathDecision::Forbidden => Err(Error::DisallowedPath(path.display().to_string())),
        PathDecision::NeedsPrompt => {
            if policy.is_granted(path) {
                return Ok(());
            }
            let subject = PathPolicy::prompt_subject(path);
            let answer = sink
                .read_line(&format!(
                    "Allow access to '{}'? (y/n)",
                    subject.display()
                ))
                .await;
            if matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes") {
                policy.grant(&subject);
                Ok(())
            } else {
                Err(Error::PathDenied(path.display().to_string()))
            }
        }
    }
}

pub async fn copy_file(policy: &PathPolicy, sink: &dyn EventSink, src: &Path, dst: &Path) -> Result<()> {
    authorize(policy, sink, src).await?;
    authorize(policy, sink, dst).await?;
    std::fs::copy(src, dst)?;
    Ok(())
}

pub async fn remove_file(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<()> {
    authorize(policy, sink, path).await?;
    std::fs::remove_file(path)?;
    Ok(())
}

/// Recursively copy `src` into `dst`, reporting progress events through
/// `on_progress` (entries copied / total entries).
pub async fn copy_dir(
    policy: &PathPolicy,
    sink: &dyn EventSink,
    src: &Path,
    dst: &Path,
    mut on_progress: impl FnMut(u64, u64),
) -> Result<()> {
    authorize(policy, sink, src).await?;
    authorize(policy, sink, dst).await?;

    let entries: Vec<PathBuf> = WalkDir::new(src)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .map(|e| e.path().to_path_buf())
        .collect();
    let total = entries.len() as u64;

    for (i, entry) in entries.iter().enumerate() {
        let relative = entry.strip_prefix(src).unwrap_or(entry);
        let target = dst.join(relative);
        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry, &target)?;
        }
        on_progress(i as u64 + 1, total);
    }

    Ok(())
}

pub async fn move_dir(policy: &PathPolicy, sink: &dyn EventSink, src: &Path, dst: &Path) -> Result<()> {
    authorize(policy, sink, src).await?;
    authorize(policy, sink, dst).await?;
    std::fs::rename(src, dst)?;
    Ok(())
}

pub async fn remove_dir(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<()> {
    authorize(policy, sink, path).await?;
    std::fs::remove_dir_all(path)?;
    Ok(())
}

#[cfg(unix)]
pub async fn symlink(policy: &PathPolicy, sink: &dyn EventSink, target: &Path, link: &Path) -> Result<()> {
    authorize(policy, sink, target).await?;
    authorize(policy, sink, link).await?;
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

pub async fn hardlink(policy: &PathPolicy, sink: &dyn EventSink, src: &Path, dst: &Path) -> Result<()> {
    authorize(policy, sink, src).await?;
    authorize(policy, sink, dst).await?;
    std::fs::hard_link(src, dst)?;
    Ok(())
}

pub async fn realpath(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<PathBuf> {
    authorize(policy, sink, path).await?;
    Ok(std::fs::canonicalize(path)?)
}

pub async fn readlink(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<PathBuf> {
    authorize(policy, sink, path).await?;
    Ok(std::fs::read_link(path)?)
}

pub async fn sha1_file(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<String> {
    authorize(policy, sink, path).await?;
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha1::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub async fn md5_file(policy: &PathPolicy, sink: &dyn EventSink, path: &Path) -> Result<String> {
    authorize(policy, sink, path).await?;
    let bytes = std::fs::read(path)?;
    let mut hasher = Md5::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

/// Recursive directory scan, yielding relative file paths (dirs omitted).
pub async fn scan_dir(policy: &PathPolicy, sink: &dyn EventSink, root: &Path) -> Result<Vec<PathBuf>> {
    authorize(policy, sink, root).await?;
    Ok(WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::NullSink;

    #[tokio::test]
    async fn copy_and_hash_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), vec![]);
        let sink = NullSink;

        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();
        let dst = dir.path().join("b.txt");

        copy_file(&policy, &sink, &src, &dst).await.unwrap();
        assert_eq!(std::fs::read_to_string(&dst).unwrap(), "hello");

        let hash = sha1_file(&policy, &sink, &dst).await.unwrap();
        assert_eq!(hash.len(), 40);
    }

    #[tokio::test]
    async fn copy_dir_reports_progress_for_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let policy = PathPolicy::new(dir.path().to_path_buf(), vec![]);
        let sink = NullSink;

        let src = dir.path().join("src");
        std::fs::create_dir_all(src.join("nested")).unwrap();
        std::fs::write(src.join("nested/f.txt"), b"x").unwrap();
        let dst = dir.path().join("dst");

        let mut calls = 0;
        copy_dir(&policy, &sink, &src, &dst, |_current, _total| calls += 1)
            .await
            .unwrap();
        assert!(calls >= 2);
        assert!(dst.join("nested/f.txt").is_file());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn forbidden_path_is_rejected() {
        let policy = PathPolicy::new(std::env::temp_dir(), vec![]);
        let sink = NullSink;
        let err = remove_file(&policy, &sink, Path::new("/etc/passwd")).await.unwrap_err();
        assert!(matches!(err, Error::DisallowedPath(_)));
    }
}
