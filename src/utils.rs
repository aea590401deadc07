//! Utility functions for file persistence and naming

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Counter making temp file names unique within this process
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `contents` to `path` atomically.
///
/// The data is written to a hidden temp file in the same directory, fsynced, and
/// renamed over the target. Readers observe either the previous file or the new
/// one, never a partial write. Parent directories are created as needed.
pub async fn atomic_write(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&parent).await?;

    let tmp_path = temp_path_for(path, &parent)?;

    let write_result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        tokio::fs::remove_file(&tmp_path).await.ok();
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        tokio::fs::remove_file(&tmp_path).await.ok();
        return Err(e);
    }

    Ok(())
}

fn temp_path_for(path: &Path, parent: &Path) -> std::io::Result<PathBuf> {
    let file_name = path.file_name().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("'{}' has no file name", path.display()),
        )
    })?;
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    Ok(parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name.to_string_lossy(),
        std::process::id(),
        n
    )))
}

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Make an identifier safe to use as a single path component.
///
/// Percent-encodes everything outside the URL-unreserved set, so separators can
/// never split the name and distinct ids always map to distinct names. `.`, `..`
/// and the empty id are spelled out as `%2E`, `%2E%2E` and `%`.
pub fn safe_path_component(name: &str) -> String {
    match name {
        "" => "%".to_string(),
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        _ => urlencoding::encode(name).into_owned(),
    }
}
