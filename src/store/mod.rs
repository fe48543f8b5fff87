//! On-disk state: the request/response queue directory and the allow-list
//! documents that "always allow" decisions append to.

pub mod policy;
pub mod queue;

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncWriteExt;

static REQUEST_ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid request id regex"));

/// Ids become file name components, so only a conservative alphabet is
/// accepted and the directory aliases are refused outright.
pub fn is_valid_id(id: &str) -> bool {
    id != "." && id != ".." && REQUEST_ID_REGEX.is_match(id)
}

/// Write `bytes` to a sibling temp file, fsync it, then rename it over
/// `path`. Readers polling `path` see either nothing or the full contents.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })?
        .to_string_lossy()
        .into_owned();
    let temp_path = path.with_file_name(format!(
        ".{}.tmp-{}-{}",
        file_name,
        std::process::id(),
        uuid::Uuid::new_v4().simple()
    ));

    let write_result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok::<_, std::io::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }

    Ok(())
}
