//! TEI output: persist a service response body at its resolved path.
//!
//! Writes go to a sibling `*.tmp` file that is renamed into place, so an
//! interrupted run never leaves a truncated TEI file that a later run
//! without `--force` would mistake for a finished one.

use crate::error::ItemError;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write `body` to `output_path`, creating parent directories.
///
/// Overwrites an existing file. Concurrent creation of the same parent
/// directory by another task is not an error.
///
/// # Returns
/// Number of bytes written.
pub async fn write_tei(output_path: &Path, body: &str) -> Result<usize, ItemError> {
    let fail = |e: std::io::Error| ItemError::WriteFailed {
        path: output_path.to_path_buf(),
        detail: e.to_string(),
    };

    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.map_err(fail)?;
        }
    }

    let tmp_path = tmp_path_for(output_path);
    tokio::fs::write(&tmp_path, body.as_bytes())
        .await
        .map_err(fail)?;

    if let Err(e) = tokio::fs::rename(&tmp_path, output_path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }

    debug!("Wrote {} ({} bytes)", output_path.display(), body.len());
    Ok(body.len())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}
