//! Input discovery: turn the user's `--input` into a list of PDF files.
//!
//! A directory is walked recursively on the local file system; a file is
//! taken as-is (single-file mode). The list is sorted so that repeated runs
//! over the same tree submit files in the same order.

use crate::error::GrobidError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Collect the PDF files under `input`.
///
/// # Errors
/// [`GrobidError::InputNotFound`] if `input` does not exist. Entries that
/// cannot be read during the walk are logged and left out.
pub fn collect_pdfs(input: &Path) -> Result<Vec<PathBuf>, GrobidError> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        return Err(GrobidError::InputNotFound {
            path: input.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(input) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", input.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            debug!("Found {}", entry.path().display());
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// `true` for a `.pdf` extension in any letter case.
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}
