//! Output path resolution: where the TEI file for an input PDF goes.
//!
//! Three cases, decided by the caller's arguments rather than by the file
//! system:
//!
//! | `output_root` | `input_root`        | output                               |
//! |---------------|---------------------|--------------------------------------|
//! | `None`        | any                 | next to the input                    |
//! | `Some(out)`   | the input file      | `out/<stem>.tei.xml`                 |
//! | `Some(out)`   | a parent directory  | `out/<path relative to root>.tei.xml`|

use std::path::{Path, PathBuf};

/// Extension that replaces the input's last extension.
pub const TEI_EXTENSION: &str = "tei.xml";

/// Compute the output path for `input_file`.
///
/// Pure and deterministic: the same arguments always yield the same path.
pub fn resolve(input_file: &Path, input_root: &Path, output_root: Option<&Path>) -> PathBuf {
    let Some(output_root) = output_root else {
        return input_file.with_extension(TEI_EXTENSION);
    };

    let relative = if input_root == input_file {
        base_name(input_file)
    } else {
        relative_to(input_file, input_root).unwrap_or_else(|| base_name(input_file))
    };

    output_root.join(relative).with_extension(TEI_EXTENSION)
}

fn base_name(path: &Path) -> PathBuf {
    path.file_name().map(PathBuf::from).unwrap_or_default()
}

/// `file` relative to `root`, comparing absolute forms when the lexical
/// prefix does not match (e.g. `./papers` vs `papers`).
fn relative_to(file: &Path, root: &Path) -> Option<PathBuf> {
    if let Ok(rel) = file.strip_prefix(root) {
        return Some(rel.to_path_buf());
    }
    let file = std::path::absolute(file).ok()?;
    let root = std::path::absolute(root).ok()?;
    file.strip_prefix(&root).ok().map(Path::to_path_buf)
}
