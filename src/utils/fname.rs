//! Output filename helpers
//!
//! Derived outputs are named after their input: same stem and extension, a
//! suffix marking the processing step, placed in a chosen directory.

use std::path::{Path, PathBuf};

/// Extensions that span more than one dot and must be split off whole.
const SPECIAL_EXTENSIONS: [&str; 3] = [".nii.gz", ".tar.gz", ".niml.dset"];

/// Split a path into (directory, stem, extension).
///
/// `.nii.gz` and the other double extensions are treated as a single
/// extension, so `sub-01_T1w.nii.gz` yields `("", "sub-01_T1w", ".nii.gz")`.
/// They match regardless of case; the returned extension keeps the casing of
/// the input.
pub fn split_filename(path: &Path) -> (PathBuf, String, String) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for ext in SPECIAL_EXTENSIONS {
        if name.len() <= ext.len() {
            continue;
        }
        let split = name.len() - ext.len();
        if name.is_char_boundary(split) && name[split..].eq_ignore_ascii_case(ext) {
            return (dir, name[..split].to_string(), name[split..].to_string());
        }
    }

    match name.rfind('.') {
        // a leading dot marks a hidden file, not an extension
        Some(idx) if idx > 0 => (dir, name[..idx].to_string(), name[idx..].to_string()),
        _ => (dir, name, String::new()),
    }
}

/// Build `<newpath or original dir>/<prefix><stem><suffix><ext>`.
pub fn fname_presuffix(path: &Path, prefix: &str, suffix: &str, newpath: Option<&Path>) -> PathBuf {
    let (dir, stem, ext) = split_filename(path);
    let dir = newpath.map(Path::to_path_buf).unwrap_or(dir);
    dir.join(format!("{}{}{}{}", prefix, stem, suffix, ext))
}
