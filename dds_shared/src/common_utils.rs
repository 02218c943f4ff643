//! Common Utilities Module
//!
//! Small path and filesystem helpers used across discovery, planning and
//! job execution.

use std::path::Path;

/// Lower-cased extension of `path`, or an empty string when there is none.
///
/// ```
/// use std::path::Path;
/// use dds_shared::common_utils::get_extension_lowercase;
///
/// assert_eq!(get_extension_lowercase(Path::new("Sword.DDS")), "dds");
/// assert_eq!(get_extension_lowercase(Path::new("noext")), "");
/// ```
pub fn get_extension_lowercase(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

/// Case-insensitive extension check. `extension` is given without the dot.
pub fn has_extension(path: &Path, extension: &str) -> bool {
    get_extension_lowercase(path) == extension.to_lowercase()
}

/// Creates `dir` and its parents. An already existing directory is not an
/// error, which also covers several workers racing on the same parent.
pub fn ensure_dir_exists(dir: &Path) -> std::io::Result<()> {
    match std::fs::create_dir_all(dir) {
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        other => other,
    }
}

pub fn file_size(path: &Path) -> std::io::Result<u64> {
    std::fs::metadata(path).map(|m| m.len())
}
