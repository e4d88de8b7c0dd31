//! Helpers for handling user-supplied names and for keeping full paths out
//! of span attributes and log lines.

use std::path::{Component, Path};

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Checks that an uploaded filename is a single plain path component.
///
/// Rejects empty names, directory parts, `.`/`..`, NUL and other control
/// characters, and names longer than 255 bytes.
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() || name.len() > 255 {
        return false;
    }
    if name.chars().any(|c| c.is_control() || c == '/' || c == '\\') {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
