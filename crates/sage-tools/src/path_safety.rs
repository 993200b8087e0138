//! Path confinement and output truncation.
//!
//! File tools must never resolve outside a configured allowed directory.
//! `confine` performs the resolve-then-check; callers get back an absolute,
//! existing-or-not path they may safely pass to `tokio::fs`.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("path '{attempted}' escapes the allowed directory '{allowed}'")]
pub struct PathEscape {
    pub attempted: String,
    pub allowed: String,
}

/// Resolve `requested` against `allowed_directory` and verify the result is a
/// descendant of it. `allowed_directory` need not exist on disk for the
/// lexical check, but components are normalised (`.`/`..` collapsed) before
/// comparison so a relative escape like `../../etc/passwd` is caught even
/// when no file exists at the final destination.
pub fn confine(allowed_directory: &Path, requested: &str) -> Result<PathBuf, PathEscape> {
    let allowed = normalise(allowed_directory);
    let joined = if Path::new(requested).is_absolute() {
        PathBuf::from(requested)
    } else {
        allowed.join(requested)
    };
    let resolved = normalise(&joined);

    if resolved.starts_with(&allowed) {
        Ok(resolved)
    } else {
        Err(PathEscape {
            attempted: requested.to_string(),
            allowed: allowed.display().to_string(),
        })
    }
}

/// Lexically normalise a path: collapse `.` and `..` components without
/// touching the filesystem (the path may not exist yet, e.g. a write target).
fn normalise(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Truncate `text` to at most `max_len` characters and append a visible
/// marker noting the original length. Counts chars, not bytes, so a
/// multi-byte-per-char file (e.g. CJK text) isn't cut to a fraction of the
/// configured limit.
pub fn truncate_with_marker(text: &str, max_len: usize) -> String {
    let total_chars = text.chars().count();
    if total_chars <= max_len {
        return text.to_string();
    }

    let truncated: String = text.chars().take(max_len).collect();

    format!(
        "{truncated}\n\n[TRUNCATED - showing {max_len} of {total_chars} chars]"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_descendant_path() {
        let allowed = Path::new("/workspace/uploads");
        let resolved = confine(allowed, "report.txt").unwrap();
        assert_eq!(resolved, Path::new("/workspace/uploads/report.txt"));
    }

    #[test]
    fn allows_nested_descendant_path() {
        let allowed = Path::new("/workspace/uploads");
        let resolved = confine(allowed, "2026/q1/report.txt").unwrap();
        assert_eq!(
            resolved,
            Path::new("/workspace/uploads/2026/q1/report.txt")
        );
    }

    #[test]
    fn rejects_parent_dir_escape() {
        let allowed = Path::new("/workspace/uploads");
        let err = confine(allowed, "../../../etc/passwd").unwrap_err();
        assert_eq!(err.attempted, "../../../etc/passwd");
    }

    #[test]
    fn rejects_absolute_path_outside_allowed() {
        let allowed = Path::new("/workspace/uploads");
        assert!(confine(allowed, "/etc/passwd").is_err());
    }

    #[test]
    fn truncate_leaves_short_text_untouched() {
        assert_eq!(truncate_with_marker("hello", 100), "hello");
    }

    #[test]
    fn truncate_respects_utf8_boundaries() {
        let text = "a".repeat(10) + "\u{1F600}\u{1F600}\u{1F600}";
        let truncated = truncate_with_marker(&text, 11);
        assert!(truncated.is_char_boundary(truncated.find('\n').unwrap()));
    }
}
