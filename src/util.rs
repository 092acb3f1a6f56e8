//! Shared path and time helpers.
//!
//! Relative forward-slash paths are the canonical file identifier across the
//! index, the dependency graph, and the search engine. Absolute paths are
//! accepted at API boundaries and converted here.

use std::path::{Component, Path, PathBuf};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Normalize a path to forward slashes without touching the filesystem.
pub fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Convert a possibly-absolute path into the canonical repo-relative form.
/// Paths already relative are cleaned of `.`/`..` components.
pub fn to_rel_path(root: &Path, path: &Path) -> String {
    let stripped = if path.is_absolute() {
        path.strip_prefix(root).unwrap_or(path)
    } else {
        path
    };
    clean_components(stripped)
}

/// Join a repo-relative path back onto the root.
pub fn to_abs_path(root: &Path, rel: &str) -> PathBuf {
    root.join(rel)
}

fn clean_components(path: &Path) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop();
            }
            Component::Normal(p) => {
                if let Some(s) = p.to_str() {
                    parts.push(s);
                }
            }
            _ => {}
        }
    }
    parts.join("/")
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// File mtime in milliseconds, or None when the file cannot be stat'ed.
pub fn mtime_ms(path: &Path) -> Option<i64> {
    let meta = std::fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    Some(
        modified
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64,
    )
}

/// Check if a byte range sits on identifier boundaries.
pub fn is_word_boundary(buf: &[u8], start: usize, len: usize) -> bool {
    let is_ident = |b: u8| b.is_ascii_alphanumeric() || b == b'_';
    let before_ok = if start == 0 {
        true
    } else {
        !is_ident(buf[start - 1])
    };
    let end = start + len;
    let after_ok = if end >= buf.len() {
        true
    } else {
        !is_ident(buf[end])
    };
    before_ok && after_ok
}

/// A soft deadline for long-running operations.
///
/// Operations holding one check it periodically and abort cleanly on expiry,
/// leaving persistent state either pre- or post-commit.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { expires: None }
    }

    pub fn after(duration: std::time::Duration) -> Self {
        Self {
            expires: Some(Instant::now() + duration),
        }
    }

    pub fn expired(&self) -> bool {
        self.expires.map(|e| Instant::now() >= e).unwrap_or(false)
    }
}

/// Encode a relative path into a single filesystem-safe component.
/// Used for backup file names.
pub fn encode_path_component(rel: &str) -> String {
    rel.replace(['/', '\\'], "__").replace(':', "_")
}
