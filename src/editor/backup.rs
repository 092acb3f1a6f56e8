//! Pre-write backups with bounded retention, plus the destructive-operation
//! hash confirmation gate.

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

use crate::editor::edit::{hash_content, HashAlgorithm};
use crate::util::encode_path_component;

/// Directory under the repository root that holds backups.
pub const BACKUP_DIR: &str = ".mcp/backups";

pub struct BackupStore {
    root: PathBuf,
    retention: usize,
}

impl BackupStore {
    pub fn new(root: &Path, retention: usize) -> Self {
        Self {
            root: root.to_path_buf(),
            retention,
        }
    }

    fn dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    /// Copy the original content aside before a write. Oldest backups beyond
    /// the retention limit are deleted.
    pub fn backup(&self, rel_path: &str, content: &str) -> Result<PathBuf> {
        let dir = self.dir();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let encoded = encode_path_component(rel_path);
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S%.3fZ");
        let backup_path = dir.join(format!("{encoded}_{timestamp}.bak"));
        fs::write(&backup_path, content)
            .with_context(|| format!("failed to write backup {}", backup_path.display()))?;
        self.prune(&encoded)?;
        debug!("backed up {rel_path} to {}", backup_path.display());
        Ok(backup_path)
    }

    /// All backups for a path, oldest first.
    pub fn list(&self, rel_path: &str) -> Result<Vec<PathBuf>> {
        let encoded = encode_path_component(rel_path);
        let prefix = format!("{encoded}_");
        let mut entries: Vec<PathBuf> = match fs::read_dir(self.dir()) {
            Ok(iter) => iter
                .flatten()
                .map(|e| e.path())
                .filter(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(|n| n.starts_with(&prefix) && n.ends_with(".bak"))
                        .unwrap_or(false)
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        // ISO timestamps sort lexicographically.
        entries.sort();
        Ok(entries)
    }

    fn prune(&self, encoded: &str) -> Result<()> {
        let prefix = format!("{encoded}_");
        let mut entries: Vec<PathBuf> = fs::read_dir(self.dir())?
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(".bak"))
                    .unwrap_or(false)
            })
            .collect();
        entries.sort();
        while entries.len() > self.retention {
            let oldest = entries.remove(0);
            debug!("pruning backup {}", oldest.display());
            let _ = fs::remove_file(oldest);
        }
        Ok(())
    }
}

/// Whether a destructive operation may proceed.
///
/// Deletes on files at or beyond the size threshold, and strict-mode deletes
/// carrying a confirmation hash, require the hash to agree with current
/// content. Without agreement the file is left untouched.
pub fn destructive_allowed(
    content: &str,
    size_threshold: u64,
    confirmation_hash: Option<&str>,
    strict: bool,
) -> bool {
    let large = content.len() as u64 >= size_threshold;
    let needs_confirmation = large || (strict && confirmation_hash.is_some());
    if !needs_confirmation {
        return true;
    }
    match confirmation_hash {
        Some(hash) => {
            hash_content(HashAlgorithm::Sha256, content).eq_ignore_ascii_case(hash)
                || hash_content(HashAlgorithm::Xxhash, content).eq_ignore_ascii_case(hash)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn backup_writes_encoded_name() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), 10);
        let path = store.backup("src/auth/login.ts", "original\n").unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("src__auth__login.ts_"));
        assert!(name.ends_with(".bak"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "original\n");
    }

    #[test]
    fn retention_keeps_newest() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), 3);
        for i in 0..6 {
            store.backup("a.ts", &format!("v{i}\n")).unwrap();
            // Distinct timestamps down to milliseconds.
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let backups = store.list("a.ts").unwrap();
        assert_eq!(backups.len(), 3);
        let newest = fs::read_to_string(backups.last().unwrap()).unwrap();
        assert_eq!(newest, "v5\n");
    }

    #[test]
    fn retention_is_per_path() {
        let dir = tempdir().unwrap();
        let store = BackupStore::new(dir.path(), 2);
        store.backup("a.ts", "a\n").unwrap();
        store.backup("b.ts", "b\n").unwrap();
        store.backup("a.ts", "a2\n").unwrap();
        assert_eq!(store.list("a.ts").unwrap().len(), 2);
        assert_eq!(store.list("b.ts").unwrap().len(), 1);
    }

    #[test]
    fn small_deletes_pass_without_hash() {
        assert!(destructive_allowed("tiny", 10 * 1024, None, false));
    }

    #[test]
    fn large_deletes_require_matching_hash() {
        let content = "x".repeat(20 * 1024);
        assert!(!destructive_allowed(&content, 10 * 1024, None, false));
        let hash = hash_content(HashAlgorithm::Sha256, &content);
        assert!(destructive_allowed(&content, 10 * 1024, Some(&hash), false));
        assert!(!destructive_allowed(&content, 10 * 1024, Some("bad"), false));
    }

    #[test]
    fn strict_mode_checks_given_hash_even_when_small() {
        let hash = hash_content(HashAlgorithm::Sha256, "tiny");
        assert!(destructive_allowed("tiny", 10 * 1024, Some(&hash), true));
        assert!(!destructive_allowed("tiny", 10 * 1024, Some("bad"), true));
    }
}
