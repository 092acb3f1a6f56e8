//! Workspace discovery and path resolution.
//!
//! Finds the repository root by walking up from the current directory
//! looking for project markers. Priority order:
//!
//! 1. CLI argument (`--workspace`)
//! 2. Environment variable (`QUARRY_WORKSPACE`)
//! 3. Auto-detection via marker files

use anyhow::{bail, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable for explicit workspace path
pub const ENV_WORKSPACE: &str = "QUARRY_WORKSPACE";

/// Environment variable for explicit database path
pub const ENV_DB: &str = "QUARRY_DB";

/// Workspace markers in priority order.
pub const WORKSPACE_MARKERS: &[&str] = &[
    ".mcp", // explicit quarry workspace (highest priority)
    ".git",
    "tsconfig.json",
    "package.json",
    "pnpm-workspace.yaml",
    "lerna.json",
];

/// Find workspace root by walking up from the current directory.
pub fn find_workspace_root() -> Option<PathBuf> {
    let cwd = env::current_dir().ok()?;
    find_workspace_root_from(&cwd)
}

/// Find workspace root by walking up from a specific starting path.
///
/// Returns `None` if no markers are found before reaching the filesystem
/// root or the user's home directory.
pub fn find_workspace_root_from(start: &Path) -> Option<PathBuf> {
    let start = if start.is_absolute() {
        start.to_path_buf()
    } else {
        env::current_dir().ok()?.join(start)
    };

    let home = dirs::home_dir();

    let mut current = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start
    };

    loop {
        if let Some(ref home) = home {
            if &current == home {
                if has_workspace_marker(&current) {
                    return Some(current);
                }
                return None;
            }
        }

        if has_workspace_marker(&current) {
            return Some(current);
        }

        match current.parent() {
            Some(parent) if parent != current => {
                current = parent.to_path_buf();
            }
            _ => return None,
        }
    }
}

fn has_workspace_marker(dir: &Path) -> bool {
    WORKSPACE_MARKERS
        .iter()
        .any(|marker| dir.join(marker).exists())
}

/// Resolve workspace root with priority: CLI arg > env var > auto-detect.
pub fn resolve_workspace(cli_arg: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = cli_arg {
        return Ok(canonicalize_or_absolute(path));
    }

    if let Ok(env_path) = env::var(ENV_WORKSPACE) {
        return Ok(canonicalize_or_absolute(Path::new(&env_path)));
    }

    if let Some(workspace) = find_workspace_root() {
        return Ok(workspace);
    }

    bail!(
        "Could not detect workspace root.\n\n\
         Run from a directory containing .mcp/, .git/, tsconfig.json, package.json, or other project markers.\n\n\
         Or specify explicitly:\n\
         \x20 --workspace /path/to/project\n\
         \x20 {}=/path/to/project",
        ENV_WORKSPACE
    )
}

/// Resolve database path with priority: CLI arg > env var > workspace/.mcp/index.db.
pub fn resolve_db_path(cli_arg: Option<&Path>, workspace: &Path) -> PathBuf {
    if let Some(path) = cli_arg {
        return if path.is_absolute() {
            path.to_path_buf()
        } else {
            workspace.join(path)
        };
    }

    if let Ok(env_path) = env::var(ENV_DB) {
        let path = PathBuf::from(env_path);
        return if path.is_absolute() {
            path
        } else {
            workspace.join(path)
        };
    }

    workspace.join(".mcp/index.db")
}

/// Monorepo heuristic from workspace markers. Purely advisory: exposed as
/// metadata, never branched on.
pub fn detect_monorepo(root: &Path) -> bool {
    if root.join("pnpm-workspace.yaml").exists() || root.join("lerna.json").exists() {
        return true;
    }
    if let Ok(raw) = std::fs::read_to_string(root.join("package.json")) {
        if raw.contains("\"workspaces\"") {
            return true;
        }
    }
    ["packages", "apps", "libs", "services"]
        .iter()
        .any(|layout| root.join(layout).is_dir())
}

fn canonicalize_or_absolute(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(path)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn finds_workspace_with_mcp_marker() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join(".mcp")).unwrap();

        let result = find_workspace_root_from(temp.path());
        assert_eq!(result, Some(temp.path().to_path_buf()));
    }

    #[test]
    fn finds_workspace_from_subdirectory() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join(".git")).unwrap();
        let subdir = temp.path().join("src").join("nested");
        fs::create_dir_all(&subdir).unwrap();

        let result = find_workspace_root_from(&subdir);
        assert_eq!(result, Some(temp.path().to_path_buf()));
    }

    #[test]
    fn finds_workspace_with_tsconfig() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("tsconfig.json"), "{}").unwrap();

        let result = find_workspace_root_from(temp.path());
        assert_eq!(result, Some(temp.path().to_path_buf()));
    }

    #[test]
    fn db_path_defaults_under_mcp() {
        let workspace = PathBuf::from("/home/user/project");
        let result = resolve_db_path(None, &workspace);
        assert_eq!(result, PathBuf::from("/home/user/project/.mcp/index.db"));
    }

    #[test]
    fn db_path_with_cli_arg() {
        let workspace = PathBuf::from("/home/user/project");
        let result = resolve_db_path(Some(Path::new("custom.db")), &workspace);
        assert_eq!(result, PathBuf::from("/home/user/project/custom.db"));
        let result = resolve_db_path(Some(Path::new("/tmp/index.db")), &workspace);
        assert_eq!(result, PathBuf::from("/tmp/index.db"));
    }

    #[test]
    fn monorepo_detection_is_marker_based() {
        let temp = tempdir().unwrap();
        assert!(!detect_monorepo(temp.path()));
        fs::write(temp.path().join("pnpm-workspace.yaml"), "packages:\n").unwrap();
        assert!(detect_monorepo(temp.path()));
    }

    #[test]
    fn workspaces_field_marks_monorepo() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("package.json"),
            r#"{"name":"x","workspaces":["packages/*"]}"#,
        )
        .unwrap();
        assert!(detect_monorepo(temp.path()));
    }
}
