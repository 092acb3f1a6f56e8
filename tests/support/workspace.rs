#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use quarry::config::Config;
use quarry::indexer::{build_full_index, Engine, IndexProgress};
use tempfile::TempDir;

/// Builder for creating test workspaces with a fluent API.
pub struct TestWorkspaceBuilder {
    files: HashMap<PathBuf, String>,
    config: Config,
    auto_index: bool,
}

impl Default for TestWorkspaceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspaceBuilder {
    pub fn new() -> Self {
        Self {
            files: HashMap::new(),
            config: Config::default(),
            auto_index: true,
        }
    }

    /// Add a file with inline content.
    pub fn with_file(mut self, path: impl AsRef<Path>, content: impl Into<String>) -> Self {
        self.files
            .insert(path.as_ref().to_path_buf(), content.into());
        self
    }

    /// Override the engine configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Disable the automatic baseline index.
    pub fn without_auto_index(mut self) -> Self {
        self.auto_index = false;
        self
    }

    /// Build the workspace: write files, open the engine, index.
    pub fn build(self) -> Result<TestWorkspace> {
        let dir = TempDir::new()?;
        let root = dir.path().to_path_buf();
        for (rel, content) in &self.files {
            let path = root.join(rel);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, content)?;
        }
        let engine = Engine::open(&root, &root.join(".mcp/index.db"), self.config)?;
        if self.auto_index {
            build_full_index(&engine, None::<fn(&IndexProgress)>)?;
        }
        Ok(TestWorkspace {
            _dir: dir,
            root,
            engine,
        })
    }
}

/// A built test workspace holding the tempdir alive.
pub struct TestWorkspace {
    _dir: TempDir,
    pub root: PathBuf,
    pub engine: Engine,
}

impl TestWorkspace {
    pub fn abs(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn write(&self, rel: &str, content: &str) -> Result<()> {
        let path = self.abs(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn read(&self, rel: &str) -> String {
        std::fs::read_to_string(self.abs(rel)).unwrap_or_default()
    }

    pub fn reindex(&self) -> Result<()> {
        build_full_index(&self.engine, None::<fn(&IndexProgress)>)?;
        Ok(())
    }
}
