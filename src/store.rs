//! SQLite-backed index store.
//!
//! Single-writer: every mutating operation runs inside a transaction and is
//! serialized through the owning connection. Readers observe committed state.
//! Schema migrations are sequential integers; the latest applied version is
//! recorded under `metadata('schema_version')`.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::symbol::Symbol;

/// Sequential migrations. Index in this array + 1 == schema version.
const MIGRATIONS: &[&str] = &[
    // v1: core tables
    r#"
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS files (
        path TEXT PRIMARY KEY,
        last_modified INTEGER NOT NULL,
        language TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS symbols (
        path TEXT PRIMARY KEY,
        symbols_json TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS dependencies (
        source TEXT NOT NULL,
        target TEXT NOT NULL,
        kind TEXT NOT NULL,
        line INTEGER NOT NULL,
        metadata_json TEXT NOT NULL,
        PRIMARY KEY (source, target, kind, line)
    );
    CREATE INDEX IF NOT EXISTS dependencies_target_idx ON dependencies(target);
    CREATE TABLE IF NOT EXISTS unresolved (
        path TEXT NOT NULL,
        specifier TEXT NOT NULL,
        error TEXT NOT NULL,
        metadata_json TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS unresolved_path_idx ON unresolved(path);
    "#,
    // v2: persisted trigram posting lists
    r#"
    CREATE TABLE IF NOT EXISTS trigrams (
        trigram TEXT PRIMARY KEY,
        paths_json TEXT NOT NULL
    );
    "#,
];

/// A tracked file row: mtime in ms since epoch plus the language tag the
/// parser reported.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: String,
    pub last_modified: i64,
    pub language: String,
}

/// Per-edge metadata recorded when an import resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMetadata {
    /// The imported names, or "*" for namespace imports.
    pub what: String,
    pub line: usize,
    /// Raw specifier before resolution.
    pub specifier: String,
    /// Resolution strategy that produced the target.
    pub strategy: String,
}

/// A resolved file-to-file dependency edge. Both endpoints are normalized
/// relative paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source: String,
    pub target: String,
    pub kind: String,
    pub metadata: EdgeMetadata,
}

/// An import the resolver could not map to a file inside the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnresolvedImport {
    pub specifier: String,
    pub error: String,
    pub metadata: EdgeMetadata,
}

#[derive(Debug)]
pub struct IndexStore {
    conn: RefCell<Connection>,
    db_path: PathBuf,
}

impl IndexStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: RefCell::new(conn),
            db_path: path.to_path_buf(),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: RefCell::new(conn),
            db_path: PathBuf::from(":memory:"),
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.borrow();
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS metadata (key TEXT PRIMARY KEY, value TEXT NOT NULL);",
        )?;
        let current: i64 = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            let version = (i + 1) as i64;
            if version <= current {
                continue;
            }
            conn.execute_batch(migration)
                .with_context(|| format!("schema migration {version} failed"))?;
            conn.execute(
                "INSERT INTO metadata(key, value) VALUES ('schema_version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![version.to_string()],
            )?;
        }
        Ok(())
    }

    // ==================== Metadata ====================

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.borrow();
        let value = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.borrow().execute(
            "INSERT INTO metadata(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn schema_version(&self) -> Result<i64> {
        Ok(self
            .get_metadata("schema_version")?
            .and_then(|v| v.parse().ok())
            .unwrap_or(0))
    }

    // ==================== Symbols ====================

    /// Replace the stored symbol list for a file atomically.
    pub fn replace_symbols(
        &self,
        rel_path: &str,
        last_modified: i64,
        language: &str,
        symbols: &[Symbol],
    ) -> Result<()> {
        let json = serde_json::to_string(symbols)?;
        let conn = &mut *self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO files(path, last_modified, language) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET
                 last_modified = excluded.last_modified,
                 language = excluded.language",
            params![rel_path, last_modified, language],
        )?;
        tx.execute(
            "INSERT INTO symbols(path, symbols_json) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET symbols_json = excluded.symbols_json",
            params![rel_path, json],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_file_record(&self, rel_path: &str) -> Result<Option<FileRecord>> {
        let conn = self.conn.borrow();
        let record = conn
            .query_row(
                "SELECT path, last_modified, language FROM files WHERE path = ?1",
                params![rel_path],
                |row| {
                    Ok(FileRecord {
                        path: row.get(0)?,
                        last_modified: row.get(1)?,
                        language: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn get_symbols(&self, rel_path: &str) -> Result<Option<Vec<Symbol>>> {
        let conn = self.conn.borrow();
        let json: Option<String> = conn
            .query_row(
                "SELECT symbols_json FROM symbols WHERE path = ?1",
                params![rel_path],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Streamed scan of the cold store. The callback sees each file's path
    /// and deserialized symbols in turn; rows that fail to deserialize are
    /// skipped.
    pub fn for_each_symbols<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&str, Vec<Symbol>),
    {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare("SELECT path, symbols_json FROM symbols ORDER BY path")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let path: String = row.get(0)?;
            let json: String = row.get(1)?;
            if let Ok(symbols) = serde_json::from_str::<Vec<Symbol>>(&json) {
                f(&path, symbols);
            }
        }
        Ok(())
    }

    /// Candidate rows whose serialized symbols contain the query, case
    /// insensitively. The caller narrows to actual name hits.
    pub fn symbols_like(&self, query: &str, limit: usize) -> Result<Vec<(String, Vec<Symbol>)>> {
        let pattern = format!("%{}%", escape_like(query));
        let conn = self.conn.borrow();
        // SQLite LIKE is case-insensitive for ASCII, which is exactly the
        // contract of the exact-search tier.
        let mut stmt = conn.prepare(
            "SELECT path, symbols_json FROM symbols
             WHERE symbols_json LIKE ?1 ESCAPE '\\'
             ORDER BY path LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![pattern, limit as i64])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let path: String = row.get(0)?;
            let json: String = row.get(1)?;
            if let Ok(symbols) = serde_json::from_str::<Vec<Symbol>>(&json) {
                out.push((path, symbols));
            }
        }
        Ok(out)
    }

    pub fn list_paths(&self) -> Result<HashSet<String>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare("SELECT path FROM files")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(rows)
    }

    /// Drop every row for a file: record, symbols, edges, unresolved.
    pub fn remove_file(&self, rel_path: &str) -> Result<()> {
        let conn = &mut *self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM files WHERE path = ?1", params![rel_path])?;
        tx.execute("DELETE FROM symbols WHERE path = ?1", params![rel_path])?;
        tx.execute(
            "DELETE FROM dependencies WHERE source = ?1",
            params![rel_path],
        )?;
        tx.execute("DELETE FROM unresolved WHERE path = ?1", params![rel_path])?;
        tx.commit()?;
        Ok(())
    }

    /// Drop every row under a directory prefix.
    pub fn remove_prefix(&self, rel_prefix: &str) -> Result<()> {
        let prefix = if rel_prefix.is_empty() || rel_prefix.ends_with('/') {
            rel_prefix.to_string()
        } else {
            format!("{rel_prefix}/")
        };
        let pattern = format!("{}%", escape_like(&prefix));
        let conn = &mut *self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM files WHERE path LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )?;
        tx.execute(
            "DELETE FROM symbols WHERE path LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )?;
        tx.execute(
            "DELETE FROM dependencies WHERE source LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )?;
        tx.execute(
            "DELETE FROM unresolved WHERE path LIKE ?1 ESCAPE '\\'",
            params![pattern],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Dependencies ====================

    /// Replace a file's outgoing edges and unresolved imports atomically.
    pub fn replace_dependencies(
        &self,
        rel_path: &str,
        last_modified: i64,
        outgoing: &[DependencyEdge],
        unresolved: &[UnresolvedImport],
    ) -> Result<()> {
        let conn = &mut *self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM dependencies WHERE source = ?1",
            params![rel_path],
        )?;
        tx.execute("DELETE FROM unresolved WHERE path = ?1", params![rel_path])?;
        for edge in outgoing {
            tx.execute(
                "INSERT OR REPLACE INTO dependencies(source, target, kind, line, metadata_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    edge.source,
                    edge.target,
                    edge.kind,
                    edge.metadata.line as i64,
                    serde_json::to_string(&edge.metadata)?,
                ],
            )?;
        }
        for entry in unresolved {
            tx.execute(
                "INSERT INTO unresolved(path, specifier, error, metadata_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    rel_path,
                    entry.specifier,
                    entry.error,
                    serde_json::to_string(&entry.metadata)?,
                ],
            )?;
        }
        tx.execute(
            "UPDATE files SET last_modified = ?2 WHERE path = ?1",
            params![rel_path, last_modified],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Drop a file's outgoing edges and unresolved imports without touching
    /// its symbols.
    pub fn clear_dependencies(&self, rel_path: &str) -> Result<()> {
        let conn = &mut *self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM dependencies WHERE source = ?1",
            params![rel_path],
        )?;
        tx.execute("DELETE FROM unresolved WHERE path = ?1", params![rel_path])?;
        tx.commit()?;
        Ok(())
    }

    pub fn dependencies_from(&self, rel_path: &str) -> Result<Vec<DependencyEdge>> {
        self.query_edges(
            "SELECT source, target, kind, metadata_json FROM dependencies WHERE source = ?1",
            rel_path,
        )
    }

    pub fn dependencies_to(&self, rel_path: &str) -> Result<Vec<DependencyEdge>> {
        self.query_edges(
            "SELECT source, target, kind, metadata_json FROM dependencies WHERE target = ?1",
            rel_path,
        )
    }

    fn query_edges(&self, sql: &str, arg: &str) -> Result<Vec<DependencyEdge>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params![arg])?;
        let mut edges = Vec::new();
        while let Some(row) = rows.next()? {
            let metadata_json: String = row.get(3)?;
            let metadata = serde_json::from_str(&metadata_json)?;
            edges.push(DependencyEdge {
                source: row.get(0)?,
                target: row.get(1)?,
                kind: row.get(2)?,
                metadata,
            });
        }
        Ok(edges)
    }

    pub fn unresolved_for(&self, rel_path: &str) -> Result<Vec<UnresolvedImport>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(
            "SELECT specifier, error, metadata_json FROM unresolved WHERE path = ?1",
        )?;
        let mut rows = stmt.query(params![rel_path])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let metadata_json: String = row.get(2)?;
            out.push(UnresolvedImport {
                specifier: row.get(0)?,
                error: row.get(1)?,
                metadata: serde_json::from_str(&metadata_json)?,
            });
        }
        Ok(out)
    }

    /// Paths that still carry at least one unresolved import.
    pub fn paths_with_unresolved(&self) -> Result<Vec<String>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare("SELECT DISTINCT path FROM unresolved ORDER BY path")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// In-degree per target path, for the reverse import index.
    pub fn import_in_degrees(&self) -> Result<HashMap<String, usize>> {
        let conn = self.conn.borrow();
        let mut stmt =
            conn.prepare("SELECT target, COUNT(DISTINCT source) FROM dependencies GROUP BY target")?;
        let mut rows = stmt.query([])?;
        let mut out = HashMap::new();
        while let Some(row) = rows.next()? {
            let target: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            out.insert(target, count as usize);
        }
        Ok(out)
    }

    pub fn counts(&self) -> Result<StoreCounts> {
        let conn = self.conn.borrow();
        let files: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?;
        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM dependencies", [], |r| r.get(0))?;
        let unresolved: i64 =
            conn.query_row("SELECT COUNT(*) FROM unresolved", [], |r| r.get(0))?;
        let files_with_unresolved: i64 = conn.query_row(
            "SELECT COUNT(DISTINCT path) FROM unresolved",
            [],
            |r| r.get(0),
        )?;
        Ok(StoreCounts {
            files: files as usize,
            edges: edges as usize,
            unresolved: unresolved as usize,
            files_with_unresolved: files_with_unresolved as usize,
        })
    }

    // ==================== Trigram postings ====================

    /// Rewrite the persisted posting lists wholesale. Idempotent.
    pub fn replace_trigram_postings(&self, postings: &[(String, Vec<String>)]) -> Result<()> {
        let conn = &mut *self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM trigrams", [])?;
        for (trigram, paths) in postings {
            tx.execute(
                "INSERT INTO trigrams(trigram, paths_json) VALUES (?1, ?2)",
                params![trigram, serde_json::to_string(paths)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_trigram_postings(&self) -> Result<Vec<(String, Vec<String>)>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare("SELECT trigram, paths_json FROM trigrams")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let trigram: String = row.get(0)?;
            let json: String = row.get(1)?;
            if let Ok(paths) = serde_json::from_str::<Vec<String>>(&json) {
                out.push((trigram, paths));
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StoreCounts {
    pub files: usize,
    pub edges: usize,
    pub unresolved: usize,
    pub files_with_unresolved: usize,
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::{Definition, DefinitionKind};

    fn def(name: &str) -> Symbol {
        Symbol::Definition(Definition {
            kind: DefinitionKind::Function,
            name: name.into(),
            signature: format!("function {name}()"),
            start_line: 1,
            end_line: 1,
            start_byte: 0,
            end_byte: 10,
            doc: None,
            modifiers: vec![],
            calls: vec![],
            content: None,
        })
    }

    fn edge(source: &str, target: &str) -> DependencyEdge {
        DependencyEdge {
            source: source.into(),
            target: target.into(),
            kind: "named".into(),
            metadata: EdgeMetadata {
                what: "x".into(),
                line: 1,
                specifier: "./x".into(),
                strategy: "relative".into(),
            },
        }
    }

    #[test]
    fn migrates_to_latest_version() {
        let store = IndexStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), MIGRATIONS.len() as i64);
        // Re-running migration is a no-op.
        store.migrate().unwrap();
        assert_eq!(store.schema_version().unwrap(), MIGRATIONS.len() as i64);
    }

    #[test]
    fn replace_and_fetch_symbols() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .replace_symbols("src/a.ts", 100, "typescript", &[def("foo")])
            .unwrap();
        let record = store.get_file_record("src/a.ts").unwrap().unwrap();
        assert_eq!(record.last_modified, 100);
        assert_eq!(record.language, "typescript");
        let symbols = store.get_symbols("src/a.ts").unwrap().unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name(), "foo");

        // Replacing overwrites rather than appending.
        store
            .replace_symbols("src/a.ts", 200, "typescript", &[def("bar"), def("baz")])
            .unwrap();
        let symbols = store.get_symbols("src/a.ts").unwrap().unwrap();
        assert_eq!(symbols.len(), 2);
    }

    #[test]
    fn like_search_is_case_insensitive() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .replace_symbols("src/a.ts", 1, "typescript", &[def("Authenticator")])
            .unwrap();
        let hits = store.symbols_like("authent", 100).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "src/a.ts");
    }

    #[test]
    fn dependencies_replace_atomically() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .replace_symbols("a.ts", 1, "typescript", &[])
            .unwrap();
        store
            .replace_dependencies("a.ts", 1, &[edge("a.ts", "b.ts")], &[])
            .unwrap();
        assert_eq!(store.dependencies_from("a.ts").unwrap().len(), 1);
        assert_eq!(store.dependencies_to("b.ts").unwrap().len(), 1);

        store
            .replace_dependencies(
                "a.ts",
                2,
                &[edge("a.ts", "c.ts")],
                &[UnresolvedImport {
                    specifier: "ghost".into(),
                    error: "not found".into(),
                    metadata: EdgeMetadata {
                        what: "g".into(),
                        line: 2,
                        specifier: "ghost".into(),
                        strategy: "unresolved".into(),
                    },
                }],
            )
            .unwrap();
        let edges = store.dependencies_from("a.ts").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].target, "c.ts");
        assert!(store.dependencies_to("b.ts").unwrap().is_empty());
        assert_eq!(store.paths_with_unresolved().unwrap(), vec!["a.ts"]);
    }

    #[test]
    fn remove_file_drops_all_rows() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .replace_symbols("a.ts", 1, "typescript", &[def("f")])
            .unwrap();
        store
            .replace_dependencies("a.ts", 1, &[edge("a.ts", "b.ts")], &[])
            .unwrap();
        store.remove_file("a.ts").unwrap();
        assert!(store.get_symbols("a.ts").unwrap().is_none());
        assert!(store.get_file_record("a.ts").unwrap().is_none());
        assert!(store.dependencies_from("a.ts").unwrap().is_empty());
    }

    #[test]
    fn remove_prefix_scopes_to_directory() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .replace_symbols("src/a.ts", 1, "typescript", &[])
            .unwrap();
        store
            .replace_symbols("src2/b.ts", 1, "typescript", &[])
            .unwrap();
        store.remove_prefix("src").unwrap();
        assert!(store.get_file_record("src/a.ts").unwrap().is_none());
        assert!(store.get_file_record("src2/b.ts").unwrap().is_some());
    }

    #[test]
    fn trigram_postings_round_trip() {
        let store = IndexStore::open_in_memory().unwrap();
        let postings = vec![
            ("abc".to_string(), vec!["a.ts".to_string(), "b.ts".to_string()]),
            ("bcd".to_string(), vec!["a.ts".to_string()]),
        ];
        store.replace_trigram_postings(&postings).unwrap();
        let mut loaded = store.load_trigram_postings().unwrap();
        loaded.sort();
        assert_eq!(loaded, postings);
        // Rebuild is idempotent.
        store.replace_trigram_postings(&postings).unwrap();
        assert_eq!(store.load_trigram_postings().unwrap().len(), 2);
    }
}
