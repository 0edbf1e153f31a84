//! Document persistence for the video catalog.
//!
//! Videos are stored as JSON documents in SQLite. The `id` column is an
//! `AUTOINCREMENT` key, so identifiers only ever grow and are never reused,
//! which is what cursor pagination relies on. A companion FTS5 table indexes
//! the text fields (title, description, transcript) for full-text search; its
//! rowid is the video id and it is rewritten in the same transaction as the
//! document.

use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{Context, Result};
use rusqlite::{
    Connection, OptionalExtension, TransactionBehavior,
    functions::FunctionFlags,
    params, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};
use serde_json::Value;

use crate::counts::FieldMatchCounts;
use crate::fields::FieldPaths;
use crate::query::{Filter, Projection, lookup, set_path};
use crate::record::{contains_folded, flatten_text};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store-assigned identifier. Totally ordered in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VideoId(i64);

impl VideoId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a video identifier: {0:?}")]
pub struct ParseVideoIdError(pub String);

impl FromStr for VideoId {
    type Err = ParseVideoIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().parse::<i64>() {
            Ok(raw) if raw > 0 => Ok(Self(raw)),
            _ => Err(ParseVideoIdError(value.to_owned())),
        }
    }
}

/// A document together with its identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: VideoId,
    pub doc: Value,
}

/// Operations the catalog needs from its backing document store.
///
/// Implementations are blocking; async callers run them on the blocking
/// thread pool.
pub trait DocumentStore: Send + Sync + 'static {
    /// Documents matching `filter`, ordered by identifier ascending, at most
    /// `limit` of them, each reduced to `projection`.
    fn find_matching(
        &self,
        filter: &Filter,
        projection: &Projection,
        limit: u64,
    ) -> Result<Vec<StoredDocument>>;

    /// How many documents match each filter, computed in one pass.
    fn count_each(&self, filters: &[Filter]) -> Result<Vec<u64>>;

    /// Size of the whole collection, ignoring any filter.
    fn count_estimate(&self) -> Result<u64>;

    fn get(&self, id: VideoId) -> Result<Option<StoredDocument>>;

    fn insert(&self, doc: &Value) -> Result<VideoId>;

    /// Sets each `(path, value)` pair on the document, leaving other fields
    /// untouched. Returns the number of documents matched (0 or 1).
    fn update_fields(&self, id: VideoId, fields: &[(&'static str, Value)]) -> Result<u64>;

    /// Returns the number of documents removed (0 or 1).
    fn delete(&self, id: VideoId) -> Result<u64>;

    /// Per-field match counts over the full-text candidates for `keyword`.
    /// Candidates are visited one at a time, never collected.
    fn text_search_count(&self, keyword: &str) -> Result<FieldMatchCounts>;
}

/// SQLite-backed [`DocumentStore`]. Cheap to clone; each call opens its own
/// short-lived connection so concurrent requests do not share one.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
    paths: FieldPaths,
}

impl SqliteStore {
    /// Opens (creating if needed) the database and ensures the schema exists.
    /// WAL mode is enabled so readers do not block the writer.
    pub fn open(path: impl AsRef<Path>, paths: FieldPaths) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("opening catalog DB {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("enabling WAL mode for catalog DB")?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .context("setting catalog DB synchronous mode")?;
        ensure_tables(&mut conn)?;

        tracing::info!(path = %path.display(), "catalog store opened");
        Ok(Self {
            db_path: path.to_path_buf(),
            paths,
        })
    }

    /// Checkpoints the WAL so the database file is self-contained once the
    /// process exits.
    pub fn close(self) -> Result<()> {
        self.with_connection(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .context("checkpointing catalog WAL")
        })?;
        tracing::info!(path = %self.db_path.display(), "catalog store closed");
        Ok(())
    }

    fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = Connection::open(&self.db_path)
            .with_context(|| format!("opening catalog DB {}", self.db_path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        register_functions(&conn).context("registering catalog SQL functions")?;
        f(&mut conn)
    }

    fn index_body(&self, doc: &Value) -> String {
        self.paths
            .text_paths()
            .iter()
            .filter_map(|path| lookup(doc, path))
            .map(flatten_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn write_index(&self, conn: &Connection, id: VideoId, doc: &Value) -> Result<()> {
        conn.execute("DELETE FROM videos_fts WHERE rowid = ?1", params![id.get()])?;
        conn.execute(
            "INSERT INTO videos_fts (rowid, body) VALUES (?1, ?2)",
            params![id.get(), self.index_body(doc)],
        )?;
        Ok(())
    }
}

fn ensure_tables(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS videos (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            doc TEXT NOT NULL
        );

        CREATE VIRTUAL TABLE IF NOT EXISTS videos_fts USING fts5(body);
        "#,
    )
    .context("creating catalog tables")?;
    tx.commit()?;
    Ok(())
}

/// `contains_ci(haystack, needle)`: 1 when `haystack` contains the already
/// lowercased `needle`, ignoring case. Numbers are matched on their decimal
/// text; NULL and blobs never match.
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "contains_ci",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let needle: String = ctx.get(1)?;
            let matched = match ctx.get_raw(0) {
                ValueRef::Text(bytes) => contains_folded(&String::from_utf8_lossy(bytes), &needle),
                ValueRef::Integer(number) => number.to_string().contains(&needle),
                ValueRef::Real(number) => number.to_string().contains(&needle),
                ValueRef::Null | ValueRef::Blob(_) => false,
            };
            Ok(matched)
        },
    )
}

impl DocumentStore for SqliteStore {
    fn find_matching(
        &self,
        filter: &Filter,
        projection: &Projection,
        limit: u64,
    ) -> Result<Vec<StoredDocument>> {
        let mut sql = SqlWhere::default();
        sql.push(filter);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        sql.params.push(SqlValue::Integer(limit));

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT id, doc FROM videos WHERE {} ORDER BY id ASC LIMIT ?",
                sql.text
            ))?;
            let mut rows = stmt.query(params_from_iter(sql.params.iter()))?;
            let mut docs = Vec::new();
            while let Some(row) = rows.next()? {
                let stored = row_to_document(row)?;
                docs.push(StoredDocument {
                    id: stored.id,
                    doc: projection.apply(&stored.doc),
                });
            }
            Ok(docs)
        })
    }

    fn count_each(&self, filters: &[Filter]) -> Result<Vec<u64>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = SqlWhere::default();
        let columns: Vec<String> = filters
            .iter()
            .map(|filter| {
                let start = sql.text.len();
                sql.push(filter);
                let condition = sql.text.split_off(start);
                format!("COUNT(CASE WHEN {condition} THEN 1 END)")
            })
            .collect();

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {} FROM videos", columns.join(", ")))?;
            let counts = stmt.query_row(params_from_iter(sql.params.iter()), |row| {
                (0..filters.len())
                    .map(|index| row.get::<_, i64>(index).map(|count| count as u64))
                    .collect::<rusqlite::Result<Vec<u64>>>()
            })?;
            Ok(counts)
        })
    }

    fn count_estimate(&self) -> Result<u64> {
        self.with_connection(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    fn get(&self, id: VideoId) -> Result<Option<StoredDocument>> {
        self.with_connection(|conn| {
            let raw: Option<String> = conn
                .query_row("SELECT doc FROM videos WHERE id = ?1", params![id.get()], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(raw) = raw else {
                return Ok(None);
            };
            let doc = serde_json::from_str(&raw)
                .with_context(|| format!("parsing stored document {id}"))?;
            Ok(Some(StoredDocument { id, doc }))
        })
    }

    fn insert(&self, doc: &Value) -> Result<VideoId> {
        let raw = serde_json::to_string(doc).context("serializing video document")?;
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute("INSERT INTO videos (doc) VALUES (?1)", params![raw])?;
            let id = VideoId::new(tx.last_insert_rowid());
            self.write_index(&tx, id, doc)?;
            tx.commit()?;
            Ok(id)
        })
    }

    fn update_fields(&self, id: VideoId, fields: &[(&'static str, Value)]) -> Result<u64> {
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let raw: Option<String> = tx
                .query_row("SELECT doc FROM videos WHERE id = ?1", params![id.get()], |row| {
                    row.get(0)
                })
                .optional()?;
            let Some(raw) = raw else {
                return Ok(0);
            };

            let mut doc: Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing stored document {id}"))?;
            for (path, value) in fields {
                set_path(&mut doc, path, value.clone());
            }

            let raw = serde_json::to_string(&doc).context("serializing video document")?;
            tx.execute(
                "UPDATE videos SET doc = ?1 WHERE id = ?2",
                params![raw, id.get()],
            )?;
            self.write_index(&tx, id, &doc)?;
            tx.commit()?;
            Ok(1)
        })
    }

    fn delete(&self, id: VideoId) -> Result<u64> {
        self.with_connection(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let removed = tx.execute("DELETE FROM videos WHERE id = ?1", params![id.get()])?;
            tx.execute("DELETE FROM videos_fts WHERE rowid = ?1", params![id.get()])?;
            tx.commit()?;
            Ok(removed as u64)
        })
    }

    fn text_search_count(&self, keyword: &str) -> Result<FieldMatchCounts> {
        let Some(query) = fts_query(keyword) else {
            return Ok(FieldMatchCounts::default());
        };
        let needle = keyword.to_lowercase();

        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, doc FROM videos \
                 WHERE id IN (SELECT rowid FROM videos_fts WHERE videos_fts MATCH ?1)",
            )?;
            let mut rows = stmt.query(params![query])?;
            let mut counts = FieldMatchCounts::default();
            let mut candidates = 0u64;
            while let Some(row) = rows.next()? {
                let stored = row_to_document(row)?;
                counts.tally(&stored.doc, &self.paths, &needle);
                candidates += 1;
            }
            tracing::debug!(keyword, candidates, ?counts, "counted field matches");
            Ok(counts)
        })
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> Result<StoredDocument> {
    let id = VideoId::new(row.get("id")?);
    let raw: String = row.get("doc")?;
    let doc =
        serde_json::from_str(&raw).with_context(|| format!("parsing stored document {id}"))?;
    Ok(StoredDocument { id, doc })
}

/// A WHERE clause under construction with its positional parameters.
#[derive(Debug, Default)]
struct SqlWhere {
    text: String,
    params: Vec<SqlValue>,
}

impl SqlWhere {
    fn push(&mut self, filter: &Filter) {
        match filter {
            Filter::And(members) if members.is_empty() => self.text.push('1'),
            Filter::And(members) => {
                self.text.push('(');
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        self.text.push_str(" AND ");
                    }
                    self.push(member);
                }
                self.text.push(')');
            }
            Filter::NonBlankString { path } => {
                self.text.push_str(
                    "(json_type(doc, ?) = 'text' AND \
                     trim(json_extract(doc, ?), ' ' || char(9, 10, 11, 12, 13)) <> '')",
                );
                self.params.push(json_path(path));
                self.params.push(json_path(path));
            }
            Filter::ContainsText { path, needle } => {
                self.text.push_str("contains_ci(json_extract(doc, ?), ?)");
                self.params.push(json_path(path));
                self.params.push(SqlValue::Text(needle.to_lowercase()));
            }
            Filter::TextSearch { keyword } => match fts_query(keyword) {
                Some(query) => {
                    self.text.push_str(
                        "(id IN (SELECT rowid FROM videos_fts WHERE videos_fts MATCH ?))",
                    );
                    self.params.push(SqlValue::Text(query));
                }
                None => self.text.push('0'),
            },
            Filter::IdAfter(id) => {
                self.text.push_str("(id > ?)");
                self.params.push(SqlValue::Integer(id.get()));
            }
        }
    }
}

fn json_path(path: &str) -> SqlValue {
    SqlValue::Text(format!("$.{path}"))
}

/// Builds an FTS5 query matching any whitespace-separated term of the
/// keyword. Terms are quoted so operators in user input stay inert.
pub fn fts_query(keyword: &str) -> Option<String> {
    let terms: Vec<String> = keyword
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
