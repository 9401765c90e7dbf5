//! SQLite storage implementation

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};
use tempfile::TempDir;

use super::schema;
use crate::context::RequestContext;
use crate::dump::{Dump, PackageDefinition, PackageReference, Upload, UploadState};
use crate::{Error, Result};

/// Maximum number of commits walked in either direction from the commit
/// being browsed when computing same-repository visibility.
pub const MAX_TRAVERSAL_LIMIT: usize = 100;

/// Number of SQLite VM steps between cancellation checks
const PROGRESS_OPS: i32 = 1000;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TEMPORARY_DB_NAME: &str = "xrepo.db";

/// Columns of `lsif_uploads` / `lsif_dumps` in `row_to_upload` order
pub(crate) const UPLOAD_COLUMNS: &str = "id, commit_hash, root, visible_at_tip, uploaded_at, state, \
    failure_summary, failure_stacktrace, started_at, finished_at, tracing_context, repository_id, indexer";

/// Where the database lives; pagers open their own connection to it
#[derive(Debug, Clone)]
pub(crate) enum DatabaseLocation {
    File(PathBuf),
    /// Private directory, deleted once the store and every pager are gone
    Temporary(Arc<TempDir>),
}

impl DatabaseLocation {
    fn path(&self) -> PathBuf {
        match self {
            DatabaseLocation::File(path) => path.clone(),
            DatabaseLocation::Temporary(dir) => dir.path().join(TEMPORARY_DB_NAME),
        }
    }
}

/// SQLite-backed dump metadata store
///
/// Every store runs in WAL mode, so open pagers keep reading their snapshot
/// while ingestion writes through the store.
pub struct SqliteStore {
    conn: Connection,
    location: DatabaseLocation,
    traversal_limit: usize,
}

impl SqliteStore {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_at(DatabaseLocation::File(path.to_path_buf()))
    }

    /// Open a throwaway database in a fresh temporary directory (for testing)
    pub fn open_temporary() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("xrepo-").tempdir()?;
        Self::open_at(DatabaseLocation::Temporary(Arc::new(dir)))
    }

    fn open_at(location: DatabaseLocation) -> Result<Self> {
        let conn = Self::connect(&location)?;
        let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!("Opened {} (journal_mode={})", location.path().display(), journal_mode);

        let store = Self { conn, location, traversal_limit: MAX_TRAVERSAL_LIMIT };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Builder: bound commit-graph walks to `limit` steps in each direction
    pub fn with_traversal_limit(mut self, limit: usize) -> Self {
        self.traversal_limit = limit;
        self
    }

    pub fn traversal_limit(&self) -> usize {
        self.traversal_limit
    }

    fn connect(location: &DatabaseLocation) -> Result<Connection> {
        let conn = Connection::open(location.path())?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        rusqlite::vtab::array::load_module(&conn)?;
        Ok(conn)
    }

    /// Open a fresh connection to the same database, along with the
    /// location handle that keeps a temporary database alive
    pub(crate) fn open_connection(&self) -> Result<(Connection, DatabaseLocation)> {
        Ok((Self::connect(&self.location)?, self.location.clone()))
    }

    /// Initialize the database schema
    fn initialize_schema(&self) -> Result<()> {
        for stmt in schema::all_schema_statements() {
            self.conn.execute(stmt, [])?;
        }
        Ok(())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    // ========== Upload Operations ==========

    /// Insert an upload row
    pub fn insert_upload(&self, upload: &Upload) -> Result<()> {
        upload.validate()?;
        self.conn.execute(
            r#"
            INSERT INTO lsif_uploads (id, commit_hash, root, visible_at_tip, uploaded_at, state,
                failure_summary, failure_stacktrace, started_at, finished_at, tracing_context,
                repository_id, indexer)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                upload.id,
                upload.commit,
                upload.root,
                upload.visible_at_tip,
                upload.uploaded_at,
                upload.state.as_str(),
                upload.failure_summary,
                upload.failure_stacktrace,
                upload.started_at,
                upload.finished_at,
                upload.tracing_context,
                upload.repository_id,
                upload.indexer,
            ],
        )?;
        Ok(())
    }

    /// Get an upload by ID, whatever its state
    pub fn get_upload(&self, ctx: &RequestContext, id: i64) -> Result<Option<Upload>> {
        let sql = format!("SELECT {} FROM lsif_uploads WHERE id = ?1", UPLOAD_COLUMNS);
        run_with_context(&self.conn, ctx, |conn| {
            conn.query_row(&sql, [id], row_to_upload).optional()
        })
    }

    /// Get a dump (completed upload) by ID
    pub fn get_dump(&self, ctx: &RequestContext, id: i64) -> Result<Option<Dump>> {
        let sql = format!("SELECT {} FROM lsif_dumps WHERE id = ?1", UPLOAD_COLUMNS);
        let upload = run_with_context(&self.conn, ctx, |conn| {
            conn.query_row(&sql, [id], row_to_upload).optional()
        })?;
        upload.map(Dump::try_from).transpose()
    }

    // ========== Package Operations ==========

    /// Insert a package definition row
    pub fn insert_package(&self, definition: &PackageDefinition) -> Result<()> {
        self.conn.execute(
            "INSERT INTO lsif_packages (scheme, name, version, dump_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                definition.package.scheme,
                definition.package.name,
                definition.package.version,
                definition.dump_id,
            ],
        )?;
        Ok(())
    }

    /// Find the dump that defines a package.
    ///
    /// Returns `Ok(None)` when no completed dump defines it. When several
    /// dumps claim the same package the most recently created one (highest
    /// dump id) wins.
    pub fn get_package(
        &self,
        ctx: &RequestContext,
        scheme: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<Dump>> {
        let columns = prefixed_upload_columns("d");
        let sql = format!(
            r#"
            SELECT {columns}
            FROM lsif_packages p
            JOIN lsif_dumps d ON d.id = p.dump_id
            WHERE p.scheme = ?1 AND p.name = ?2 AND p.version = ?3
            ORDER BY d.id DESC
            LIMIT 1
            "#
        );

        let upload = run_with_context(&self.conn, ctx, |conn| {
            conn.query_row(&sql, params![scheme, name, version], row_to_upload)
                .optional()
        })?;

        tracing::debug!(
            "Package {}:{}@{} -> {:?}",
            scheme,
            name,
            version,
            upload.as_ref().map(|u| u.id)
        );
        upload.map(Dump::try_from).transpose()
    }

    // ========== Reference Operations ==========

    /// Insert a package reference row
    pub fn insert_reference(&self, reference: &PackageReference) -> Result<()> {
        self.conn.execute(
            "INSERT INTO lsif_references (scheme, name, version, dump_id, filter) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                reference.package.scheme,
                reference.package.name,
                reference.package.version,
                reference.dump_id,
                reference.filter,
            ],
        )?;
        Ok(())
    }

    // ========== Commit Graph Operations ==========

    /// Record a commit and its parents for a repository
    pub fn insert_commit(&self, repository_id: i64, commit: &str, parents: &[&str]) -> Result<()> {
        if parents.is_empty() {
            self.conn.execute(
                "INSERT OR IGNORE INTO lsif_commits (repository_id, commit_hash, parent_commit_hash) VALUES (?1, ?2, NULL)",
                params![repository_id, commit],
            )?;
        }
        for parent in parents {
            self.conn.execute(
                "INSERT OR IGNORE INTO lsif_commits (repository_id, commit_hash, parent_commit_hash) VALUES (?1, ?2, ?3)",
                params![repository_id, commit, parent],
            )?;
        }
        Ok(())
    }

    /// Record many commits in one transaction
    pub fn insert_commits(&self, repository_id: i64, commits: &[(&str, Vec<&str>)]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for (commit, parents) in commits {
            self.insert_commit(repository_id, commit, parents)?;
        }
        tx.commit()?;
        Ok(())
    }

    // ========== Statistics ==========

    fn count_rows(&self, ctx: &RequestContext, table: &str) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        let count: i64 = run_with_context(&self.conn, ctx, |conn| conn.query_row(&sql, [], |row| row.get(0)))?;
        Ok(count as usize)
    }

    /// Get database statistics
    pub fn stats(&self, ctx: &RequestContext) -> Result<DbStats> {
        Ok(DbStats {
            uploads: self.count_rows(ctx, "lsif_uploads")?,
            dumps: self.count_rows(ctx, "lsif_dumps")?,
            packages: self.count_rows(ctx, "lsif_packages")?,
            references: self.count_rows(ctx, "lsif_references")?,
            commits: self.count_rows(ctx, "lsif_commits")?,
        })
    }
}

fn prefixed_upload_columns(alias: &str) -> String {
    UPLOAD_COLUMNS
        .split(", ")
        .map(|column| format!("{}.{}", alias, column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Helper to convert a row to an Upload
pub(crate) fn row_to_upload(row: &rusqlite::Row) -> rusqlite::Result<Upload> {
    let state_str: String = row.get(5)?;
    let state: UploadState = state_str.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Upload {
        id: row.get(0)?,
        commit: row.get(1)?,
        root: row.get(2)?,
        visible_at_tip: row.get(3)?,
        uploaded_at: row.get(4)?,
        state,
        failure_summary: row.get(6)?,
        failure_stacktrace: row.get(7)?,
        started_at: row.get(8)?,
        finished_at: row.get(9)?,
        tracing_context: row.get(10)?,
        repository_id: row.get(11)?,
        indexer: row.get(12)?,
    })
}

/// Run `f` on `conn`, interrupting it once `ctx` is cancelled or expires.
///
/// An interrupted statement surfaces as `Error::Canceled`.
pub(crate) fn run_with_context<T>(
    conn: &Connection,
    ctx: &RequestContext,
    f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> Result<T> {
    ctx.check()?;

    let watched = ctx.clone();
    conn.progress_handler(PROGRESS_OPS, Some(move || watched.is_done()));
    let result = f(conn);
    conn.progress_handler(0, None::<fn() -> bool>);

    result.map_err(|err| match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::OperationInterrupted => {
            Error::Canceled
        }
        other if ctx.is_done() => {
            tracing::debug!("Query failed after cancellation: {}", other);
            Error::Canceled
        }
        other => Error::Storage(other),
    })
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub uploads: usize,
    pub dumps: usize,
    pub packages: usize,
    pub references: usize,
    pub commits: usize,
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Uploads: {}", self.uploads)?;
        writeln!(f, "  Dumps: {}", self.dumps)?;
        writeln!(f, "  Packages: {}", self.packages)?;
        writeln!(f, "  References: {}", self.references)?;
        writeln!(f, "  Commit edges: {}", self.commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::PackageKey;
    use chrono::{TimeZone, Utc};

    const COMMIT: &str = "deadbeef01deadbeef02deadbeef03deadbeef04";

    fn leftpad() -> PackageKey {
        PackageKey::new("gomod", "leftpad", "0.1.0")
    }

    #[test]
    fn test_get_package_missing() {
        let store = SqliteStore::open_temporary().unwrap();
        let ctx = RequestContext::background();

        let dump = store.get_package(&ctx, "gomod", "leftpad", "0.1.0").unwrap();
        assert!(dump.is_none());
    }

    #[test]
    fn test_get_package_roundtrip() {
        let store = SqliteStore::open_temporary().unwrap();
        let ctx = RequestContext::background();

        let t1 = Utc.with_ymd_and_hms(2020, 3, 1, 12, 0, 0).unwrap();
        let t2 = t1 + chrono::Duration::minutes(1);
        let t3 = t1 + chrono::Duration::minutes(2);
        let upload = Upload {
            id: 1,
            commit: COMMIT.to_string(),
            root: "sub/".to_string(),
            visible_at_tip: true,
            uploaded_at: t1,
            state: UploadState::Completed,
            failure_summary: None,
            failure_stacktrace: None,
            started_at: Some(t2),
            finished_at: Some(t3),
            tracing_context: r#"{"id": 42}"#.to_string(),
            repository_id: 50,
            indexer: "lsif-go".to_string(),
        };
        store.insert_upload(&upload).unwrap();
        store
            .insert_package(&PackageDefinition { package: leftpad(), dump_id: 1 })
            .unwrap();

        let dump = store.get_package(&ctx, "gomod", "leftpad", "0.1.0").unwrap().unwrap();
        assert_eq!(dump, Dump::try_from(upload).unwrap());
    }

    #[test]
    fn test_get_package_ignores_incomplete_uploads() {
        let store = SqliteStore::open_temporary().unwrap();
        let ctx = RequestContext::background();

        let upload = Upload::completed(1, 50, COMMIT).with_state(UploadState::Processing);
        store.insert_upload(&upload).unwrap();
        store
            .insert_package(&PackageDefinition { package: leftpad(), dump_id: 1 })
            .unwrap();

        assert!(store.get_package(&ctx, "gomod", "leftpad", "0.1.0").unwrap().is_none());
        assert!(store.get_upload(&ctx, 1).unwrap().is_some());
        assert!(store.get_dump(&ctx, 1).unwrap().is_none());
    }

    #[test]
    fn test_get_package_duplicate_definitions_prefer_newest_dump() {
        let store = SqliteStore::open_temporary().unwrap();
        let ctx = RequestContext::background();

        for id in [3, 7, 5] {
            store.insert_upload(&Upload::completed(id, 50 + id, COMMIT)).unwrap();
            store
                .insert_package(&PackageDefinition { package: leftpad(), dump_id: id })
                .unwrap();
        }

        let dump = store.get_package(&ctx, "gomod", "leftpad", "0.1.0").unwrap().unwrap();
        assert_eq!(dump.id, 7);
        assert_eq!(dump.repository_id, 57);
    }

    #[test]
    fn test_get_package_malformed_row_is_an_error() {
        let store = SqliteStore::open_temporary().unwrap();
        let ctx = RequestContext::background();

        store.insert_upload(&Upload::completed(1, 50, COMMIT)).unwrap();
        store
            .insert_package(&PackageDefinition { package: leftpad(), dump_id: 1 })
            .unwrap();
        store
            .connection()
            .execute("UPDATE lsif_uploads SET uploaded_at = 'not a timestamp' WHERE id = 1", [])
            .unwrap();

        let err = store.get_package(&ctx, "gomod", "leftpad", "0.1.0").unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }

    #[test]
    fn test_get_package_canceled_context() {
        let store = SqliteStore::open_temporary().unwrap();
        let ctx = RequestContext::background();
        ctx.cancel();

        let err = store.get_package(&ctx, "gomod", "leftpad", "0.1.0").unwrap_err();
        assert!(err.is_canceled());
    }

    #[test]
    fn test_insert_upload_rejects_short_commit() {
        let store = SqliteStore::open_temporary().unwrap();
        let err = store.insert_upload(&Upload::completed(1, 50, "deadbeef")).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_stats() {
        let store = SqliteStore::open_temporary().unwrap();
        store.insert_upload(&Upload::completed(1, 50, COMMIT)).unwrap();
        store
            .insert_upload(&Upload::completed(2, 50, COMMIT).with_state(UploadState::Errored))
            .unwrap();
        store
            .insert_reference(&PackageReference::new(leftpad(), 1, b"f1".to_vec()))
            .unwrap();
        store.insert_commits(50, &[(COMMIT, vec![])]).unwrap();

        let stats = store.stats(&RequestContext::background()).unwrap();
        assert_eq!(stats.uploads, 2);
        assert_eq!(stats.dumps, 1);
        assert_eq!(stats.packages, 0);
        assert_eq!(stats.references, 1);
        assert_eq!(stats.commits, 1);
    }

    #[test]
    fn test_temporary_stores_are_isolated() {
        let ctx = RequestContext::background();
        let a = SqliteStore::open_temporary().unwrap();
        let b = SqliteStore::open_temporary().unwrap();
        a.insert_upload(&Upload::completed(1, 50, COMMIT)).unwrap();

        assert_eq!(a.stats(&ctx).unwrap().uploads, 1);
        assert_eq!(b.stats(&ctx).unwrap().uploads, 0);
    }

    #[test]
    fn test_stats_canceled_context() {
        let store = SqliteStore::open_temporary().unwrap();
        let ctx = RequestContext::background();
        ctx.cancel();

        assert!(store.stats(&ctx).unwrap_err().is_canceled());
        assert!(store.get_upload(&ctx, 1).unwrap_err().is_canceled());
    }

    #[test]
    fn test_temporary_store_runs_in_wal_mode() {
        let store = SqliteStore::open_temporary().unwrap();
        let mode: String = store
            .connection()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
    }
}
