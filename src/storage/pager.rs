//! Reference pagers - snapshot-stable, randomly addressable pages
//!
//! A pager owns a dedicated connection holding an open read transaction.
//! The total count is read once, right after `BEGIN`, which pins the
//! snapshot every later page is served from. Concurrent ingestion can add
//! or remove rows without the pager ever disagreeing with its own total.
//!
//! Ordering is by dump id ascending (row id breaks ties), so a page depends
//! only on its offset and never on which pages were fetched before it.

use std::rc::Rc;

use rusqlite::types::Value;
use rusqlite::vtab::array::Array;
use rusqlite::{Connection, params};

use super::commits::CommitGraph;
use super::sqlite::{DatabaseLocation, SqliteStore, run_with_context};
use crate::context::RequestContext;
use crate::dump::{PackageKey, Reference};
use crate::{Error, Result};

const SAME_REPO_COUNT: &str = r#"
SELECT COUNT(*)
FROM lsif_references r
JOIN lsif_dumps d ON d.id = r.dump_id
WHERE r.scheme = ?1 AND r.name = ?2 AND r.version = ?3
  AND d.repository_id = ?4
  AND d.commit_hash IN rarray(?5)
"#;

const SAME_REPO_PAGE: &str = r#"
SELECT r.dump_id, r.filter
FROM lsif_references r
JOIN lsif_dumps d ON d.id = r.dump_id
WHERE r.scheme = ?1 AND r.name = ?2 AND r.version = ?3
  AND d.repository_id = ?4
  AND d.commit_hash IN rarray(?5)
ORDER BY r.dump_id, r.id
LIMIT ?6 OFFSET ?7
"#;

const GLOBAL_COUNT: &str = r#"
SELECT COUNT(*)
FROM lsif_references r
JOIN lsif_dumps d ON d.id = r.dump_id
WHERE r.scheme = ?1 AND r.name = ?2 AND r.version = ?3
  AND d.visible_at_tip = 1
  AND d.repository_id != ?4
"#;

const GLOBAL_PAGE: &str = r#"
SELECT r.dump_id, r.filter
FROM lsif_references r
JOIN lsif_dumps d ON d.id = r.dump_id
WHERE r.scheme = ?1 AND r.name = ?2 AND r.version = ?3
  AND d.visible_at_tip = 1
  AND d.repository_id != ?4
ORDER BY r.dump_id, r.id
LIMIT ?5 OFFSET ?6
"#;

/// Which reference set a pager walks
#[derive(Debug, Clone)]
enum PagerQuery {
    /// References from dumps of one repository at commits near the one browsed
    SameRepo { repository_id: i64, commits: Vec<String> },
    /// References from tip-visible dumps of every other repository
    Global { excluded_repository_id: i64 },
}

impl PagerQuery {
    fn kind(&self) -> &'static str {
        match self {
            PagerQuery::SameRepo { .. } => "same-repo",
            PagerQuery::Global { .. } => "global",
        }
    }
}

fn commit_array(commits: &[String]) -> Array {
    Rc::new(commits.iter().cloned().map(Value::from).collect())
}

fn row_to_reference(row: &rusqlite::Row) -> rusqlite::Result<Reference> {
    Ok(Reference {
        dump_id: row.get(0)?,
        filter: row.get(1)?,
    })
}

/// Stateful cursor over a reference result set fixed at creation.
///
/// Exclusively owned by its creator. `close` releases the transaction and
/// may be called any number of times; dropping an open pager releases it as
/// well, so every exit path gives the connection back.
pub struct ReferencePager {
    conn: Option<Connection>,
    // Dropped after `conn`; keeps a temporary database on disk while paging
    _database: DatabaseLocation,
    package: PackageKey,
    query: PagerQuery,
    page_size: usize,
    total_count: usize,
}

impl ReferencePager {
    fn open(
        ctx: &RequestContext,
        (conn, database): (Connection, DatabaseLocation),
        package: PackageKey,
        query: PagerQuery,
        page_size: usize,
    ) -> Result<(usize, Self)> {
        conn.execute_batch("BEGIN DEFERRED")?;

        // From here on Drop rolls the transaction back if counting fails
        let mut pager = Self {
            conn: Some(conn),
            _database: database,
            package,
            query,
            page_size,
            total_count: 0,
        };
        pager.total_count = pager.count(ctx)?;

        tracing::debug!(
            "Opened {} pager for {} (total={}, page_size={})",
            pager.query.kind(),
            pager.package,
            pager.total_count,
            pager.page_size
        );
        Ok((pager.total_count, pager))
    }

    fn connection(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::PagerClosed)
    }

    fn count(&self, ctx: &RequestContext) -> Result<usize> {
        let conn = self.connection()?;
        let p = &self.package;

        let count: i64 = run_with_context(conn, ctx, |conn| match &self.query {
            PagerQuery::SameRepo { repository_id, commits } => conn.query_row(
                SAME_REPO_COUNT,
                params![p.scheme, p.name, p.version, repository_id, commit_array(commits)],
                |row| row.get(0),
            ),
            PagerQuery::Global { excluded_repository_id } => conn.query_row(
                GLOBAL_COUNT,
                params![p.scheme, p.name, p.version, excluded_repository_id],
                |row| row.get(0),
            ),
        })?;
        Ok(count as usize)
    }

    /// Number of references in the pager's snapshot
    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of pages needed to cover the whole result set
    pub fn page_count(&self) -> usize {
        self.total_count.div_ceil(self.page_size)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Fetch up to `page_size` references starting at `offset`.
    ///
    /// Offsets may be requested in any order and any number of times. An
    /// empty pager answers every offset with an empty page; otherwise the
    /// offset must lie in `[0, total_count)`.
    pub fn page_from_offset(&self, ctx: &RequestContext, offset: usize) -> Result<Vec<Reference>> {
        let conn = self.connection()?;

        if self.total_count == 0 {
            return Ok(Vec::new());
        }
        if offset >= self.total_count {
            return Err(Error::OffsetOutOfRange { offset, total: self.total_count });
        }

        let p = &self.package;
        let limit = self.page_size as i64;
        let offset_param = offset as i64;

        let references = run_with_context(conn, ctx, |conn| match &self.query {
            PagerQuery::SameRepo { repository_id, commits } => {
                let mut stmt = conn.prepare_cached(SAME_REPO_PAGE)?;
                let rows = stmt.query_map(
                    params![
                        p.scheme,
                        p.name,
                        p.version,
                        repository_id,
                        commit_array(commits),
                        limit,
                        offset_param
                    ],
                    row_to_reference,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
            PagerQuery::Global { excluded_repository_id } => {
                let mut stmt = conn.prepare_cached(GLOBAL_PAGE)?;
                let rows = stmt.query_map(
                    params![p.scheme, p.name, p.version, excluded_repository_id, limit, offset_param],
                    row_to_reference,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            }
        })?;

        tracing::debug!(
            "Served {} references at offset {} of {} ({})",
            references.len(),
            offset,
            self.total_count,
            self.package
        );
        Ok(references)
    }

    /// Concatenate pages 0, P, 2P, ... into the full ordered result set
    pub fn collect_all(&self, ctx: &RequestContext) -> Result<Vec<Reference>> {
        self.connection()?;
        let mut all = Vec::with_capacity(self.total_count);
        let mut offset = 0;
        while offset < self.total_count {
            all.extend(self.page_from_offset(ctx, offset)?);
            offset += self.page_size;
        }
        Ok(all)
    }

    /// Release the transaction and connection. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.execute_batch("COMMIT")?;
            tracing::debug!("Closed {} pager for {}", self.query.kind(), self.package);
        }
        Ok(())
    }
}

impl Drop for ReferencePager {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.execute_batch("ROLLBACK") {
                tracing::warn!("Failed to release pager transaction for {}: {}", self.package, e);
            }
        }
    }
}

impl SqliteStore {
    /// Page through references to `package` from dumps relevant to what is
    /// being browsed: dumps of `repository_id` whose commit lies within the
    /// bounded ancestor/descendant closure of `commit`.
    pub fn same_repo_pager(
        &self,
        ctx: &RequestContext,
        graph: &dyn CommitGraph,
        repository_id: i64,
        commit: &str,
        package: &PackageKey,
        page_size: usize,
    ) -> Result<(usize, ReferencePager)> {
        check_page_size(page_size)?;

        let mut commits: Vec<String> = graph
            .ancestry_closure(ctx, repository_id, commit, self.traversal_limit())?
            .into_iter()
            .collect();
        commits.sort();

        ReferencePager::open(
            ctx,
            self.open_connection()?,
            package.clone(),
            PagerQuery::SameRepo { repository_id, commits },
            page_size,
        )
    }

    /// Page through every tip-visible reference to `package` across the
    /// fleet, excluding `repository_id` (whose own references are served by
    /// `same_repo_pager`).
    pub fn package_reference_pager(
        &self,
        ctx: &RequestContext,
        package: &PackageKey,
        repository_id: i64,
        page_size: usize,
    ) -> Result<(usize, ReferencePager)> {
        check_page_size(page_size)?;

        ReferencePager::open(
            ctx,
            self.open_connection()?,
            package.clone(),
            PagerQuery::Global { excluded_repository_id: repository_id },
            page_size,
        )
    }
}

fn check_page_size(page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(Error::InvalidArgument("page size must be positive".to_string()));
    }
    Ok(())
}
