//! Storage Layer - SQLite-backed dump metadata
//!
//! System of record is SQLite with tables:
//! - lsif_uploads(id, commit_hash, root, state, visible_at_tip, repository_id, ...)
//! - lsif_dumps: view of completed uploads
//! - lsif_packages(scheme, name, version, dump_id)
//! - lsif_references(scheme, name, version, dump_id, filter)
//! - lsif_commits(repository_id, commit_hash, parent_commit_hash)

pub mod schema;
pub mod sqlite;
pub mod commits;
pub mod pager;

pub use sqlite::{SqliteStore, DbStats, MAX_TRAVERSAL_LIMIT};
pub use commits::CommitGraph;
pub use pager::ReferencePager;
