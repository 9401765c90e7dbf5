//! Commit visibility oracle
//!
//! Answers bounded reachability questions over a repository's commit graph.
//! The same-repository pager asks for the closure of the commit being browsed
//! and keeps only references from dumps at commits in that closure.

use std::collections::HashSet;

use rusqlite::params;

use super::sqlite::{SqliteStore, run_with_context};
use crate::Result;
use crate::context::RequestContext;

/// Read-only ancestry oracle over per-repository commit graphs
pub trait CommitGraph {
    /// Commits reachable from `commit` within `repository_id` by walking at
    /// most `bound` parent edges up (ancestors) or `bound` child edges down
    /// (descendants). The commit itself is always part of its closure.
    fn ancestry_closure(
        &self,
        ctx: &RequestContext,
        repository_id: i64,
        commit: &str,
        bound: usize,
    ) -> Result<HashSet<String>>;
}

const ANCESTRY_CLOSURE_QUERY: &str = r#"
WITH RECURSIVE
    ancestors(commit_hash, depth) AS (
        SELECT ?2, 0
        UNION
        SELECT c.parent_commit_hash, a.depth + 1
        FROM ancestors a
        JOIN lsif_commits c ON c.repository_id = ?1 AND c.commit_hash = a.commit_hash
        WHERE a.depth < ?3 AND c.parent_commit_hash IS NOT NULL
    ),
    descendants(commit_hash, depth) AS (
        SELECT ?2, 0
        UNION
        SELECT c.commit_hash, d.depth + 1
        FROM descendants d
        JOIN lsif_commits c ON c.repository_id = ?1 AND c.parent_commit_hash = d.commit_hash
        WHERE d.depth < ?3
    )
SELECT commit_hash FROM ancestors
UNION
SELECT commit_hash FROM descendants
"#;

impl CommitGraph for SqliteStore {
    fn ancestry_closure(
        &self,
        ctx: &RequestContext,
        repository_id: i64,
        commit: &str,
        bound: usize,
    ) -> Result<HashSet<String>> {
        let commits = run_with_context(self.connection(), ctx, |conn| {
            let mut stmt = conn.prepare(ANCESTRY_CLOSURE_QUERY)?;
            let rows = stmt.query_map(params![repository_id, commit, bound as i64], |row| {
                row.get::<_, String>(0)
            })?;
            rows.collect::<rusqlite::Result<HashSet<String>>>()
        })?;

        tracing::debug!(
            "Commit closure for {}@{} (bound {}): {} commits",
            repository_id,
            commit,
            bound,
            commits.len()
        );
        Ok(commits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const C01: &str = "deadbeef01deadbeef02deadbeef03deadbeef04";
    const C11: &str = "deadbeef11deadbeef12deadbeef13deadbeef14";
    const C21: &str = "deadbeef21deadbeef22deadbeef23deadbeef24";
    const C31: &str = "deadbeef31deadbeef32deadbeef33deadbeef34";
    const C41: &str = "deadbeef41deadbeef42deadbeef43deadbeef44";

    /// Linear history 01 <- 11 <- 21 <- 31 in repository 50
    fn linear_store() -> SqliteStore {
        let store = SqliteStore::open_temporary().unwrap();
        store
            .insert_commits(
                50,
                &[(C01, vec![]), (C11, vec![C01]), (C21, vec![C11]), (C31, vec![C21])],
            )
            .unwrap();
        store
    }

    fn closure(store: &SqliteStore, repository_id: i64, commit: &str, bound: usize) -> HashSet<String> {
        store
            .ancestry_closure(&RequestContext::background(), repository_id, commit, bound)
            .unwrap()
    }

    fn set(commits: &[&str]) -> HashSet<String> {
        commits.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_closure_includes_descendants() {
        let store = linear_store();
        assert_eq!(closure(&store, 50, C01, 100), set(&[C01, C11, C21, C31]));
    }

    #[test]
    fn test_closure_includes_ancestors() {
        let store = linear_store();
        assert_eq!(closure(&store, 50, C31, 100), set(&[C01, C11, C21, C31]));
    }

    #[test]
    fn test_closure_is_bounded() {
        let store = linear_store();
        assert_eq!(closure(&store, 50, C01, 1), set(&[C01, C11]));
        assert_eq!(closure(&store, 50, C21, 1), set(&[C11, C21, C31]));
        assert_eq!(closure(&store, 50, C21, 0), set(&[C21]));
    }

    #[test]
    fn test_closure_unknown_commit_is_itself() {
        let store = SqliteStore::open_temporary().unwrap();
        assert_eq!(closure(&store, 50, C41, 100), set(&[C41]));
    }

    #[test]
    fn test_closure_is_scoped_to_repository() {
        let store = linear_store();
        store.insert_commit(51, C41, &[C01]).unwrap();

        assert!(!closure(&store, 50, C01, 100).contains(C41));
        assert_eq!(closure(&store, 51, C01, 100), set(&[C01, C41]));
    }

    #[test]
    fn test_closure_follows_merges() {
        let store = linear_store();
        // 41 merges 31 and a side branch rooted at 11
        store.insert_commit(50, C41, &[C31, C11]).unwrap();

        let from_tip = closure(&store, 50, C41, 2);
        assert_eq!(from_tip, set(&[C41, C31, C21, C11, C01]));
    }

    #[test]
    fn test_closure_canceled() {
        let store = linear_store();
        let ctx = RequestContext::background();
        ctx.cancel();

        let err = store.ancestry_closure(&ctx, 50, C01, 100).unwrap_err();
        assert!(err.is_canceled());
    }
}
