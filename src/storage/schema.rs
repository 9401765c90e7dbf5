//! Database schema definitions

/// SQL to create the uploads table
pub const CREATE_UPLOADS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lsif_uploads (
    id INTEGER PRIMARY KEY,
    commit_hash TEXT NOT NULL CHECK (length(commit_hash) = 40),
    root TEXT NOT NULL DEFAULT '',
    visible_at_tip INTEGER NOT NULL DEFAULT 0,
    uploaded_at TEXT NOT NULL,
    state TEXT NOT NULL DEFAULT 'queued'
        CHECK (state IN ('queued', 'processing', 'completed', 'errored')),
    failure_summary TEXT,
    failure_stacktrace TEXT,
    started_at TEXT,
    finished_at TEXT,
    tracing_context TEXT NOT NULL DEFAULT '',
    repository_id INTEGER NOT NULL,
    indexer TEXT NOT NULL
)
"#;

/// Dumps are the completed uploads
pub const CREATE_DUMPS_VIEW: &str = r#"
CREATE VIEW IF NOT EXISTS lsif_dumps AS
SELECT * FROM lsif_uploads WHERE state = 'completed'
"#;

/// SQL to create the package definitions table
pub const CREATE_PACKAGES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lsif_packages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scheme TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    dump_id INTEGER NOT NULL REFERENCES lsif_uploads(id) ON DELETE CASCADE
)
"#;

/// SQL to create the package references table
/// `filter` is an opaque blob owned by the ingestion pipeline
pub const CREATE_REFERENCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lsif_references (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scheme TEXT NOT NULL,
    name TEXT NOT NULL,
    version TEXT NOT NULL,
    dump_id INTEGER NOT NULL REFERENCES lsif_uploads(id) ON DELETE CASCADE,
    filter BLOB NOT NULL
)
"#;

/// SQL to create the commit graph table (one row per parent edge)
pub const CREATE_COMMITS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS lsif_commits (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repository_id INTEGER NOT NULL,
    commit_hash TEXT NOT NULL,
    parent_commit_hash TEXT,
    UNIQUE(repository_id, commit_hash, parent_commit_hash)
)
"#;

/// SQL to create indexes
pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_uploads_repository_commit ON lsif_uploads(repository_id, commit_hash)",
    "CREATE INDEX IF NOT EXISTS idx_uploads_visible_at_tip ON lsif_uploads(repository_id) WHERE visible_at_tip = 1",
    "CREATE INDEX IF NOT EXISTS idx_packages_identity ON lsif_packages(scheme, name, version)",
    "CREATE INDEX IF NOT EXISTS idx_references_identity ON lsif_references(scheme, name, version, dump_id)",
    "CREATE INDEX IF NOT EXISTS idx_commits_commit ON lsif_commits(repository_id, commit_hash)",
    "CREATE INDEX IF NOT EXISTS idx_commits_parent ON lsif_commits(repository_id, parent_commit_hash)",
];

/// All schema creation statements
pub fn all_schema_statements() -> Vec<&'static str> {
    let mut stmts = vec![
        CREATE_UPLOADS_TABLE,
        CREATE_DUMPS_VIEW,
        CREATE_PACKAGES_TABLE,
        CREATE_REFERENCES_TABLE,
        CREATE_COMMITS_TABLE,
    ];
    stmts.extend(CREATE_INDEXES.iter().copied());
    stmts
}
