//! # Xrepo - Cross-Repository Precise Symbol Resolution
//!
//! Given a moniker found inside one repository's precomputed index ("bundle"),
//! xrepo finds the dump that *defines* the corresponding package elsewhere in
//! the fleet and answers "who else references this package" queries.
//!
//! Xrepo provides:
//! - SQLite-backed dump metadata (uploads, package definitions, references, commits)
//! - Snapshot-stable reference pagers (same-repository and fleet-wide)
//! - A commit-graph visibility oracle bounded against pathological histories
//! - An HTTP client for the per-dump bundle manager
//! - The moniker resolver that ties them together

pub mod context;
pub mod dump;
pub mod moniker;
pub mod storage;
pub mod bundles;
pub mod query;
pub mod config;
pub mod server;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use context::RequestContext;
pub use dump::{Dump, PackageKey, Reference, Upload, UploadState};
pub use moniker::{Location, MonikerData, MonikerModel, PackageInformation, ResolvedLocation};
pub use storage::{CommitGraph, ReferencePager, SqliteStore};
pub use bundles::{BundleClient, BundleManager, HttpBundleManager};
pub use query::{MonikerResolver, PackageResolver};

/// Result type alias for xrepo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for xrepo operations
///
/// "Not found" is never represented here; lookups that can miss return
/// `Option` or an empty result instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Malformed row: {0}")]
    MalformedRow(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Bundle manager returned {status}: {body}")]
    Remote { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Pager used after close")]
    PagerClosed,

    #[error("Offset {offset} out of range for {total} references")]
    OffsetOutOfRange { offset: usize, total: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the error came from the caller's deadline or cancellation
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }
}
