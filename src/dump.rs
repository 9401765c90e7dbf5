//! Dump metadata types
//!
//! An `Upload` is one indexing job result. A `Dump` is an upload that
//! reached the `completed` state; only dumps answer resolution queries.
//! Package rows join dumps together across repositories:
//! - `PackageDefinition`: this dump is the canonical definition of a package
//! - `PackageReference`: this dump references symbols from a package

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle state of an upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    Queued,
    Processing,
    Completed,
    Errored,
}

impl UploadState {
    /// Get the string representation stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadState::Queued => "queued",
            UploadState::Processing => "processing",
            UploadState::Completed => "completed",
            UploadState::Errored => "errored",
        }
    }

    /// Get all upload states
    pub fn all() -> &'static [UploadState] {
        &[
            UploadState::Queued,
            UploadState::Processing,
            UploadState::Completed,
            UploadState::Errored,
        ]
    }
}

impl FromStr for UploadState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(UploadState::Queued),
            "processing" => Ok(UploadState::Processing),
            "completed" => Ok(UploadState::Completed),
            "errored" => Ok(UploadState::Errored),
            _ => Err(Error::MalformedRow(format!("Unknown upload state: {}", s))),
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One indexing job result.
///
/// Created by the ingestion pipeline; this crate never mutates uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upload {
    pub id: i64,
    /// 40-character hex commit the index was built from
    pub commit: String,
    /// Subdirectory the indexer ran in, prefixed onto bundle-local paths
    pub root: String,
    pub visible_at_tip: bool,
    pub uploaded_at: DateTime<Utc>,
    pub state: UploadState,
    pub failure_summary: Option<String>,
    pub failure_stacktrace: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tracing_context: String,
    pub repository_id: i64,
    pub indexer: String,
}

impl Upload {
    /// Create a completed upload with empty root and no failure details
    pub fn completed(id: i64, repository_id: i64, commit: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            commit: commit.into(),
            root: String::new(),
            visible_at_tip: false,
            uploaded_at: now,
            state: UploadState::Completed,
            failure_summary: None,
            failure_stacktrace: None,
            started_at: Some(now),
            finished_at: Some(now),
            tracing_context: String::new(),
            repository_id,
            indexer: "lsif-go".to_string(),
        }
    }

    /// Builder: set the root directory
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Builder: set the visible-at-tip flag
    pub fn with_visible_at_tip(mut self, visible_at_tip: bool) -> Self {
        self.visible_at_tip = visible_at_tip;
        self
    }

    /// Builder: set the lifecycle state
    pub fn with_state(mut self, state: UploadState) -> Self {
        self.state = state;
        self
    }

    /// Check the commit is a full 40-character hex sha
    pub fn validate(&self) -> Result<()> {
        validate_commit(&self.commit)
    }

    pub fn is_dump(&self) -> bool {
        self.state == UploadState::Completed
    }
}

/// A completed upload, eligible to answer resolution queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dump {
    pub id: i64,
    pub commit: String,
    pub root: String,
    pub visible_at_tip: bool,
    pub uploaded_at: DateTime<Utc>,
    pub state: UploadState,
    pub failure_summary: Option<String>,
    pub failure_stacktrace: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tracing_context: String,
    pub repository_id: i64,
    pub indexer: String,
}

impl TryFrom<Upload> for Dump {
    type Error = Error;

    fn try_from(upload: Upload) -> Result<Self> {
        if !upload.is_dump() {
            return Err(Error::MalformedRow(format!(
                "upload {} is {}, not completed",
                upload.id, upload.state
            )));
        }

        Ok(Dump {
            id: upload.id,
            commit: upload.commit,
            root: upload.root,
            visible_at_tip: upload.visible_at_tip,
            uploaded_at: upload.uploaded_at,
            state: upload.state,
            failure_summary: upload.failure_summary,
            failure_stacktrace: upload.failure_stacktrace,
            started_at: upload.started_at,
            finished_at: upload.finished_at,
            tracing_context: upload.tracing_context,
            repository_id: upload.repository_id,
            indexer: upload.indexer,
        })
    }
}

/// Package identity - the cross-repository join key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageKey {
    pub scheme: String,
    pub name: String,
    pub version: String,
}

impl PackageKey {
    pub fn new(scheme: impl Into<String>, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl std::fmt::Display for PackageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}@{}", self.scheme, self.name, self.version)
    }
}

/// Parses the `scheme:name@version` form produced by `Display`.
/// Names may contain `@` (npm scopes), so the version follows the last one.
impl FromStr for PackageKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidArgument(format!("expected scheme:name@version, got {:?}", s));
        let (scheme, rest) = s.split_once(':').ok_or_else(invalid)?;
        let (name, version) = rest.rsplit_once('@').ok_or_else(invalid)?;
        if scheme.is_empty() || name.is_empty() || version.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(scheme, name, version))
    }
}

/// "This dump is the canonical definition site of this package."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDefinition {
    pub package: PackageKey,
    pub dump_id: i64,
}

/// "This dump contains symbol references into this package."
///
/// `filter` is an opaque per-dump membership summary; it is stored and
/// returned untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageReference {
    pub package: PackageKey,
    pub dump_id: i64,
    pub filter: Vec<u8>,
}

impl PackageReference {
    pub fn new(package: PackageKey, dump_id: i64, filter: impl Into<Vec<u8>>) -> Self {
        Self {
            package,
            dump_id,
            filter: filter.into(),
        }
    }
}

/// One row served by a reference pager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reference {
    pub dump_id: i64,
    pub filter: Vec<u8>,
}

impl Reference {
    pub fn new(dump_id: i64, filter: impl Into<Vec<u8>>) -> Self {
        Self {
            dump_id,
            filter: filter.into(),
        }
    }
}

/// Check a commit is a 40-character hex sha
pub fn validate_commit(commit: &str) -> Result<()> {
    if commit.len() == 40 && commit.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("invalid commit: {:?}", commit)))
    }
}
