//! Monikers, bundle-local locations, and resolved locations
//!
//! A moniker is a portable symbol identifier (`scheme` + `identifier`),
//! optionally bound to a package through `package_information_id`. Only
//! package-bound monikers can be resolved across repositories.

use crate::dump::Dump;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Moniker attached to a symbol occurrence inside one bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonikerData {
    /// import, export or local
    #[serde(default)]
    pub kind: String,
    pub scheme: String,
    pub identifier: String,
    /// Empty for local-only monikers
    #[serde(default, rename = "packageInformationID")]
    pub package_information_id: String,
}

impl MonikerData {
    pub fn new(scheme: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            kind: String::new(),
            scheme: scheme.into(),
            identifier: identifier.into(),
            package_information_id: String::new(),
        }
    }

    /// Builder: bind the moniker to a package information row
    pub fn with_package_information(mut self, id: impl Into<String>) -> Self {
        self.package_information_id = id.into();
        self
    }

    /// Whether the moniker can be resolved outside its own bundle
    pub fn is_package_bound(&self) -> bool {
        !self.package_information_id.is_empty()
    }
}

/// Package name and version resolved from a bundle's package information id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInformation {
    pub name: String,
    pub version: String,
}

/// Which moniker result set to read from a bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonikerModel {
    Definition,
    Reference,
}

impl MonikerModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonikerModel::Definition => "definition",
            MonikerModel::Reference => "reference",
        }
    }
}

impl FromStr for MonikerModel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "definition" | "definitions" | "def" => Ok(MonikerModel::Definition),
            "reference" | "references" | "ref" => Ok(MonikerModel::Reference),
            _ => Err(Error::InvalidArgument(format!("Unknown moniker model: {}", s))),
        }
    }
}

impl std::fmt::Display for MonikerModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Zero-based line/character position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

/// Half-open source range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start_line: u32, start_character: u32, end_line: u32, end_character: u32) -> Self {
        Self {
            start: Position { line: start_line, character: start_character },
            end: Position { line: end_line, character: end_character },
        }
    }
}

/// A location as returned by a bundle: path is relative to the dump root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub dump_id: i64,
    pub path: String,
    pub range: Range,
}

/// A location translated through its owning dump
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLocation {
    pub dump_id: i64,
    pub repository_id: i64,
    pub commit: String,
    /// Repository-relative path: dump root + bundle-local path
    pub path: String,
    pub range: Range,
}

/// Translate bundle-local locations into repository locations of `dump`
pub fn resolve_locations_with_dump(dump: &Dump, locations: Vec<Location>) -> Vec<ResolvedLocation> {
    locations
        .into_iter()
        .map(|location| ResolvedLocation {
            dump_id: dump.id,
            repository_id: dump.repository_id,
            commit: dump.commit.clone(),
            path: format!("{}{}", dump.root, location.path),
            range: location.range,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump::Upload;

    #[test]
    fn test_model_roundtrip() {
        for model in [MonikerModel::Definition, MonikerModel::Reference] {
            let parsed: MonikerModel = model.as_str().parse().unwrap();
            assert_eq!(model, parsed);
        }
        assert!("hover".parse::<MonikerModel>().is_err());
    }

    #[test]
    fn test_local_moniker_is_not_package_bound() {
        let local = MonikerData::new("gomod", "leftpad.Pad");
        assert!(!local.is_package_bound());
        assert!(local.with_package_information("pid1").is_package_bound());
    }

    #[test]
    fn test_moniker_json_field_names() {
        let json = r#"{"kind":"import","scheme":"gomod","identifier":"x","packageInformationID":"7"}"#;
        let moniker: MonikerData = serde_json::from_str(json).unwrap();
        assert_eq!(moniker.package_information_id, "7");

        let local: MonikerData = serde_json::from_str(r#"{"scheme":"gomod","identifier":"x"}"#).unwrap();
        assert!(!local.is_package_bound());
    }

    #[test]
    fn test_resolve_locations_prefixes_root() {
        let upload = Upload::completed(42, 50, "deadbeef01deadbeef02deadbeef03deadbeef04").with_root("sub/");
        let dump = Dump::try_from(upload).unwrap();
        let locations = vec![
            Location { dump_id: 42, path: "pad.go".to_string(), range: Range::new(1, 2, 1, 8) },
            Location { dump_id: 42, path: "util/trim.go".to_string(), range: Range::new(10, 0, 12, 1) },
        ];

        let resolved = resolve_locations_with_dump(&dump, locations);
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].path, "sub/pad.go");
        assert_eq!(resolved[1].path, "sub/util/trim.go");
        assert_eq!(resolved[1].repository_id, 50);
        assert_eq!(resolved[1].commit, dump.commit);
        assert_eq!(resolved[1].range, Range::new(10, 0, 12, 1));
    }
}
