//! Package Resolver
//!
//! Named seam between the moniker resolver and the dump metadata store, so
//! resolution logic never depends on how package definitions are stored.

use crate::Result;
use crate::context::RequestContext;
use crate::dump::Dump;
use crate::storage::SqliteStore;

/// Finds the dump that defines a package identity
pub trait PackageResolver {
    /// `Ok(None)` means no completed dump defines the package.
    fn resolve(
        &self,
        ctx: &RequestContext,
        scheme: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<Dump>>;
}

impl PackageResolver for SqliteStore {
    fn resolve(
        &self,
        ctx: &RequestContext,
        scheme: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<Dump>> {
        self.get_package(ctx, scheme, name, version)
    }
}

impl<T: PackageResolver + ?Sized> PackageResolver for &T {
    fn resolve(
        &self,
        ctx: &RequestContext,
        scheme: &str,
        name: &str,
        version: &str,
    ) -> Result<Option<Dump>> {
        (**self).resolve(ctx, scheme, name, version)
    }
}
