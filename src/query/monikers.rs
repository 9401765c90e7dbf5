//! Moniker Resolver
//!
//! Turns a package-bound moniker found in one dump into locations inside the
//! dump that defines the package:
//! 1. Local monikers (no package information id) resolve to nothing
//! 2. Package information is read from the bundle that owns the moniker
//! 3. The package resolver picks the defining dump; unknown packages resolve to nothing
//! 4. The defining dump's bundle answers the moniker query
//! 5. Bundle-local paths are rebased onto the defining dump's root
//!
//! Failures in steps 2-4 are returned unchanged.

use crate::Result;
use crate::bundles::{BundleClient, BundleManager};
use crate::context::RequestContext;
use crate::moniker::{MonikerData, MonikerModel, ResolvedLocation, resolve_locations_with_dump};
use crate::query::PackageResolver;

/// Stateless cross-repository moniker resolution
pub struct MonikerResolver<P, B> {
    packages: P,
    bundles: B,
}

impl<P: PackageResolver, B: BundleManager> MonikerResolver<P, B> {
    pub fn new(packages: P, bundles: B) -> Self {
        Self { packages, bundles }
    }

    /// Resolve `moniker`, seen at `path` inside dump `dump_id`.
    ///
    /// Returns one page (`skip`/`take`) of locations and the total number of
    /// locations the defining bundle reports.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve(
        &self,
        ctx: &RequestContext,
        dump_id: i64,
        path: &str,
        model: MonikerModel,
        moniker: &MonikerData,
        skip: usize,
        take: usize,
    ) -> Result<(Vec<ResolvedLocation>, usize)> {
        if !moniker.is_package_bound() {
            tracing::debug!(
                "Moniker {}:{} is local to dump {}",
                moniker.scheme,
                moniker.identifier,
                dump_id
            );
            return Ok((Vec::new(), 0));
        }

        let package_information = self
            .bundles
            .bundle_client(dump_id)
            .package_information(ctx, path, &moniker.package_information_id)?;

        let Some(dump) = self.packages.resolve(
            ctx,
            &moniker.scheme,
            &package_information.name,
            &package_information.version,
        )?
        else {
            tracing::debug!(
                "No dump defines {}:{}@{}",
                moniker.scheme,
                package_information.name,
                package_information.version
            );
            return Ok((Vec::new(), 0));
        };

        let (locations, count) = self.bundles.bundle_client(dump.id).moniker_results(
            ctx,
            model,
            &moniker.scheme,
            &moniker.identifier,
            skip,
            take,
        )?;

        tracing::debug!(
            "Resolved {} {}:{} via dump {} ({} of {})",
            model,
            moniker.scheme,
            moniker.identifier,
            dump.id,
            locations.len(),
            count
        );
        Ok((resolve_locations_with_dump(&dump, locations), count))
    }
}
