//! Bundle client contract
//!
//! Each dump's compiled index lives behind the bundle manager and is queried
//! remotely. The resolver only depends on these traits; `HttpBundleManager`
//! is the production transport.

pub mod http;

pub use http::{HttpBundleClient, HttpBundleManager};

use crate::Result;
use crate::context::RequestContext;
use crate::moniker::{Location, MonikerModel, PackageInformation};

/// Remote query interface to one dump's index
pub trait BundleClient {
    /// Resolve a package information id that appears in `path`
    fn package_information(
        &self,
        ctx: &RequestContext,
        path: &str,
        package_information_id: &str,
    ) -> Result<PackageInformation>;

    /// Page of locations attached to a moniker, plus the total number of them
    fn moniker_results(
        &self,
        ctx: &RequestContext,
        model: MonikerModel,
        scheme: &str,
        identifier: &str,
        skip: usize,
        take: usize,
    ) -> Result<(Vec<Location>, usize)>;
}

/// Hands out clients addressed to individual dumps
pub trait BundleManager {
    type Client: BundleClient;

    fn bundle_client(&self, dump_id: i64) -> Self::Client;
}
