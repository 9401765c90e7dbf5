//! HTTP transport for the bundle manager
//!
//! Endpoints, relative to the manager's base URL:
//! - `GET dbs/{id}/packageInformation?path=&packageInformationId=`
//! - `GET dbs/{id}/monikerResults?modelType=&scheme=&identifier=&skip=&take=`
//!
//! Failures are returned as-is; retry policy belongs to the caller.

use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::{BundleClient, BundleManager};
use crate::context::RequestContext;
use crate::moniker::{Location, MonikerModel, PackageInformation};
use crate::{Error, Result};

/// Client factory for a bundle manager reachable over HTTP
#[derive(Debug, Clone)]
pub struct HttpBundleManager {
    http: Client,
    base_url: Url,
}

impl HttpBundleManager {
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: &str) -> Result<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl BundleManager for HttpBundleManager {
    type Client = HttpBundleClient;

    fn bundle_client(&self, dump_id: i64) -> HttpBundleClient {
        HttpBundleClient {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            dump_id,
        }
    }
}

/// Bundle client bound to a single dump
#[derive(Debug, Clone)]
pub struct HttpBundleClient {
    http: Client,
    base_url: Url,
    dump_id: i64,
}

#[derive(Deserialize)]
struct MonikerResultsResponse {
    locations: Vec<Location>,
    count: usize,
}

impl HttpBundleClient {
    fn url(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(&format!("dbs/{}/{}", self.dump_id, endpoint))
            .map_err(|e| Error::InvalidUrl(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &RequestContext,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        ctx.check()?;
        let url = self.url(endpoint)?;

        let mut request = self.http.get(url.clone()).query(query);
        if let Some(remaining) = ctx.remaining() {
            request = request.timeout(remaining);
        }

        tracing::debug!("GET {} (dump {})", url, self.dump_id);
        let response = request.send().map_err(|e| transport_error(e, ctx))?;
        let status = response.status();
        let body = response.text().map_err(|e| transport_error(e, ctx))?;

        if !status.is_success() {
            tracing::warn!("Bundle manager {} for {}: {}", status, url, body);
            return Err(Error::Remote { status: status.as_u16(), body });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn transport_error(err: reqwest::Error, ctx: &RequestContext) -> Error {
    if err.is_timeout() && ctx.deadline().is_some() {
        Error::Canceled
    } else {
        Error::Http(err)
    }
}

impl BundleClient for HttpBundleClient {
    fn package_information(
        &self,
        ctx: &RequestContext,
        path: &str,
        package_information_id: &str,
    ) -> Result<PackageInformation> {
        self.get_json(
            ctx,
            "packageInformation",
            &[
                ("path", path.to_string()),
                ("packageInformationId", package_information_id.to_string()),
            ],
        )
    }

    fn moniker_results(
        &self,
        ctx: &RequestContext,
        model: MonikerModel,
        scheme: &str,
        identifier: &str,
        skip: usize,
        take: usize,
    ) -> Result<(Vec<Location>, usize)> {
        let response: MonikerResultsResponse = self.get_json(
            ctx,
            "monikerResults",
            &[
                ("modelType", model.as_str().to_string()),
                ("scheme", scheme.to_string()),
                ("identifier", identifier.to_string()),
                ("skip", skip.to_string()),
                ("take", take.to_string()),
            ],
        )?;
        Ok((response.locations, response.count))
    }
}
