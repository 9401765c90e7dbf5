use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::context::RequestContext;
use crate::dump::{Dump, PackageKey, Reference};
use crate::moniker::{MonikerData, MonikerModel, ResolvedLocation};
use crate::query::MonikerResolver;
use crate::server::AppState;
use crate::storage::SqliteStore;
use crate::Error;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
pub struct PackageParams {
    pub scheme: String,
    pub name: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceParams {
    pub scheme: String,
    pub name: String,
    pub version: String,
    pub repository_id: i64,
    /// Present: same-repository pager anchored at this commit. Absent: fleet-wide pager.
    pub commit: Option<String>,
    pub offset: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonikerParams {
    pub dump_id: i64,
    pub path: String,
    pub model: MonikerModel,
    pub scheme: String,
    pub identifier: String,
    #[serde(rename = "packageInformationID", default)]
    pub package_information_id: String,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct PackageResponse {
    pub found: bool,
    pub dump: Option<Dump>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferencesResponse {
    pub references: Vec<Reference>,
    pub total_count: usize,
    pub offset: usize,
    pub page_size: usize,
}

#[derive(Debug, Serialize)]
pub struct MonikerResponse {
    pub locations: Vec<ResolvedLocation>,
    pub count: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult = Result<Json<serde_json::Value>, ApiError>;

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::InvalidArgument(_) | Error::OffsetOutOfRange { .. } => StatusCode::BAD_REQUEST,
        Error::Canceled => StatusCode::GATEWAY_TIMEOUT,
        Error::Http(_) | Error::Remote { .. } | Error::Decode(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!("Request failed: {}", err);
    }
    (status, Json(ErrorResponse { error: err.to_string() }))
}

fn internal_error(message: String) -> ApiError {
    tracing::error!("{}", message);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: message }))
}

/// Cancels the request context when the handler future is dropped, so
/// blocking work stops once the client goes away.
struct CancelOnDrop(RequestContext);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Run `f` on the blocking pool with a fresh request context
async fn run_blocking<T, F>(state: &Arc<AppState>, f: F) -> ApiResult
where
    T: Serialize + Send + 'static,
    F: FnOnce(&AppState, &RequestContext) -> crate::Result<T> + Send + 'static,
{
    let ctx = state.request_context();
    let _guard = CancelOnDrop(ctx.clone());
    let state = Arc::clone(state);

    let result = tokio::task::spawn_blocking(move || f(&state, &ctx))
        .await
        .map_err(|e| internal_error(format!("worker failed: {}", e)))?;
    let value = result.map_err(api_error)?;

    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| internal_error(format!("failed to encode response: {}", e)))
}

fn open_store(state: &AppState) -> crate::Result<SqliteStore> {
    Ok(SqliteStore::open(&state.database_path)?.with_traversal_limit(state.traversal_limit))
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    run_blocking(&state, |state, ctx| open_store(state)?.stats(ctx)).await
}

pub async fn get_package(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PackageParams>,
) -> ApiResult {
    run_blocking(&state, move |state, ctx| {
        let dump = open_store(state)?.get_package(ctx, &params.scheme, &params.name, &params.version)?;
        Ok(PackageResponse { found: dump.is_some(), dump })
    })
    .await
}

pub async fn get_references(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReferenceParams>,
) -> ApiResult {
    run_blocking(&state, move |state, ctx| {
        let store = open_store(state)?;
        let package = PackageKey::new(params.scheme, params.name, params.version);
        let offset = params.offset.unwrap_or(0);
        let requested = params.page_size.unwrap_or(DEFAULT_PAGE_SIZE);

        let (total_count, mut pager) = match &params.commit {
            Some(commit) => store.same_repo_pager(ctx, &store, params.repository_id, commit, &package, requested)?,
            None => store.package_reference_pager(ctx, &package, params.repository_id, requested)?,
        };

        let page = pager.page_from_offset(ctx, offset);
        let page_size = pager.page_size();
        let closed = pager.close();
        let references = page?;
        closed?;

        Ok(ReferencesResponse { references, total_count, offset, page_size })
    })
    .await
}

pub async fn resolve_moniker(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MonikerParams>,
) -> ApiResult {
    run_blocking(&state, move |state, ctx| {
        let store = open_store(state)?;
        let resolver = MonikerResolver::new(&store, state.bundles.clone());
        let moniker = MonikerData::new(params.scheme, params.identifier)
            .with_package_information(params.package_information_id);

        let (locations, count) = resolver.resolve(
            ctx,
            params.dump_id,
            &params.path,
            params.model,
            &moniker,
            params.skip.unwrap_or(0),
            params.take.unwrap_or(DEFAULT_PAGE_SIZE),
        )?;
        Ok(MonikerResponse { locations, count })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundles::HttpBundleManager;
    use crate::dump::{PackageDefinition, PackageReference, Upload};
    use httpmock::prelude::*;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    const C1: &str = "1111111111111111111111111111111111111111";
    const C2: &str = "2222222222222222222222222222222222222222";
    const C3: &str = "3333333333333333333333333333333333333333";

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    fn leftpad() -> PackageKey {
        PackageKey::new("gomod", "leftpad", "0.1.0")
    }

    /// Dump 1 defines leftpad in repo 50; dumps 2 and 3 reference it from
    /// repo 60, and only dump 3 is visible at tip
    fn seed(path: &Path) {
        let store = SqliteStore::open(path).unwrap();
        store.insert_upload(&Upload::completed(1, 50, C1).with_root("lib/")).unwrap();
        store.insert_upload(&Upload::completed(2, 60, C2)).unwrap();
        store
            .insert_upload(&Upload::completed(3, 60, C3).with_visible_at_tip(true))
            .unwrap();
        store.insert_commit(60, C2, &[]).unwrap();
        store.insert_commit(60, C3, &[C2]).unwrap();
        store
            .insert_package(&PackageDefinition { package: leftpad(), dump_id: 1 })
            .unwrap();
        for dump_id in [2, 3] {
            store
                .insert_reference(&PackageReference::new(leftpad(), dump_id, format!("f{}", dump_id).into_bytes()))
                .unwrap();
        }
    }

    fn state(dir: &TempDir, bundle_manager_url: &str) -> Arc<AppState> {
        let path = dir.path().join("xrepo.db");
        seed(&path);
        Arc::new(AppState::new(path, HttpBundleManager::new(bundle_manager_url).unwrap()))
    }

    fn reference_params(commit: Option<&str>, page_size: usize) -> ReferenceParams {
        ReferenceParams {
            scheme: "gomod".to_string(),
            name: "leftpad".to_string(),
            version: "0.1.0".to_string(),
            repository_id: 60,
            commit: commit.map(str::to_string),
            offset: None,
            page_size: Some(page_size),
        }
    }

    #[test]
    fn test_get_package() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, "http://localhost:3187");
        let rt = runtime();

        let Json(found) = rt
            .block_on(get_package(
                State(Arc::clone(&state)),
                Query(PackageParams { scheme: "gomod".into(), name: "leftpad".into(), version: "0.1.0".into() }),
            ))
            .unwrap();
        assert_eq!(found["found"], true);
        assert_eq!(found["dump"]["id"], 1);

        let Json(missing) = rt
            .block_on(get_package(
                State(state),
                Query(PackageParams { scheme: "gomod".into(), name: "rightpad".into(), version: "0.1.0".into() }),
            ))
            .unwrap();
        assert_eq!(missing["found"], false);
        assert!(missing["dump"].is_null());
    }

    #[test]
    fn test_get_references_same_repo() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, "http://localhost:3187");
        let rt = runtime();

        let Json(body) = rt
            .block_on(get_references(State(state), Query(reference_params(Some(C2), 1))))
            .unwrap();
        assert_eq!(body["totalCount"], 2);
        assert_eq!(body["pageSize"], 1);
        assert_eq!(body["offset"], 0);
        assert_eq!(body["references"].as_array().unwrap().len(), 1);
        assert_eq!(body["references"][0]["dumpId"], 2);
        assert!(body["references"][0].get("dump_id").is_none());
    }

    #[test]
    fn test_get_references_global_excludes_requesting_repo() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, "http://localhost:3187");
        let rt = runtime();

        let Json(own) = rt
            .block_on(get_references(State(Arc::clone(&state)), Query(reference_params(None, 10))))
            .unwrap();
        assert_eq!(own["totalCount"], 0);
        assert!(own["references"].as_array().unwrap().is_empty());

        let mut params = reference_params(None, 10);
        params.repository_id = 50;
        let Json(fleet) = rt.block_on(get_references(State(state), Query(params))).unwrap();
        assert_eq!(fleet["totalCount"], 1);
        assert_eq!(fleet["references"][0]["dumpId"], 3);
    }

    #[test]
    fn test_get_references_rejects_zero_page_size() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, "http://localhost:3187");
        let rt = runtime();

        let (status, _) = rt
            .block_on(get_references(State(state), Query(reference_params(Some(C2), 0))))
            .unwrap_err();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_get_stats() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, "http://localhost:3187");

        let Json(body) = runtime().block_on(get_stats(State(state))).unwrap();
        assert_eq!(body["uploads"], 3);
        assert_eq!(body["references"], 2);
        assert_eq!(body["commits"], 2);
    }

    #[test]
    fn test_get_stats_past_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xrepo.db");
        seed(&path);
        let state = AppState::new(path, HttpBundleManager::new("http://localhost:3187").unwrap())
            .with_request_timeout(Some(std::time::Duration::ZERO));

        let (status, _) = runtime().block_on(get_stats(State(Arc::new(state)))).unwrap_err();
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_resolve_moniker() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/dbs/2/packageInformation");
            then.status(200).json_body(json!({"name": "leftpad", "version": "0.1.0"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/dbs/1/monikerResults").query_param("modelType", "definition");
            then.status(200).json_body(json!({
                "locations": [
                    {"dumpId": 1, "path": "pad.go", "range": {"start": {"line": 1, "character": 2}, "end": {"line": 1, "character": 5}}}
                ],
                "count": 1
            }));
        });

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, &server.base_url());
        let rt = runtime();

        let params = MonikerParams {
            dump_id: 2,
            path: "main.go".to_string(),
            model: MonikerModel::Definition,
            scheme: "gomod".to_string(),
            identifier: "leftpad.Pad".to_string(),
            package_information_id: "pid1".to_string(),
            skip: None,
            take: None,
        };
        let Json(body) = rt.block_on(resolve_moniker(State(state), Query(params))).unwrap();

        assert_eq!(body["count"], 1);
        assert_eq!(body["locations"][0]["path"], "lib/pad.go");
        assert_eq!(body["locations"][0]["repositoryId"], 50);
        assert_eq!(body["locations"][0]["commit"], C1);
    }

    #[test]
    fn test_resolve_moniker_remote_failure() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/dbs/2/packageInformation");
            then.status(500).body("boom");
        });

        let dir = tempfile::tempdir().unwrap();
        let state = state(&dir, &server.base_url());
        let rt = runtime();

        let params = MonikerParams {
            dump_id: 2,
            path: "main.go".to_string(),
            model: MonikerModel::Reference,
            scheme: "gomod".to_string(),
            identifier: "leftpad.Pad".to_string(),
            package_information_id: "pid1".to_string(),
            skip: None,
            take: None,
        };
        let (status, Json(error)) = rt.block_on(resolve_moniker(State(state), Query(params))).unwrap_err();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(error.error.contains("500"));
    }
}
