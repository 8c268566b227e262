/**
 * API REST EDGEPICK - Serveur HTTP de la gateway
 *
 * RÔLE :
 * Ce module expose les opérations du cœur Edgepick aux collecteurs, aux nœuds
 * demandeurs et aux outils d'administration.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, état partagé AppState (dépendances injectées)
 * - Routes organisées : /health, /inventory, /latency, /resources, /selector, /probe
 * - Sérialisation JSON automatique des réponses
 * - Erreurs typées du cœur traduites par ApiError (400, 404, 409, 502, 500)
 *
 * UTILITÉ DANS EDGEPICK :
 * 🎯 Collecteurs : récupèrent leurs cibles, publient batches et rapports
 * 🎯 Nœuds demandeurs : obtiennent le meilleur serveur edge
 * 🎯 Administration : inventaire, historique des décisions, sonde à la demande
 *
 * SÉCURITÉ :
 * - Header x-api-key exigé sur toutes les routes sauf /health si une clé est configurée
 */

use crate::error::{ApiError, ApiResult};
use crate::health::GatewayHealth;
use crate::state::AppState;
use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use edgepick_core::inventory::{latency_targets_for, AssetQuery, Inventory};
use edgepick_core::model::{
    HostReport, InventoryAsset, LatencyAnalysis, LatencyBatch, LatencyRecord, LatencyTargets, ResourceAnalysis,
    ResourceSnapshot, SelectionDecision, SelectionOutcome,
};
use edgepick_core::store::Subject;
use edgepick_core::SelectionRequest;
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct TargetsParams {
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportParams {
    host: Option<String>,
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        // inventaire
        .route("/inventory", get(list_inventory).post(create_asset).put(update_asset))
        .route("/inventory/servers", get(list_servers))
        .route("/inventory/servers/gpu", get(list_gpu_servers))
        .route("/inventory/robots", get(list_robots))
        .route("/inventory/sensors", get(list_sensors))
        .route("/inventory/{id}", get(get_asset).delete(delete_asset))
        // latence
        .route("/latency", post(archive_latency))
        .route("/latency/targets", get(latency_targets))
        .route("/latency/{id}", get(get_latency))
        .route("/latency/source/{source}/minutes/{minutes}", get(latency_by_source))
        .route("/latency/target/{target}/minutes/{minutes}", get(latency_by_target))
        .route("/latency/analysis/target/{target}/minutes/{minutes}", get(latency_analysis))
        // ressources
        .route("/resources", post(archive_resources))
        .route("/resources/device/{host}/minutes/{minutes}", get(resources_by_device))
        .route("/resources/analysis/device/{host}/minutes/{minutes}", get(resources_analysis))
        // sélection
        .route("/selector", get(list_selections))
        .route("/selector/{id}", get(get_selection))
        .route("/selector/target/{target}", get(selections_by_target))
        .route("/selector/asset/{asset}", get(selections_by_asset))
        .route("/selector/target/{target}/minutes/{minutes}/gpu/{gpu}", get(select_server))
        // sonde à la demande
        .route("/probe", post(probe_now))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> ApiResult<Json<GatewayHealth>> {
    Ok(Json(app.health.get_health(app.inventory.as_ref()).await?))
}

// ---------------------------------------------------------------------------
// Inventaire
// ---------------------------------------------------------------------------

async fn list_by(app: &AppState, query: AssetQuery) -> ApiResult<Json<Vec<InventoryAsset>>> {
    Ok(Json(app.inventory.list(&query).await?))
}

async fn list_inventory(State(app): State<AppState>) -> ApiResult<Json<Vec<InventoryAsset>>> {
    list_by(&app, AssetQuery::all()).await
}

async fn list_servers(State(app): State<AppState>) -> ApiResult<Json<Vec<InventoryAsset>>> {
    list_by(&app, AssetQuery::servers(false)).await
}

async fn list_gpu_servers(State(app): State<AppState>) -> ApiResult<Json<Vec<InventoryAsset>>> {
    list_by(&app, AssetQuery::servers(true)).await
}

async fn list_robots(State(app): State<AppState>) -> ApiResult<Json<Vec<InventoryAsset>>> {
    list_by(&app, AssetQuery::robots()).await
}

async fn list_sensors(State(app): State<AppState>) -> ApiResult<Json<Vec<InventoryAsset>>> {
    list_by(&app, AssetQuery::sensors()).await
}

async fn get_asset(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<InventoryAsset>> {
    Ok(Json(app.inventory.get(&id).await?))
}

async fn create_asset(
    State(app): State<AppState>,
    Json(asset): Json<InventoryAsset>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let key = asset.id.clone();
    app.inventory.create(asset).await?;
    Ok((StatusCode::CREATED, Json(Created { key })))
}

async fn update_asset(State(app): State<AppState>, Json(asset): Json<InventoryAsset>) -> ApiResult<Json<Created>> {
    let key = asset.id.clone();
    app.inventory.update(asset).await?;
    Ok(Json(Created { key }))
}

async fn delete_asset(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<StatusCode> {
    app.inventory.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Latence
// ---------------------------------------------------------------------------

// GET /latency/targets?source=
async fn latency_targets(
    State(app): State<AppState>,
    Query(params): Query<TargetsParams>,
) -> ApiResult<Json<LatencyTargets>> {
    let source = params
        .source
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("query parameter `source` is required".into()))?;
    Ok(Json(latency_targets_for(app.inventory.as_ref(), &source).await?))
}

// POST /latency
async fn archive_latency(
    State(app): State<AppState>,
    Json(batch): Json<LatencyBatch>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let key = app.archiver.archive_latency(batch).await?;
    app.health.batch_archived();
    Ok((StatusCode::CREATED, Json(Created { key })))
}

async fn get_latency(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<LatencyRecord>> {
    Ok(Json(app.history.latency_record(&id).await?))
}

async fn latency_by_source(
    State(app): State<AppState>,
    Path((source, minutes)): Path<(String, i64)>,
) -> ApiResult<Json<Vec<LatencyRecord>>> {
    Ok(Json(app.history.latency_by_source(&source, minutes).await?))
}

async fn latency_by_target(
    State(app): State<AppState>,
    Path((target, minutes)): Path<(String, i64)>,
) -> ApiResult<Json<Vec<LatencyRecord>>> {
    Ok(Json(app.history.latency_by_target(&target, minutes).await?))
}

async fn latency_analysis(
    State(app): State<AppState>,
    Path((target, minutes)): Path<(String, i64)>,
) -> ApiResult<Json<Vec<LatencyAnalysis>>> {
    Ok(Json(app.analyzer.latency_for_target(&target, minutes).await?))
}

// ---------------------------------------------------------------------------
// Ressources
// ---------------------------------------------------------------------------

// POST /resources?host=
async fn archive_resources(
    State(app): State<AppState>,
    Query(params): Query<ReportParams>,
    Json(report): Json<HostReport>,
) -> ApiResult<(StatusCode, Json<Created>)> {
    let host = params
        .host
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| report.host.hostname.clone());
    let key = app.archiver.archive_resources(&host, &report).await?;
    app.health.report_archived();
    Ok((StatusCode::CREATED, Json(Created { key })))
}

async fn resources_by_device(
    State(app): State<AppState>,
    Path((host, minutes)): Path<(String, i64)>,
) -> ApiResult<Json<Vec<ResourceSnapshot>>> {
    Ok(Json(app.history.resources_by_host(&host, minutes).await?))
}

async fn resources_analysis(
    State(app): State<AppState>,
    Path((host, minutes)): Path<(String, i64)>,
) -> ApiResult<Json<ResourceAnalysis>> {
    Ok(Json(app.analyzer.resources_for_host(&host, minutes).await?))
}

// ---------------------------------------------------------------------------
// Sélection
// ---------------------------------------------------------------------------

// GET /selector/target/{target}/minutes/{m}/gpu/{0|1}
async fn select_server(
    State(app): State<AppState>,
    Path((target, minutes, gpu)): Path<(String, i64, u8)>,
) -> ApiResult<Json<SelectionOutcome>> {
    let gpu_required = match gpu {
        0 => false,
        1 => true,
        other => return Err(ApiError::BadRequest(format!("gpu must be 0 or 1, got {other}"))),
    };
    let outcome = app.selector.select(&SelectionRequest { target, minutes, gpu_required }).await?;
    app.health.selection_served();
    Ok(Json(outcome))
}

async fn list_selections(State(app): State<AppState>) -> ApiResult<Json<Vec<SelectionDecision>>> {
    Ok(Json(app.history.selections(Subject::Any).await?))
}

async fn get_selection(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<SelectionDecision>> {
    Ok(Json(app.history.selection(&id).await?))
}

async fn selections_by_target(
    State(app): State<AppState>,
    Path(target): Path<String>,
) -> ApiResult<Json<Vec<SelectionDecision>>> {
    Ok(Json(app.history.selections(Subject::Target(target)).await?))
}

async fn selections_by_asset(
    State(app): State<AppState>,
    Path(asset): Path<String>,
) -> ApiResult<Json<Vec<SelectionDecision>>> {
    Ok(Json(app.history.selections(Subject::Asset(asset)).await?))
}

// ---------------------------------------------------------------------------
// Sonde
// ---------------------------------------------------------------------------

// POST /probe : cycle immédiat depuis la gateway, non archivé
async fn probe_now(
    State(app): State<AppState>,
    Json(request): Json<LatencyTargets>,
) -> ApiResult<Json<LatencyBatch>> {
    Ok(Json(app.orchestrator.run(&request).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use edgepick_core::clock::Clock;
    use edgepick_core::model::Timestamp;
    use edgepick_core::{InventoryRegistry, KeyMode, LedgerStore};
    use edgepick_devkit::{batch, AssetBuilder, FixedClock, MockProbe, ReportBuilder};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use time::macros::datetime;
    use tower::ServiceExt;

    struct Fixture {
        app: AppState,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::at(datetime!(2024-05-01 12:00:00 UTC)));
        let probe = MockProbe::new().succeed("robot-1.local", 8).fail("sensor-1.local");
        let app = AppState::new(
            Arc::new(LedgerStore::in_memory()),
            Arc::new(InventoryRegistry::in_memory()),
            probe.shared(),
            clock.clone(),
            KeyMode::Insert,
        );
        Fixture { app, clock }
    }

    async fn call(app: &AppState, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        call_with(app, method, uri, body, None).await
    }

    async fn call_with(
        app: &AppState,
        method: &str,
        uri: &str,
        body: Option<Value>,
        api_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let response = build_router(app.clone()).oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()));
        (status, value)
    }

    async fn seed(app: &AppState) {
        for asset in [
            AssetBuilder::server("srv-1").build(),
            AssetBuilder::server("srv-2").gpu().build(),
            AssetBuilder::robot("robot-1").build(),
            AssetBuilder::sensor("sensor-1").build(),
        ] {
            let (status, _) = call(app, "POST", "/inventory", Some(serde_json::to_value(&asset).unwrap())).await;
            assert_eq!(status, StatusCode::CREATED);
        }
    }

    #[tokio::test]
    async fn test_health_is_plain_ok() {
        let f = fixture();
        let (status, body) = call(&f.app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!("ok"));
    }

    #[tokio::test]
    async fn test_inventory_routes() {
        let f = fixture();
        seed(&f.app).await;

        let (_, servers) = call(&f.app, "GET", "/inventory/servers", None).await;
        assert_eq!(servers.as_array().unwrap().len(), 2);
        let (_, gpu) = call(&f.app, "GET", "/inventory/servers/gpu", None).await;
        assert_eq!(gpu[0]["id"], json!("srv-2"));
        assert_eq!(gpu[0]["properties"]["gpu"], json!(1));

        let dup = serde_json::to_value(AssetBuilder::server("srv-1").build()).unwrap();
        let (status, body) = call(&f.app, "POST", "/inventory", Some(dup)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("srv-1"));

        let (status, _) = call(&f.app, "DELETE", "/inventory/sensor-1", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(&f.app, "GET", "/inventory/sensor-1", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_latency_targets_need_source() {
        let f = fixture();
        seed(&f.app).await;

        let (status, _) = call(&f.app, "GET", "/latency/targets", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = call(&f.app, "GET", "/latency/targets?source=robot-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], json!("robot-1"));
        assert_eq!(body["targets"][0]["hostname"], json!("sensor-1.local"));
        assert_eq!(body["targets"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_latency_archive_and_analysis() {
        let f = fixture();
        let at = f.clock.now() - time::Duration::seconds(30);
        let posted = serde_json::to_value(batch("srv-1", at, &[("robot-1", 10), ("robot-2", -1)])).unwrap();

        let (status, body) = call(&f.app, "POST", "/latency", Some(posted.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["key"], json!("srv-1-2024-05-01T11:59:30"));

        let (status, _) = call(&f.app, "POST", "/latency", Some(posted)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, record) = call(&f.app, "GET", "/latency/srv-1-2024-05-01T11:59:30", None).await;
        assert_eq!(record["source"], json!("srv-1"));
        assert_eq!(record["results"][1]["latency"], json!(-1));

        let (_, by_target) = call(&f.app, "GET", "/latency/target/robot-2/minutes/5", None).await;
        assert_eq!(by_target.as_array().unwrap().len(), 1);

        let (_, analysis) = call(&f.app, "GET", "/latency/analysis/target/robot-1/minutes/5", None).await;
        assert_eq!(analysis[0]["hostname"], json!("srv-1"));
        assert_eq!(analysis[0]["averageLatency"], json!(10.0));
        assert_eq!(analysis[0]["latencyCount"], json!(1));

        let (status, _) = call(&f.app, "GET", "/latency/source/srv-1/minutes/-3", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let f = fixture();
        let posted = json!({"source": "srv-1", "timestamp": Timestamp::from(f.clock.now()), "results": []});
        let (status, _) = call(&f.app, "POST", "/latency", Some(posted)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resources_keyed_by_query_host_then_report() {
        let f = fixture();
        let at = f.clock.now() - time::Duration::seconds(10);
        let report = ReportBuilder::new("container-id", at).cpu(20.0).memory(30.0).containers(2, 1).build();
        let report = serde_json::to_value(report).unwrap();

        let (status, body) = call(&f.app, "POST", "/resources?host=srv-1", Some(report.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["key"], json!("srv-1-2024-05-01T11:59:50"));

        let (_, body) = call(&f.app, "POST", "/resources", Some(report)).await;
        assert_eq!(body["key"], json!("container-id-2024-05-01T11:59:50"));

        let (_, analysis) = call(&f.app, "GET", "/resources/analysis/device/srv-1/minutes/5", None).await;
        assert_eq!(analysis["cpuAverageUsage"], json!(20.0));
        assert_eq!(analysis["containersRunning"], json!(2));
        assert_eq!(analysis["count"], json!(1));

        let (_, snapshots) = call(&f.app, "GET", "/resources/device/srv-1/minutes/5", None).await;
        assert_eq!(snapshots.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_selection_roundtrip() {
        let f = fixture();
        seed(&f.app).await;
        let at = f.clock.now() - time::Duration::seconds(20);
        for (server, latency, cpu) in [("srv-1", 5, 50.0), ("srv-2", 5, 30.0)] {
            let posted = serde_json::to_value(batch(server, at, &[("robot-1", latency)])).unwrap();
            call(&f.app, "POST", "/latency", Some(posted)).await;
            let report = serde_json::to_value(ReportBuilder::new(server, at).cpu(cpu).build()).unwrap();
            call(&f.app, "POST", "/resources", Some(report)).await;
        }

        let (status, outcome) = call(&f.app, "GET", "/selector/target/robot-1/minutes/5/gpu/0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["selected"]["asset"]["id"], json!("srv-2"));
        assert_eq!(outcome["options"][0]["asset"]["id"], json!("srv-1"));

        let (_, history) = call(&f.app, "GET", "/selector/target/robot-1", None).await;
        assert_eq!(history[0]["assetID"], json!("srv-2"));
        let id = history[0]["id"].as_str().unwrap().to_string();
        let (status, _) = call(&f.app, "GET", &format!("/selector/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, by_asset) = call(&f.app, "GET", "/selector/asset/srv-2", None).await;
        assert_eq!(by_asset.as_array().unwrap().len(), 1);

        let (status, _) = call(&f.app, "GET", "/selector/target/robot-1/minutes/5/gpu/7", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, health) = call(&f.app, "GET", "/system/health", None).await;
        assert_eq!(health["selections_served"], json!(1));
        assert_eq!(health["batches_archived"], json!(2));
        assert_eq!(health["assets_registered"], json!(4));
    }

    #[tokio::test]
    async fn test_empty_selection_is_null_pair() {
        let f = fixture();
        seed(&f.app).await;
        let (status, outcome) = call(&f.app, "GET", "/selector/target/robot-1/minutes/5/gpu/1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, json!({"selected": null, "options": null}));
        let (_, history) = call(&f.app, "GET", "/selector", None).await;
        assert_eq!(history, json!([]));
    }

    #[tokio::test]
    async fn test_probe_now() {
        let f = fixture();
        let request = json!({
            "source": "gateway",
            "targets": [
                {"hostname": "robot-1.local", "hostPort": "22", "hostUser": "ops", "hostPassword": "pw"},
                {"hostname": "sensor-1.local", "hostPort": "22", "hostUser": "ops", "hostPassword": "pw"}
            ]
        });
        let (status, batch) = call(&f.app, "POST", "/probe", Some(request)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(batch["results"][0], json!({"hostname": "robot-1.local", "latency": 8}));
        assert_eq!(batch["results"][1], json!({"hostname": "sensor-1.local", "latency": -1}));

        let (status, _) = call(&f.app, "POST", "/probe", Some(json!({"source": "gateway", "targets": []}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_api_key_guard() {
        let f = fixture();
        let app = f.app.with_api_key(Some("s3cret".into()));

        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = call(&app, "GET", "/inventory", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call_with(&app, "GET", "/inventory", None, Some("nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call_with(&app, "GET", "/inventory", None, Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
