use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Extension, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::address::Principal;
use crate::alert::{AlertThresholds, RiskBand};
use crate::amount::SolvencyRatio;
use crate::clock::Timestamp;
use crate::history::{HistoryEntry, HistoryInfo, SolvencyHistory};
use crate::ledger::{LedgerError, LedgerSide, SolvencyLedger, SolvencyMetrics, UpdateReceipt};
use crate::middleware::{principal_middleware, request_logging, Caller};
use crate::snapshot::{SnapshotSubmission, ValuationSnapshot};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<SolvencyLedger>,
}

/// Create the API router
pub fn create_router(ledger: Arc<SolvencyLedger>) -> Router {
    let state = AppState { ledger };

    Router::new()
        .route("/health", get(health_check))
        .route("/api/solvency", get(get_metrics))
        .route("/api/solvency/ratio", get(get_ratio))
        .route("/api/solvency/assets", get(get_assets).post(post_assets))
        .route(
            "/api/solvency/liabilities",
            get(get_liabilities).post(post_liabilities),
        )
        .route("/api/solvency/history", get(get_history))
        .route("/api/solvency/history/info", get(get_history_info))
        .route("/api/oracles", get(get_oracles).post(post_oracle))
        .route("/api/oracles/:address", get(get_oracle))
        .with_state(state)
        .layer(middleware::from_fn(request_logging))
        .layer(middleware::from_fn(principal_middleware))
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn get_metrics(State(state): State<AppState>) -> Json<SolvencyMetrics> {
    Json(state.ledger.metrics())
}

async fn get_ratio(State(state): State<AppState>) -> Json<RatioResponse> {
    let (is_solvent, ratio) = state.ledger.verify_solvency();
    let thresholds = state.ledger.thresholds();
    Json(RatioResponse {
        is_solvent,
        ratio_percent: ratio.to_percent_string(),
        band: thresholds.classify(&ratio),
        ratio,
        thresholds,
    })
}

async fn get_assets(State(state): State<AppState>) -> Json<ValuationSnapshot> {
    Json(state.ledger.protocol_assets())
}

async fn get_liabilities(State(state): State<AppState>) -> Json<ValuationSnapshot> {
    Json(state.ledger.protocol_liabilities())
}

async fn post_assets(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    body: Result<Json<SnapshotSubmission>, JsonRejection>,
) -> Result<Json<UpdateReceipt>, ApiError> {
    submit(&state, caller, LedgerSide::Assets, body)
}

async fn post_liabilities(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    body: Result<Json<SnapshotSubmission>, JsonRejection>,
) -> Result<Json<UpdateReceipt>, ApiError> {
    submit(&state, caller, LedgerSide::Liabilities, body)
}

/// Caller is checked before the body, so an anonymous request gets 401
/// whatever it sends.
fn submit(
    state: &AppState,
    caller: Option<Extension<Caller>>,
    side: LedgerSide,
    body: Result<Json<SnapshotSubmission>, JsonRejection>,
) -> Result<Json<UpdateReceipt>, ApiError> {
    let caller = require_caller(caller)?;
    let Json(submission) = body?;
    let receipt = state.ledger.update(&caller, side, submission)?;
    Ok(Json(receipt))
}

/// History in `[start, end]`; both bounds default to the full range.
async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(params) = query?;
    let start = params.start.unwrap_or(Timestamp::MIN);
    let end = params.end.unwrap_or(Timestamp::MAX);
    let entries = state.ledger.history(start, end);
    let count = entries.len();

    let response = match params.view.unwrap_or_default() {
        HistoryView::Entries => HistoryResponse::Entries { count, entries },
        HistoryView::Columns => HistoryResponse::Columns {
            count,
            history: SolvencyHistory::from(entries),
        },
    };
    Ok(Json(response))
}

async fn get_history_info(State(state): State<AppState>) -> Json<HistoryInfo> {
    Json(state.ledger.history_info())
}

async fn get_oracles(State(state): State<AppState>) -> Json<OraclesResponse> {
    Json(OraclesResponse {
        owner: state.ledger.owner(),
        sources: state.ledger.sources(),
    })
}

async fn get_oracle(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<OracleStatus>, ApiError> {
    let address: Principal = address
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid address {}: {}", address, e)))?;
    Ok(Json(OracleStatus {
        address,
        authorized: state.ledger.is_authorized(&address),
        changed: None,
    }))
}

async fn post_oracle(
    State(state): State<AppState>,
    caller: Option<Extension<Caller>>,
    body: Result<Json<OracleRequest>, JsonRejection>,
) -> Result<Json<OracleStatus>, ApiError> {
    let caller = require_caller(caller)?;
    let Json(request) = body?;
    let changed = state
        .ledger
        .set_oracle(&caller, request.address, request.authorized)?;
    Ok(Json(OracleStatus {
        address: request.address,
        authorized: request.authorized,
        changed: Some(changed),
    }))
}

fn require_caller(caller: Option<Extension<Caller>>) -> Result<Principal, ApiError> {
    caller
        .map(|Extension(Caller(principal))| principal)
        .ok_or(ApiError::MissingPrincipal)
}

// ===== Request/Response Types =====

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum HistoryView {
    #[default]
    Entries,
    Columns,
}

#[derive(Deserialize)]
struct HistoryQuery {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
    view: Option<HistoryView>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum HistoryResponse {
    Entries {
        count: usize,
        entries: Vec<HistoryEntry>,
    },
    Columns {
        count: usize,
        history: SolvencyHistory,
    },
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct RatioResponse {
    is_solvent: bool,
    ratio: SolvencyRatio,
    ratio_percent: String,
    band: RiskBand,
    thresholds: AlertThresholds,
}

#[derive(Serialize)]
struct OraclesResponse {
    owner: Principal,
    sources: Vec<Principal>,
}

#[derive(Deserialize)]
struct OracleRequest {
    address: Principal,
    authorized: bool,
}

#[derive(Serialize)]
struct OracleStatus {
    address: Principal,
    authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed: Option<bool>,
}

// ===== Error Handling =====

#[derive(Debug)]
pub enum ApiError {
    MissingPrincipal,
    Ledger(LedgerError),
    BadRequest(String),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        ApiError::Ledger(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::MissingPrincipal => (
                StatusCode::UNAUTHORIZED,
                "Missing x-principal header".to_string(),
            ),
            ApiError::Ledger(err @ LedgerError::Unauthorized { .. }) => {
                (StatusCode::FORBIDDEN, err.to_string())
            }
            ApiError::Ledger(err @ LedgerError::InvalidSnapshot(_)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::clock::ManualClock;
    use crate::ledger::LedgerConfig;
    use crate::middleware::PRINCIPAL_HEADER;
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    const START: Timestamp = 1_700_000_000;

    fn owner() -> Principal {
        Address::from_low_u64(0xA11CE)
    }

    fn setup() -> (Router, Arc<SolvencyLedger>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let ledger =
            Arc::new(SolvencyLedger::new(LedgerConfig::new(owner()), clock.clone()).unwrap());
        (create_router(ledger.clone()), ledger, clock)
    }

    fn post(uri: &str, caller: Option<Principal>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(caller) = caller {
            builder = builder.header(PRINCIPAL_HEADER, caller.to_string());
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn submission(token: u64, value: u64) -> Value {
        json!({
            "tokens": [Address::from_low_u64(token).to_string()],
            "amounts": ["1"],
            "values": [value.to_string()],
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _, _) = setup();
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_update_requires_principal() {
        let (app, ledger, _) = setup();
        let response = app
            .oneshot(post("/api/solvency/assets", None, submission(1, 100)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(ledger.protocol_assets().is_empty());
    }

    #[tokio::test]
    async fn test_update_rejects_unauthorized_principal() {
        let (app, ledger, _) = setup();
        let response = app
            .oneshot(post(
                "/api/solvency/assets",
                Some(Address::from_low_u64(0xBAD)),
                submission(1, 100),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(json_body(response).await["error"]
            .as_str()
            .unwrap()
            .contains("unauthorized"));
        assert!(ledger.protocol_assets().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_read_metrics() {
        let (app, _, clock) = setup();
        let response = app
            .clone()
            .oneshot(post("/api/solvency/assets", Some(owner()), submission(1, 6_500)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(receipt["ratio"], "20000");
        assert_eq!(receipt["history"]["outcome"], "recorded");

        clock.advance(10);
        let response = app
            .clone()
            .oneshot(post(
                "/api/solvency/liabilities",
                Some(owner()),
                submission(2, 5_000),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let receipt = json_body(response).await;
        assert_eq!(receipt["alert"]["kind"], "WARNING");
        assert_eq!(receipt["history"]["outcome"], "throttled");

        let metrics = json_body(app.clone().oneshot(get("/api/solvency")).await.unwrap()).await;
        assert_eq!(metrics["ratio"], "13000");
        assert_eq!(metrics["ratio_percent"], "130.00%");
        assert_eq!(metrics["is_solvent"], true);
        assert_eq!(metrics["total_assets"], "6500");

        let ratio = json_body(app.oneshot(get("/api/solvency/ratio")).await.unwrap()).await;
        assert_eq!(ratio["band"], "WARNING");
    }

    #[tokio::test]
    async fn test_invalid_snapshot_is_unprocessable() {
        let (app, ledger, _) = setup();
        let body = json!({
            "tokens": [Address::from_low_u64(1).to_string()],
            "amounts": ["1", "2"],
            "values": ["3"],
        });
        let response = app
            .oneshot(post("/api/solvency/assets", Some(owner()), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ledger.metrics().generation, 0);
    }

    #[tokio::test]
    async fn test_history_endpoints() {
        let (app, ledger, clock) = setup();
        for step in 0..3u64 {
            ledger
                .update_assets(
                    &owner(),
                    SnapshotSubmission::from_entries([crate::snapshot::SnapshotEntry::new(
                        Address::from_low_u64(1),
                        1u64,
                        100 + step,
                    )]),
                )
                .unwrap();
            clock.advance(3_600);
        }

        let all = json_body(app.clone().oneshot(get("/api/solvency/history")).await.unwrap()).await;
        assert_eq!(all["count"], 3);

        let uri = format!(
            "/api/solvency/history?start={}&end={}&view=columns",
            START + 1,
            START + 3_600
        );
        let columns = json_body(app.clone().oneshot(get(&uri)).await.unwrap()).await;
        assert_eq!(columns["count"], 1);
        assert_eq!(columns["history"]["timestamps"][0], START + 3_600);

        let inverted = format!("/api/solvency/history?start={}&end={}", START + 10, START);
        let empty = json_body(app.clone().oneshot(get(&inverted)).await.unwrap()).await;
        assert_eq!(empty["count"], 0);

        let info = json_body(app.oneshot(get("/api/solvency/history/info")).await.unwrap()).await;
        assert_eq!(info["total_entries"], 3);
        assert_eq!(info["oldest_timestamp"], START);
    }

    #[tokio::test]
    async fn test_oracle_management() {
        let (app, _, _) = setup();
        let oracle = Address::from_low_u64(0x0AC1E);
        let grant = json!({ "address": oracle.to_string(), "authorized": true });

        let response = app
            .clone()
            .oneshot(post("/api/oracles", Some(oracle), grant.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(post("/api/oracles", Some(owner()), grant))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["changed"], true);

        let status = json_body(
            app.clone()
                .oneshot(get(&format!("/api/oracles/{}", oracle)))
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(status["authorized"], true);

        let response = app.oneshot(get("/api/oracles/not-an-address")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_malformed_requests_get_json_errors() {
        let (app, ledger, _) = setup();
        let negative = json!({
            "tokens": [Address::from_low_u64(1).to_string()],
            "amounts": ["-1"],
            "values": ["3"],
        });

        let response = app
            .clone()
            .oneshot(post("/api/solvency/assets", Some(owner()), negative.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let response = app
            .clone()
            .oneshot(post("/api/solvency/liabilities", None, negative))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let untyped = Request::builder()
            .method("POST")
            .uri("/api/oracles")
            .header(PRINCIPAL_HEADER, owner().to_string())
            .body(Body::from("authorized=true"))
            .unwrap();
        let response = app.clone().oneshot(untyped).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        let response = app
            .oneshot(get("/api/solvency/history?start=yesterday"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());

        assert_eq!(ledger.metrics().generation, 0);
    }
}
