//! # HTTP API
//!
//! Thin axum front end over [`TransactionService`]. Every handler does one
//! service call and maps the typed error to a status code; none of them
//! carries lifecycle logic.
//!
//! ## Endpoints
//!
//! | Method | Path                            | Operation                  |
//! |--------|---------------------------------|----------------------------|
//! | GET    | `/health`                       | Liveness probe             |
//! | GET    | `/metrics`                      | Prometheus exposition      |
//! | GET    | `/total`                        | Stored transaction count   |
//! | GET    | `/info`                         | Consensus engine info      |
//! | POST   | `/transactions`                 | Construct                  |
//! | GET    | `/transactions/:id`             | Get                        |
//! | GET    | `/transactions/:id/state`       | Lifecycle state            |
//! | GET    | `/transactions/:id/query`       | Query the consensus index  |
//! | POST   | `/transactions/:id/sign`        | Sign                       |
//! | POST   | `/transactions/:id/encode`      | Encode (`?params=`)        |
//! | POST   | `/transactions/:id/decode`      | Decode (`?params=`)        |
//! | POST   | `/transactions/:id/broadcast`   | Broadcast                  |
//! | POST   | `/transactions/:id/append`      | Append an amendment        |
//!
//! Errors map `NotFound → 404`, `InvalidState → 406`,
//! `InvalidPayload → 400`, everything else `500`, with a body of
//! `{"error": "...", "kind": "..."}`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use bftx_protocol::{BftxError, BftxResult, ErrorKind, TransactionService};

use crate::metrics::{metrics_handler, SharedMetrics};

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub service: Arc<TransactionService>,
    pub metrics: SharedMetrics,
}

impl AppState {
    /// Count the call and pass the result through.
    fn served<T>(&self, operation: &str, result: BftxResult<T>) -> Result<T, ApiError> {
        self.metrics
            .record(operation, result.as_ref().err().map(BftxError::kind));
        result.map_err(ApiError)
    }
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let metrics = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(Arc::clone(&state.metrics));

    Router::new()
        .route("/health", get(health_handler))
        .route("/total", get(total_handler))
        .route("/info", get(info_handler))
        .route("/transactions", post(construct_handler))
        .route("/transactions/:id", get(get_handler))
        .route("/transactions/:id/state", get(state_handler))
        .route("/transactions/:id/query", get(query_handler))
        .route("/transactions/:id/sign", post(sign_handler))
        .route("/transactions/:id/encode", post(encode_handler))
        .route("/transactions/:id/decode", post(decode_handler))
        .route("/transactions/:id/broadcast", post(broadcast_handler))
        .route("/transactions/:id/append", post(append_handler))
        .with_state(state)
        .merge(metrics)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct ApiError(BftxError);

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState => StatusCode::NOT_ACCEPTABLE,
        ErrorKind::InvalidPayload => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let body = ErrorResponse {
            error: self.0.to_string(),
            kind: kind.as_str().to_string(),
        };
        (status_for(kind), Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ParamsQuery {
    pub params: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: String,
}

/// The body is parsed here rather than by `Json` so a malformed payload is
/// an `InvalidPayload` like any other.
fn parse_payload(body: &[u8]) -> BftxResult<Value> {
    serde_json::from_slice(body)
        .map_err(|e| BftxError::InvalidPayload(format!("request body is not JSON: {e}")))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": state.version,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn total_handler(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let total = state.served("total", state.service.total().await)?;
    state.metrics.stored_transactions.set(total as i64);
    Ok(Json(json!({ "total": total })))
}

async fn info_handler(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let info = state.served("info", state.service.info().await)?;
    Ok(Json(info))
}

async fn construct_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let result = match parse_payload(&body) {
        Ok(payload) => state.service.construct(payload).await,
        Err(e) => Err(e),
    };
    let id = state.served("construct", result)?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

async fn get_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.served("get", state.service.get(&id).await)?;
    Ok(Json(tx))
}

async fn state_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let lifecycle = state.served("state", state.service.state(&id).await)?;
    Ok(Json(json!({ "id": id, "state": lifecycle.as_str() })))
}

async fn query_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.served("query", state.service.query(&id).await)?;
    Ok(Json(tx))
}

async fn sign_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let tx = state.served("sign", state.service.sign(&id).await)?;
    Ok(Json(tx))
}

async fn encode_handler(
    Path(id): Path<String>,
    Query(query): Query<ParamsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.service.encode(&id, query.params.as_deref()).await;
    let tx = state.served("encode", result)?;
    Ok(Json(tx))
}

async fn decode_handler(
    Path(id): Path<String>,
    Query(query): Query<ParamsQuery>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state.service.decode(&id, query.params.as_deref()).await;
    let tx = state.served("decode", result)?;
    Ok(Json(tx))
}

async fn broadcast_handler(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let started = Instant::now();
    let result = state.service.broadcast(&id).await;
    if result.is_ok() {
        state
            .metrics
            .broadcast_latency_seconds
            .observe(started.elapsed().as_secs_f64());
    }
    let receipt = state.served("broadcast", result)?;
    Ok(Json(receipt))
}

async fn append_handler(
    Path(old_id): Path<String>,
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let result = match parse_payload(&body) {
        Ok(payload) => state.service.append(payload, &old_id).await,
        Err(e) => Err(e),
    };
    let id = state.served("append", result)?;
    Ok((StatusCode::CREATED, Json(IdResponse { id })))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use bftx_protocol::crypto::NodeKeypair;
    use bftx_protocol::{BftxDb, EncodingPipeline, LocalEngine, SigningService};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::metrics::NodeMetrics;

    fn test_router() -> (Router, Arc<LocalEngine>) {
        let engine = Arc::new(LocalEngine::new());
        let db = Arc::new(BftxDb::open_temporary().expect("temp db"));
        let service = TransactionService::new(
            db,
            engine.clone(),
            SigningService::new(NodeKeypair::generate()),
            EncodingPipeline::ephemeral(),
        );
        let state = AppState {
            version: "0.1.0-test".into(),
            service: Arc::new(service),
            metrics: Arc::new(NodeMetrics::new().unwrap()),
        };
        (create_router(state), engine)
    }

    async fn send(router: &Router, method: &str, path: &str, body: Body) -> (StatusCode, Value) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn get(router: &Router, path: &str) -> (StatusCode, Value) {
        send(router, "GET", path, Body::empty()).await
    }

    async fn post(router: &Router, path: &str, body: Value) -> (StatusCode, Value) {
        send(router, "POST", path, Body::from(serde_json::to_vec(&body).unwrap())).await
    }

    async fn construct(router: &Router, payload: Value) -> String {
        let (status, body) = post(router, "/transactions", payload).await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (router, _) = test_router();
        let (status, body) = get(&router, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn full_lifecycle_over_http() {
        let (router, engine) = test_router();
        let id = construct(&router, json!({"cargo": "steel"})).await;

        let (status, body) = post(&router, &format!("/transactions/{id}/sign"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Verified"], true);

        let (status, body) = post(&router, &format!("/transactions/{id}/broadcast"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["hash"].is_string());
        assert_eq!(engine.broadcast_calls(), 1);

        let (status, body) = get(&router, &format!("/transactions/{id}/query")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Id"], id.as_str());

        let (_, body) = get(&router, &format!("/transactions/{id}/state")).await;
        assert_eq!(body["state"], "transmitted");

        let (_, body) = get(&router, "/total").await;
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn second_sign_is_not_acceptable() {
        let (router, _) = test_router();
        let id = construct(&router, json!({"cargo": "steel"})).await;
        post(&router, &format!("/transactions/{id}/sign"), Value::Null).await;

        let (status, body) = post(&router, &format!("/transactions/{id}/sign"), Value::Null).await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body["kind"], "invalid_state");
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let (router, _) = test_router();
        let (status, body) = get(&router, "/transactions/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
    }

    #[tokio::test]
    async fn bad_payloads_are_bad_requests() {
        let (router, _) = test_router();
        let (status, _) = post(&router, "/transactions", json!(["not", "an", "object"])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&router, "POST", "/transactions", Body::from("{oops")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn encode_and_decode_with_named_params() {
        let (router, _) = test_router();
        let payload = json!({"cargo": "grain", "tons": 40});
        let id = construct(&router, payload.clone()).await;

        let (status, body) =
            post(&router, &format!("/transactions/{id}/encode?params=kyber512"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Encoding"], "Encoded");

        let (status, body) =
            post(&router, &format!("/transactions/{id}/decode?params=kyber512"), Value::Null).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["Properties"], payload);

        let (status, _) =
            post(&router, &format!("/transactions/{id}/encode?params=saber"), Value::Null).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn append_returns_new_id() {
        let (router, _) = test_router();
        let old = construct(&router, json!({"cargo": "steel"})).await;

        let (status, body) = post(
            &router,
            &format!("/transactions/{old}/append"),
            json!({"cargo": "steel", "tons": 12}),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let new = body["id"].as_str().unwrap();

        let (_, parent) = get(&router, &format!("/transactions/{old}")).await;
        assert_eq!(parent["Amendment"], new);
    }

    #[tokio::test]
    async fn offline_engine_is_internal_error() {
        let (router, engine) = test_router();
        engine.set_offline(true);
        let (status, body) = post(&router, "/transactions", json!({"cargo": "steel"})).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["kind"], "unavailable_dependency");
    }

    #[tokio::test]
    async fn metrics_count_served_operations() {
        let (router, _) = test_router();
        get(&router, "/transactions/missing").await;

        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("bftx_failures_total{kind=\"not_found\",operation=\"get\"} 1"));
    }
}
