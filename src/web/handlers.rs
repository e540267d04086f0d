//! HTTP request handlers.

use super::AppState;
use crate::check::{CheckError, CheckReport, CheckTarget};
use crate::probe::ProbeError;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

const DEFAULT_RESULTS_LIMIT: u32 = 100;

impl IntoResponse for CheckError {
    fn into_response(self) -> Response {
        let status = match &self {
            CheckError::Transport(ProbeError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            CheckError::Transport(_) => StatusCode::BAD_GATEWAY,
            CheckError::Storage(_) | CheckError::StorageTask(_) | CheckError::Publish(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

// ============================================================================
// Check invocation
// ============================================================================

pub async fn handle_check(
    State(state): State<AppState>,
    Json(target): Json<CheckTarget>,
) -> Result<Json<CheckReport>, Response> {
    if target.target_id.trim().is_empty() {
        return Err(bad_request("targetId must not be empty"));
    }
    if target.host.trim().is_empty() {
        return Err(bad_request("host must not be empty"));
    }

    match state.checker.run_check(&target).await {
        Ok(report) => Ok(Json(report)),
        Err(e) => Err(e.into_response()),
    }
}

pub async fn handle_healthz() -> &'static str {
    "ok"
}

// ============================================================================
// API: audit
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ResultsQuery {
    pub limit: Option<u32>,
}

pub async fn handle_get_results(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> impl IntoResponse {
    if !state.store.results_enabled() {
        return (StatusCode::NOT_FOUND, "Raw result persistence is disabled").into_response();
    }

    let limit = query.limit.unwrap_or(DEFAULT_RESULTS_LIMIT);
    match state.store.get_raw_results(&target_id, limit) {
        Ok(results) => Json(results).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub target_id: String,
    pub failing: bool,
    pub fail_counter: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
}

pub async fn handle_get_status(
    State(state): State<AppState>,
    Path(target_id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_counter(&target_id) {
        Ok(counter) => Json(TargetStatus {
            target_id,
            failing: counter.is_some(),
            fail_counter: counter.map_or(0, |c| c.fail_counter),
            threshold: counter.map(|c| c.threshold),
        })
        .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::Checker;
    use crate::db::{CounterStore, Store};
    use crate::probe::Prober;
    use crate::testutil::{closed_port, spawn_upstream};
    use crate::web::router;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::NamedTempFile;
    use tower::ServiceExt;

    fn state(tmp: &NamedTempFile, results_table: Option<&str>) -> AppState {
        let store = Arc::new(Store::open(tmp.path(), "uptime_status", results_table).unwrap());
        let mut checker = Checker::new(Prober::new().unwrap(), store.clone(), Duration::from_millis(500), 3);
        if results_table.is_some() {
            checker = checker.with_results(store.clone());
        }
        AppState {
            store,
            checker: Arc::new(checker),
        }
    }

    fn check_request(body: serde_json::Value) -> Request<Body> {
        Request::post("/check")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_check_returns_measurements() {
        let tmp = NamedTempFile::new().unwrap();
        let app = router(state(&tmp, Some("uptime_results")));
        let addr = spawn_upstream(StatusCode::OK, Duration::ZERO).await;

        let response = app
            .oneshot(check_request(json!({
                "targetId": "site-a",
                "host": format!("http://{}", addr),
                "expectedStatusCodes": [200]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["host"], format!("http://{}", addr));
        assert_eq!(body["statusCode"], 200);
        assert_eq!(body["dnsLookupMs"], 0);
        assert_eq!(body["tlsHandshakeMs"], 0);
        assert!(body["ttfbMs"].is_u64());
    }

    #[tokio::test]
    async fn test_check_unreachable_is_bad_gateway() {
        let tmp = NamedTempFile::new().unwrap();
        let app = router(state(&tmp, None));
        let port = closed_port().await;

        let response = app
            .oneshot(check_request(json!({
                "targetId": "site-a",
                "host": format!("http://127.0.0.1:{}", port),
                "expectedStatusCodes": [200]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().contains("connect failed"));
    }

    #[tokio::test]
    async fn test_check_timeout_is_gateway_timeout() {
        let tmp = NamedTempFile::new().unwrap();
        let app = router(state(&tmp, None));
        let addr = spawn_upstream(StatusCode::OK, Duration::from_secs(5)).await;

        let response = app
            .oneshot(check_request(json!({
                "targetId": "site-a",
                "host": format!("http://{}", addr),
                "expectedStatusCodes": [200]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_check_rejects_empty_target_id() {
        let tmp = NamedTempFile::new().unwrap();
        let app = router(state(&tmp, None));

        let response = app
            .oneshot(check_request(json!({
                "targetId": "",
                "host": "example.com",
                "expectedStatusCodes": [200]
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_check_rejects_malformed_body() {
        let tmp = NamedTempFile::new().unwrap();
        let app = router(state(&tmp, None));

        let response = app
            .oneshot(check_request(json!({ "host": "example.com" })))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_results_disabled() {
        let tmp = NamedTempFile::new().unwrap();
        let app = router(state(&tmp, None));

        let response = app
            .oneshot(Request::get("/api/results/site-a").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_reports_failing_streak() {
        let tmp = NamedTempFile::new().unwrap();
        let state = state(&tmp, None);
        state.store.increment_and_set_threshold("site-a", 3).unwrap();
        state.store.increment_and_set_threshold("site-a", 3).unwrap();
        let app = router(state);

        let response = app
            .clone()
            .oneshot(Request::get("/api/status/site-a").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "targetId": "site-a", "failing": true, "failCounter": 2, "threshold": 3 })
        );

        let response = app
            .oneshot(Request::get("/api/status/site-b").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            json_body(response).await,
            json!({ "targetId": "site-b", "failing": false, "failCounter": 0 })
        );
    }

    #[tokio::test]
    async fn test_healthz() {
        let tmp = NamedTempFile::new().unwrap();
        let app = router(state(&tmp, None));

        let response = app
            .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_storage_task_failure_is_internal_error() {
        let join_err = tokio::spawn(async { panic!("storage worker died") })
            .await
            .unwrap_err();

        let response = CheckError::StorageTask(join_err).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = json_body(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("storage task failed"));
    }
}
