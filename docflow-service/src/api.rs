//! HTTP API for the docflow service.
//!
//! Every pipeline stage is its own endpoint so an external workflow engine
//! can call them one at a time:
//! - Stage endpoints under `/stages`
//! - The orchestration trigger
//! - Upload and status lookup for the front end
//! - Execution details for runs
//! - Health and metrics monitoring

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::service::PipelineService;

pub mod documents;
pub mod executions;
pub mod stages;
use documents::{status_handler, upload_document_handler};
use executions::{get_execution_handler, stop_execution_handler};
use stages::{
    analyze_handler, classify_handler, extract_images_handler, launch_ocr_handler,
    trigger_handler, wait_ocr_handler,
};

/// Largest accepted document upload
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Application state
pub struct AppState {
    pub service: Arc<PipelineService>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(service: Arc<PipelineService>, metrics: Option<PrometheusHandle>) -> Router {
    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let stage_routes = Router::new()
        .route("/classify", post(classify_handler))
        .route("/ocr", post(analyze_handler))
        .route("/ocr/launch", post(launch_ocr_handler))
        .route("/ocr/wait", post(wait_ocr_handler))
        .route("/extract-images", post(extract_images_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/trigger", post(trigger_handler))
        .route("/status", get(status_handler))
        .route("/executions/{name}", get(get_execution_handler))
        .route("/executions/{name}/stop", post(stop_execution_handler))
        .route(
            "/documents",
            post(upload_document_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .nest("/stages", stage_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// === Health & Metrics ===

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
    workflow_engine: &'static str,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let workflow_engine = if state.service.local_engine().is_some() {
        "local"
    } else {
        "remote"
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        workflow_engine,
    })
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            "metrics recorder not installed\n".to_string(),
        ),
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::ServiceConfig;
    use crate::service::PipelineService;
    use crate::testing::{FakeObjectStore, FakeOcr, FakeRenderer, FakeWorkflowEngine};
    use crate::workflow::WorkflowEngine;

    pub struct TestApp {
        pub router: Router,
        pub service: Arc<PipelineService>,
        pub store: Arc<FakeObjectStore>,
        pub ocr: Arc<FakeOcr>,
        pub engine: Arc<FakeWorkflowEngine>,
        _scratch: TempDir,
    }

    /// App backed by a fake remote workflow engine.
    pub fn test_app(store: FakeObjectStore, ocr: FakeOcr) -> TestApp {
        build(store, ocr, true)
    }

    /// App running executions on the in-process engine.
    pub fn local_test_app(store: FakeObjectStore, ocr: FakeOcr) -> TestApp {
        build(store, ocr, false)
    }

    fn build(store: FakeObjectStore, ocr: FakeOcr, remote: bool) -> TestApp {
        let scratch = TempDir::new().unwrap();
        let mut config: ServiceConfig = serde_json::from_value(json!({})).unwrap();
        config.extraction.scratch_dir = scratch.path().to_path_buf();
        config.ocr.poll_interval_secs = 0;

        let store = Arc::new(store);
        let ocr = Arc::new(ocr);
        let engine = Arc::new(FakeWorkflowEngine::default());
        let remote_engine: Option<Arc<dyn WorkflowEngine>> = if remote {
            Some(engine.clone())
        } else {
            None
        };
        let service = Arc::new(PipelineService::assemble(
            config,
            store.clone(),
            ocr.clone(),
            Arc::new(FakeRenderer::new(2)),
            remote_engine,
        ));

        TestApp {
            router: super::router(service.clone(), None),
            service,
            store,
            ocr,
            engine,
            _scratch: scratch,
        }
    }

    pub async fn post_json(router: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        send(router, request).await
    }

    pub async fn get(router: &Router, uri: &str) -> (StatusCode, Value) {
        send(router, Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}
