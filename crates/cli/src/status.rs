//! Status web server: liveness, health summary and Prometheus metrics.

use std::sync::Arc;

use {
    axum::{
        Json, Router,
        extract::State,
        http::header,
        response::IntoResponse,
        routing::get,
    },
    mirror_metrics::MetricsHandle,
    mirror_relay::RelayCoordinator,
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
};

#[derive(Clone)]
pub struct StatusState {
    pub coordinator: Arc<RelayCoordinator>,
    pub metrics: MetricsHandle,
}

pub fn router(state: StatusState) -> Router {
    let mut router = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler));
    if state.metrics.is_exporting() {
        router = router.route("/metrics", get(metrics_handler));
    }
    router.with_state(state)
}

/// Serve until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: StatusState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
}

async fn root_handler() -> &'static str {
    "OK"
}

async fn health_handler(State(state): State<StatusState>) -> impl IntoResponse {
    let coordinator = &state.coordinator;
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "ready": coordinator.is_ready(),
        "routes": coordinator.routes().len(),
        "watched": coordinator.tracker().len(),
    }))
}

async fn metrics_handler(State(state): State<StatusState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
