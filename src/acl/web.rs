use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use miette::IntoDiagnostic;

use crate::acl::engine;
use crate::acl::types::{CapabilitiesRequest, CapabilitiesResponse, Decision, Request};
use crate::acl::Acl;
use crate::settings::Settings;

pub fn router(acl: Arc<Acl>) -> Router {
    Router::new()
        .route("/v1/authorize", post(handle_authorize))
        .route("/v1/capabilities", post(handle_capabilities))
        .route("/healthz", get(health))
        .with_state(acl)
}

pub async fn serve(settings: &Settings, acl: Arc<Acl>) -> miette::Result<()> {
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .into_diagnostic()?;
    tracing::info!(%addr, "heliopause listening");
    axum::serve(listener, router(acl)).await.into_diagnostic()?;
    Ok(())
}

async fn handle_authorize(
    State(acl): State<Arc<Acl>>,
    Json(req): Json<Request>,
) -> Json<Decision> {
    Json(engine::authorize(&acl, &req))
}

async fn handle_capabilities(
    State(acl): State<Arc<Acl>>,
    Json(req): Json<CapabilitiesRequest>,
) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        capabilities: engine::capabilities(&acl, &req.path),
    })
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
