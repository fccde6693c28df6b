//! HTTP endpoints for health checks and relay info.

use anyhow::Result;
use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::{future::Future, net::SocketAddr, sync::Arc};
use tracing::{debug, info};

use crate::ws::Relay;

#[derive(Clone)]
struct HttpState {
    relay: Arc<Relay>,
    name: String,
    description: String,
}

/// Response body for the `/healthz` endpoint.
#[derive(Serialize, Deserialize)]
struct Health {
    /// Always "ok" when the server is running.
    status: String,
    /// Live WebSocket sessions.
    connections: usize,
}

/// Start an HTTP server exposing `/healthz` and the relay info document.
pub async fn serve_http(
    addr: SocketAddr,
    relay: Arc<Relay>,
    name: String,
    description: String,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("http listening on {}", listener.local_addr()?);
    let state = Arc::new(HttpState {
        relay,
        name,
        description,
    });
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

fn router(state: Arc<HttpState>) -> Router {
    Router::new()
        .route("/", get(relay_info))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Health check endpoint.
async fn healthz(State(state): State<Arc<HttpState>>) -> Json<Health> {
    debug!("GET /healthz");
    Json(Health {
        status: "ok".to_string(),
        connections: state.relay.hub.len(),
    })
}

/// Minimal NIP-11 relay information document.
#[derive(Serialize, Deserialize)]
struct RelayInfo {
    /// Human-readable relay name.
    name: String,
    description: String,
    /// Software identifier (here it is always "flare").
    software: String,
    /// Semantic version string such as "0.1.0".
    version: String,
    supported_nips: Vec<u32>,
}

/// Basic NIP-11 relay information document.
async fn relay_info(State(state): State<Arc<HttpState>>) -> impl IntoResponse {
    debug!("GET /");
    (
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::CONTENT_TYPE, "application/nostr+json"),
        ],
        Json(RelayInfo {
            name: state.name.clone(),
            description: state.description.clone(),
            software: "flare".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            supported_nips: vec![1, 11],
        }),
    )
}
