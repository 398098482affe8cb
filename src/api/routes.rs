//! API Routes
//!
//! HTTP endpoints under `/api/symbol`:
//!
//! - `GET /api/symbol/height` — cache-fronted consensus height
//! - `GET /api/symbol/nodes/peer` — persisted snapshot, verbatim
//! - `GET /api/symbol/nodes/peersP2p` — P2P peer projection
//! - `GET /api/symbol/nodes/api` — reserved, always empty

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::WatchConfig;
use crate::crawler::snapshot::SnapshotStore;
use crate::height::HeightService;
use crate::rest::NodeApi;
use crate::types::{role_labels, KnownPeer, KnownPeerEndpoint, KnownPeerMetadata, PeerRecord};

/// At most this many snapshot entries are scanned for the P2P projection.
/// The cap counts scanned entries, not emitted ones.
const P2P_SCAN_LIMIT: usize = 10;

/// Shared API state
pub struct ApiState<A: NodeApi> {
    pub config: Arc<WatchConfig>,
    pub height: HeightService<A>,
    pub store: SnapshotStore,
}

impl<A: NodeApi> ApiState<A> {
    pub fn new(config: Arc<WatchConfig>, api: Arc<A>) -> Self {
        let height = HeightService::new(config.clone(), api);
        let store = SnapshotStore::new(&config.snapshot_path);
        Self { config, height, store }
    }
}

/// Build the router for the serving surface
pub fn router<A: NodeApi>(state: Arc<ApiState<A>>) -> Router {
    Router::new()
        .route("/api/symbol/height", get(get_height::<A>))
        .route("/api/symbol/nodes/peer", get(get_nodes_peer::<A>))
        .route("/api/symbol/nodes/peersP2p", get(get_nodes_peers_p2p::<A>))
        .route("/api/symbol/nodes/api", get(get_nodes_api))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_api_server<A: NodeApi>(state: Arc<ApiState<A>>) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], state.config.api_port));
    let app = router(state);

    info!("HTTP API listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /api/symbol/height - consensus height of the trusted node set
async fn get_height<A: NodeApi>(State(state): State<Arc<ApiState<A>>>) -> impl IntoResponse {
    match state.height.query().await {
        Ok(summary) => (StatusCode::OK, Json(serde_json::json!(summary))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// GET /api/symbol/nodes/peer - the persisted snapshot, byte-for-byte
async fn get_nodes_peer<A: NodeApi>(State(state): State<Arc<ApiState<A>>>) -> impl IntoResponse {
    match state.store.read_raw().await {
        Ok(raw) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            raw,
        )
            .into_response(),
        Err(e) => {
            warn!("Failed to read snapshot: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to read peer snapshot"})),
            )
                .into_response()
        }
    }
}

/// GET /api/symbol/nodes/peersP2p - projection of snapshot entries whose
/// role bitmask carries the Peer or Api bit
async fn get_nodes_peers_p2p<A: NodeApi>(
    State(state): State<Arc<ApiState<A>>>,
) -> impl IntoResponse {
    match state.store.read().await {
        Ok(records) => (StatusCode::OK, Json(project_known_peers(&records))).into_response(),
        Err(e) => {
            warn!("Failed to read snapshot: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": "Failed to read peer snapshot"})),
            )
                .into_response()
        }
    }
}

/// GET /api/symbol/nodes/api - reserved endpoint, always an empty list
async fn get_nodes_api() -> impl IntoResponse {
    Json(Vec::<KnownPeer>::new())
}

/// 404 fallback, JSON body like every other response
async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "Endpoint not found"})),
    )
}

/// Project the snapshot head into the P2P known-peer shape.
///
/// Scans at most [`P2P_SCAN_LIMIT`] entries; entries without the Peer or
/// Api role bit are skipped but still count against the scan cap.
fn project_known_peers(records: &[PeerRecord]) -> Vec<KnownPeer> {
    records
        .iter()
        .take(P2P_SCAN_LIMIT)
        .filter(|record| record.roles & 3 != 0)
        .map(|record| KnownPeer {
            public_key: record.main_public_key.clone(),
            endpoint: KnownPeerEndpoint {
                host: record.host.clone(),
                port: record.port,
            },
            metadata: KnownPeerMetadata {
                name: record.name.clone(),
                roles: role_labels(record.roles),
            },
        })
        .collect()
}
