//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::game::state::Phase;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.client_origin.as_deref());

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
fn cors_layer(client_origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods([Method::GET, Method::OPTIONS]);

    match client_origin {
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
                .collect();
            cors.allow_origin(allowed_origins)
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true)
        }
        None => cors.allow_origin(Any).allow_headers(Any),
    }
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    room_exists: bool,
    phase: Phase,
    players_count: usize,
    tick: u64,
    uptime_secs: u64,
    timestamp: String,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let room = state.room.status();

    Json(HealthResponse {
        status: "ok",
        room_exists: room.running,
        phase: room.phase,
        players_count: room.players_count,
        tick: room.tick,
        uptime_secs: uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::game::{Room, RoomSettings};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn test_config() -> Config {
        Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            client_origin: None,
            room_seed: Some(1),
            duck_timeout_ticks: None,
        }
    }

    #[tokio::test]
    async fn test_health_reports_room_status() {
        let (_room, handle) = Room::new(RoomSettings::default());
        let router = build_router(AppState::new(test_config(), handle));

        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["room_exists"], false);
        assert_eq!(json["phase"], "TITLE");
        assert_eq!(json["players_count"], 0);
        assert_eq!(json["tick"], 0);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let (_room, handle) = Room::new(RoomSettings::default());
        let router = build_router(AppState::new(test_config(), handle));

        let response = router
            .oneshot(Request::builder().uri("/matchmaking").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
