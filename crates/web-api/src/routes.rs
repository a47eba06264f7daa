use axum::{
    extract::{ws::WebSocketUpgrade, State},
    http::{header::HOST, HeaderMap},
    response::Response,
    routing::get,
    Json, Router,
};
use domain::Team;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use crate::{error::ApiError, state::AppState, ws_connection::WebSocketConnection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket_upgrade))
        // 兼容旧客户端的 SockJS 路径
        .route("/sockjs/sock", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "broker_connected": state.supervisor().is_connected(),
    }))
}

/// 团队取自 Host 头的第一个标签
async fn websocket_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let host = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let team = Team::from_host(host)?;

    let ctx = state.sessions.clone();
    Ok(ws.on_upgrade(move |socket| WebSocketConnection::new(socket, ctx, team).run()))
}
