//! Web API 层。
//!
//! 提供 Axum 路由：WebSocket 升级端点、健康检查与 HTTP 追踪。
//! 每个 WebSocket 连接交给应用层的会话驱动。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
pub use ws_connection::WebSocketConnection;
