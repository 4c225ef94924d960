//! Web API 层。
//!
//! 提供 Axum 路由：实时聊天的 WebSocket 入口、历史查询接口以及健康检查。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::{ApiError, ErrorBody};
pub use routes::router;
pub use state::AppState;
