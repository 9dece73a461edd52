//! Web API 层。
//!
//! 提供 Axum 路由：健康检查与聊天 WebSocket 端点，
//! 每个 socket 由独立的读循环与写任务驱动，状态全部交给应用层的连接中心。

mod auth;
mod error;
mod routes;
mod state;
mod ws_connection;

pub use auth::{Claims, JwtService};
pub use config::JwtConfig;
pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
