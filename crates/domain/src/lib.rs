//! 聊天实时推送系统核心领域模型
//!
//! 包含标识符、聊天与消息实体、领域事件，以及连接中心所依赖的外部协作者接口
//! （令牌校验、聊天目录、消息持久化）。

pub mod chat;
pub mod errors;
pub mod events;
pub mod message;
pub mod repositories;
pub mod services;
pub mod value_objects;

// 重新导出常用类型
pub use chat::*;
pub use errors::*;
pub use events::*;
pub use message::*;
pub use repositories::*;
pub use services::*;
pub use value_objects::*;
