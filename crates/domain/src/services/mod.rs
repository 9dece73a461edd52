//! 领域服务接口
//!
//! 连接中心消费的外部协作者：令牌校验与消息持久化。

pub mod message_service;
pub mod token_validator;

// 重新导出服务
pub use message_service::*;
pub use token_validator::*;
