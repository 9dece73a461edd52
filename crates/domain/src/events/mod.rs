//! 领域事件定义
//!
//! 所有事件只在产生它的事务提交之后才会被投递给订阅方。

pub mod chat_event;

// 重新导出事件类型
pub use chat_event::*;
