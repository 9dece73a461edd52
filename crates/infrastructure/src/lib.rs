//! 基础设施层实现。
//!
//! 提供内存聊天存储，实现领域层定义的聊天目录与消息服务接口，
//! 并通过提交后发布器把领域事件交给连接中心。

pub mod memory_store;

pub use memory_store::InMemoryChatStore;
