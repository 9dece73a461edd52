//! 领域模型错误定义
//!
//! 定义了聊天领域中可能出现的错误类型，提供清晰的错误上下文。

use thiserror::Error;

use crate::value_objects::{MessageId, UserId};

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 聊天不存在
    #[error("聊天不存在")]
    ChatNotFound,

    /// 聊天参与者不存在
    #[error("聊天参与者不存在: {user_id}")]
    ParticipantNotFound { user_id: UserId },

    /// 消息不存在
    #[error("消息不存在: {message_id}")]
    MessageNotFound { message_id: MessageId },

    /// 无权执行该操作
    #[error("权限不足")]
    Forbidden,

    /// 聊天至少需要两名参与者
    #[error("聊天至少需要两名参与者")]
    InvalidChatSize,

    /// 令牌无效或已过期
    #[error("令牌无效: {reason}")]
    InvalidToken { reason: String },

    /// 存储层错误
    #[error("存储错误: {message}")]
    Storage { message: String },
}

impl DomainError {
    /// 创建参与者不存在错误
    pub fn participant_not_found(user_id: UserId) -> Self {
        Self::ParticipantNotFound { user_id }
    }

    /// 创建消息不存在错误
    pub fn message_not_found(message_id: MessageId) -> Self {
        Self::MessageNotFound { message_id }
    }

    /// 创建令牌无效错误
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }

    /// 创建存储错误
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
