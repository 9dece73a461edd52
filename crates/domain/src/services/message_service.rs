use async_trait::async_trait;

use crate::errors::DomainResult;
use crate::message::ChatMessage;
use crate::value_objects::{ChatId, MessageId, UserId};

/// 消息服务接口
///
/// 负责在持久层校验聊天存在与发送者成员身份，并保存消息。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait MessageService: Send + Sync {
    /// 保存一条消息并返回持久化结果
    ///
    /// 失败时返回 `ChatNotFound` 或 `ParticipantNotFound`。
    async fn send_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: String,
        message_id: Option<MessageId>,
    ) -> DomainResult<ChatMessage>;
}
