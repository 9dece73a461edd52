//! 上行消息路由
//!
//! 解析客户端文本帧，依据缓存的成员关系鉴权，委托消息服务持久化后广播。

use std::sync::Arc;

use domain::{MessageService, UserId};
use tracing::{debug, warn};

use crate::connection::Connection;
use crate::envelope::{IncomingEnvelope, IncomingMessageType, OutgoingEnvelope, SendMessageDto};
use crate::hub::ChatHub;

/// 单个上行帧的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundOutcome {
    /// 已持久化并广播
    Broadcast { delivered: usize },
    /// 发送者不属于该聊天，静默丢弃
    Unauthorized,
    /// 消息服务拒绝（聊天不存在、发送者不是参与者等）
    Rejected,
    /// JSON 无法解析，已回送 `ERROR`
    InvalidJson,
    /// 连接已不在线
    Ignored,
}

#[derive(Clone)]
pub struct InboundRouter {
    hub: Arc<ChatHub>,
    message_service: Arc<dyn MessageService>,
}

impl InboundRouter {
    pub fn new(hub: Arc<ChatHub>, message_service: Arc<dyn MessageService>) -> Self {
        Self {
            hub,
            message_service,
        }
    }

    pub async fn handle_text(&self, connection: &Connection, text: &str) -> InboundOutcome {
        debug!(connection_id = %connection.id(), "Received message {}", text);

        if !connection.is_open() {
            return InboundOutcome::Ignored;
        }

        let envelope = match IncomingEnvelope::parse(text) {
            Ok(envelope) => envelope,
            Err(err) => return self.reject_json(connection, text, &err).await,
        };

        match envelope.message_type {
            IncomingMessageType::NewMessage => match envelope.decode_payload::<SendMessageDto>() {
                Ok(dto) => self.handle_send_message(dto, connection.user_id()).await,
                Err(err) => self.reject_json(connection, text, &err).await,
            },
        }
    }

    async fn handle_send_message(&self, dto: SendMessageDto, sender_id: UserId) -> InboundOutcome {
        if !self.hub.is_member(sender_id, dto.chat_id).await {
            debug!(user_id = %sender_id, chat_id = %dto.chat_id, "Sender not in cached chat membership, dropping");
            return InboundOutcome::Unauthorized;
        }

        let saved = match self
            .message_service
            .send_message(dto.chat_id, sender_id, dto.content, dto.message_id)
            .await
        {
            Ok(message) => message,
            Err(err) => {
                warn!(user_id = %sender_id, chat_id = %dto.chat_id, error = %err, "Message service rejected message");
                return InboundOutcome::Rejected;
            }
        };

        let broadcast = match OutgoingEnvelope::new_message(&saved) {
            Ok(envelope) => self.hub.broadcast_to_chat(saved.chat_id, &envelope).await,
            Err(err) => Err(err.into()),
        };

        match broadcast {
            Ok(delivered) => InboundOutcome::Broadcast { delivered },
            Err(err) => {
                warn!(chat_id = %saved.chat_id, error = %err, "Failed to broadcast new message");
                InboundOutcome::Broadcast { delivered: 0 }
            }
        }
    }

    async fn reject_json(
        &self,
        connection: &Connection,
        text: &str,
        err: &serde_json::Error,
    ) -> InboundOutcome {
        warn!(connection_id = %connection.id(), error = %err, "Couldn't parse message {}", text);

        let sent = match OutgoingEnvelope::invalid_json() {
            Ok(envelope) => self.hub.send_to_connection(connection.id(), &envelope).await,
            Err(err) => Err(err.into()),
        };
        if let Err(err) = sent {
            warn!(connection_id = %connection.id(), error = %err, "Couldn't send error message");
        }

        InboundOutcome::InvalidJson
    }
}
