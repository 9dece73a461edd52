//! WebSocket 文本帧的 JSON 信封
//!
//! 上行：`{"type": "NEW_MESSAGE", "payload": "<SendMessage JSON>"}`
//! 下行：`{"type": <OutgoingMessageType>, "payload": "<DTO JSON>"}`

use domain::{ChatId, ChatMessage, MessageId, Timestamp, UserId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 客户端可发送的消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessageType {
    NewMessage,
}

/// 服务端推送的消息类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutgoingMessageType {
    NewMessage,
    MessageDeleted,
    ChatParticipantsChanged,
    ProfilePictureUpdated,
    Error,
}

/// 上行信封
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingEnvelope {
    #[serde(rename = "type")]
    pub message_type: IncomingMessageType,
    pub payload: Value,
}

impl IncomingEnvelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// 解析内层负载；负载通常是 JSON 编码的字符串，也接受直接内嵌的对象
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match &self.payload {
            Value::String(raw) => serde_json::from_str(raw),
            other => serde_json::from_value(other.clone()),
        }
    }
}

/// 客户端发送消息负载
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageDto {
    pub chat_id: ChatId,
    pub content: String,
    #[serde(default)]
    pub message_id: Option<MessageId>,
}

/// 下行信封
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingEnvelope {
    #[serde(rename = "type")]
    pub message_type: OutgoingMessageType,
    pub payload: String,
}

impl OutgoingEnvelope {
    fn encode<T: Serialize>(
        message_type: OutgoingMessageType,
        dto: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            message_type,
            payload: serde_json::to_string(dto)?,
        })
    }

    pub fn new_message(message: &ChatMessage) -> Result<Self, serde_json::Error> {
        Self::encode(
            OutgoingMessageType::NewMessage,
            &ChatMessageDto::from(message),
        )
    }

    pub fn message_deleted(
        chat_id: ChatId,
        message_id: MessageId,
    ) -> Result<Self, serde_json::Error> {
        Self::encode(
            OutgoingMessageType::MessageDeleted,
            &DeleteMessageDto {
                chat_id,
                message_id,
            },
        )
    }

    pub fn participants_changed(chat_id: ChatId) -> Result<Self, serde_json::Error> {
        Self::encode(
            OutgoingMessageType::ChatParticipantsChanged,
            &ChatParticipantsChangedDto { chat_id },
        )
    }

    pub fn profile_picture_updated(
        user_id: UserId,
        new_url: Option<String>,
    ) -> Result<Self, serde_json::Error> {
        Self::encode(
            OutgoingMessageType::ProfilePictureUpdated,
            &ProfilePictureUpdateDto { user_id, new_url },
        )
    }

    pub fn error(code: &str, message: &str) -> Result<Self, serde_json::Error> {
        Self::encode(
            OutgoingMessageType::Error,
            &ErrorDto {
                code: code.to_string(),
                message: message.to_string(),
            },
        )
    }

    pub fn invalid_json() -> Result<Self, serde_json::Error> {
        Self::error("INVALID_JSON", "Incoming JSON or UUID is invalid")
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageDto {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub content: String,
    pub created_at: Timestamp,
    pub sender_id: UserId,
}

impl From<&ChatMessage> for ChatMessageDto {
    fn from(message: &ChatMessage) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            content: message.content.clone(),
            created_at: message.created_at,
            sender_id: message.sender_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageDto {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatParticipantsChangedDto {
    pub chat_id: ChatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfilePictureUpdateDto {
    pub user_id: UserId,
    pub new_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDto {
    pub code: String,
    pub message: String,
}
