//! 聊天相关的领域事件

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, MessageId, UserId};

/// 聊天相关的领域事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatEvent {
    /// 聊天创建事件
    ChatCreated {
        chat_id: ChatId,
        participant_ids: Vec<UserId>,
    },

    /// 参与者加入事件
    ParticipantsJoined {
        chat_id: ChatId,
        user_ids: Vec<UserId>,
    },

    /// 参与者离开事件
    ParticipantLeft { chat_id: ChatId, user_id: UserId },

    /// 消息删除事件
    MessageDeleted {
        chat_id: ChatId,
        message_id: MessageId,
    },

    /// 头像更新事件
    ProfilePictureUpdated {
        user_id: UserId,
        new_url: Option<String>,
    },
}

impl ChatEvent {
    /// 创建聊天创建事件
    pub fn chat_created(chat_id: ChatId, participant_ids: Vec<UserId>) -> Self {
        ChatEvent::ChatCreated {
            chat_id,
            participant_ids,
        }
    }

    /// 创建参与者加入事件
    pub fn participants_joined(chat_id: ChatId, user_ids: Vec<UserId>) -> Self {
        ChatEvent::ParticipantsJoined { chat_id, user_ids }
    }

    /// 创建参与者离开事件
    pub fn participant_left(chat_id: ChatId, user_id: UserId) -> Self {
        ChatEvent::ParticipantLeft { chat_id, user_id }
    }

    /// 创建消息删除事件
    pub fn message_deleted(chat_id: ChatId, message_id: MessageId) -> Self {
        ChatEvent::MessageDeleted {
            chat_id,
            message_id,
        }
    }

    /// 创建头像更新事件
    pub fn profile_picture_updated(user_id: UserId, new_url: Option<String>) -> Self {
        ChatEvent::ProfilePictureUpdated { user_id, new_url }
    }

    /// 事件名称，用于日志
    pub fn event_type(&self) -> &'static str {
        match self {
            ChatEvent::ChatCreated { .. } => "chat_created",
            ChatEvent::ParticipantsJoined { .. } => "participants_joined",
            ChatEvent::ParticipantLeft { .. } => "participant_left",
            ChatEvent::MessageDeleted { .. } => "message_deleted",
            ChatEvent::ProfilePictureUpdated { .. } => "profile_picture_updated",
        }
    }

    /// 事件涉及的聊天（头像更新不属于单个聊天）
    pub fn chat_id(&self) -> Option<ChatId> {
        match self {
            ChatEvent::ChatCreated { chat_id, .. }
            | ChatEvent::ParticipantsJoined { chat_id, .. }
            | ChatEvent::ParticipantLeft { chat_id, .. }
            | ChatEvent::MessageDeleted { chat_id, .. } => Some(*chat_id),
            ChatEvent::ProfilePictureUpdated { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn profile_picture_event_has_no_chat() {
        let event = ChatEvent::profile_picture_updated(UserId::from(Uuid::new_v4()), None);
        assert_eq!(event.chat_id(), None);
        assert_eq!(event.event_type(), "profile_picture_updated");
    }

    #[test]
    fn chat_scoped_events_expose_chat_id() {
        let chat_id = ChatId::from(Uuid::new_v4());
        let event = ChatEvent::message_deleted(chat_id, MessageId::from(Uuid::new_v4()));
        assert_eq!(event.chat_id(), Some(chat_id));
    }
}
