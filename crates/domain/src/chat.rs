//! 聊天与参与者实体

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, Timestamp, UserId};

/// 聊天参与者（用户在聊天模块中的投影）。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatParticipant {
    pub user_id: UserId,
    pub username: String,
    pub profile_picture_url: Option<String>,
}

impl ChatParticipant {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            profile_picture_url: None,
        }
    }
}

/// 聊天实体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub creator_id: UserId,
    pub participants: HashSet<UserId>,
    pub created_at: Timestamp,
}

impl Chat {
    pub fn has_participant(&self, user_id: UserId) -> bool {
        self.participants.contains(&user_id)
    }
}
