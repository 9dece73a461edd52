//! 单元测试共用的假实现

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use domain::{ChatDirectory, ChatId, DomainResult, UserId};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::connection::OutboundFrame;

pub(crate) fn user() -> UserId {
    UserId::from(Uuid::new_v4())
}

pub(crate) fn chat() -> ChatId {
    ChatId::from(Uuid::new_v4())
}

/// 取出通道中已排队的全部文本帧
pub(crate) fn drain_texts(rx: &mut mpsc::Receiver<OutboundFrame>) -> Vec<String> {
    let mut texts = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        if let OutboundFrame::Text(text) = frame {
            texts.push(text);
        }
    }
    texts
}

/// 固定成员关系的聊天目录
#[derive(Default)]
pub(crate) struct StaticDirectory {
    memberships: HashMap<UserId, HashSet<ChatId>>,
}

impl StaticDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_member(mut self, user_id: UserId, chats: &[ChatId]) -> Self {
        self.memberships
            .entry(user_id)
            .or_default()
            .extend(chats.iter().copied());
        self
    }
}

#[async_trait]
impl ChatDirectory for StaticDirectory {
    async fn list_chat_ids_for_user(&self, user_id: UserId) -> DomainResult<HashSet<ChatId>> {
        Ok(self.memberships.get(&user_id).cloned().unwrap_or_default())
    }
}
