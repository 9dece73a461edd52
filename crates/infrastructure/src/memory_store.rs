//! 内存聊天存储
//!
//! 同时充当连接中心的聊天目录和消息服务，并提供会改变成员关系的聊天命令。
//! 每个命令在写锁内完成状态变更并提交工作单元，事件桥看到的永远是已经生效的
//! 变更，且事件顺序与写入顺序一致。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use application::{Clock, PostCommitPublisher};
use async_trait::async_trait;
use domain::{
    Chat, ChatDirectory, ChatEvent, ChatId, ChatMessage, ChatParticipant, DomainError,
    DomainResult, MessageId, MessageService, UserId,
};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct StoreState {
    users: HashMap<UserId, ChatParticipant>,
    chats: HashMap<ChatId, Chat>,
    messages: HashMap<MessageId, ChatMessage>,
}

pub struct InMemoryChatStore {
    state: RwLock<StoreState>,
    publisher: PostCommitPublisher,
    clock: Arc<dyn Clock>,
}

impl InMemoryChatStore {
    pub fn new(publisher: PostCommitPublisher, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            publisher,
            clock,
        }
    }

    pub async fn register_user(&self, participant: ChatParticipant) {
        debug!(user_id = %participant.user_id, username = %participant.username, "User registered");
        self.state
            .write()
            .await
            .users
            .insert(participant.user_id, participant);
    }

    pub async fn user(&self, user_id: UserId) -> Option<ChatParticipant> {
        self.state.read().await.users.get(&user_id).cloned()
    }

    pub async fn chat(&self, chat_id: ChatId) -> Option<Chat> {
        self.state.read().await.chats.get(&chat_id).cloned()
    }

    pub async fn message(&self, message_id: MessageId) -> Option<ChatMessage> {
        self.state.read().await.messages.get(&message_id).cloned()
    }

    /// 创建聊天；未知用户会被忽略，有效参与者少于两人时失败
    pub async fn create_chat(&self, creator_id: UserId, others: &[UserId]) -> DomainResult<Chat> {
        let mut unit = self.publisher.begin();

        let chat = {
            let mut state = self.state.write().await;

            let participants: HashSet<UserId> = std::iter::once(creator_id)
                .chain(others.iter().copied())
                .filter(|user_id| state.users.contains_key(user_id))
                .collect();
            if participants.len() < 2 {
                return Err(DomainError::InvalidChatSize);
            }

            let chat = Chat {
                id: ChatId::from(Uuid::new_v4()),
                creator_id,
                participants,
                created_at: self.clock.now(),
            };
            state.chats.insert(chat.id, chat.clone());

            unit.record(ChatEvent::chat_created(
                chat.id,
                chat.participants.iter().copied().collect(),
            ));
            unit.commit();
            chat
        };

        info!(chat_id = %chat.id, creator_id = %creator_id, participants = chat.participants.len(), "Chat created");
        Ok(chat)
    }

    /// 由现有参与者邀请新用户加入聊天
    pub async fn add_participants(
        &self,
        requester_id: UserId,
        chat_id: ChatId,
        user_ids: &[UserId],
    ) -> DomainResult<Chat> {
        let mut unit = self.publisher.begin();

        let chat = {
            let mut state = self.state.write().await;

            let chat = state.chats.get(&chat_id).ok_or(DomainError::ChatNotFound)?;
            if !chat.has_participant(requester_id) {
                return Err(DomainError::Forbidden);
            }
            if let Some(missing) = user_ids.iter().find(|id| !state.users.contains_key(*id)) {
                return Err(DomainError::participant_not_found(*missing));
            }

            let chat = state
                .chats
                .get_mut(&chat_id)
                .ok_or(DomainError::ChatNotFound)?;
            let joined: Vec<UserId> = user_ids
                .iter()
                .copied()
                .filter(|user_id| chat.participants.insert(*user_id))
                .collect();
            let chat = chat.clone();

            if !joined.is_empty() {
                unit.record(ChatEvent::participants_joined(chat_id, joined));
            }
            unit.commit();
            chat
        };

        Ok(chat)
    }

    /// 移除参与者；最后一名参与者离开时聊天被删除，不发布事件
    pub async fn remove_participant(&self, chat_id: ChatId, user_id: UserId) -> DomainResult<()> {
        let mut unit = self.publisher.begin();

        {
            let mut state = self.state.write().await;
            let chat = state
                .chats
                .get_mut(&chat_id)
                .ok_or(DomainError::ChatNotFound)?;
            if !chat.participants.remove(&user_id) {
                return Err(DomainError::participant_not_found(user_id));
            }

            if chat.participants.is_empty() {
                state.chats.remove(&chat_id);
                state.messages.retain(|_, message| message.chat_id != chat_id);
                info!(chat_id = %chat_id, "Last participant left, chat deleted");
                unit.rollback();
                return Ok(());
            }

            unit.record(ChatEvent::participant_left(chat_id, user_id));
            unit.commit();
        }
        Ok(())
    }

    /// 删除消息，只有发送者可以删除
    pub async fn delete_message(
        &self,
        message_id: MessageId,
        requester_id: UserId,
    ) -> DomainResult<()> {
        let mut unit = self.publisher.begin();

        {
            let mut state = self.state.write().await;
            let message = state
                .messages
                .get(&message_id)
                .ok_or(DomainError::message_not_found(message_id))?;
            if message.sender_id != requester_id {
                return Err(DomainError::Forbidden);
            }
            let chat_id = message.chat_id;
            state.messages.remove(&message_id);

            unit.record(ChatEvent::message_deleted(chat_id, message_id));
            unit.commit();
        }
        Ok(())
    }

    pub async fn update_profile_picture(
        &self,
        user_id: UserId,
        new_url: Option<String>,
    ) -> DomainResult<()> {
        let mut unit = self.publisher.begin();

        {
            let mut state = self.state.write().await;
            let user = state
                .users
                .get_mut(&user_id)
                .ok_or(DomainError::participant_not_found(user_id))?;
            user.profile_picture_url = new_url.clone();

            unit.record(ChatEvent::profile_picture_updated(user_id, new_url));
            unit.commit();
        }
        Ok(())
    }
}

#[async_trait]
impl ChatDirectory for InMemoryChatStore {
    async fn list_chat_ids_for_user(&self, user_id: UserId) -> DomainResult<HashSet<ChatId>> {
        Ok(self
            .state
            .read()
            .await
            .chats
            .values()
            .filter(|chat| chat.has_participant(user_id))
            .map(|chat| chat.id)
            .collect())
    }
}

#[async_trait]
impl MessageService for InMemoryChatStore {
    async fn send_message(
        &self,
        chat_id: ChatId,
        sender_id: UserId,
        content: String,
        message_id: Option<MessageId>,
    ) -> DomainResult<ChatMessage> {
        let mut state = self.state.write().await;

        let chat = state.chats.get(&chat_id).ok_or(DomainError::ChatNotFound)?;
        if !chat.has_participant(sender_id) {
            return Err(DomainError::participant_not_found(sender_id));
        }

        let message = ChatMessage {
            id: message_id.unwrap_or_else(|| MessageId::from(Uuid::new_v4())),
            chat_id,
            sender_id,
            content: content.trim().to_string(),
            created_at: self.clock.now(),
        };
        state.messages.insert(message.id, message.clone());

        debug!(message_id = %message.id, chat_id = %chat_id, sender_id = %sender_id, "Message saved");
        Ok(message)
    }
}
