//! 领域事件桥
//!
//! 消费提交后发布的领域事件，更新连接中心索引并触发扇出。

use std::sync::Arc;

use domain::ChatEvent;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::envelope::OutgoingEnvelope;
use crate::error::HubError;
use crate::hub::ChatHub;

#[derive(Clone)]
pub struct EventBridge {
    hub: Arc<ChatHub>,
}

impl EventBridge {
    pub fn new(hub: Arc<ChatHub>) -> Self {
        Self { hub }
    }

    /// 处理单个事件，返回收到推送的连接数
    pub async fn handle(&self, event: ChatEvent) -> Result<usize, HubError> {
        let event_type = event.event_type();
        let scope = event.chat_id();
        let delivered = match event {
            ChatEvent::ChatCreated {
                chat_id,
                participant_ids,
            } => {
                self.hub.add_chat_for_users(chat_id, &participant_ids).await;
                0
            }
            ChatEvent::ParticipantsJoined { chat_id, user_ids } => {
                self.hub.add_chat_for_users(chat_id, &user_ids).await;
                let envelope = OutgoingEnvelope::participants_changed(chat_id)?;
                self.hub.broadcast_to_chat(chat_id, &envelope).await?
            }
            ChatEvent::ParticipantLeft { chat_id, user_id } => {
                self.hub.remove_chat_for_user(chat_id, user_id).await;
                let envelope = OutgoingEnvelope::participants_changed(chat_id)?;
                self.hub.broadcast_to_chat(chat_id, &envelope).await?
            }
            ChatEvent::MessageDeleted {
                chat_id,
                message_id,
            } => {
                let envelope = OutgoingEnvelope::message_deleted(chat_id, message_id)?;
                self.hub.broadcast_to_chat(chat_id, &envelope).await?
            }
            ChatEvent::ProfilePictureUpdated { user_id, new_url } => {
                let envelope = OutgoingEnvelope::profile_picture_updated(user_id, new_url)?;
                self.hub.broadcast_to_user_chats(user_id, &envelope).await?
            }
        };

        debug!(event_type, chat_id = ?scope, delivered, "Domain event applied");
        Ok(delivered)
    }

    /// 持续消费事件通道，直到所有发布端关闭
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<ChatEvent>) {
        info!("Event bridge started");
        while let Some(event) = events.recv().await {
            let event_type = event.event_type();
            if let Err(err) = self.handle(event).await {
                error!(event_type, error = %err, "Failed to apply domain event");
            }
        }
        info!("Event bridge stopped");
    }
}
