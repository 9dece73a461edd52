//! 连接中心
//!
//! 四个索引（连接注册表、用户索引、聊天索引、用户聊天缓存）由同一把读写锁保护：
//! 每次连接、断开、事件驱动的变更都是一个完整的写临界区；广播只在读锁下
//! 复制出目标连接，释放锁之后再逐个发送。锁内不会再次获取该锁。
//!
//! 不变量：
//! - 任何索引中出现的连接ID都存在于注册表中
//! - 用户有在线连接 ⇔ 用户聊天缓存中有该用户的条目
//! - 连接出现在 `chat_connections[c]` ⇔ 连接在线且其用户的缓存包含 `c`

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use domain::{ChatDirectory, ChatId, UserId};
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::connection::{CloseReason, Connection, ConnectionId, OutboundFrame};
use crate::envelope::OutgoingEnvelope;
use crate::error::HubError;

/// 连接中心统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub users: usize,
    pub chats: usize,
}

#[derive(Default)]
struct HubIndexes {
    /// 连接ID → 连接
    connections: HashMap<ConnectionId, Arc<Connection>>,
    /// 用户 → 连接ID集合
    user_connections: HashMap<UserId, HashSet<ConnectionId>>,
    /// 聊天 → 可接收该聊天事件的连接ID集合
    chat_connections: HashMap<ChatId, HashSet<ConnectionId>>,
    /// 用户 → 聊天ID集合（仅在线用户）
    user_chats: HashMap<UserId, HashSet<ChatId>>,
}

impl HubIndexes {
    fn add_to_chat(&mut self, chat_id: ChatId, connection_id: ConnectionId) {
        self.chat_connections
            .entry(chat_id)
            .or_default()
            .insert(connection_id);
    }

    fn remove_from_chat(&mut self, chat_id: ChatId, connection_id: ConnectionId) {
        if let Some(connections) = self.chat_connections.get_mut(&chat_id) {
            connections.remove(&connection_id);
            if connections.is_empty() {
                self.chat_connections.remove(&chat_id);
            }
        }
    }

    fn resolve(&self, ids: impl IntoIterator<Item = ConnectionId>) -> Vec<Arc<Connection>> {
        ids.into_iter()
            .filter_map(|id| self.connections.get(&id).cloned())
            .collect()
    }
}

/// 单进程内唯一的连接中心，由进程启动时显式创建
pub struct ChatHub {
    indexes: RwLock<HubIndexes>,
    directory: Arc<dyn ChatDirectory>,
    clock: Arc<dyn Clock>,
}

impl ChatHub {
    pub fn new(directory: Arc<dyn ChatDirectory>, clock: Arc<dyn Clock>) -> Self {
        Self {
            indexes: RwLock::new(HubIndexes::default()),
            directory,
            clock,
        }
    }

    /// 注册一个已通过认证的连接
    ///
    /// 用户缓存为冷时，在同一个写临界区内查询一次聊天目录；查询失败时不留下任何状态。
    pub async fn connect(
        &self,
        user_id: UserId,
        sender: mpsc::Sender<OutboundFrame>,
    ) -> Result<Arc<Connection>, HubError> {
        let connection = Arc::new(Connection::new(user_id, sender, self.clock.now()));
        let connection_id = connection.id();

        let mut indexes = self.indexes.write().await;

        if !indexes.user_chats.contains_key(&user_id) {
            let chat_ids = self.directory.list_chat_ids_for_user(user_id).await?;
            debug!(user_id = %user_id, chats = chat_ids.len(), "用户聊天缓存已加载");
            indexes.user_chats.insert(user_id, chat_ids);
        }

        indexes
            .connections
            .insert(connection_id, connection.clone());
        indexes
            .user_connections
            .entry(user_id)
            .or_default()
            .insert(connection_id);

        let chat_ids: Vec<ChatId> = indexes
            .user_chats
            .get(&user_id)
            .map(|chats| chats.iter().copied().collect())
            .unwrap_or_default();
        for chat_id in chat_ids {
            indexes.add_to_chat(chat_id, connection_id);
        }

        connection.mark_open();
        drop(indexes);

        info!(connection_id = %connection_id, user_id = %user_id, "WebSocket connection established");
        Ok(connection)
    }

    /// 从全部索引中移除连接，重复调用是空操作
    pub async fn disconnect(&self, connection_id: ConnectionId) -> bool {
        self.remove_connection(connection_id).await.is_some()
    }

    /// 移除连接并通知写任务发送关闭帧
    pub async fn close(&self, connection_id: ConnectionId, reason: CloseReason) -> bool {
        match self.remove_connection(connection_id).await {
            Some(connection) => {
                connection.send_close(reason);
                true
            }
            None => false,
        }
    }

    async fn remove_connection(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        let mut indexes = self.indexes.write().await;

        let connection = indexes.connections.remove(&connection_id)?;
        connection.mark_closing();
        let user_id = connection.user_id();

        let user_offline = match indexes.user_connections.get_mut(&user_id) {
            Some(connections) => {
                connections.remove(&connection_id);
                connections.is_empty()
            }
            None => true,
        };

        let chat_ids: Vec<ChatId> = indexes
            .user_chats
            .get(&user_id)
            .map(|chats| chats.iter().copied().collect())
            .unwrap_or_default();
        for chat_id in chat_ids {
            indexes.remove_from_chat(chat_id, connection_id);
        }

        if user_offline {
            indexes.user_connections.remove(&user_id);
            indexes.user_chats.remove(&user_id);
        }

        connection.mark_closed();
        drop(indexes);

        info!(connection_id = %connection_id, user_id = %user_id, "WebSocket session closed");
        Some(connection)
    }

    /// 记录 pong
    pub async fn record_pong(&self, connection_id: ConnectionId) -> bool {
        let indexes = self.indexes.read().await;
        match indexes.connections.get(&connection_id) {
            Some(connection) => {
                connection.record_pong(self.clock.now());
                true
            }
            None => false,
        }
    }

    pub async fn connection(&self, connection_id: ConnectionId) -> Option<Arc<Connection>> {
        self.indexes
            .read()
            .await
            .connections
            .get(&connection_id)
            .cloned()
    }

    /// 根据缓存判断用户是否属于某个聊天
    pub async fn is_member(&self, user_id: UserId, chat_id: ChatId) -> bool {
        self.indexes
            .read()
            .await
            .user_chats
            .get(&user_id)
            .is_some_and(|chats| chats.contains(&chat_id))
    }

    /// 把聊天加入在线用户的缓存，并把这些用户的连接加入聊天索引
    ///
    /// 不在线的用户没有缓存条目，下次连接时会从聊天目录完整加载。
    pub async fn add_chat_for_users(&self, chat_id: ChatId, user_ids: &[UserId]) -> usize {
        let mut indexes = self.indexes.write().await;
        let mut added = 0;

        for user_id in user_ids {
            let Some(chats) = indexes.user_chats.get_mut(user_id) else {
                continue;
            };
            chats.insert(chat_id);

            let connection_ids: Vec<ConnectionId> = indexes
                .user_connections
                .get(user_id)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default();
            for connection_id in connection_ids {
                indexes.add_to_chat(chat_id, connection_id);
                added += 1;
            }
        }

        debug!(chat_id = %chat_id, added, "聊天索引已更新");
        added
    }

    /// 从用户缓存中移除聊天，并把该用户的连接移出聊天索引
    pub async fn remove_chat_for_user(&self, chat_id: ChatId, user_id: UserId) -> usize {
        let mut indexes = self.indexes.write().await;

        let Some(chats) = indexes.user_chats.get_mut(&user_id) else {
            return 0;
        };
        chats.remove(&chat_id);

        let connection_ids: Vec<ConnectionId> = indexes
            .user_connections
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();
        for connection_id in &connection_ids {
            indexes.remove_from_chat(chat_id, *connection_id);
        }

        debug!(chat_id = %chat_id, user_id = %user_id, removed = connection_ids.len(), "用户已移出聊天索引");
        connection_ids.len()
    }

    /// 广播到聊天的所有连接，返回成功投递的连接数
    pub async fn broadcast_to_chat(
        &self,
        chat_id: ChatId,
        envelope: &OutgoingEnvelope,
    ) -> Result<usize, HubError> {
        let text = envelope.to_json()?;
        let targets = {
            let indexes = self.indexes.read().await;
            match indexes.chat_connections.get(&chat_id) {
                Some(ids) => indexes.resolve(ids.iter().copied()),
                None => Vec::new(),
            }
        };

        Ok(Self::deliver(&targets, &text))
    }

    /// 发送到用户的所有设备
    pub async fn send_to_user(
        &self,
        user_id: UserId,
        envelope: &OutgoingEnvelope,
    ) -> Result<usize, HubError> {
        let text = envelope.to_json()?;
        let targets = {
            let indexes = self.indexes.read().await;
            match indexes.user_connections.get(&user_id) {
                Some(ids) => indexes.resolve(ids.iter().copied()),
                None => Vec::new(),
            }
        };

        Ok(Self::deliver(&targets, &text))
    }

    /// 发送到用户所在全部聊天的连接并集（每个连接只收到一次）
    pub async fn broadcast_to_user_chats(
        &self,
        user_id: UserId,
        envelope: &OutgoingEnvelope,
    ) -> Result<usize, HubError> {
        let text = envelope.to_json()?;
        let targets = {
            let indexes = self.indexes.read().await;
            let mut ids = HashSet::new();
            if let Some(chats) = indexes.user_chats.get(&user_id) {
                for chat_id in chats {
                    if let Some(connections) = indexes.chat_connections.get(chat_id) {
                        ids.extend(connections.iter().copied());
                    }
                }
            }
            indexes.resolve(ids)
        };

        Ok(Self::deliver(&targets, &text))
    }

    /// 发送到单个连接
    pub async fn send_to_connection(
        &self,
        connection_id: ConnectionId,
        envelope: &OutgoingEnvelope,
    ) -> Result<(), HubError> {
        let text = envelope.to_json()?;
        let connection = self
            .connection(connection_id)
            .await
            .ok_or(HubError::ConnectionClosed(connection_id))?;
        connection.send(OutboundFrame::Text(text))
    }

    fn deliver(targets: &[Arc<Connection>], text: &str) -> usize {
        let mut delivered = 0;
        for connection in targets {
            match connection.send(OutboundFrame::Text(text.to_string())) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    error!(
                        connection_id = %connection.id(),
                        user_id = %connection.user_id(),
                        error = %err,
                        "Error while sending message to connection"
                    );
                }
            }
        }
        delivered
    }

    /// 当前在线连接的快照
    pub async fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.indexes
            .read()
            .await
            .connections
            .values()
            .cloned()
            .collect()
    }

    pub async fn stats(&self) -> HubStats {
        let indexes = self.indexes.read().await;
        HubStats {
            connections: indexes.connections.len(),
            users: indexes.user_connections.len(),
            chats: indexes.chat_connections.len(),
        }
    }

    pub async fn chat_connection_ids(&self, chat_id: ChatId) -> HashSet<ConnectionId> {
        self.indexes
            .read()
            .await
            .chat_connections
            .get(&chat_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn user_connection_ids(&self, user_id: UserId) -> HashSet<ConnectionId> {
        self.indexes
            .read()
            .await
            .user_connections
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 用户聊天缓存，用户不在线时为 `None`
    pub async fn cached_chat_ids(&self, user_id: UserId) -> Option<HashSet<ChatId>> {
        self.indexes.read().await.user_chats.get(&user_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::connection::ConnectionState;
    use crate::test_support::{chat, drain_texts, user, StaticDirectory};
    use domain::{DomainError, MockChatDirectory};

    fn hub_with(directory: StaticDirectory) -> ChatHub {
        ChatHub::new(Arc::new(directory), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_connect_syncs_membership_from_directory() {
        let (u1, c1, c2) = (user(), chat(), chat());
        let hub = hub_with(StaticDirectory::new().with_member(u1, &[c1, c2]));

        let (tx, _rx) = mpsc::channel(16);
        let conn = hub.connect(u1, tx).await.unwrap();

        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(hub.cached_chat_ids(u1).await, Some(HashSet::from([c1, c2])));
        assert!(hub.chat_connection_ids(c1).await.contains(&conn.id()));
        assert!(hub.chat_connection_ids(c2).await.contains(&conn.id()));
        assert_eq!(hub.user_connection_ids(u1).await, HashSet::from([conn.id()]));
    }

    #[tokio::test]
    async fn test_directory_queried_only_when_cache_is_cold() {
        let (u1, c1) = (user(), chat());
        let mut directory = MockChatDirectory::new();
        directory
            .expect_list_chat_ids_for_user()
            .times(2)
            .returning(move |_| Ok(HashSet::from([c1])));
        let hub = ChatHub::new(Arc::new(directory), Arc::new(SystemClock));

        let (tx1, _rx1) = mpsc::channel(16);
        let (tx2, _rx2) = mpsc::channel(16);
        let first = hub.connect(u1, tx1).await.unwrap();
        let second = hub.connect(u1, tx2).await.unwrap();
        assert_eq!(hub.chat_connection_ids(c1).await.len(), 2);

        // 全部断开后缓存失效，再次连接重新查询
        hub.disconnect(first.id()).await;
        hub.disconnect(second.id()).await;
        let (tx3, _rx3) = mpsc::channel(16);
        hub.connect(u1, tx3).await.unwrap();
    }

    #[tokio::test]
    async fn test_directory_failure_leaves_no_state() {
        let mut directory = MockChatDirectory::new();
        directory
            .expect_list_chat_ids_for_user()
            .returning(|_| Err(DomainError::storage("db down")));
        let hub = ChatHub::new(Arc::new(directory), Arc::new(SystemClock));

        let (tx, _rx) = mpsc::channel(16);
        let result = hub.connect(user(), tx).await;

        assert!(matches!(result, Err(HubError::Directory(_))));
        assert_eq!(hub.stats().await, HubStats::default());
    }

    #[tokio::test]
    async fn test_last_disconnect_tears_down_cache() {
        let (u1, c1) = (user(), chat());
        let hub = hub_with(StaticDirectory::new().with_member(u1, &[c1]));

        let (tx1, _rx1) = mpsc::channel(16);
        let (tx2, _rx2) = mpsc::channel(16);
        let phone = hub.connect(u1, tx1).await.unwrap();
        let laptop = hub.connect(u1, tx2).await.unwrap();

        assert!(hub.disconnect(phone.id()).await);
        assert_eq!(phone.state(), ConnectionState::Closed);
        assert!(hub.cached_chat_ids(u1).await.is_some());
        assert_eq!(hub.chat_connection_ids(c1).await, HashSet::from([laptop.id()]));

        assert!(hub.disconnect(laptop.id()).await);
        assert_eq!(hub.cached_chat_ids(u1).await, None);
        assert!(hub.chat_connection_ids(c1).await.is_empty());
        assert!(hub.user_connection_ids(u1).await.is_empty());
        assert_eq!(hub.stats().await, HubStats::default());
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let (u1, c1) = (user(), chat());
        let hub = hub_with(StaticDirectory::new().with_member(u1, &[c1]));
        let (tx, mut rx) = mpsc::channel(16);
        let conn = hub.connect(u1, tx).await.unwrap();

        assert!(hub.close(conn.id(), CloseReason::transport_error()).await);
        assert!(!hub.close(conn.id(), CloseReason::transport_error()).await);
        assert!(!hub.disconnect(conn.id()).await);

        assert_eq!(
            rx.try_recv().ok(),
            Some(OutboundFrame::Close(CloseReason::transport_error()))
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_exactly_chat_connections() {
        let (u1, u2, u3, c1, c2) = (user(), user(), user(), chat(), chat());
        let hub = hub_with(
            StaticDirectory::new()
                .with_member(u1, &[c1])
                .with_member(u2, &[c1, c2])
                .with_member(u3, &[c2]),
        );

        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);
        let (tx3, mut rx3) = mpsc::channel(16);
        let (tx4, mut rx4) = mpsc::channel(16);
        hub.connect(u1, tx1).await.unwrap();
        hub.connect(u1, tx2).await.unwrap();
        hub.connect(u2, tx3).await.unwrap();
        hub.connect(u3, tx4).await.unwrap();

        let envelope = OutgoingEnvelope::participants_changed(c1).unwrap();
        let delivered = hub.broadcast_to_chat(c1, &envelope).await.unwrap();

        assert_eq!(delivered, 3);
        assert_eq!(drain_texts(&mut rx1).len(), 1);
        assert_eq!(drain_texts(&mut rx2).len(), 1);
        assert_eq!(drain_texts(&mut rx3).len(), 1);
        assert!(drain_texts(&mut rx4).is_empty());
    }

    #[tokio::test]
    async fn test_failed_connection_does_not_abort_fanout() {
        let (u1, u2, u3, c1) = (user(), user(), user(), chat());
        let hub = hub_with(
            StaticDirectory::new()
                .with_member(u1, &[c1])
                .with_member(u2, &[c1])
                .with_member(u3, &[c1]),
        );

        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, rx2) = mpsc::channel(16);
        let (tx3, mut rx3) = mpsc::channel(16);
        hub.connect(u1, tx1).await.unwrap();
        hub.connect(u2, tx2).await.unwrap();
        hub.connect(u3, tx3).await.unwrap();
        drop(rx2);

        let envelope = OutgoingEnvelope::participants_changed(c1).unwrap();
        let delivered = hub.broadcast_to_chat(c1, &envelope).await.unwrap();

        assert_eq!(delivered, 2);
        assert_eq!(drain_texts(&mut rx1).len(), 1);
        assert_eq!(drain_texts(&mut rx3).len(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_skips_only_slow_connection() {
        let (u1, u2, c1) = (user(), user(), chat());
        let hub = hub_with(
            StaticDirectory::new()
                .with_member(u1, &[c1])
                .with_member(u2, &[c1]),
        );

        let (tx_slow, mut rx_slow) = mpsc::channel(2);
        let (tx_fast, mut rx_fast) = mpsc::channel(16);
        let slow = hub.connect(u1, tx_slow).await.unwrap();
        hub.connect(u2, tx_fast).await.unwrap();

        let envelope = OutgoingEnvelope::participants_changed(c1).unwrap();
        let mut delivered = Vec::new();
        for _ in 0..5 {
            delivered.push(hub.broadcast_to_chat(c1, &envelope).await.unwrap());
            assert_eq!(drain_texts(&mut rx_fast).len(), 1);
        }

        assert_eq!(delivered, vec![2, 2, 1, 1, 1]);
        assert_eq!(drain_texts(&mut rx_slow).len(), 2);
        // 慢连接仍在线，由心跳检测决定去留
        assert!(slow.is_open());
        assert_eq!(hub.chat_connection_ids(c1).await.len(), 2);
    }

    #[tokio::test]
    async fn test_send_to_user_reaches_every_device() {
        let u1 = user();
        let hub = hub_with(StaticDirectory::new());
        let (tx1, mut rx1) = mpsc::channel(16);
        let (tx2, mut rx2) = mpsc::channel(16);
        hub.connect(u1, tx1).await.unwrap();
        hub.connect(u1, tx2).await.unwrap();

        let envelope = OutgoingEnvelope::invalid_json().unwrap();
        assert_eq!(hub.send_to_user(u1, &envelope).await.unwrap(), 2);
        assert_eq!(drain_texts(&mut rx1).len(), 1);
        assert_eq!(drain_texts(&mut rx2).len(), 1);
        assert_eq!(hub.send_to_user(user(), &envelope).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_chat_index_patching_only_touches_online_users() {
        let (online, offline, c1) = (user(), user(), chat());
        let hub = hub_with(StaticDirectory::new());
        let (tx, _rx) = mpsc::channel(16);
        let conn = hub.connect(online, tx).await.unwrap();

        let added = hub.add_chat_for_users(c1, &[online, offline]).await;
        assert_eq!(added, 1);
        assert_eq!(hub.chat_connection_ids(c1).await, HashSet::from([conn.id()]));
        assert_eq!(hub.cached_chat_ids(offline).await, None);

        assert_eq!(hub.remove_chat_for_user(c1, online).await, 1);
        assert!(hub.chat_connection_ids(c1).await.is_empty());
        assert_eq!(hub.cached_chat_ids(online).await, Some(HashSet::new()));
        assert!(!hub.is_member(online, c1).await);
    }
}
