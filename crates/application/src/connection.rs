//! 单个客户端连接
//!
//! 连接本身不持有 socket，只持有写任务的发送端；真正的网络写入发生在
//! web 层为每个 socket 启动的写任务中。

use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use domain::{Timestamp, UserId};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::HubError;

/// 连接唯一标识，不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 连接生命周期
///
/// `Connecting → Open → Closing → Closed`，`Closed` 为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for ConnectionState {
    fn from(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// 关闭原因（WebSocket close code + reason）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub const NORMAL: u16 = 1000;
    pub const GOING_AWAY: u16 = 1001;
    pub const SERVER_ERROR: u16 = 1011;

    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// 回应客户端主动发起的关闭
    pub fn normal() -> Self {
        Self::new(Self::NORMAL, "Normal closure")
    }

    pub fn authentication_failed() -> Self {
        Self::new(Self::SERVER_ERROR, "Authentication failed")
    }

    pub fn ping_timeout() -> Self {
        Self::new(Self::GOING_AWAY, "Ping timeout")
    }

    pub fn transport_error() -> Self {
        Self::new(Self::SERVER_ERROR, "Transport error")
    }
}

/// 写任务消费的帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Ping,
    Close(CloseReason),
}

/// 一个在线连接
///
/// 写队列有界：队列满时发送立即失败，不会在内存中堆积帧。
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    user_id: UserId,
    sender: mpsc::Sender<OutboundFrame>,
    /// 关闭帧无法入队时由写任务监听的停止信号
    abort: CancellationToken,
    last_pong_millis: AtomicI64,
    state: AtomicU8,
}

impl Connection {
    pub fn new(user_id: UserId, sender: mpsc::Sender<OutboundFrame>, now: Timestamp) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            sender,
            abort: CancellationToken::new(),
            last_pong_millis: AtomicI64::new(now.timestamp_millis()),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// 最近一次收到 pong 的时间（毫秒时间戳）
    pub fn last_pong_millis(&self) -> i64 {
        self.last_pong_millis.load(Ordering::SeqCst)
    }

    /// pong 只刷新时间，不改变生命周期状态
    pub(crate) fn record_pong(&self, now: Timestamp) {
        self.last_pong_millis
            .store(now.timestamp_millis(), Ordering::SeqCst);
    }

    pub(crate) fn mark_open(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Connecting as u8,
            ConnectionState::Open as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    pub(crate) fn mark_closing(&self) {
        let _ = self.state.fetch_max(ConnectionState::Closing as u8, Ordering::SeqCst);
    }

    pub(crate) fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::SeqCst);
    }

    /// 向连接写入一帧，不等待队列空位
    ///
    /// 连接未处于 `Open`、写任务已退出或写队列已满时返回错误。
    pub fn send(&self, frame: OutboundFrame) -> Result<(), HubError> {
        if !self.is_open() {
            return Err(HubError::ConnectionClosed(self.id));
        }
        self.sender.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => HubError::QueueFull(self.id),
            TrySendError::Closed(_) => HubError::ConnectionClosed(self.id),
        })
    }

    /// 通知写任务发送关闭帧；队列已满时直接让写任务停止
    pub(crate) fn send_close(&self, reason: CloseReason) {
        if let Err(TrySendError::Full(_)) = self.sender.try_send(OutboundFrame::Close(reason)) {
            self.abort.cancel();
        }
    }

    /// 写任务在该信号触发后应立即丢弃队列并关闭 socket
    pub fn abort_signal(&self) -> CancellationToken {
        self.abort.clone()
    }
}
