//! 应用层实现：实时连接中心。
//!
//! 维护在线连接、用户与聊天之间的派生索引，把客户端上行消息和提交后的领域事件
//! 扇出到需要它们的连接，并通过心跳驱逐失联连接。

pub mod clock;
pub mod connection;
pub mod envelope;
pub mod error;
pub mod event_bridge;
pub mod hub;
pub mod inbound;
pub mod liveness;
pub mod outbox;

#[cfg(test)]
pub(crate) mod test_support;

pub use clock::{Clock, ManualClock, SystemClock};
pub use connection::{CloseReason, Connection, ConnectionId, ConnectionState, OutboundFrame};
pub use envelope::{
    ChatMessageDto, ChatParticipantsChangedDto, DeleteMessageDto, ErrorDto, IncomingEnvelope,
    IncomingMessageType, OutgoingEnvelope, OutgoingMessageType, ProfilePictureUpdateDto,
    SendMessageDto,
};
pub use error::HubError;
pub use event_bridge::EventBridge;
pub use hub::{ChatHub, HubStats};
pub use inbound::{InboundOutcome, InboundRouter};
pub use liveness::{LivenessMonitor, LivenessReport};
pub use outbox::{PostCommitPublisher, UnitOfWork};
