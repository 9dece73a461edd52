use domain::DomainError;
use thiserror::Error;

use crate::connection::ConnectionId;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnectionId),
    #[error("outbound queue of connection {0} is full")]
    QueueFull(ConnectionId),
    #[error("chat directory lookup failed: {0}")]
    Directory(#[from] DomainError),
    #[error("failed to serialize envelope: {0}")]
    Serialization(#[from] serde_json::Error),
}
