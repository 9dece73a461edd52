use std::time::Duration;

use application::{CloseReason, Connection, ConnectionId, OutboundFrame};
use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket};
use domain::{DomainError, UserId};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;

/// 关闭后等待写任务发出剩余帧的时长
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// 读循环退出的原因
enum ReadExit {
    /// 客户端关闭或流结束
    Closed,
    /// 写任务先行退出（被驱逐或写失败）
    WriterStopped,
    /// 传输层错误
    Transport(axum::Error),
}

/// WebSocket 连接会话
///
/// 握手完成后校验凭证，注册到连接中心，然后由两部分组成：
/// - 写任务：独占 socket 的发送端，消费连接中心投递的帧
/// - 读循环：处理文本帧与 pong，直到连接关闭
pub struct WebSocketConnection {
    state: AppState,
}

impl WebSocketConnection {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn run(self, socket: WebSocket, credential: Option<String>) {
        let (mut sink, mut stream) = socket.split();

        let user_id = match self.authenticate(credential.as_deref()) {
            Ok(user_id) => user_id,
            Err(err) => {
                tracing::warn!(error = %err, "WebSocket authentication failed");
                Self::send_close(&mut sink, CloseReason::authentication_failed()).await;
                return;
            }
        };

        let (tx, rx) = mpsc::channel(self.state.outbound_capacity);
        let connection = match self.state.hub.connect(user_id, tx).await {
            Ok(connection) => connection,
            Err(err) => {
                tracing::error!(user_id = %user_id, error = %err, "Failed to register connection");
                Self::send_close(&mut sink, CloseReason::transport_error()).await;
                return;
            }
        };
        let connection_id = connection.id();

        let mut writer = Self::spawn_writer(sink, rx, connection_id, connection.abort_signal());

        let exit = tokio::select! {
            exit = self.read_loop(&connection, &mut stream) => exit,
            _ = &mut writer => ReadExit::WriterStopped,
        };

        match exit {
            ReadExit::WriterStopped => {
                self.state.hub.disconnect(connection_id).await;
            }
            ReadExit::Closed => {
                // 关闭应答经写队列发出，完成关闭握手
                self.state
                    .hub
                    .close(connection_id, CloseReason::normal())
                    .await;
                Self::drain_writer(writer, connection_id).await;
            }
            ReadExit::Transport(err) => {
                tracing::error!(connection_id = %connection_id, user_id = %user_id, error = %err, "WebSocket transport error");
                self.state
                    .hub
                    .close(connection_id, CloseReason::transport_error())
                    .await;
                Self::drain_writer(writer, connection_id).await;
            }
        }
    }

    async fn drain_writer(mut writer: JoinHandle<()>, connection_id: ConnectionId) {
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer)
            .await
            .is_err()
        {
            tracing::debug!(connection_id = %connection_id, "WebSocket writer did not finish in time");
            writer.abort();
        }
    }

    fn authenticate(&self, credential: Option<&str>) -> Result<UserId, DomainError> {
        let credential =
            credential.ok_or_else(|| DomainError::invalid_token("missing credential"))?;
        self.state.token_validator.extract_user_id(credential)
    }

    async fn read_loop(
        &self,
        connection: &Connection,
        stream: &mut futures_util::stream::SplitStream<WebSocket>,
    ) -> ReadExit {
        while let Some(message) = stream.next().await {
            match message {
                Ok(WsMessage::Text(text)) => {
                    self.state
                        .inbound
                        .handle_text(connection, text.as_str())
                        .await;
                }
                Ok(WsMessage::Pong(_)) => {
                    tracing::debug!(connection_id = %connection.id(), "Pong received");
                    self.state.hub.record_pong(connection.id()).await;
                }
                Ok(WsMessage::Close(frame)) => {
                    tracing::debug!(connection_id = %connection.id(), ?frame, "Client closed connection");
                    return ReadExit::Closed;
                }
                // ping 由协议层自动回复，二进制帧不在协议内
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Binary(_)) => {}
                Err(err) => return ReadExit::Transport(err),
            }
        }
        ReadExit::Closed
    }

    fn spawn_writer(
        mut sink: SplitSink<WebSocket, WsMessage>,
        mut rx: mpsc::Receiver<OutboundFrame>,
        connection_id: ConnectionId,
        abort: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let frame = tokio::select! {
                    biased;
                    _ = abort.cancelled() => {
                        tracing::warn!(connection_id = %connection_id, "Outbound queue full, dropping connection");
                        let _ = sink.close().await;
                        break;
                    }
                    frame = rx.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                let result = match frame {
                    OutboundFrame::Text(text) => sink.send(WsMessage::Text(text.into())).await,
                    OutboundFrame::Ping => {
                        tracing::debug!(connection_id = %connection_id, "Sending ping");
                        sink.send(WsMessage::Ping(Bytes::new())).await
                    }
                    OutboundFrame::Close(reason) => {
                        Self::send_close(&mut sink, reason).await;
                        break;
                    }
                };

                if let Err(err) = result {
                    tracing::error!(connection_id = %connection_id, error = %err, "Failed to write WebSocket frame");
                    break;
                }
            }
            tracing::debug!(connection_id = %connection_id, "WebSocket writer finished");
        })
    }

    async fn send_close(sink: &mut SplitSink<WebSocket, WsMessage>, reason: CloseReason) {
        let frame = CloseFrame {
            code: reason.code,
            reason: reason.reason.into(),
        };
        if let Err(err) = sink.send(WsMessage::Close(Some(frame))).await {
            tracing::debug!(error = %err, "Failed to send close frame");
        }
        let _ = sink.close().await;
    }
}
