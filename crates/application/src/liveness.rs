//! 心跳检测
//!
//! 按固定间隔扫描所有在线连接：超过超时时长没有 pong 的连接以 `1001 Ping timeout`
//! 关闭，其余连接发送一个 ping。扫描基于快照，关闭在扫描结束后统一执行。

use std::sync::Arc;
use std::time::Duration;

use config::HubConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::connection::{CloseReason, ConnectionId, OutboundFrame};
use crate::hub::ChatHub;

/// 一轮扫描的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LivenessReport {
    pub pinged: usize,
    pub evicted: usize,
}

pub struct LivenessMonitor {
    hub: Arc<ChatHub>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    timeout: Duration,
}

impl LivenessMonitor {
    pub fn new(hub: Arc<ChatHub>, clock: Arc<dyn Clock>, config: &HubConfig) -> Self {
        Self::with_durations(hub, clock, config.ping_interval(), config.pong_timeout())
    }

    pub fn with_durations(
        hub: Arc<ChatHub>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            hub,
            clock,
            interval,
            timeout,
        }
    }

    /// 执行一轮扫描
    pub async fn tick(&self) -> LivenessReport {
        let now_millis = self.clock.now().timestamp_millis();
        let timeout_millis = i64::try_from(self.timeout.as_millis()).unwrap_or(i64::MAX);

        let mut report = LivenessReport::default();
        let mut to_close: Vec<(ConnectionId, CloseReason)> = Vec::new();

        for connection in self.hub.snapshot().await {
            if !connection.is_open() {
                continue;
            }

            let silent_for = now_millis.saturating_sub(connection.last_pong_millis());
            if silent_for > timeout_millis {
                debug!(connection_id = %connection.id(), silent_for_ms = silent_for, "Pong timeout");
                to_close.push((connection.id(), CloseReason::ping_timeout()));
                continue;
            }

            match connection.send(OutboundFrame::Ping) {
                Ok(()) => report.pinged += 1,
                Err(err) => {
                    warn!(connection_id = %connection.id(), error = %err, "Failed to send ping");
                    to_close.push((connection.id(), CloseReason::transport_error()));
                }
            }
        }

        for (connection_id, reason) in to_close {
            if self.hub.close(connection_id, reason).await {
                report.evicted += 1;
            }
        }

        if report.evicted > 0 {
            info!(pinged = report.pinged, evicted = report.evicted, "Liveness sweep evicted connections");
        }
        report
    }

    /// 在后台按间隔扫描，直到取消
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // 第一次 tick 立即完成
            ticker.tick().await;

            info!(interval_secs = self.interval.as_secs(), timeout_secs = self.timeout.as_secs(), "Liveness monitor started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
            info!("Liveness monitor stopped");
        })
    }
}
