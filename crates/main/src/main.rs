//! 主应用程序入口
//!
//! 组装连接中心、事件桥与心跳检测，启动 Axum WebSocket 服务。

use std::sync::Arc;

use application::{
    ChatHub, Clock, EventBridge, InboundRouter, LivenessMonitor, PostCommitPublisher, SystemClock,
};
use config::AppConfig;
use infrastructure::InMemoryChatStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use web_api::{router, AppState, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;

    // 初始化日志，RUST_LOG 优先于配置文件
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // 领域事件只在存储提交后进入通道
    let (publisher, events) = PostCommitPublisher::channel();
    let store = Arc::new(InMemoryChatStore::new(publisher, clock.clone()));

    let hub = Arc::new(ChatHub::new(store.clone(), clock.clone()));
    let bridge = tokio::spawn(EventBridge::new(hub.clone()).run(events));

    let shutdown = CancellationToken::new();
    let liveness =
        LivenessMonitor::new(hub.clone(), clock, &config.hub).spawn(shutdown.clone());

    let state = AppState::new(
        hub.clone(),
        InboundRouter::new(hub.clone(), store.clone()),
        Arc::new(JwtService::new(config.jwt.clone())),
    )
    .with_outbound_capacity(config.hub.outbound_queue_capacity);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(address = %address, "聊天连接中心启动");

    axum::serve(listener, router(state))
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                if let Err(err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %err, "Failed to listen for shutdown signal");
                }
                tracing::info!("接收到 Ctrl+C 信号，开始优雅停机...");
                // 先停止心跳检测，再让服务器排空连接
                shutdown.cancel();
            }
        })
        .await?;

    shutdown.cancel();
    liveness.await?;

    bridge.abort();

    let stats = hub.stats().await;
    tracing::info!(connections = stats.connections, "聊天连接中心已停止");
    Ok(())
}
