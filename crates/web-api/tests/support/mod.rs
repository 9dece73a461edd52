#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::{ChatHub, EventBridge, InboundRouter, PostCommitPublisher, SystemClock};
use domain::{ChatParticipant, UserId};
use futures_util::StreamExt;
use infrastructure::InMemoryChatStore;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;
use web_api::{router, AppState, JwtConfig, JwtService};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 运行在随机端口上的完整服务
pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: Arc<ChatHub>,
    pub store: Arc<InMemoryChatStore>,
    pub jwt: JwtService,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let (publisher, events) = PostCommitPublisher::channel();
        let store = Arc::new(InMemoryChatStore::new(publisher, Arc::new(SystemClock)));
        let hub = Arc::new(ChatHub::new(store.clone(), Arc::new(SystemClock)));
        tokio::spawn(EventBridge::new(hub.clone()).run(events));

        let jwt = JwtService::new(JwtConfig {
            secret: "test-secret-key-that-is-long-enough-for-hs256".to_string(),
            expiration_hours: 1,
        });
        let state = AppState::new(
            hub.clone(),
            InboundRouter::new(hub.clone(), store.clone()),
            Arc::new(jwt.clone()),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(state);

        tokio::spawn(async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            addr,
            hub,
            store,
            jwt,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn register(&self, name: &str) -> UserId {
        let user_id = UserId::from(Uuid::new_v4());
        self.store
            .register_user(ChatParticipant::new(user_id, name))
            .await;
        user_id
    }

    pub fn token(&self, user_id: UserId) -> String {
        self.jwt.generate_token(user_id).expect("token")
    }

    /// 携带 `Authorization` 头建立连接
    pub async fn connect(&self, authorization: Option<String>) -> Client {
        let mut request = format!("ws://{}/ws/chat", self.addr)
            .into_client_request()
            .expect("request");
        if let Some(value) = authorization {
            request
                .headers_mut()
                .insert("authorization", value.parse().expect("header"));
        }
        let (ws, _) = connect_async(request).await.expect("ws connect");
        ws
    }

    pub async fn connect_as(&self, user_id: UserId) -> Client {
        self.connect(Some(format!("Bearer {}", self.token(user_id))))
            .await
    }

    /// 等待连接中心注册到指定数量的连接
    pub async fn wait_for_connections(&self, expected: usize) {
        self.wait_until(|| async { self.hub.stats().await.connections == expected })
            .await;
    }

    pub async fn wait_until<F, Fut>(&self, mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached in time");
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 读取下一条文本帧，跳过控制帧；超时返回 `None`
pub async fn next_text(ws: &mut Client, wait: Duration) -> Option<String> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        match tokio::time::timeout(remaining, ws.next()).await {
            Ok(Some(Ok(TungsteniteMessage::Text(text)))) => return Some(text.to_string()),
            Ok(Some(Ok(TungsteniteMessage::Ping(_) | TungsteniteMessage::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// 把内层负载解析为 JSON
pub fn parse_envelope(text: &str) -> (String, serde_json::Value) {
    let outer: serde_json::Value = serde_json::from_str(text).expect("envelope json");
    let kind = outer["type"].as_str().expect("type").to_string();
    let payload = serde_json::from_str(outer["payload"].as_str().expect("payload string"))
        .expect("payload json");
    (kind, payload)
}
