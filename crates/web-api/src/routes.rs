use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use application::HubStats;

use crate::{state::AppState, ws_connection::WebSocketConnection};

#[derive(Debug, Deserialize)]
struct WsQuery {
    /// 浏览器无法设置握手头时的备用凭证
    token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws/chat", get(websocket_upgrade))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats().await)
}

/// 凭证在握手完成后校验，失败时以关闭帧告知原因
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .or(query.token);

    ws.on_upgrade(move |socket| WebSocketConnection::new(state).run(socket, credential))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    use application::{ChatHub, InboundRouter, SystemClock};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use domain::{
        ChatDirectory, ChatId, ChatMessage, DomainError, DomainResult, MessageId,
        MessageService, TokenValidator, UserId,
    };
    use tower::ServiceExt;

    struct Nobody;

    #[async_trait]
    impl ChatDirectory for Nobody {
        async fn list_chat_ids_for_user(&self, _: UserId) -> DomainResult<HashSet<ChatId>> {
            Ok(HashSet::new())
        }
    }

    #[async_trait]
    impl MessageService for Nobody {
        async fn send_message(
            &self,
            _: ChatId,
            _: UserId,
            _: String,
            _: Option<MessageId>,
        ) -> DomainResult<ChatMessage> {
            Err(DomainError::ChatNotFound)
        }
    }

    impl TokenValidator for Nobody {
        fn extract_user_id(&self, _: &str) -> DomainResult<UserId> {
            Err(DomainError::invalid_token("nobody"))
        }
    }

    #[tokio::test]
    async fn test_health_reports_hub_stats() {
        let hub = Arc::new(ChatHub::new(Arc::new(Nobody), Arc::new(SystemClock)));
        let state = AppState::new(
            hub.clone(),
            InboundRouter::new(hub, Arc::new(Nobody)),
            Arc::new(Nobody),
        );

        let response = router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let stats: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(stats["connections"], 0);
        assert_eq!(stats["users"], 0);
        assert_eq!(stats["chats"], 0);
    }
}
