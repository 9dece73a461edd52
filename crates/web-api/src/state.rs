use std::sync::Arc;

use application::{ChatHub, InboundRouter};
use domain::TokenValidator;

/// 未配置时每个连接写队列的容量
pub const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ChatHub>,
    pub inbound: InboundRouter,
    pub token_validator: Arc<dyn TokenValidator>,
    pub outbound_capacity: usize,
}

impl AppState {
    pub fn new(
        hub: Arc<ChatHub>,
        inbound: InboundRouter,
        token_validator: Arc<dyn TokenValidator>,
    ) -> Self {
        Self {
            hub,
            inbound,
            token_validator,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
        }
    }

    pub fn with_outbound_capacity(mut self, capacity: usize) -> Self {
        self.outbound_capacity = capacity.max(1);
        self
    }
}
