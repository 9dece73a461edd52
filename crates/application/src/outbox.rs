//! 提交后事件发布
//!
//! 持久层在一次写操作里通过 [`UnitOfWork`] 暂存领域事件，只有在自身提交成功后
//! 调用 [`UnitOfWork::commit`] 才会把事件按顺序送入事件通道；未提交就被丢弃的
//! 工作单元不会发布任何事件。连接中心只从这个通道看到领域事件。

use domain::ChatEvent;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// 提交后事件发布器
#[derive(Clone)]
pub struct PostCommitPublisher {
    sender: mpsc::UnboundedSender<ChatEvent>,
}

impl PostCommitPublisher {
    /// 创建发布器与对应的事件接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ChatEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    /// 开始一个工作单元
    pub fn begin(&self) -> UnitOfWork {
        UnitOfWork {
            sender: self.sender.clone(),
            pending: Vec::new(),
        }
    }
}

/// 一次写操作内暂存的事件
#[must_use = "events are only published after commit()"]
pub struct UnitOfWork {
    sender: mpsc::UnboundedSender<ChatEvent>,
    pending: Vec<ChatEvent>,
}

impl UnitOfWork {
    pub fn record(&mut self, event: ChatEvent) {
        self.pending.push(event);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// 提交成功后调用：按记录顺序发布事件，返回已发布数量
    ///
    /// 接收端已关闭时记录日志并丢弃剩余事件，不会重试。
    pub fn commit(self) -> usize {
        let mut published = 0;
        for event in self.pending {
            let event_type = event.event_type();
            if self.sender.send(event).is_err() {
                warn!(event_type, "Event channel closed, dropping post-commit event");
                continue;
            }
            debug!(event_type, "Post-commit event published");
            published += 1;
        }
        published
    }

    /// 放弃暂存的事件
    pub fn rollback(self) {
        if !self.pending.is_empty() {
            debug!(discarded = self.pending.len(), "Unit of work rolled back");
        }
    }
}
