//! 聊天目录接口

use std::collections::HashSet;

use async_trait::async_trait;

use crate::errors::DomainResult;
use crate::value_objects::{ChatId, UserId};

/// 聊天目录：查询用户当前所属的聊天
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ChatDirectory: Send + Sync {
    /// 返回用户当前所属的全部聊天ID（成员关系快照）
    async fn list_chat_ids_for_user(&self, user_id: UserId) -> DomainResult<HashSet<ChatId>>;
}
