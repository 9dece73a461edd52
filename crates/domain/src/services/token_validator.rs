use crate::errors::DomainResult;
use crate::value_objects::UserId;

/// 令牌校验接口
#[cfg_attr(feature = "testing", mockall::automock)]
pub trait TokenValidator: Send + Sync {
    /// 从凭证中解析出用户ID，凭证无效或过期时返回 `InvalidToken`
    fn extract_user_id(&self, credential: &str) -> DomainResult<UserId>;
}
