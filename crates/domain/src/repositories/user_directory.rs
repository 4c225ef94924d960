use async_trait::async_trait;

use crate::entities::UserIdentity;
use crate::errors::DirectoryError;
use crate::value_objects::UserId;

/// 只读的用户身份查询（由外部用户服务提供）
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<UserIdentity>, DirectoryError>;
}
