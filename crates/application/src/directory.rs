use std::collections::HashMap;

use async_trait::async_trait;
use domain::{DirectoryError, UserDirectory, UserId, UserIdentity};

/// 固定内容的用户目录，用于开发环境和测试
#[derive(Debug, Default, Clone)]
pub struct StaticUserDirectory {
    users: HashMap<UserId, UserIdentity>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, identity: UserIdentity) -> Self {
        self.users.insert(identity.id.clone(), identity);
        self
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<UserIdentity>, DirectoryError> {
        Ok(self.users.get(user_id).cloned())
    }
}
