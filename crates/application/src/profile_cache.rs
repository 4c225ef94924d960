//! 用户身份缓存
//!
//! 外部用户目录的查询可能很慢，查询在调用方任务中完成，结果随命令一起交给中枢。
//! 只缓存查到的身份；查无此人或查询失败不缓存，下次重新查询。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use domain::{UserDirectory, UserId, UserIdentity};
use tokio::sync::RwLock;
use tokio::time::Instant;

struct CachedProfile {
    identity: UserIdentity,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct ProfileCache {
    directory: Arc<dyn UserDirectory>,
    ttl: Duration,
    capacity: usize,
    entries: Arc<RwLock<HashMap<UserId, CachedProfile>>>,
}

impl ProfileCache {
    pub fn new(directory: Arc<dyn UserDirectory>, ttl: Duration, capacity: usize) -> Self {
        Self {
            directory,
            ttl,
            capacity,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 查询用户身份；目录不可用时返回 `None`，由中枢退回在线连接的信息
    pub async fn resolve(&self, user_id: &UserId) -> Option<UserIdentity> {
        if let Some(identity) = self.cached(user_id).await {
            return Some(identity);
        }

        match self.directory.lookup(user_id).await {
            Ok(Some(identity)) => {
                self.remember(user_id.clone(), identity.clone()).await;
                Some(identity)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, user_id = %user_id, "用户目录查询失败，使用在线信息");
                None
            }
        }
    }

    async fn cached(&self, user_id: &UserId) -> Option<UserIdentity> {
        let entries = self.entries.read().await;
        entries
            .get(user_id)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.identity.clone())
    }

    async fn remember(&self, user_id: UserId, identity: UserIdentity) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.entries.write().await;
        if entries.len() >= self.capacity && !entries.contains_key(&user_id) {
            let ttl = self.ttl;
            entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.fetched_at)
                    .map(|(id, _)| id.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            user_id,
            CachedProfile {
                identity,
                fetched_at: Instant::now(),
            },
        );
    }
}
