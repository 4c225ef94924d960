use std::sync::Arc;
use std::time::Duration;

use application::{InMemoryConversationStore, StaticUserDirectory};
use config::AppConfig;
use domain::{ConversationStore, DirectoryError, UserDirectory};
use thiserror::Error;

use crate::{
    migrations::MIGRATOR,
    repository::{create_pg_pool, PgConversationStore},
    user_directory::HttpUserDirectory,
};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("user directory error: {0}")]
    Directory(#[from] DirectoryError),
}

/// 按配置选择的外部适配器
#[derive(Clone)]
pub struct Infrastructure {
    pub store: Arc<dyn ConversationStore>,
    pub directory: Arc<dyn UserDirectory>,
}

impl Infrastructure {
    /// 配置了数据库时连接 PostgreSQL 并执行迁移，否则使用内存存储；
    /// 配置了用户服务地址时通过 HTTP 查询身份，否则只使用握手参数。
    pub async fn connect(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let store: Arc<dyn ConversationStore> = match &config.database.url {
            Some(url) => {
                let pool = create_pg_pool(url, config.database.max_connections).await?;
                MIGRATOR.run(&pool).await?;
                tracing::info!("使用 PostgreSQL 会话存储");
                Arc::new(PgConversationStore::new(pool))
            }
            None => {
                tracing::warn!("未配置数据库，使用内存会话存储，重启后历史消息将丢失");
                Arc::new(InMemoryConversationStore::new())
            }
        };

        let directory: Arc<dyn UserDirectory> = match &config.user_directory.base_url {
            Some(base_url) => Arc::new(HttpUserDirectory::new(
                base_url,
                config.user_directory.service_token.clone(),
                Duration::from_millis(config.user_directory.timeout_ms),
            )?),
            None => Arc::new(StaticUserDirectory::new()),
        };

        Ok(Self { store, directory })
    }

    /// 纯内存组合，用于测试和本地开发
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemoryConversationStore::new()),
            directory: Arc::new(StaticUserDirectory::new()),
        }
    }
}
