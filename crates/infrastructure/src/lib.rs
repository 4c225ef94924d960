//! 基础设施层实现。
//!
//! 提供 PostgreSQL 会话存储、外部用户服务客户端，以及按配置组装这些适配器的构建器。

pub mod builder;
pub mod migrations;
pub mod repository;
pub mod user_directory;

pub use builder::{Infrastructure, InfrastructureError};
pub use migrations::MIGRATOR;
pub use repository::{create_pg_pool, PgConversationStore};
pub use user_directory::HttpUserDirectory;
