//! 会话存储接口

use async_trait::async_trait;

use crate::entities::{AppendedMessage, ConversationSummary, NewMessage, Participant, StoredMessage};
use crate::errors::RepositoryResult;
use crate::value_objects::{ChatId, UserId};

/// 按会话有序保存消息的持久化日志。
///
/// 同一 `chat_id` 的追加必须串行化：序号严格递增且不重复；
/// 不同会话之间的追加可以并发执行。
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// 分配下一个序号并追加消息，必要时创建会话
    async fn append(&self, message: NewMessage) -> RepositoryResult<AppendedMessage>;

    /// 按序号升序返回消息；`after` 只返回序号更大的消息。未知会话返回空列表。
    async fn list(&self, chat_id: &ChatId, after: Option<u64>)
        -> RepositoryResult<Vec<StoredMessage>>;

    /// 会话参与者；会话不存在时返回 `None`
    async fn participants(&self, chat_id: &ChatId) -> RepositoryResult<Option<Vec<Participant>>>;

    /// 用户参与的会话，按最近活动倒序
    async fn list_conversations_for_user(
        &self,
        user_id: &UserId,
    ) -> RepositoryResult<Vec<ConversationSummary>>;
}
