//! 历史查询服务
//!
//! 只读，直接访问会话存储，不经过中枢。客户端（重）连后用它补齐错过的消息，
//! 并按 `(chatId, ordinal)` 与实时推送去重。

use std::sync::Arc;

use domain::{
    ChatId, ConversationStore, ParticipantRole, StoredMessage, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use crate::error::ApplicationError;

/// 会话中对方的信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSummary {
    pub user_id: UserId,
    pub name: String,
    pub role: ParticipantRole,
}

/// 会话列表条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationOverview {
    pub chat_id: ChatId,
    /// 不包含请求者自己
    pub peer_summary: Vec<PeerSummary>,
    pub last_activity: Timestamp,
    pub last_message: String,
}

/// 历史消息条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_role: ParticipantRole,
    pub text: String,
    pub timestamp: Timestamp,
    pub ordinal: u64,
}

impl From<StoredMessage> for HistoryMessage {
    fn from(message: StoredMessage) -> Self {
        Self {
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            sender_role: message.sender_role,
            text: message.text,
            timestamp: message.timestamp,
            ordinal: message.ordinal,
        }
    }
}

#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn ConversationStore>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// 用户参与的会话，按最近活动倒序
    pub async fn conversations(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ConversationOverview>, ApplicationError> {
        let summaries = self.store.list_conversations_for_user(user_id).await?;
        Ok(summaries
            .iter()
            .map(|summary| ConversationOverview {
                chat_id: summary.chat_id.clone(),
                peer_summary: summary
                    .peers_of(user_id)
                    .map(|p| PeerSummary {
                        user_id: p.user_id.clone(),
                        name: p.name.clone(),
                        role: p.role,
                    })
                    .collect(),
                last_activity: summary.last_activity,
                last_message: summary.last_message.clone(),
            })
            .collect())
    }

    /// 会话的完整记录；`after` 用于增量补齐
    pub async fn messages(
        &self,
        chat_id: &ChatId,
        after: Option<u64>,
    ) -> Result<Vec<HistoryMessage>, ApplicationError> {
        let messages = self.store.list(chat_id, after).await?;
        tracing::debug!(chat_id = %chat_id, after = ?after, count = messages.len(), "读取会话历史");
        Ok(messages.into_iter().map(HistoryMessage::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::InMemoryConversationStore;
    use chrono::Utc;
    use domain::{MessageText, MockConversationStore, NewMessage, Participant, RepositoryError};

    fn participant(id: &str, role: ParticipantRole) -> Participant {
        Participant::new(UserId::parse(id).unwrap(), id.to_uppercase(), role)
    }

    async fn seeded() -> HistoryService {
        let store = Arc::new(InMemoryConversationStore::new());
        for text in ["hello", "how much per day?"] {
            store
                .append(NewMessage {
                    chat_id: ChatId::parse("alice_bob").unwrap(),
                    sender: participant("alice", ParticipantRole::Customer),
                    recipient: Some(participant("bob", ParticipantRole::CarProvider)),
                    text: MessageText::parse(text).unwrap(),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
        }
        HistoryService::new(store)
    }

    #[tokio::test]
    async fn peers_exclude_the_requesting_user() {
        let service = seeded().await;

        let list = service
            .conversations(&UserId::parse("alice").unwrap())
            .await
            .unwrap();

        assert_eq!(list.len(), 1);
        assert_eq!(list[0].last_message, "how much per day?");
        assert_eq!(list[0].peer_summary.len(), 1);
        assert_eq!(list[0].peer_summary[0].user_id.as_str(), "bob");
        assert_eq!(list[0].peer_summary[0].role, ParticipantRole::CarProvider);
    }

    #[tokio::test]
    async fn messages_support_incremental_catch_up() {
        let service = seeded().await;
        let chat = ChatId::parse("alice_bob").unwrap();

        let all = service.messages(&chat, None).await.unwrap();
        assert_eq!(all.iter().map(|m| m.ordinal).collect::<Vec<_>>(), vec![1, 2]);

        let rest = service.messages(&chat, Some(1)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].text, "how much per day?");

        let json = serde_json::to_value(&rest[0]).unwrap();
        assert_eq!(json["senderId"], "alice");
        assert_eq!(json["ordinal"], 2);
        assert_eq!(json["senderRole"], "customer");
    }

    #[tokio::test]
    async fn unknown_ids_yield_empty_lists() {
        let service = seeded().await;

        assert!(service
            .conversations(&UserId::parse("carol").unwrap())
            .await
            .unwrap()
            .is_empty());
        assert!(service
            .messages(&ChatId::parse("nope").unwrap(), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_surfaced() {
        let mut store = MockConversationStore::new();
        store
            .expect_list()
            .returning(|_, _| Err(RepositoryError::storage("connection reset")));
        let service = HistoryService::new(Arc::new(store));

        let err = service
            .messages(&ChatId::parse("a_b").unwrap(), None)
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "storage-unavailable");
    }
}
