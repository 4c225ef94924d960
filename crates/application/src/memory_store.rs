//! 内存会话存储
//!
//! 未配置数据库时使用，进程重启后数据丢失。每个会话一把互斥锁，
//! 同一会话的追加串行，不同会话之间互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{
    merge_participant, sort_by_recent_activity, AppendedMessage, ChatId, ConversationStore,
    ConversationSummary, NewMessage, Participant, RepositoryResult, StoredMessage, UserId,
};
use tokio::sync::{Mutex, RwLock};

#[derive(Default)]
struct ConversationLog {
    participants: Vec<Participant>,
    messages: Vec<StoredMessage>,
}

impl ConversationLog {
    fn summary(&self, chat_id: &ChatId) -> Option<ConversationSummary> {
        let last = self.messages.last()?;
        Some(ConversationSummary {
            chat_id: chat_id.clone(),
            participants: self.participants.clone(),
            last_message: last.text.clone(),
            last_activity: last.timestamp,
            message_count: self.messages.len() as u64,
        })
    }
}

#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<ChatId, Arc<Mutex<ConversationLog>>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn log(&self, chat_id: &ChatId) -> Option<Arc<Mutex<ConversationLog>>> {
        self.conversations.read().await.get(chat_id).cloned()
    }

    async fn log_or_create(&self, chat_id: &ChatId) -> Arc<Mutex<ConversationLog>> {
        if let Some(log) = self.log(chat_id).await {
            return log;
        }
        self.conversations
            .write()
            .await
            .entry(chat_id.clone())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn append(&self, message: NewMessage) -> RepositoryResult<AppendedMessage> {
        let log = self.log_or_create(&message.chat_id).await;
        let mut log = log.lock().await;

        merge_participant(&mut log.participants, &message.sender);
        if let Some(recipient) = &message.recipient {
            merge_participant(&mut log.participants, recipient);
        }

        let stored = StoredMessage {
            chat_id: message.chat_id,
            ordinal: log.messages.len() as u64 + 1,
            sender_id: message.sender.user_id,
            sender_name: message.sender.name,
            sender_role: message.sender.role,
            text: message.text.into_inner(),
            timestamp: message.timestamp,
        };
        log.messages.push(stored.clone());

        Ok(AppendedMessage {
            message: stored,
            participants: log.participants.clone(),
        })
    }

    async fn list(
        &self,
        chat_id: &ChatId,
        after: Option<u64>,
    ) -> RepositoryResult<Vec<StoredMessage>> {
        let Some(log) = self.log(chat_id).await else {
            return Ok(Vec::new());
        };
        let log = log.lock().await;
        // 序号从 1 开始且连续，可以直接按下标截取
        let skip = after.unwrap_or(0).min(log.messages.len() as u64) as usize;
        Ok(log.messages[skip..].to_vec())
    }

    async fn participants(&self, chat_id: &ChatId) -> RepositoryResult<Option<Vec<Participant>>> {
        match self.log(chat_id).await {
            Some(log) => Ok(Some(log.lock().await.participants.clone())),
            None => Ok(None),
        }
    }

    async fn list_conversations_for_user(
        &self,
        user_id: &UserId,
    ) -> RepositoryResult<Vec<ConversationSummary>> {
        let logs: Vec<(ChatId, Arc<Mutex<ConversationLog>>)> = self
            .conversations
            .read()
            .await
            .iter()
            .map(|(id, log)| (id.clone(), log.clone()))
            .collect();

        let mut summaries = Vec::new();
        for (chat_id, log) in logs {
            let log = log.lock().await;
            if let Some(summary) = log.summary(&chat_id) {
                if summary.has_participant(user_id) {
                    summaries.push(summary);
                }
            }
        }
        sort_by_recent_activity(&mut summaries);
        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use domain::{MessageText, ParticipantRole};
    use std::collections::HashSet;

    fn user(id: &str) -> Participant {
        Participant::new(UserId::parse(id).unwrap(), id.to_uppercase(), ParticipantRole::Customer)
    }

    fn message(chat: &str, from: &str, to: Option<&str>, text: &str) -> NewMessage {
        NewMessage {
            chat_id: ChatId::parse(chat).unwrap(),
            sender: user(from),
            recipient: to.map(user),
            text: MessageText::parse(text).unwrap(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ordinals_start_at_one_and_list_in_order() {
        let store = InMemoryConversationStore::new();
        for text in ["one", "two", "three"] {
            store.append(message("a_b", "a", Some("b"), text)).await.unwrap();
        }

        let chat = ChatId::parse("a_b").unwrap();
        let all = store.list(&chat, None).await.unwrap();
        let ordinals: Vec<_> = all.iter().map(|m| m.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
        assert_eq!(all[0].text, "one");

        let tail = store.list(&chat, Some(2)).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].text, "three");
        assert!(store.list(&chat, Some(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_conversation_is_empty() {
        let store = InMemoryConversationStore::new();
        let chat = ChatId::parse("nobody").unwrap();

        assert!(store.list(&chat, None).await.unwrap().is_empty());
        assert!(store.participants(&chat).await.unwrap().is_none());
        assert!(store
            .list_conversations_for_user(&UserId::parse("a").unwrap())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn concurrent_appends_never_lose_or_reuse_ordinals() {
        let store = Arc::new(InMemoryConversationStore::new());
        let mut tasks = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .append(message("a_b", "a", Some("b"), &format!("m{i}")))
                    .await
                    .unwrap()
                    .message
                    .ordinal
            }));
        }

        let mut ordinals = HashSet::new();
        for task in tasks {
            ordinals.insert(task.await.unwrap());
        }
        assert_eq!(ordinals, (1..=64).collect::<HashSet<u64>>());

        let listed = store.list(&ChatId::parse("a_b").unwrap(), None).await.unwrap();
        assert_eq!(listed.len(), 64);
        assert!(listed.windows(2).all(|w| w[0].ordinal < w[1].ordinal));
    }

    #[tokio::test]
    async fn recipients_grow_the_participant_set() {
        let store = InMemoryConversationStore::new();
        store.append(message("group", "a", Some("b"), "hi")).await.unwrap();
        let appended = store.append(message("group", "b", Some("c"), "hey")).await.unwrap();

        let ids: Vec<_> = appended
            .participants
            .iter()
            .map(|p| p.user_id.as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn conversations_sorted_by_last_activity() {
        let store = InMemoryConversationStore::new();
        let now = Utc::now();

        let mut older = message("a_b", "a", Some("b"), "old");
        older.timestamp = now - Duration::minutes(5);
        store.append(older).await.unwrap();

        let mut newer = message("a_c", "c", Some("a"), "new");
        newer.timestamp = now;
        store.append(newer).await.unwrap();

        store.append(message("b_c", "b", Some("c"), "other")).await.unwrap();

        let summaries = store
            .list_conversations_for_user(&UserId::parse("a").unwrap())
            .await
            .unwrap();
        let chats: Vec<_> = summaries.iter().map(|s| s.chat_id.as_str()).collect();
        assert_eq!(chats, vec!["a_c", "a_b"]);
        assert_eq!(summaries[0].last_message, "new");
        assert_eq!(summaries[0].message_count, 1);
    }
}
