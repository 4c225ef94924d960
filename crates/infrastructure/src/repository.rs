use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    AppendedMessage, ChatId, ConversationStore, ConversationSummary, NewMessage, Participant,
    ParticipantRole, RepositoryError, RepositoryResult, StoredMessage, UserId,
};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool, Postgres, Transaction};

fn map_sqlx_err(err: sqlx::Error) -> RepositoryError {
    RepositoryError::storage(err.to_string())
}

fn invalid_data(message: impl Into<String>) -> RepositoryError {
    RepositoryError::storage(message)
}

fn to_db_ordinal(ordinal: u64) -> i64 {
    i64::try_from(ordinal).unwrap_or(i64::MAX)
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    chat_id: String,
    ordinal: i64,
    sender_id: String,
    sender_name: String,
    sender_role: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRecord> for StoredMessage {
    type Error = RepositoryError;

    fn try_from(value: MessageRecord) -> Result<Self, Self::Error> {
        Ok(StoredMessage {
            chat_id: ChatId::parse(value.chat_id).map_err(|err| invalid_data(err.to_string()))?,
            ordinal: u64::try_from(value.ordinal)
                .map_err(|_| invalid_data(format!("negative ordinal {}", value.ordinal)))?,
            sender_id: UserId::parse(value.sender_id)
                .map_err(|err| invalid_data(err.to_string()))?,
            sender_name: value.sender_name,
            sender_role: ParticipantRole::parse_lenient(&value.sender_role),
            text: value.text,
            timestamp: value.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct ParticipantRecord {
    chat_id: String,
    user_id: String,
    display_name: String,
    role: String,
}

impl TryFrom<ParticipantRecord> for Participant {
    type Error = RepositoryError;

    fn try_from(value: ParticipantRecord) -> Result<Self, Self::Error> {
        Ok(Participant {
            user_id: UserId::parse(value.user_id).map_err(|err| invalid_data(err.to_string()))?,
            name: value.display_name,
            role: ParticipantRole::parse_lenient(&value.role),
        })
    }
}

#[derive(Debug, FromRow)]
struct SummaryRecord {
    chat_id: String,
    last_ordinal: i64,
    last_message: String,
    last_activity: DateTime<Utc>,
}

/// PostgreSQL 会话存储
///
/// 序号分配依赖 `conversations` 行上的 upsert：并发追加同一会话时，
/// 后到的事务会在行锁上等待，直到前一个事务提交。
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_participant(
        tx: &mut Transaction<'_, Postgres>,
        chat_id: &ChatId,
        participant: &Participant,
        joined_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversation_participants (chat_id, user_id, display_name, role, joined_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (chat_id, user_id)
            DO UPDATE SET display_name = EXCLUDED.display_name, role = EXCLUDED.role
            "#,
        )
        .bind(chat_id.as_str())
        .bind(participant.user_id.as_str())
        .bind(&participant.name)
        .bind(participant.role.as_str())
        .bind(joined_at)
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_err)?;
        Ok(())
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn append(&self, message: NewMessage) -> RepositoryResult<AppendedMessage> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_err)?;

        let (ordinal,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO conversations (chat_id, last_ordinal, last_message, last_activity)
            VALUES ($1, 1, $2, $3)
            ON CONFLICT (chat_id) DO UPDATE
            SET last_ordinal = conversations.last_ordinal + 1,
                last_message = EXCLUDED.last_message,
                last_activity = EXCLUDED.last_activity
            RETURNING last_ordinal
            "#,
        )
        .bind(message.chat_id.as_str())
        .bind(message.text.as_str())
        .bind(message.timestamp)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        Self::upsert_participant(&mut tx, &message.chat_id, &message.sender, message.timestamp)
            .await?;
        if let Some(recipient) = &message.recipient {
            Self::upsert_participant(&mut tx, &message.chat_id, recipient, message.timestamp)
                .await?;
        }

        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO chat_messages (chat_id, ordinal, sender_id, sender_name, sender_role, text, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING chat_id, ordinal, sender_id, sender_name, sender_role, text, created_at
            "#,
        )
        .bind(message.chat_id.as_str())
        .bind(ordinal)
        .bind(message.sender.user_id.as_str())
        .bind(&message.sender.name)
        .bind(message.sender.role.as_str())
        .bind(message.text.as_str())
        .bind(message.timestamp)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        let participants = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT chat_id, user_id, display_name, role
            FROM conversation_participants
            WHERE chat_id = $1
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(message.chat_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(map_sqlx_err)?;

        tx.commit().await.map_err(map_sqlx_err)?;

        Ok(AppendedMessage {
            message: StoredMessage::try_from(record)?,
            participants: participants
                .into_iter()
                .map(Participant::try_from)
                .collect::<Result<_, _>>()?,
        })
    }

    async fn list(
        &self,
        chat_id: &ChatId,
        after: Option<u64>,
    ) -> RepositoryResult<Vec<StoredMessage>> {
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT chat_id, ordinal, sender_id, sender_name, sender_role, text, created_at
            FROM chat_messages
            WHERE chat_id = $1 AND ordinal > $2
            ORDER BY ordinal ASC
            "#,
        )
        .bind(chat_id.as_str())
        .bind(to_db_ordinal(after.unwrap_or(0)))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        records.into_iter().map(StoredMessage::try_from).collect()
    }

    async fn participants(&self, chat_id: &ChatId) -> RepositoryResult<Option<Vec<Participant>>> {
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT chat_id, user_id, display_name, role
            FROM conversation_participants
            WHERE chat_id = $1
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(chat_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        // 会话创建时至少写入发送者，所以没有参与者等价于会话不存在
        if records.is_empty() {
            return Ok(None);
        }
        records
            .into_iter()
            .map(Participant::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    async fn list_conversations_for_user(
        &self,
        user_id: &UserId,
    ) -> RepositoryResult<Vec<ConversationSummary>> {
        let summaries = sqlx::query_as::<_, SummaryRecord>(
            r#"
            SELECT c.chat_id, c.last_ordinal, c.last_message, c.last_activity
            FROM conversations c
            JOIN conversation_participants p ON p.chat_id = c.chat_id
            WHERE p.user_id = $1
            ORDER BY c.last_activity DESC, c.chat_id ASC
            "#,
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        if summaries.is_empty() {
            return Ok(Vec::new());
        }

        let chat_ids: Vec<String> = summaries.iter().map(|s| s.chat_id.clone()).collect();
        let records = sqlx::query_as::<_, ParticipantRecord>(
            r#"
            SELECT chat_id, user_id, display_name, role
            FROM conversation_participants
            WHERE chat_id = ANY($1)
            ORDER BY joined_at, user_id
            "#,
        )
        .bind(&chat_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        let mut by_chat: HashMap<String, Vec<Participant>> = HashMap::new();
        for record in records {
            let chat_id = record.chat_id.clone();
            by_chat
                .entry(chat_id)
                .or_default()
                .push(Participant::try_from(record)?);
        }

        summaries
            .into_iter()
            .map(|record| {
                Ok(ConversationSummary {
                    participants: by_chat.remove(&record.chat_id).unwrap_or_default(),
                    chat_id: ChatId::parse(record.chat_id)
                        .map_err(|err| invalid_data(err.to_string()))?,
                    last_message: record.last_message,
                    last_activity: record.last_activity,
                    message_count: u64::try_from(record.last_ordinal).unwrap_or(0),
                })
            })
            .collect()
    }
}

pub async fn create_pg_pool(
    database_url: &str,
    max_connections: u32,
) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
}
