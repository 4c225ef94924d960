//! 消息实体定义
//!
//! 消息一经持久化即不可变，`ordinal` 由会话存储在写入时分配。

use serde::{Deserialize, Serialize};

use crate::entities::conversation::Participant;
use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{ChatId, ParticipantRole, Timestamp, UserId};

/// 单条消息的最大字符数
pub const MAX_MESSAGE_CHARS: usize = 4000;

/// 经过验证的消息正文。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageText(String);

impl MessageText {
    pub fn parse(value: impl Into<String>) -> DomainResult<Self> {
        let value = value.into().trim().to_owned();
        if value.is_empty() {
            return Err(DomainError::validation_error("text", "消息内容不能为空"));
        }
        let len = value.chars().count();
        if len > MAX_MESSAGE_CHARS {
            return Err(DomainError::validation_error(
                "text",
                format!("消息内容过长: {len} > {MAX_MESSAGE_CHARS}"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// 待写入的消息
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub chat_id: ChatId,
    pub sender: Participant,
    /// 本次消息指定的接收者，会被并入会话参与者集合
    pub recipient: Option<Participant>,
    pub text: MessageText,
    pub timestamp: Timestamp,
}

/// 已持久化的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub chat_id: ChatId,
    pub ordinal: u64,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(default)]
    pub sender_role: ParticipantRole,
    pub text: String,
    pub timestamp: Timestamp,
}

/// 追加结果：已存储的消息以及写入后的会话参与者
#[derive(Debug, Clone, PartialEq)]
pub struct AppendedMessage {
    pub message: StoredMessage,
    pub participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_is_trimmed() {
        assert_eq!(MessageText::parse("  hi  ").unwrap().as_str(), "hi");
    }

    #[test]
    fn empty_or_oversized_text_is_rejected() {
        assert!(MessageText::parse("   ").is_err());
        assert!(MessageText::parse("a".repeat(MAX_MESSAGE_CHARS + 1)).is_err());
        assert!(MessageText::parse("a".repeat(MAX_MESSAGE_CHARS)).is_ok());
    }
}
