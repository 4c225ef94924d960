//! 聊天连接上的收发事件
//!
//! 线上格式为 `{"type": "...", "data": {...}}`，字段使用 camelCase。

use serde::{Deserialize, Serialize};

use crate::entities::{ConnectionInfo, RosterEntry, StoredMessage};
use crate::value_objects::{ChatId, ConnectionId, ParticipantRole, Timestamp, UserId};

/// 服务端下发给客户端的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// 连接建立后的欢迎消息，携带当前在线名单
    Connection(ConnectionGreeting),
    /// 其他用户上线
    UserConnected(PresenceNotice),
    /// 其他用户下线
    UserDisconnected(PresenceNotice),
    /// 完整的聊天消息，仅发给会话参与者
    ChatMessage(ChatMessagePayload),
    /// 轻量通知，不含消息正文
    Notification(NotificationPayload),
    /// 发送失败，仅发给发送者
    SendFailed(SendFailure),
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::UserConnected(_) => "user-connected",
            Self::UserDisconnected(_) => "user-disconnected",
            Self::ChatMessage(_) => "chat-message",
            Self::Notification(_) => "notification",
            Self::SendFailed(_) => "send-failed",
        }
    }

    pub fn greeting(info: &ConnectionInfo, users: Vec<RosterEntry>) -> Self {
        Self::Connection(ConnectionGreeting {
            id: info.id,
            user_id: info.user_id.clone(),
            name: info.display_name.clone(),
            color: info.color.clone(),
            users,
            message: "Connected to chat server".to_string(),
        })
    }

    pub fn joined(info: &ConnectionInfo) -> Self {
        Self::UserConnected(PresenceNotice {
            id: info.id,
            user_id: info.user_id.clone(),
            name: info.display_name.clone(),
            color: Some(info.color.clone()),
            message: format!("{} has joined the chat!", info.display_name),
        })
    }

    pub fn left(info: &ConnectionInfo) -> Self {
        Self::UserDisconnected(PresenceNotice {
            id: info.id,
            user_id: info.user_id.clone(),
            name: info.display_name.clone(),
            color: None,
            message: format!("{} has left the chat!", info.display_name),
        })
    }

    pub fn chat_message(message: &StoredMessage, color: impl Into<String>) -> Self {
        Self::ChatMessage(ChatMessagePayload {
            chat_id: message.chat_id.clone(),
            ordinal: message.ordinal,
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            sender_role: message.sender_role,
            text: message.text.clone(),
            timestamp: message.timestamp,
            color: color.into(),
        })
    }

    pub fn notification(sender_name: &str) -> Self {
        Self::Notification(NotificationPayload {
            sender_name: sender_name.to_string(),
            message: format!("New message from {sender_name}"),
        })
    }

    pub fn send_failed(
        reason: &'static str,
        message: impl Into<String>,
        client_message_id: Option<String>,
    ) -> Self {
        Self::SendFailed(SendFailure {
            reason: reason.to_string(),
            message: message.into(),
            client_message_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionGreeting {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    pub color: String,
    pub users: Vec<RosterEntry>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceNotice {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub chat_id: ChatId,
    pub ordinal: u64,
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_role: ParticipantRole,
    pub text: String,
    pub timestamp: Timestamp,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub sender_name: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendFailure {
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_message_id: Option<String>,
}

/// 客户端通过连接发送的聊天消息
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    pub text: String,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub recipient_id: Option<String>,
    /// 客户端生成的幂等键，用于重发去重
    #[serde(default)]
    pub client_message_id: Option<String>,
}

impl ClientMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn in_chat(mut self, chat_id: impl Into<String>) -> Self {
        self.chat_id = Some(chat_id.into());
        self
    }

    pub fn to_recipient(mut self, recipient_id: impl Into<String>) -> Self {
        self.recipient_id = Some(recipient_id.into());
        self
    }

    pub fn with_client_id(mut self, client_message_id: impl Into<String>) -> Self {
        self.client_message_id = Some(client_message_id.into());
        self
    }
}
