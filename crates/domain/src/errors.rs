//! 领域模型错误定义
//!
//! 定义了聊天子系统中可能出现的错误类型，提供清晰的错误上下文。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 验证错误
    #[error("验证失败: {field}: {message}")]
    ValidationError { field: String, message: String },

    /// 发送者不属于目标会话
    #[error("用户 {user_id} 不是会话 {chat_id} 的参与者")]
    NotParticipant { chat_id: String, user_id: String },

    /// 会话不存在且无法推断创建方式
    #[error("会话不存在: {chat_id}")]
    ConversationNotFound { chat_id: String },

    /// 首条消息缺少接收者，无法确定会话
    #[error("缺少接收者: 首次会话必须指定 recipientId")]
    RecipientRequired,

    /// 接收者无效（例如发给自己）
    #[error("无效的接收者: {message}")]
    InvalidRecipient { message: String },
}

impl DomainError {
    /// 创建验证错误
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_participant(chat_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::NotParticipant {
            chat_id: chat_id.into(),
            user_id: user_id.into(),
        }
    }

    pub fn conversation_not_found(chat_id: impl Into<String>) -> Self {
        Self::ConversationNotFound {
            chat_id: chat_id.into(),
        }
    }

    pub fn invalid_recipient(message: impl Into<String>) -> Self {
        Self::InvalidRecipient {
            message: message.into(),
        }
    }

    /// 发送失败时回传给客户端的机器可读原因
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "invalid-message",
            Self::NotParticipant { .. } => "not-a-participant",
            Self::ConversationNotFound { .. } => "conversation-not-found",
            Self::RecipientRequired => "recipient-required",
            Self::InvalidRecipient { .. } => "invalid-recipient",
        }
    }
}

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("record conflict")]
    Conflict,
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

/// 用户目录（外部身份服务）查询错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("user directory unavailable: {0}")]
    Unavailable(String),
    #[error("user directory returned invalid payload: {0}")]
    InvalidPayload(String),
    #[error("invalid user directory url: {0}")]
    InvalidUrl(String),
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储结果类型
pub type RepositoryResult<T> = Result<T, RepositoryError>;
