use domain::{DomainError, RepositoryError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),
    #[error("repository error: {0}")]
    Repository(RepositoryError),
    /// 消息持久化失败，发送被拒绝
    #[error("failed to persist message: {0}")]
    Persistence(RepositoryError),
    /// 发送者的连接已不在名单中
    #[error("connection {0} is not registered")]
    UnknownConnection(domain::ConnectionId),
    /// 中枢任务已退出
    #[error("chat hub is unavailable")]
    HubUnavailable,
}

impl ApplicationError {
    /// 回传给发送者的机器可读原因
    pub fn reason(&self) -> &'static str {
        match self {
            ApplicationError::Domain(err) => err.reason(),
            ApplicationError::Repository(_) => "storage-unavailable",
            ApplicationError::Persistence(_) => "persistence-failed",
            ApplicationError::UnknownConnection(_) => "not-connected",
            ApplicationError::HubUnavailable => "hub-unavailable",
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        ApplicationError::Repository(value)
    }
}
