//! 连接实体定义
//!
//! 连接是临时对象，仅由连接注册表持有；注销后即进入终态。

use serde::{Deserialize, Serialize};

use crate::value_objects::{ConnectionId, ParticipantRole, Timestamp, UserId};

/// 连接生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Registered,
    /// 最近收到过客户端帧
    Active,
    /// 一段时间内没有收到客户端帧
    Idle,
    Deregistered,
}

impl ConnectionState {
    /// Connecting → Registered → (Active | Idle) → Deregistered，Deregistered 为终态
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Registered)
                | (Registered | Active | Idle, Active | Idle)
                | (Registered | Active | Idle, Deregistered)
        )
    }
}

/// 连接握手时声明的身份（尚未分配ID和颜色）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIdentity {
    pub user_id: UserId,
    pub display_name: String,
    pub role: ParticipantRole,
}

/// 已注册连接的信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub display_name: String,
    pub role: ParticipantRole,
    pub color: String,
    pub connected_at: Timestamp,
}

impl ConnectionInfo {
    pub fn roster_entry(&self) -> RosterEntry {
        RosterEntry {
            id: self.id,
            user_id: self.user_id.clone(),
            name: self.display_name.clone(),
            color: self.color.clone(),
            role: self.role,
        }
    }
}

/// 在线名单条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub name: String,
    pub color: String,
    pub role: ParticipantRole,
}

/// 外部用户服务返回的身份信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub id: UserId,
    pub display_name: String,
    pub role: ParticipantRole,
}
