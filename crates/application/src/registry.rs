//! 连接注册表
//!
//! 仅由中枢任务持有和修改，因此内部不加锁；外部通过 `HubHandle` 访问。

use std::collections::{BTreeMap, HashSet};

use domain::{ConnectionId, ConnectionIdentity, ConnectionInfo, RosterEntry, Timestamp, UserId};

use crate::outbound::OutboundSender;

/// 轮转配色表：跳过当前在线连接正在使用的颜色，全部占用时才允许重复。
#[derive(Debug, Clone)]
pub struct ColorPalette {
    colors: Vec<String>,
    cursor: usize,
}

impl ColorPalette {
    pub fn new(colors: Vec<String>) -> Self {
        let colors = if colors.is_empty() {
            config::default_palette()
        } else {
            colors
        };
        Self { colors, cursor: 0 }
    }

    pub fn assign(&mut self, in_use: &HashSet<&str>) -> String {
        let len = self.colors.len();
        let index = (0..len)
            .map(|offset| (self.cursor + offset) % len)
            .find(|&i| !in_use.contains(self.colors[i].as_str()))
            .unwrap_or(self.cursor % len);
        self.cursor = (index + 1) % len;
        self.colors[index].clone()
    }
}

/// 已注册的连接：元数据加出站队列
pub struct RegisteredConnection {
    pub info: ConnectionInfo,
    pub outbound: OutboundSender,
}

pub struct ConnectionRegistry {
    next_id: u64,
    palette: ColorPalette,
    connections: BTreeMap<ConnectionId, RegisteredConnection>,
}

impl ConnectionRegistry {
    pub fn new(palette: ColorPalette) -> Self {
        Self {
            next_id: 1,
            palette,
            connections: BTreeMap::new(),
        }
    }

    /// 注册连接，返回分配好的连接信息与包含自己的在线名单快照
    pub fn register(
        &mut self,
        identity: ConnectionIdentity,
        outbound: OutboundSender,
        now: Timestamp,
    ) -> (ConnectionInfo, Vec<RosterEntry>) {
        let id = ConnectionId::new(self.next_id);
        self.next_id += 1;

        let color = {
            let in_use: HashSet<&str> = self
                .connections
                .values()
                .map(|c| c.info.color.as_str())
                .collect();
            self.palette.assign(&in_use)
        };

        let info = ConnectionInfo {
            id,
            user_id: identity.user_id,
            display_name: identity.display_name,
            role: identity.role,
            color,
            connected_at: now,
        };
        self.connections.insert(
            id,
            RegisteredConnection {
                info: info.clone(),
                outbound,
            },
        );

        (info, self.roster())
    }

    /// 注销连接；重复注销返回 `None`
    pub fn deregister(&mut self, id: ConnectionId) -> Option<RegisteredConnection> {
        self.connections.remove(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&RegisteredConnection> {
        self.connections.get(&id)
    }

    /// 按连接顺序排列的在线名单
    pub fn roster(&self) -> Vec<RosterEntry> {
        self.connections
            .values()
            .map(|c| c.info.roster_entry())
            .collect()
    }

    pub fn connections(&self) -> impl Iterator<Item = &RegisteredConnection> {
        self.connections.values()
    }

    /// 某个用户当前的任意一个在线连接
    pub fn find_user(&self, user_id: &UserId) -> Option<&ConnectionInfo> {
        self.connections
            .values()
            .map(|c| &c.info)
            .find(|info| &info.user_id == user_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
