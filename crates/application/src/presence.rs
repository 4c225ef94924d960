//! 在线状态广播
//!
//! 在每次注册/注销后通知其他所有在线连接。投递是逐连接尽力而为的，
//! 某个连接失败不会影响其他连接。

use domain::{ConnectionId, ConnectionInfo, ServerEvent};

use crate::outbound::PushOutcome;
use crate::registry::{ConnectionRegistry, RegisteredConnection};

/// 一次扇出的结果
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    /// 出站队列溢出、需要被强制断开的连接
    pub evicted: Vec<ConnectionId>,
}

impl FanoutReport {
    pub(crate) fn record(&mut self, connection: &RegisteredConnection, event: ServerEvent) {
        match connection.outbound.push(event) {
            outcome if outcome.is_delivered() => {
                if outcome == PushOutcome::DroppedOldest {
                    tracing::debug!(connection_id = %connection.info.id, "出站队列已满，丢弃最旧事件");
                }
                self.delivered += 1;
            }
            PushOutcome::Overflowed => {
                tracing::warn!(connection_id = %connection.info.id, "出站队列溢出，断开慢消费者");
                self.evicted.push(connection.info.id);
            }
            _ => {
                tracing::debug!(connection_id = %connection.info.id, "连接已关闭，跳过投递");
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PresenceBroadcaster;

impl PresenceBroadcaster {
    /// 通知除新连接以外的所有连接：有人上线
    pub fn announce_joined(&self, registry: &ConnectionRegistry, joined: &ConnectionInfo) -> FanoutReport {
        self.broadcast_except(registry, joined.id, ServerEvent::joined(joined))
    }

    /// 通知剩余所有连接：有人下线。调用前连接必须已从名单移除。
    pub fn announce_left(&self, registry: &ConnectionRegistry, left: &ConnectionInfo) -> FanoutReport {
        self.broadcast_except(registry, left.id, ServerEvent::left(left))
    }

    fn broadcast_except(
        &self,
        registry: &ConnectionRegistry,
        except: ConnectionId,
        event: ServerEvent,
    ) -> FanoutReport {
        let mut report = FanoutReport::default();
        for connection in registry.connections().filter(|c| c.info.id != except) {
            report.record(connection, event.clone());
        }
        report
    }
}
