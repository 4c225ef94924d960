//! 聊天中枢
//!
//! 单个 tokio 任务独占连接注册表、配色和消息路由器，是所有名单变更与路由决策的唯一串行化点。
//! 外部只能通过可克隆的 `HubHandle` 发送命令并等待 `oneshot` 回复。
//! 中枢任务内只做内存操作和消息持久化；用户目录查询在 `HubHandle` 一侧完成。

use std::sync::Arc;
use std::time::Duration;

use config::{HubConfig, OverflowPolicy};
use domain::{
    ClientMessage, ConnectionId, ConnectionIdentity, ConnectionInfo, ConversationStore,
    RosterEntry, ServerEvent, UserDirectory, UserId, UserIdentity,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::outbound::{outbound_queue, OutboundReceiver, OutboundSender};
use crate::presence::PresenceBroadcaster;
use crate::profile_cache::ProfileCache;
use crate::registry::{ColorPalette, ConnectionRegistry};
use crate::router::{MessageRouter, RouteOutcome};

/// 注册成功后返回给连接的信息
#[derive(Debug, Clone)]
pub struct Registration {
    pub info: ConnectionInfo,
    /// 注册时刻的在线名单（包含自己）
    pub roster: Vec<RosterEntry>,
}

enum HubCommand {
    Register {
        identity: ConnectionIdentity,
        outbound: OutboundSender,
        reply: oneshot::Sender<Registration>,
    },
    Deregister {
        connection_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Route {
        connection_id: ConnectionId,
        message: ClientMessage,
        recipient_profile: Option<UserIdentity>,
        reply: oneshot::Sender<Result<RouteOutcome, ApplicationError>>,
    },
    Roster {
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
}

pub struct HubDependencies {
    pub store: Arc<dyn ConversationStore>,
    pub directory: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn Clock>,
}

pub struct Hub {
    registry: ConnectionRegistry,
    presence: PresenceBroadcaster,
    router: MessageRouter,
    clock: Arc<dyn Clock>,
    commands: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// 创建中枢并在后台运行，返回句柄。所有句柄释放后中枢任务退出。
    pub fn spawn(config: &HubConfig, deps: HubDependencies) -> (HubHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let hub = Hub {
            registry: ConnectionRegistry::new(ColorPalette::new(config.palette.clone())),
            presence: PresenceBroadcaster,
            router: MessageRouter::new(deps.store, deps.clock.clone(), config.dedup_window),
            clock: deps.clock,
            commands: rx,
        };
        let handle = HubHandle {
            commands: tx,
            profiles: ProfileCache::new(
                deps.directory,
                Duration::from_secs(config.profile_cache_ttl_secs),
                config.profile_cache_capacity,
            ),
            outbound_capacity: config.outbound_capacity,
            overflow_policy: config.overflow_policy,
        };
        (handle, tokio::spawn(hub.run()))
    }

    async fn run(mut self) {
        tracing::info!("聊天中枢已启动");
        while let Some(command) = self.commands.recv().await {
            self.handle(command).await;
        }
        tracing::info!(remaining = self.registry.len(), "聊天中枢已停止");
    }

    async fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register {
                identity,
                outbound,
                reply,
            } => {
                let registration = self.register(identity, outbound);
                let _ = reply.send(registration);
            }
            HubCommand::Deregister {
                connection_id,
                reply,
            } => {
                let removed = self.drop_connections(vec![connection_id]) > 0;
                let _ = reply.send(removed);
            }
            HubCommand::Route {
                connection_id,
                message,
                recipient_profile,
                reply,
            } => {
                let outcome = self.route(connection_id, message, recipient_profile).await;
                let _ = reply.send(outcome);
            }
            HubCommand::Roster { reply } => {
                let _ = reply.send(self.registry.roster());
            }
        }
    }

    fn register(&mut self, identity: ConnectionIdentity, outbound: OutboundSender) -> Registration {
        let (info, roster) = self.registry.register(identity, outbound, self.clock.now());
        if let Some(connection) = self.registry.get(info.id) {
            connection
                .outbound
                .push(ServerEvent::greeting(&info, roster.clone()));
        }

        tracing::info!(
            connection_id = %info.id,
            user_id = %info.user_id,
            color = %info.color,
            online = self.registry.len(),
            "连接已注册"
        );

        let report = self.presence.announce_joined(&self.registry, &info);
        self.drop_connections(report.evicted);

        Registration { info, roster }
    }

    async fn route(
        &mut self,
        connection_id: ConnectionId,
        message: ClientMessage,
        recipient_profile: Option<UserIdentity>,
    ) -> Result<RouteOutcome, ApplicationError> {
        let sender = self
            .registry
            .get(connection_id)
            .map(|c| c.info.clone())
            .ok_or(ApplicationError::UnknownConnection(connection_id))?;
        let client_message_id = message.client_message_id.clone();

        match self
            .router
            .route(&self.registry, &sender, message, recipient_profile)
            .await
        {
            Ok(outcome) => {
                self.drop_connections(outcome.report.evicted.clone());
                Ok(outcome)
            }
            Err(err) => {
                tracing::warn!(error = %err, connection_id = %connection_id, "消息发送被拒绝");
                if let Some(connection) = self.registry.get(connection_id) {
                    connection.outbound.push(ServerEvent::send_failed(
                        err.reason(),
                        err.to_string(),
                        client_message_id,
                    ));
                }
                Err(err)
            }
        }
    }

    /// 注销连接并通知其余连接；通知过程中溢出的连接也会被一并断开。返回实际移除的数量。
    fn drop_connections(&mut self, mut pending: Vec<ConnectionId>) -> usize {
        let mut removed = 0;
        while let Some(id) = pending.pop() {
            let Some(connection) = self.registry.deregister(id) else {
                continue;
            };
            connection.outbound.close();
            removed += 1;

            tracing::info!(
                connection_id = %id,
                user_id = %connection.info.user_id,
                online = self.registry.len(),
                "连接已注销"
            );

            let report = self.presence.announce_left(&self.registry, &connection.info);
            pending.extend(report.evicted);
        }
        removed
    }
}

/// 中枢句柄，可在各连接任务与 HTTP 处理器之间克隆共享
#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    profiles: ProfileCache,
    outbound_capacity: usize,
    overflow_policy: OverflowPolicy,
}

impl HubHandle {
    /// 注册新连接，返回注册信息和该连接的出站队列读端。
    /// 欢迎消息已在队列中排在最前面。
    pub async fn connect(
        &self,
        identity: ConnectionIdentity,
    ) -> Result<(Registration, OutboundReceiver), ApplicationError> {
        let (outbound, receiver) = outbound_queue(self.outbound_capacity, self.overflow_policy);
        let registration = self
            .request(|reply| HubCommand::Register {
                identity,
                outbound,
                reply,
            })
            .await?;
        Ok((registration, receiver))
    }

    /// 注销连接，幂等；返回本次是否真正移除
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<bool, ApplicationError> {
        self.request(|reply| HubCommand::Deregister {
            connection_id,
            reply,
        })
        .await
    }

    /// 路由一条客户端消息；失败时发送者同时会收到 `send-failed` 事件。
    /// 接收者身份在进入中枢之前查询，慢速的用户服务只会拖慢这一次发送。
    pub async fn send(
        &self,
        connection_id: ConnectionId,
        message: ClientMessage,
    ) -> Result<RouteOutcome, ApplicationError> {
        let recipient_profile = match message.recipient_id.as_deref().map(UserId::parse) {
            Some(Ok(user_id)) => self.profiles.resolve(&user_id).await,
            _ => None,
        };
        self.request(|reply| HubCommand::Route {
            connection_id,
            message,
            recipient_profile,
            reply,
        })
        .await?
    }

    pub async fn roster(&self) -> Result<Vec<RosterEntry>, ApplicationError> {
        self.request(|reply| HubCommand::Roster { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, ApplicationError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ApplicationError::HubUnavailable)?;
        response.await.map_err(|_| ApplicationError::HubUnavailable)
    }
}
