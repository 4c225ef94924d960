use application::{ApplicationError, HubHandle, OutboundReceiver};
use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use domain::{ClientMessage, ConnectionId, ConnectionIdentity, ConnectionInfo, ConnectionState};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;

/// 超过该时长没有收到客户端帧即视为空闲
const IDLE_AFTER: Duration = Duration::from_secs(60);

/// WebSocket 连接管理器
///
/// 封装单个连接的生命周期：
/// - 向中枢注册，拿到出站队列
/// - 写任务把出站事件序列化后写入 socket
/// - 读任务解析客户端消息并交给中枢路由
/// - 任一方向结束后立即注销
pub struct WebSocketConnection {
    hub: HubHandle,
    info: ConnectionInfo,
    state: ConnectionState,
}

impl WebSocketConnection {
    /// 升级完成后的入口
    pub async fn serve(socket: WebSocket, hub: HubHandle, identity: ConnectionIdentity) {
        let user_id = identity.user_id.clone();
        match hub.connect(identity).await {
            Ok((registration, outbound)) => {
                let mut connection = Self {
                    hub,
                    info: registration.info,
                    state: ConnectionState::Connecting,
                };
                connection.transition(ConnectionState::Registered);
                tracing::info!(
                    connection_id = %connection.info.id,
                    user_id = %connection.info.user_id,
                    "WebSocket 连接已建立"
                );
                connection.run(socket, outbound).await;
            }
            Err(err) => {
                tracing::error!(error = %err, user_id = %user_id, "连接注册失败");
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        advance(self.info.id, &mut self.state, next);
    }

    async fn run(mut self, socket: WebSocket, mut outbound: OutboundReceiver) {
        let (mut sender, mut incoming) = socket.split();
        let connection_id = self.info.id;

        // 读任务通过 channel 请求写 pong，写操作统一由写任务完成
        let (cmd_tx, mut cmd_rx) = mpsc::channel::<WsCommand>(32);

        let mut send_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(cmd) = cmd_rx.recv() => match cmd {
                        WsCommand::SendPong(data) => {
                            if sender.send(WsMessage::Pong(data)).await.is_err() {
                                tracing::warn!(connection_id = %connection_id, "发送 pong 失败");
                                break;
                            }
                        }
                    },
                    event = outbound.recv() => {
                        let Some(event) = event else {
                            // 中枢关闭了队列（注销或慢消费者被踢出）
                            let _ = sender.send(WsMessage::Close(None)).await;
                            break;
                        };
                        let payload = match serde_json::to_string(&event) {
                            Ok(json) => json,
                            Err(err) => {
                                tracing::warn!(error = %err, kind = event.kind(), "事件序列化失败");
                                continue;
                            }
                        };
                        if sender.send(WsMessage::Text(payload.into())).await.is_err() {
                            tracing::debug!(connection_id = %connection_id, "写入 socket 失败");
                            break;
                        }
                    }
                }
            }
        });

        let hub = self.hub.clone();
        let mut activity = self.state;
        let mut recv_task = tokio::spawn(async move {
            loop {
                let message = match tokio::time::timeout(IDLE_AFTER, incoming.next()).await {
                    Ok(Some(Ok(message))) => message,
                    Ok(_) => break,
                    Err(_) => {
                        advance(connection_id, &mut activity, ConnectionState::Idle);
                        continue;
                    }
                };
                advance(connection_id, &mut activity, ConnectionState::Active);
                if Self::handle_incoming(&hub, connection_id, message, &cmd_tx)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        tokio::select! {
            _ = &mut send_task => {
                tracing::debug!(connection_id = %connection_id, "WebSocket 发送任务结束");
                recv_task.abort();
            }
            _ = &mut recv_task => {
                tracing::debug!(connection_id = %connection_id, "WebSocket 接收任务结束");
                send_task.abort();
            }
        }

        self.transition(ConnectionState::Deregistered);
        match self.hub.disconnect(connection_id).await {
            Ok(_) => tracing::info!(
                connection_id = %connection_id,
                user_id = %self.info.user_id,
                "WebSocket 连接已断开"
            ),
            Err(err) => tracing::error!(error = %err, connection_id = %connection_id, "注销连接失败"),
        }
    }

    /// 处理来自客户端的一帧；返回 `Err` 表示连接应当结束
    async fn handle_incoming(
        hub: &HubHandle,
        connection_id: ConnectionId,
        message: WsMessage,
        cmd_tx: &mpsc::Sender<WsCommand>,
    ) -> Result<(), ()> {
        match message {
            WsMessage::Text(text) => {
                let request: ClientMessage = match serde_json::from_str(text.as_str()) {
                    Ok(request) => request,
                    Err(err) => {
                        tracing::warn!(connection_id = %connection_id, error = %err, "忽略无法解析的消息帧");
                        return Ok(());
                    }
                };
                // 失败原因已由中枢以 send-failed 事件回给发送者
                if let Err(err) = hub.send(connection_id, request).await {
                    tracing::debug!(connection_id = %connection_id, reason = err.reason(), "消息未送达");
                    if matches!(err, ApplicationError::HubUnavailable) {
                        return Err(());
                    }
                }
            }
            WsMessage::Ping(data) => {
                if cmd_tx.send(WsCommand::SendPong(data)).await.is_err() {
                    return Err(());
                }
            }
            WsMessage::Pong(_) => {}
            WsMessage::Binary(_) => {
                tracing::warn!(connection_id = %connection_id, "忽略二进制消息帧");
            }
            WsMessage::Close(_) => {
                tracing::debug!(connection_id = %connection_id, "收到关闭帧");
                return Err(());
            }
        }
        Ok(())
    }
}

fn advance(connection_id: ConnectionId, state: &mut ConnectionState, next: ConnectionState) {
    if *state == next {
        return;
    }
    if state.can_transition_to(next) {
        tracing::trace!(connection_id = %connection_id, from = ?state, to = ?next, "连接状态迁移");
        *state = next;
    } else {
        tracing::warn!(
            connection_id = %connection_id,
            from = ?state,
            to = ?next,
            "忽略非法的连接状态迁移"
        );
    }
}

#[derive(Debug)]
enum WsCommand {
    SendPong(Bytes),
}
