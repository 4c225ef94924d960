//! 消息路由
//!
//! 处理流程：解析会话 -> 持久化（分配序号，持久化先于投递）-> 扇出。
//! 参与者收到完整消息；其他在线连接只收到不含正文的通知。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use domain::{
    ChatId, ClientMessage, ConnectionInfo, ConversationStore, DomainError, MessageText,
    NewMessage, Participant, ParticipantRole, ServerEvent, StoredMessage, UserId, UserIdentity,
};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::presence::FanoutReport;
use crate::registry::ConnectionRegistry;

/// 一次路由的结果
#[derive(Debug, Clone)]
pub struct RouteOutcome {
    pub message: StoredMessage,
    /// 命中重发去重：未重新持久化，只回给发送者
    pub duplicate: bool,
    pub report: FanoutReport,
}

/// 解析后的投递目标
#[derive(Debug, Clone, PartialEq)]
struct Target {
    chat_id: ChatId,
    recipient: Option<Participant>,
}

type SendKey = (UserId, String);

/// 最近处理过的客户端消息ID，容量有限，先进先出淘汰
struct RecentSends {
    capacity: usize,
    order: VecDeque<SendKey>,
    entries: HashMap<SendKey, StoredMessage>,
}

impl RecentSends {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &SendKey) -> Option<&StoredMessage> {
        self.entries.get(key)
    }

    fn remember(&mut self, key: SendKey, message: StoredMessage) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), message).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }
}

pub struct MessageRouter {
    store: Arc<dyn ConversationStore>,
    clock: Arc<dyn Clock>,
    recent: RecentSends,
}

impl MessageRouter {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        clock: Arc<dyn Clock>,
        dedup_window: usize,
    ) -> Self {
        Self {
            store,
            clock,
            recent: RecentSends::new(dedup_window),
        }
    }

    /// `recipient_profile` 是调用方预先从用户目录查到的接收者身份（可能为空）
    pub async fn route(
        &mut self,
        registry: &ConnectionRegistry,
        sender: &ConnectionInfo,
        request: ClientMessage,
        recipient_profile: Option<UserIdentity>,
    ) -> Result<RouteOutcome, ApplicationError> {
        let text = MessageText::parse(request.text.clone())?;

        let send_key = request
            .client_message_id
            .clone()
            .map(|id| (sender.user_id.clone(), id));
        if let Some(previous) = send_key.as_ref().and_then(|key| self.recent.get(key)) {
            tracing::info!(
                user_id = %sender.user_id,
                chat_id = %previous.chat_id,
                ordinal = previous.ordinal,
                "重复消息，跳过持久化"
            );
            let mut report = FanoutReport::default();
            if let Some(connection) = registry.get(sender.id) {
                report.record(connection, ServerEvent::chat_message(previous, &sender.color));
            }
            return Ok(RouteOutcome {
                message: previous.clone(),
                duplicate: true,
                report,
            });
        }

        let target = self
            .resolve(registry, sender, &request, recipient_profile)
            .await?;

        let appended = self
            .store
            .append(NewMessage {
                chat_id: target.chat_id.clone(),
                sender: Participant::new(
                    sender.user_id.clone(),
                    sender.display_name.clone(),
                    sender.role,
                ),
                recipient: target.recipient,
                text,
                timestamp: self.clock.now(),
            })
            .await
            .map_err(|err| {
                tracing::error!(error = %err, chat_id = %target.chat_id, user_id = %sender.user_id, "消息持久化失败");
                ApplicationError::Persistence(err)
            })?;

        let message = appended.message;
        let participants: HashSet<&UserId> =
            appended.participants.iter().map(|p| &p.user_id).collect();

        let full = ServerEvent::chat_message(&message, &sender.color);
        let notice = ServerEvent::notification(&message.sender_name);
        let mut report = FanoutReport::default();
        for connection in registry.connections() {
            if participants.contains(&connection.info.user_id) {
                report.record(connection, full.clone());
            } else {
                report.record(connection, notice.clone());
            }
        }

        tracing::info!(
            chat_id = %message.chat_id,
            ordinal = message.ordinal,
            sender_id = %message.sender_id,
            delivered = report.delivered,
            "消息已路由"
        );

        if let Some(key) = send_key {
            self.recent.remember(key, message.clone());
        }

        Ok(RouteOutcome {
            message,
            duplicate: false,
            report,
        })
    }

    /// 服务端寻址规则：
    /// - 带 chatId 且会话存在：发送者必须是参与者，recipientId 会被并入参与者
    /// - 带 chatId 但会话不存在：只有当 chatId 正是发送者与 recipientId 的确定性会话ID时才新建
    /// - 只带 recipientId：使用两人的确定性会话ID；会话已存在时双方都必须是参与者
    /// - 都不带：发送者最近活跃的会话，没有则拒绝
    async fn resolve(
        &self,
        registry: &ConnectionRegistry,
        sender: &ConnectionInfo,
        request: &ClientMessage,
        recipient_profile: Option<UserIdentity>,
    ) -> Result<Target, ApplicationError> {
        let recipient_id = request
            .recipient_id
            .as_deref()
            .map(UserId::parse)
            .transpose()?;
        if recipient_id.as_ref() == Some(&sender.user_id) {
            return Err(DomainError::invalid_recipient("cannot start a conversation with yourself").into());
        }

        let chat_id = match request.chat_id.as_deref() {
            Some(raw) => {
                let chat_id = ChatId::parse(raw)?;
                match self.store.participants(&chat_id).await? {
                    Some(participants) => {
                        if !participants.iter().any(|p| p.user_id == sender.user_id) {
                            return Err(DomainError::not_participant(
                                chat_id.as_str(),
                                sender.user_id.as_str(),
                            )
                            .into());
                        }
                    }
                    // 新会话不能使用客户端自选的ID，否则可以抢占他人未来的会话
                    None => match &recipient_id {
                        Some(recipient)
                            if chat_id == ChatId::for_pair(&sender.user_id, recipient) => {}
                        _ => {
                            return Err(
                                DomainError::conversation_not_found(chat_id.as_str()).into()
                            )
                        }
                    },
                }
                chat_id
            }
            None => match &recipient_id {
                Some(recipient) => {
                    let chat_id = ChatId::for_pair(&sender.user_id, recipient);
                    if let Some(participants) = self.store.participants(&chat_id).await? {
                        let joined =
                            |user_id: &UserId| participants.iter().any(|p| &p.user_id == user_id);
                        if !joined(&sender.user_id) || !joined(recipient) {
                            return Err(DomainError::not_participant(
                                chat_id.as_str(),
                                sender.user_id.as_str(),
                            )
                            .into());
                        }
                    }
                    chat_id
                }
                None => self
                    .store
                    .list_conversations_for_user(&sender.user_id)
                    .await?
                    .into_iter()
                    .next()
                    .map(|summary| summary.chat_id)
                    .ok_or(DomainError::RecipientRequired)?,
            },
        };

        let recipient = recipient_id.map(|user_id| describe(registry, user_id, recipient_profile));

        Ok(Target { chat_id, recipient })
    }
}

/// 接收者的名称和角色：先用目录查到的身份，再看在线连接，最后退回用户ID
fn describe(
    registry: &ConnectionRegistry,
    user_id: UserId,
    profile: Option<UserIdentity>,
) -> Participant {
    if let Some(identity) = profile.filter(|identity| identity.id == user_id) {
        return Participant::new(user_id, identity.display_name, identity.role);
    }
    match registry.find_user(&user_id) {
        Some(info) => Participant::new(user_id, info.display_name.clone(), info.role),
        None => {
            let name = user_id.to_string();
            Participant::new(user_id, name, ParticipantRole::User)
        }
    }
}
