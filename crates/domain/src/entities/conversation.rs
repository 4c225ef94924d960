//! 会话实体定义

use serde::{Deserialize, Serialize};

use crate::value_objects::{ChatId, ParticipantRole, Timestamp, UserId};

/// 会话参与者
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub user_id: UserId,
    pub name: String,
    pub role: ParticipantRole,
}

impl Participant {
    pub fn new(user_id: UserId, name: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            user_id,
            name: name.into(),
            role,
        }
    }
}

/// 会话摘要，按最近活动排序返回给重连客户端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub chat_id: ChatId,
    pub participants: Vec<Participant>,
    pub last_message: String,
    pub last_activity: Timestamp,
    pub message_count: u64,
}

impl ConversationSummary {
    pub fn has_participant(&self, user_id: &UserId) -> bool {
        self.participants.iter().any(|p| &p.user_id == user_id)
    }

    /// 除指定用户外的其他参与者
    pub fn peers_of<'a>(&'a self, user_id: &'a UserId) -> impl Iterator<Item = &'a Participant> {
        self.participants.iter().filter(move |p| &p.user_id != user_id)
    }
}

/// 合并参与者：已存在的用户更新名称与角色，新用户追加在末尾。
pub fn merge_participant(participants: &mut Vec<Participant>, candidate: &Participant) {
    match participants
        .iter_mut()
        .find(|p| p.user_id == candidate.user_id)
    {
        Some(existing) => {
            existing.name = candidate.name.clone();
            existing.role = candidate.role;
        }
        None => participants.push(candidate.clone()),
    }
}

/// 按最近活动倒序排序，活动时间相同时按会话ID排序
pub fn sort_by_recent_activity(summaries: &mut [ConversationSummary]) {
    summaries.sort_by(|a, b| {
        b.last_activity
            .cmp(&a.last_activity)
            .then_with(|| a.chat_id.cmp(&b.chat_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participant(id: &str, name: &str) -> Participant {
        Participant::new(UserId::parse(id).unwrap(), name, ParticipantRole::Customer)
    }

    #[test]
    fn merge_updates_existing_and_appends_new() {
        let mut list = vec![participant("a", "Ann")];
        merge_participant(&mut list, &participant("a", "Annie"));
        merge_participant(&mut list, &participant("b", "Ben"));

        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Annie");
        assert_eq!(list[1].name, "Ben");
    }

    #[test]
    fn peers_exclude_requesting_user() {
        let summary = ConversationSummary {
            chat_id: ChatId::parse("a_b").unwrap(),
            participants: vec![participant("a", "Ann"), participant("b", "Ben")],
            last_message: "hi".into(),
            last_activity: chrono::Utc::now(),
            message_count: 1,
        };
        let me = UserId::parse("a").unwrap();
        let peers: Vec<_> = summary.peers_of(&me).collect();

        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].name, "Ben");
        assert!(summary.has_participant(&me));
    }
}
