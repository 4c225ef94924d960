use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// 统一的时间戳类型。
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// 用户标识最大长度
const MAX_ID_LEN: usize = 128;

/// 会话标识最大长度，需容纳两个转义后的用户标识
const MAX_CHAT_ID_LEN: usize = 1024;

fn parse_identifier(field: &str, value: String, max_len: usize) -> Result<String, DomainError> {
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Err(DomainError::validation_error(field, "cannot be empty"));
    }
    if value.chars().count() > max_len {
        return Err(DomainError::validation_error(field, "too long"));
    }
    Ok(value)
}

/// 用户唯一标识（由外部用户服务签发）。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        parse_identifier("userId", value.into(), MAX_ID_LEN).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 会话唯一标识。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(String);

impl ChatId {
    pub fn parse(value: impl Into<String>) -> Result<Self, DomainError> {
        parse_identifier("chatId", value.into(), MAX_CHAT_ID_LEN).map(Self)
    }

    /// 两个用户之间的确定性会话ID：排序后用 `_` 连接，与发送方向无关。
    ///
    /// 用户ID中的 `%` 和 `_` 会被转义，保证不同的用户对不会得到相同的ID。
    pub fn for_pair(a: &UserId, b: &UserId) -> Self {
        let (first, second) = if a <= b { (a, b) } else { (b, a) };
        Self(format!(
            "{}_{}",
            escape_pair_part(first.as_str()),
            escape_pair_part(second.as_str())
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_pair_part(id: &str) -> String {
    let mut escaped = String::with_capacity(id.len());
    for c in id.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '_' => escaped.push_str("%5F"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// 连接标识，进程生命周期内唯一。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 平台内的用户角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Customer,
    CarProvider,
    Admin,
    #[default]
    User,
}

impl ParticipantRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::CarProvider => "car_provider",
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    /// 宽松解析：未知角色按普通用户处理
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim() {
            "customer" => Self::Customer,
            "car_provider" => Self::CarProvider,
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }
}

impl fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 显示名称为空时的占位名
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// 规范化显示名称：去除首尾空白，空值回退为 `Anonymous`。
pub fn normalize_display_name(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(name) if !name.is_empty() => name.chars().take(MAX_ID_LEN).collect(),
        _ => ANONYMOUS_NAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_chat_id_is_symmetric() {
        let alice = UserId::parse("alice").unwrap();
        let bob = UserId::parse("bob").unwrap();

        assert_eq!(ChatId::for_pair(&alice, &bob), ChatId::for_pair(&bob, &alice));
        assert_eq!(ChatId::for_pair(&alice, &bob).as_str(), "alice_bob");
    }

    #[test]
    fn pair_chat_ids_do_not_collide_on_separator() {
        let id = |v: &str| UserId::parse(v).unwrap();

        let left = ChatId::for_pair(&id("a"), &id("b_c"));
        let right = ChatId::for_pair(&id("a_b"), &id("c"));
        assert_ne!(left, right);
        assert_eq!(left.as_str(), "a_b%5Fc");
        assert_eq!(right.as_str(), "a%5Fb_c");

        let long = id(&"_".repeat(MAX_ID_LEN));
        assert!(ChatId::parse(ChatId::for_pair(&long, &id("%")).as_str()).is_ok());
    }

    #[test]
    fn identifiers_are_trimmed_and_validated() {
        assert_eq!(UserId::parse("  u1 ").unwrap().as_str(), "u1");
        assert!(UserId::parse("   ").is_err());
        assert!(UserId::parse("x".repeat(MAX_ID_LEN + 1)).is_err());
        assert!(ChatId::parse("x".repeat(MAX_CHAT_ID_LEN + 1)).is_err());
    }

    #[test]
    fn role_parsing_falls_back_to_user() {
        assert_eq!(ParticipantRole::parse_lenient("car_provider"), ParticipantRole::CarProvider);
        assert_eq!(ParticipantRole::parse_lenient("superuser"), ParticipantRole::User);
    }

    #[test]
    fn blank_display_name_becomes_anonymous() {
        assert_eq!(normalize_display_name(None), ANONYMOUS_NAME);
        assert_eq!(normalize_display_name(Some("  ")), ANONYMOUS_NAME);
        assert_eq!(normalize_display_name(Some(" Dana ")), "Dana");
    }
}
