//! 通过外部用户服务查询身份
//!
//! `GET {base_url}/users/{id}`，响应体为 `{"data": {"_id", "fullName", "role"}}`；404 视为用户不存在。
//! 用户ID作为单个路径段转义后拼接，返回的 `_id` 必须与查询的ID一致。

use std::time::Duration;

use async_trait::async_trait;
use domain::{
    normalize_display_name, DirectoryError, ParticipantRole, UserDirectory, UserId, UserIdentity,
};
use reqwest::{StatusCode, Url};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct UserEnvelope {
    data: UserPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserPayload {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl TryFrom<UserPayload> for UserIdentity {
    type Error = DirectoryError;

    fn try_from(value: UserPayload) -> Result<Self, Self::Error> {
        Ok(UserIdentity {
            id: UserId::parse(value.id).map_err(|err| DirectoryError::InvalidPayload(err.to_string()))?,
            display_name: normalize_display_name(value.full_name.as_deref()),
            role: value
                .role
                .as_deref()
                .map(ParticipantRole::parse_lenient)
                .unwrap_or_default(),
        })
    }
}

pub struct HttpUserDirectory {
    client: reqwest::Client,
    base_url: Url,
    service_token: Option<String>,
}

impl HttpUserDirectory {
    pub fn new(
        base_url: impl AsRef<str>,
        service_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DirectoryError> {
        let base_url = Url::parse(base_url.as_ref())
            .map_err(|err| DirectoryError::InvalidUrl(err.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUrl(base_url.to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            base_url,
            service_token,
        })
    }

    /// `{base_url}/users/{id}`，`id` 中的 `/`、`?` 等字符会被百分号转义
    fn user_url(&self, user_id: &UserId) -> Result<Url, DirectoryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DirectoryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push("users")
            .push(user_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn lookup(&self, user_id: &UserId) -> Result<Option<UserIdentity>, DirectoryError> {
        // `.` 和 `..` 无法作为路径段转义，不可能是合法的用户ID
        if matches!(user_id.as_str(), "." | "..") {
            return Ok(None);
        }
        let mut request = self.client.get(self.user_url(user_id)?);
        if let Some(token) = &self.service_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|err| DirectoryError::Unavailable(err.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                tracing::debug!(user_id = %user_id, "用户服务中不存在该用户");
                Ok(None)
            }
            status if status.is_success() => {
                let envelope: UserEnvelope = response
                    .json()
                    .await
                    .map_err(|err| DirectoryError::InvalidPayload(err.to_string()))?;
                let identity = UserIdentity::try_from(envelope.data)?;
                if &identity.id != user_id {
                    return Err(DirectoryError::InvalidPayload(format!(
                        "requested user {user_id} but received {}",
                        identity.id
                    )));
                }
                Ok(Some(identity))
            }
            status => Err(DirectoryError::Unavailable(format!(
                "user service responded with {status}"
            ))),
        }
    }
}
