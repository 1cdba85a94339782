// REST collaborators: send-message (echo path), friends (name cache),
// unread count (reconciler baseline), mark-as-read. All calls run on the
// actor's runtime and report back as internal events.

use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::ChatMessage;

use super::decode::WireMessage;

#[derive(Clone)]
pub(super) struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiEnvelope<T> {
    code: i32,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self) -> Result<Option<T>, ApiError> {
        if self.code != 200 {
            return Err(ApiError::Server {
                code: self.code,
                message: self.message.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(self.data)
    }

    fn require_data(self) -> Result<T, ApiError> {
        self.into_data()?.ok_or(ApiError::MissingData)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FriendEntry {
    pub(super) user_id: String,
    pub(super) username: String,
    #[serde(default)]
    pub(super) nickname: Option<String>,
}

impl FriendEntry {
    /// Display name preference: non-blank nickname, else username.
    pub(super) fn display_name(&self) -> String {
        match self.nickname.as_deref() {
            Some(nick) if !nick.trim().is_empty() => nick.to_string(),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UserInfo {
    #[serde(default)]
    pub(super) user_id: Option<String>,
    #[serde(default)]
    pub(super) username: Option<String>,
}

impl ApiClient {
    pub(super) fn new(base_url: String, token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<ApiEnvelope<T>, ApiError> {
        Ok(self
            .http
            .get(self.url(path))
            .bearer_auth(&self.token)
            .send()
            .await?
            .json()
            .await?)
    }

    pub(super) async fn send_message(
        &self,
        receiver_id: Option<String>,
        group_id: Option<i64>,
        content: String,
    ) -> Result<ChatMessage, ApiError> {
        let body = json!({
            "receiverId": receiver_id.unwrap_or_default(),
            "groupId": group_id,
            "content": content,
        });
        let envelope: ApiEnvelope<WireMessage> = self
            .http
            .post(self.url("messages"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;
        Ok(envelope.require_data()?.into())
    }

    pub(super) async fn get_friends(&self) -> Result<Vec<FriendEntry>, ApiError> {
        let envelope: ApiEnvelope<Vec<FriendEntry>> = self.get_json("friendships").await?;
        Ok(envelope.into_data()?.unwrap_or_default())
    }

    pub(super) async fn get_unread_count(&self) -> Result<i64, ApiError> {
        let envelope: ApiEnvelope<i64> = self.get_json("messages/unread/count").await?;
        Ok(envelope.into_data()?.unwrap_or(0))
    }

    pub(super) async fn get_user_info(&self) -> Result<UserInfo, ApiError> {
        let envelope: ApiEnvelope<UserInfo> = self.get_json("user/info").await?;
        envelope.require_data()
    }

    pub(super) async fn mark_read(&self, sender_id: &str) -> Result<(), ApiError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .put(self.url(&format!("messages/read/{sender_id}")))
            .bearer_auth(&self.token)
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data().map(|_| ())
    }

    pub(super) async fn mark_group_read(
        &self,
        group_id: i64,
        last_msg_id: i64,
    ) -> Result<(), ApiError> {
        let envelope: ApiEnvelope<serde_json::Value> = self
            .http
            .put(self.url("messages/group/read"))
            .bearer_auth(&self.token)
            .query(&[
                ("groupId", group_id.to_string()),
                ("lastMsgId", last_msg_id.to_string()),
            ])
            .send()
            .await?
            .json()
            .await?;
        envelope.into_data().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_rejects_non_200_codes() {
        let envelope: ApiEnvelope<i64> =
            serde_json::from_str(r#"{"code":401,"message":"expired token"}"#).unwrap();
        match envelope.into_data() {
            Err(ApiError::Server { code, message }) => {
                assert_eq!(code, 401);
                assert_eq!(message, "expired token");
            }
            other => panic!("expected server error, got {other:?}"),
        }
    }

    #[test]
    fn envelope_allows_missing_data_on_success() {
        let envelope: ApiEnvelope<i64> = serde_json::from_str(r#"{"code":200}"#).unwrap();
        assert_eq!(envelope.into_data().unwrap(), None);
    }

    #[test]
    fn friend_display_name_prefers_non_blank_nickname() {
        let with_nick: FriendEntry =
            serde_json::from_str(r#"{"userId":"u1","username":"li","nickname":"Xiao Li"}"#)
                .unwrap();
        assert_eq!(with_nick.display_name(), "Xiao Li");

        let blank_nick: FriendEntry =
            serde_json::from_str(r#"{"userId":"u1","username":"li","nickname":"  "}"#).unwrap();
        assert_eq!(blank_nick.display_name(), "li");

        let no_nick: FriendEntry =
            serde_json::from_str(r#"{"userId":"u1","username":"li"}"#).unwrap();
        assert_eq!(no_nick.display_name(), "li");
    }
}
