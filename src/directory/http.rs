/// HTTP implementation of the directory client
use crate::config::DirectoryConfig;
use crate::directory::{DirectoryClient, DirectoryUser};
use crate::error::{TalonError, TalonResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Directory API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(rename = "errCode")]
    err_code: i64,
    #[serde(rename = "errMsg", default)]
    err_msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct AccountCheckData {
    results: Vec<AccountCheckResult>,
}

#[derive(Debug, Deserialize)]
struct AccountCheckResult {
    #[serde(rename = "userID")]
    user_id: String,
    #[serde(rename = "accountStatus")]
    account_status: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Empty {}

/// Directory client over HTTP with a cached admin token
pub struct HttpDirectoryClient {
    http: reqwest::Client,
    config: DirectoryConfig,
    admin_token: RwLock<Option<(String, Instant)>>,
}

impl HttpDirectoryClient {
    pub fn new(config: DirectoryConfig) -> TalonResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("Talon-Admin/0.1")
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .map_err(|e| TalonError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            admin_token: RwLock::new(None),
        })
    }

    /// POST a directory API call and unwrap the response envelope
    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &B,
    ) -> TalonResult<Option<T>> {
        let url = format!("{}{}", self.config.api_url, path);
        debug!("Directory call: {}", url);

        let mut request = self.http.post(&url).json(body);
        if let Some(token) = token {
            request = request.header("token", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TalonError::Directory(format!("{}: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TalonError::Directory(format!("{}: HTTP {}", path, status)));
        }

        let envelope: ApiResponse<T> = response
            .json()
            .await
            .map_err(|e| TalonError::Directory(format!("{}: invalid response: {}", path, e)))?;

        if envelope.err_code != 0 {
            return Err(TalonError::Directory(format!(
                "{}: errCode {}: {}",
                path, envelope.err_code, envelope.err_msg
            )));
        }

        Ok(envelope.data)
    }

    /// Fetch a fresh admin token from the directory
    async fn fetch_admin_token(&self) -> TalonResult<String> {
        let data: Option<TokenData> = self
            .call(
                "/auth/get_admin_token",
                None,
                &json!({ "userID": self.config.admin_user_id }),
            )
            .await?;

        data.map(|d| d.token)
            .ok_or_else(|| TalonError::Directory("admin token response missing data".to_string()))
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectoryClient {
    async fn get_admin_token(&self) -> TalonResult<String> {
        {
            let cached = self.admin_token.read().await;
            if let Some((token, fetched_at)) = cached.as_ref() {
                if fetched_at.elapsed() < Duration::from_secs(self.config.admin_token_ttl) {
                    return Ok(token.clone());
                }
            }
        }

        let token = self.fetch_admin_token().await?;
        *self.admin_token.write().await = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    async fn register_user(&self, user: &DirectoryUser) -> TalonResult<()> {
        let token = self.get_admin_token().await?;
        let _: Option<Empty> = self
            .call(
                "/user/user_register",
                Some(&token),
                &json!({ "users": [user] }),
            )
            .await?;
        Ok(())
    }

    async fn import_friend(&self, user_id: &str, friend_ids: &[String]) -> TalonResult<()> {
        if friend_ids.is_empty() {
            return Ok(());
        }
        let token = self.get_admin_token().await?;
        let _: Option<Empty> = self
            .call(
                "/friend/import_friend",
                Some(&token),
                &json!({ "ownerUserID": user_id, "friendUserIDs": friend_ids }),
            )
            .await?;
        Ok(())
    }

    async fn invite_to_group(&self, user_id: &str, group_ids: &[String]) -> TalonResult<()> {
        let token = self.get_admin_token().await?;
        for group_id in group_ids {
            let _: Option<Empty> = self
                .call(
                    "/group/invite_user_to_group",
                    Some(&token),
                    &json!({
                        "groupID": group_id,
                        "invitedUserIDs": [user_id],
                        "reason": "register"
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn get_user_token(&self, user_id: &str, platform: i64) -> TalonResult<String> {
        let token = self.get_admin_token().await?;
        let data: Option<TokenData> = self
            .call(
                "/auth/get_user_token",
                Some(&token),
                &json!({ "userID": user_id, "platformID": platform }),
            )
            .await?;

        data.map(|d| d.token)
            .ok_or_else(|| TalonError::Directory("user token response missing data".to_string()))
    }

    async fn force_logout(&self, user_id: &str) -> TalonResult<()> {
        let token = self.get_admin_token().await?;
        let _: Option<Empty> = self
            .call(
                "/auth/force_logout",
                Some(&token),
                &json!({ "userID": user_id }),
            )
            .await?;
        Ok(())
    }

    async fn account_check_single(&self, user_id: &str) -> TalonResult<bool> {
        let token = self.get_admin_token().await?;
        let data: Option<AccountCheckData> = self
            .call(
                "/user/account_check",
                Some(&token),
                &json!({ "checkUserIDs": [user_id] }),
            )
            .await?;

        let data =
            data.ok_or_else(|| TalonError::Directory("account check missing data".to_string()))?;

        let registered = data
            .results
            .iter()
            .any(|r| r.user_id == user_id && r.account_status == "registered");
        Ok(registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_nonzero_code_is_an_error() {
        let raw = r#"{"errCode": 1004, "errMsg": "record not found", "data": null}"#;
        let envelope: ApiResponse<TokenData> = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.err_code, 1004);
        assert!(envelope.data.is_none());
    }

    #[test]
    fn account_check_parses_registered_status() {
        let raw = r#"{"errCode":0,"errMsg":"","data":{"results":[
            {"userID":"1234567890","accountStatus":"registered"}]}}"#;
        let envelope: ApiResponse<AccountCheckData> = serde_json::from_str(raw).unwrap();
        let data = envelope.data.unwrap();
        assert_eq!(data.results[0].account_status, "registered");
    }

    #[test]
    fn directory_user_serializes_with_wire_names() {
        let user = DirectoryUser {
            user_id: "1234567890".into(),
            account: "alice1".into(),
            nickname: "Alice".into(),
            face_url: "".into(),
            address: "".into(),
            public_key: "".into(),
            create_time: 1700000000000,
        };
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("userID").is_some());
        assert!(value.get("faceURL").is_some());
    }
}
