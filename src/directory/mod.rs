/// Messaging directory service client
///
/// The directory owns the canonical user/friend/group graph and issues its
/// own session tokens. It is a remote collaborator with its own failure
/// modes; everything here surfaces as an opaque `Directory` error wrapped
/// with context.

pub mod http;

pub use http::HttpDirectoryClient;

use crate::error::TalonResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identity payload pushed to the directory on registration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryUser {
    #[serde(rename = "userID")]
    pub user_id: String,
    pub account: String,
    pub nickname: String,
    #[serde(rename = "faceURL")]
    pub face_url: String,
    pub address: String,
    pub public_key: String,
    pub create_time: i64,
}

/// Directory API surface consumed by this backend.
///
/// All calls are made under an admin-scoped bearer token obtained via a
/// cached admin-token call inside the implementation.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Admin-scoped bearer token, cached until near expiry
    async fn get_admin_token(&self) -> TalonResult<String>;

    /// Register an identity in the directory
    async fn register_user(&self, user: &DirectoryUser) -> TalonResult<()>;

    /// Seed default friends for a newly registered user
    async fn import_friend(&self, user_id: &str, friend_ids: &[String]) -> TalonResult<()>;

    /// Invite a newly registered user into default groups
    async fn invite_to_group(&self, user_id: &str, group_ids: &[String]) -> TalonResult<()>;

    /// Obtain a directory session token for a user on a platform
    async fn get_user_token(&self, user_id: &str, platform: i64) -> TalonResult<String>;

    /// Kick all of a user's directory sessions
    async fn force_logout(&self, user_id: &str) -> TalonResult<()>;

    /// Whether the directory knows this user ID
    async fn account_check_single(&self, user_id: &str) -> TalonResult<bool>;
}
