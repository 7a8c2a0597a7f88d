/// Row models for the account, menu and audit stores
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// User types carried alongside identity after token validation
pub const USER_TYPE_NORMAL: i64 = 1;
pub const USER_TYPE_ADMIN: i64 = 2;

/// Account capability levels. Super admin bypasses per-user menu
/// assignment entirely.
pub const LEVEL_NORMAL_USER: i64 = 0;
pub const LEVEL_NORMAL_ADMIN: i64 = 80;
pub const LEVEL_SUPER_ADMIN: i64 = 100;

/// Credential types. Phone and email are reserved but presently disabled;
/// only account-alias credentials are issued.
pub const CREDENTIAL_ACCOUNT: i64 = 0;
#[allow(dead_code)]
pub const CREDENTIAL_PHONE: i64 = 1;
#[allow(dead_code)]
pub const CREDENTIAL_EMAIL: i64 = 2;

/// Identity record. The user ID is immutable once created; soft state is
/// stored adjacently: `blocked` gates login, `stealth` is held for
/// directory sync only and is never consulted locally.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub password: String,
    pub level: i64,
    pub operator_user_id: String,
    pub blocked: bool,
    pub stealth: bool,
    pub create_time: DateTime<Utc>,
    pub change_time: DateTime<Utc>,
}

/// Mutable display data, one-to-one with Account
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Attribute {
    pub user_id: String,
    pub account: String,
    pub nickname: String,
    pub face_url: String,
    pub gender: i64,
    pub address: String,
    pub public_key: String,
    pub create_time: DateTime<Utc>,
    pub change_time: DateTime<Utc>,
    pub change_account_time: DateTime<Utc>,
}

/// A typed login identifier bound to a user. `(type, account)` is globally
/// unique across all owners.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    #[sqlx(rename = "credential_type")]
    pub credential_type: i64,
    pub account: String,
    pub allow_change: bool,
}

/// Admin menu tree node. Child keys are formed as `parent-childSuffix`
/// with `-` as the hierarchy delimiter.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdminMenu {
    pub key: String,
    pub name: String,
    pub path: String,
    pub icon: String,
    pub sort: i64,
    pub parent: String,
    pub hidden: bool,
    pub redirect: String,
}

/// Per-admin menu assignment. Absence of a row is a valid
/// "no permissions yet" state.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AdminUserMenu {
    pub user_id: String,
    /// JSON array of menu keys
    pub menus: String,
}

impl AdminUserMenu {
    pub fn keys(&self) -> Vec<String> {
        serde_json::from_str(&self.menus).unwrap_or_default()
    }
}

/// Append-only audit record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OperationLog {
    pub operation_id: String,
    pub admin_id: String,
    pub admin_account: String,
    pub admin_name: String,
    pub module: String,
    pub operation: String,
    pub method: String,
    pub path: String,
    pub ip: String,
    pub request_data: String,
    pub create_time: i64,
}
