/// Account provisioning
///
/// Orchestrates registration: credential validation, user-ID allocation,
/// atomic local persistence, registration in the messaging directory, and
/// best-effort default-relationship seeding. Local persistence and the
/// directory call are strictly ordered; a directory failure after the local
/// commit leaves an inconsistency that is only ever repaired lazily by
/// `reconcile_unlinked` on a later attempt.

use crate::credential::{CredentialChange, CredentialStore};
use crate::db::models::{
    Account, Attribute, CREDENTIAL_ACCOUNT, USER_TYPE_ADMIN, USER_TYPE_NORMAL,
};
use crate::directory::{DirectoryClient, DirectoryUser};
use crate::error::{map_unique_violation, TalonError, TalonResult};
use crate::session::TokenSessionManager;
use chrono::Utc;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Bounded number of collision probes for generated user IDs
const ID_PROBE_BUDGET: usize = 20;

/// Candidate identity for registration
#[derive(Debug, Clone, Default)]
pub struct RegisterCandidate {
    /// Caller-supplied user ID; generated when empty
    pub user_id: Option<String>,
    pub account: String,
    pub password: String,
    pub nickname: String,
    pub face_url: String,
    pub address: String,
    pub public_key: String,
}

/// Result of a successful registration
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    pub user_id: String,
    /// Local session token, minted when auto-login was requested
    pub token: Option<String>,
    /// Directory session token, fetched when auto-login was requested
    pub directory_token: Option<String>,
}

/// Typed partial update for user info; absent fields are left untouched.
/// `account: Some("")` removes the account-alias credential.
#[derive(Debug, Clone, Default)]
pub struct UserInfoUpdate {
    pub user_id: String,
    pub account: Option<String>,
    pub nickname: Option<String>,
    pub face_url: Option<String>,
    pub gender: Option<i64>,
}

#[derive(Clone)]
pub struct AccountProvisioner {
    db: SqlitePool,
    credentials: CredentialStore,
    sessions: TokenSessionManager,
    directory: Arc<dyn DirectoryClient>,
}

impl AccountProvisioner {
    pub fn new(
        db: SqlitePool,
        credentials: CredentialStore,
        sessions: TokenSessionManager,
        directory: Arc<dyn DirectoryClient>,
    ) -> Self {
        Self {
            db,
            credentials,
            sessions,
            directory,
        }
    }

    /// Register an account with its credentials and propagate it to the
    /// messaging directory.
    ///
    /// Self-registration passes `admin_initiated: None`; admin-initiated
    /// creation carries the acting admin, recorded as the operator.
    pub async fn register(
        &self,
        candidate: RegisterCandidate,
        ip: &str,
        platform: i64,
        auto_login: bool,
        admin_initiated: Option<&str>,
    ) -> TalonResult<RegisterOutcome> {
        if candidate.account.is_empty() {
            return Err(TalonError::Args("account is empty".to_string()));
        }

        // Repair path: the alias may be held by an account that exists
        // locally but never made it into the directory. Delete it so this
        // registration can retry cleanly.
        if let Some(existing) = self.credentials.take_by_account(&candidate.account).await? {
            let in_directory = self
                .directory
                .account_check_single(&existing.user_id)
                .await?;
            if !in_directory {
                info!(
                    user_id = %existing.user_id,
                    "locally registered but absent from directory, reconciling"
                );
                self.reconcile_unlinked(&existing.user_id).await?;
            }
        }

        self.credentials
            .validate_new_identifier(CREDENTIAL_ACCOUNT, &candidate.account)
            .await?;

        let user_id = match &candidate.user_id {
            Some(user_id) if !user_id.is_empty() => {
                if self.get_account(user_id).await?.is_some() {
                    return Err(TalonError::DuplicateAccount(user_id.clone()));
                }
                user_id.clone()
            }
            _ => self.allocate_user_id().await?,
        };

        // Local persistence is a single atomic transaction; nothing
        // survives a failure here.
        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        sqlx::query(
            "INSERT INTO account
                (user_id, password, level, operator_user_id, create_time, change_time)
             VALUES (?1, ?2, 0, ?3, ?4, ?4)",
        )
        .bind(&user_id)
        .bind(password_digest(&candidate.password))
        .bind(admin_initiated.unwrap_or(""))
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, TalonError::DuplicateAccount(user_id.clone())))?;

        sqlx::query(
            "INSERT INTO attribute
                (user_id, account, nickname, face_url, address, public_key,
                 create_time, change_time, change_account_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
        )
        .bind(&user_id)
        .bind(&candidate.account)
        .bind(&candidate.nickname)
        .bind(&candidate.face_url)
        .bind(&candidate.address)
        .bind(&candidate.public_key)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO credential (user_id, credential_type, account, allow_change)
             VALUES (?1, ?2, ?3, 1)",
        )
        .bind(&user_id)
        .bind(CREDENTIAL_ACCOUNT)
        .bind(&candidate.account)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique_violation(e, TalonError::DuplicateCredential(candidate.account.clone()))
        })?;

        tx.commit().await?;

        info!(user_id = %user_id, ip = %ip, "account persisted locally");

        // Not covered by the local transaction. A failure from here on
        // leaves "local exists, directory missing"; the repair path above
        // is the only recovery.
        self.directory
            .register_user(&DirectoryUser {
                user_id: user_id.clone(),
                account: candidate.account.clone(),
                nickname: candidate.nickname.clone(),
                face_url: candidate.face_url.clone(),
                address: candidate.address.clone(),
                public_key: candidate.public_key.clone(),
                create_time: now.timestamp_millis(),
            })
            .await?;

        self.seed_defaults(&user_id).await;

        let (token, directory_token) = if auto_login {
            let token = self.sessions.create_token(&user_id, USER_TYPE_NORMAL).await?;
            let directory_token = self.directory.get_user_token(&user_id, platform).await?;
            (Some(token), Some(directory_token))
        } else {
            (None, None)
        };

        Ok(RegisterOutcome {
            user_id,
            token,
            directory_token,
        })
    }

    /// Best-effort default friend and group seeding. Failures are logged
    /// and swallowed; they must never fail the registration.
    async fn seed_defaults(&self, user_id: &str) {
        match self.default_friend_ids().await {
            Ok(friend_ids) if !friend_ids.is_empty() => {
                if let Err(e) = self.directory.import_friend(user_id, &friend_ids).await {
                    warn!(user_id = %user_id, "default friend import failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("default friend lookup failed: {}", e),
        }

        match self.default_group_ids().await {
            Ok(group_ids) if !group_ids.is_empty() => {
                if let Err(e) = self.directory.invite_to_group(user_id, &group_ids).await {
                    warn!(user_id = %user_id, "default group invite failed: {}", e);
                }
            }
            Ok(_) => {}
            Err(e) => warn!("default group lookup failed: {}", e),
        }
    }

    /// Delete the local account so registration can retry from a clean
    /// slate. Re-entrant: repeated calls on an already-clean user are
    /// no-ops.
    pub async fn reconcile_unlinked(&self, user_id: &str) -> TalonResult<()> {
        let mut tx = self.db.begin().await?;

        sqlx::query("DELETE FROM credential WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM attribute WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM account WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        self.sessions.clear(user_id).await?;
        Ok(())
    }

    /// Update profile data and the account-alias credential under the
    /// at-least-one-credential invariant. All checks run before any write.
    pub async fn update_user_info(
        &self,
        op_user_id: &str,
        op_user_type: i64,
        update: UserInfoUpdate,
    ) -> TalonResult<()> {
        if update.user_id.is_empty() {
            return Err(TalonError::Args("user id is empty".to_string()));
        }

        match op_user_type {
            USER_TYPE_NORMAL => {
                if update.user_id != op_user_id {
                    return Err(TalonError::NoPermission(
                        "only admin can update other user info".to_string(),
                    ));
                }
            }
            USER_TYPE_ADMIN => {}
            _ => return Err(TalonError::NoPermission("user type error".to_string())),
        }

        let existing = self.credentials.find_by_user(&update.user_id).await?;
        if existing.is_empty() {
            return Err(TalonError::AccountNotFound(update.user_id.clone()));
        }

        // Work out the credential delta driven by the account field:
        // a new value replaces, the same value is a no-op, an empty value
        // removes.
        let mut account_change = update.account.clone();
        let mut adds: Vec<CredentialChange> = Vec::new();
        let mut removes: Vec<CredentialChange> = Vec::new();

        if let Some(new_account) = &account_change {
            let current = existing
                .iter()
                .find(|c| c.credential_type == CREDENTIAL_ACCOUNT);
            match current {
                Some(current) if current.account == *new_account => {
                    account_change = None;
                }
                Some(current) => {
                    removes.push(CredentialChange {
                        credential_type: CREDENTIAL_ACCOUNT,
                        account: current.account.clone(),
                    });
                    if !new_account.is_empty() {
                        adds.push(CredentialChange {
                            credential_type: CREDENTIAL_ACCOUNT,
                            account: new_account.clone(),
                        });
                    }
                }
                None => {
                    if !new_account.is_empty() {
                        adds.push(CredentialChange {
                            credential_type: CREDENTIAL_ACCOUNT,
                            account: new_account.clone(),
                        });
                    }
                }
            }
        }

        CredentialStore::check_invariant(&existing, &adds, &removes)?;

        if let Some(new_account) = &account_change {
            if !new_account.is_empty() {
                self.credentials
                    .validate_new_identifier(CREDENTIAL_ACCOUNT, new_account)
                    .await?;
            }
        }

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        if let Some(nickname) = &update.nickname {
            sqlx::query("UPDATE attribute SET nickname = ?1, change_time = ?2 WHERE user_id = ?3")
                .bind(nickname)
                .bind(now)
                .bind(&update.user_id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(face_url) = &update.face_url {
            sqlx::query("UPDATE attribute SET face_url = ?1, change_time = ?2 WHERE user_id = ?3")
                .bind(face_url)
                .bind(now)
                .bind(&update.user_id)
                .execute(&mut *tx)
                .await?;
        }
        if let Some(gender) = update.gender {
            sqlx::query("UPDATE attribute SET gender = ?1, change_time = ?2 WHERE user_id = ?3")
                .bind(gender)
                .bind(now)
                .bind(&update.user_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(new_account) = &account_change {
            sqlx::query(
                "DELETE FROM credential WHERE user_id = ?1 AND credential_type = ?2",
            )
            .bind(&update.user_id)
            .bind(CREDENTIAL_ACCOUNT)
            .execute(&mut *tx)
            .await?;

            if !new_account.is_empty() {
                sqlx::query(
                    "INSERT INTO credential (user_id, credential_type, account, allow_change)
                     VALUES (?1, ?2, ?3, 1)",
                )
                .bind(&update.user_id)
                .bind(CREDENTIAL_ACCOUNT)
                .bind(new_account)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    map_unique_violation(e, TalonError::DuplicateCredential(new_account.clone()))
                })?;
            }

            sqlx::query(
                "UPDATE attribute SET account = ?1, change_account_time = ?2, change_time = ?2
                 WHERE user_id = ?3",
            )
            .bind(new_account)
            .bind(now)
            .bind(&update.user_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Verify an account credential and mint local plus directory tokens
    pub async fn login(
        &self,
        account: &str,
        password: &str,
        platform: i64,
    ) -> TalonResult<(String, String, String)> {
        let credential = self
            .credentials
            .take_by_account(account)
            .await?
            .ok_or_else(|| TalonError::AccountNotFound(account.to_string()))?;

        let record = self
            .get_account(&credential.user_id)
            .await?
            .ok_or_else(|| TalonError::AccountNotFound(credential.user_id.clone()))?;

        if record.password != password_digest(password) {
            return Err(TalonError::Args("password is wrong".to_string()));
        }
        if record.blocked {
            return Err(TalonError::NoPermission("account is blocked".to_string()));
        }

        let token = self
            .sessions
            .create_token(&record.user_id, USER_TYPE_NORMAL)
            .await?;
        let directory_token = self
            .directory
            .get_user_token(&record.user_id, platform)
            .await?;

        Ok((record.user_id, token, directory_token))
    }

    /// Look up whether an account alias is registered locally
    pub async fn check_user_exist(&self, account: &str) -> TalonResult<Option<String>> {
        Ok(self
            .credentials
            .take_by_account(account)
            .await?
            .map(|c| c.user_id))
    }

    /// Delete accounts locally and clear their session-token maps
    pub async fn delete_accounts(&self, user_ids: &[String]) -> TalonResult<()> {
        for user_id in user_ids {
            self.reconcile_unlinked(user_id).await?;
        }
        Ok(())
    }

    pub async fn get_account(&self, user_id: &str) -> TalonResult<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            "SELECT user_id, password, level, operator_user_id, blocked, stealth,
                    create_time, change_time
             FROM account WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn get_attribute(&self, user_id: &str) -> TalonResult<Option<Attribute>> {
        let row = sqlx::query_as::<_, Attribute>(
            "SELECT user_id, account, nickname, face_url, gender, address, public_key,
                    create_time, change_time, change_account_time
             FROM attribute WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    /// Allocate a fresh numeric user ID with a bounded probe budget
    async fn allocate_user_id(&self) -> TalonResult<String> {
        for _ in 0..ID_PROBE_BUDGET {
            let user_id = gen_user_id();
            if self.get_account(&user_id).await?.is_none() {
                return Ok(user_id);
            }
        }
        Err(TalonError::IdAllocationExhausted)
    }

    async fn default_friend_ids(&self) -> TalonResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT user_id FROM default_friend")
            .fetch_all(&self.db)
            .await?;
        Ok(ids)
    }

    async fn default_group_ids(&self) -> TalonResult<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar("SELECT group_id FROM default_group")
            .fetch_all(&self.db)
            .await?;
        Ok(ids)
    }
}

/// 10-digit numeric user ID, first digit non-zero
pub fn gen_user_id() -> String {
    let mut rng = rand::thread_rng();
    let mut id = String::with_capacity(10);
    id.push(char::from(b'1' + rng.gen_range(0..9)));
    for _ in 0..9 {
        id.push(char::from(b'0' + rng.gen_range(0..10)));
    }
    id
}

/// Stored password form: hex-encoded SHA-256 of the presented secret
pub fn password_digest(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
