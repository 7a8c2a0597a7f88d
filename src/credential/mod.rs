/// Credential invariants
///
/// Every account must hold at least one credential at all times. The checks
/// here are evaluated before any persistent mutation; the actual writes are
/// performed inside the caller's transaction.

use crate::db::models::{Credential, CREDENTIAL_ACCOUNT};
use crate::error::{TalonError, TalonResult};
use sqlx::SqlitePool;

/// A proposed credential mutation, matched against existing rows by
/// `(type, identifier)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialChange {
    pub credential_type: i64,
    pub account: String,
}

#[derive(Clone)]
pub struct CredentialStore {
    db: SqlitePool,
}

impl CredentialStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Pure invariant check: existing - matching removals + additions must
    /// stay positive, otherwise the update would strand the account with no
    /// way to log in.
    pub fn check_invariant(
        existing: &[Credential],
        adds: &[CredentialChange],
        removes: &[CredentialChange],
    ) -> TalonResult<()> {
        let removed = removes
            .iter()
            .filter(|r| {
                existing
                    .iter()
                    .any(|c| c.credential_type == r.credential_type && c.account == r.account)
            })
            .count();

        let remaining = existing.len() as i64 - removed as i64 + adds.len() as i64;
        if remaining <= 0 {
            return Err(TalonError::CredentialInvariant(
                "a login method must exist".to_string(),
            ));
        }
        Ok(())
    }

    /// Validate a new identifier before it is written: account aliases must
    /// be alphanumeric, and `(type, value)` must not be held by any owner.
    pub async fn validate_new_identifier(
        &self,
        credential_type: i64,
        value: &str,
    ) -> TalonResult<()> {
        if credential_type == CREDENTIAL_ACCOUNT
            && !value.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(TalonError::Args(
                "account must be alphanumeric".to_string(),
            ));
        }

        let existing = self.take_by_identifier(credential_type, value).await?;
        if existing.is_some() {
            return Err(TalonError::DuplicateCredential(value.to_string()));
        }
        Ok(())
    }

    /// All credentials held by a user
    pub async fn find_by_user(&self, user_id: &str) -> TalonResult<Vec<Credential>> {
        let rows = sqlx::query_as::<_, Credential>(
            "SELECT user_id, credential_type, account, allow_change
             FROM credential WHERE user_id = ?1",
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Look up a credential by its identifier, any owner
    pub async fn take_by_identifier(
        &self,
        credential_type: i64,
        value: &str,
    ) -> TalonResult<Option<Credential>> {
        let row = sqlx::query_as::<_, Credential>(
            "SELECT user_id, credential_type, account, allow_change
             FROM credential WHERE credential_type = ?1 AND account = ?2",
        )
        .bind(credential_type)
        .bind(value)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }

    /// Look up an account-alias credential by value
    pub async fn take_by_account(&self, account: &str) -> TalonResult<Option<Credential>> {
        self.take_by_identifier(CREDENTIAL_ACCOUNT, account).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cred(credential_type: i64, account: &str) -> Credential {
        Credential {
            user_id: "1234567890".to_string(),
            credential_type,
            account: account.to_string(),
            allow_change: true,
        }
    }

    fn change(credential_type: i64, account: &str) -> CredentialChange {
        CredentialChange {
            credential_type,
            account: account.to_string(),
        }
    }

    #[test]
    fn removing_last_credential_is_rejected() {
        let existing = vec![cred(CREDENTIAL_ACCOUNT, "alice1")];
        let removes = vec![change(CREDENTIAL_ACCOUNT, "alice1")];
        let err = CredentialStore::check_invariant(&existing, &[], &removes).unwrap_err();
        assert!(matches!(err, TalonError::CredentialInvariant(_)));
    }

    #[test]
    fn replacing_a_credential_is_allowed() {
        let existing = vec![cred(CREDENTIAL_ACCOUNT, "alice1")];
        let adds = vec![change(CREDENTIAL_ACCOUNT, "alice2")];
        let removes = vec![change(CREDENTIAL_ACCOUNT, "alice1")];
        assert!(CredentialStore::check_invariant(&existing, &adds, &removes).is_ok());
    }

    #[test]
    fn removal_of_unknown_credential_does_not_count() {
        // A removal that matches nothing must not reduce the count.
        let existing = vec![cred(CREDENTIAL_ACCOUNT, "alice1")];
        let removes = vec![change(CREDENTIAL_ACCOUNT, "someoneelse")];
        assert!(CredentialStore::check_invariant(&existing, &[], &removes).is_ok());
    }

    #[test]
    fn empty_existing_with_add_is_allowed() {
        let adds = vec![change(CREDENTIAL_ACCOUNT, "alice1")];
        assert!(CredentialStore::check_invariant(&[], &adds, &[]).is_ok());
    }

    #[test]
    fn empty_existing_without_add_is_rejected() {
        assert!(CredentialStore::check_invariant(&[], &[], &[]).is_err());
    }

    async fn create_test_store() -> CredentialStore {
        let db = SqlitePool::connect(":memory:").await.unwrap();

        sqlx::query(
            r#"
            CREATE TABLE credential (
                user_id TEXT NOT NULL,
                credential_type INTEGER NOT NULL,
                account TEXT NOT NULL,
                allow_change INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (user_id, credential_type)
            )
            "#,
        )
        .execute(&db)
        .await
        .unwrap();

        sqlx::query(
            "CREATE UNIQUE INDEX idx_credential_type_account
             ON credential(credential_type, account)",
        )
        .execute(&db)
        .await
        .unwrap();

        CredentialStore::new(db)
    }

    #[tokio::test]
    async fn non_alphanumeric_alias_is_rejected() {
        let store = create_test_store().await;
        let err = store
            .validate_new_identifier(CREDENTIAL_ACCOUNT, "alice-1")
            .await
            .unwrap_err();
        assert!(matches!(err, TalonError::Args(_)));
    }

    #[tokio::test]
    async fn taken_identifier_is_rejected_for_any_owner() {
        let store = create_test_store().await;

        sqlx::query(
            "INSERT INTO credential (user_id, credential_type, account) VALUES (?1, ?2, ?3)",
        )
        .bind("1111111111")
        .bind(CREDENTIAL_ACCOUNT)
        .bind("alice1")
        .execute(&store.db)
        .await
        .unwrap();

        let err = store
            .validate_new_identifier(CREDENTIAL_ACCOUNT, "alice1")
            .await
            .unwrap_err();
        assert!(matches!(err, TalonError::DuplicateCredential(_)));
    }

    #[tokio::test]
    async fn fresh_identifier_is_accepted() {
        let store = create_test_store().await;
        assert!(store
            .validate_new_identifier(CREDENTIAL_ACCOUNT, "bob42")
            .await
            .is_ok());
    }
}
