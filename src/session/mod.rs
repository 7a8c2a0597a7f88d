/// Multi-device session-token lifecycle
///
/// Each user owns one cache entry mapping token string -> state. Logins add
/// tokens to the map instead of replacing it, so concurrent sessions across
/// devices coexist. A force-logout kicks every tracked token but keeps the
/// entries, so a late request with a stale token gets a precise "expired"
/// answer instead of "unknown token".

use crate::cache::CacheClient;
use crate::error::{TalonError, TalonResult};
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

const TOKEN_CATEGORY: &str = "tokens:";

/// Token states held in the cache map
pub const TOKEN_STATE_NORMAL: i64 = 0;
pub const TOKEN_STATE_KICKED: i64 = 1;

/// Outcome of evaluating a presented token against a user's token map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Ok,
    Expired,
    Unknown,
}

/// Per-user token map storage; the cache layer is an opaque collaborator
#[async_trait]
pub trait TokenMapStore: Send + Sync {
    /// The whole token map for a user; empty map when absent
    async fn get_all(&self, user_id: &str) -> TalonResult<HashMap<String, i64>>;

    /// Add one token, creating the map with a TTL if missing
    /// (add-if-absent-else-merge, first writer wins the TTL)
    async fn add(&self, user_id: &str, token: &str, state: i64, ttl_secs: u64) -> TalonResult<()>;

    /// Overwrite token states, keeping an existing TTL; a map the write
    /// recreated after expiry gets `ttl_secs`
    async fn set_states(
        &self,
        user_id: &str,
        states: &HashMap<String, i64>,
        ttl_secs: u64,
    ) -> TalonResult<()>;

    /// Delete the whole map
    async fn clear(&self, user_id: &str) -> TalonResult<()>;
}

#[async_trait]
impl TokenMapStore for CacheClient {
    async fn get_all(&self, user_id: &str) -> TalonResult<HashMap<String, i64>> {
        self.hash_get_all(TOKEN_CATEGORY, user_id).await
    }

    async fn add(&self, user_id: &str, token: &str, state: i64, ttl_secs: u64) -> TalonResult<()> {
        self.hash_add(TOKEN_CATEGORY, user_id, token, state, ttl_secs)
            .await
    }

    async fn set_states(
        &self,
        user_id: &str,
        states: &HashMap<String, i64>,
        ttl_secs: u64,
    ) -> TalonResult<()> {
        self.hash_set_fields(TOKEN_CATEGORY, user_id, states, ttl_secs)
            .await
    }

    async fn clear(&self, user_id: &str) -> TalonResult<()> {
        self.delete(TOKEN_CATEGORY, user_id).await
    }
}

/// Signed token claims
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User ID
    pub sub: String,
    /// User type (normal or admin), the token's issuing-path type
    pub user_type: i64,
    pub exp: i64,
    pub iat: i64,
}

/// Session token manager
#[derive(Clone)]
pub struct TokenSessionManager {
    store: Arc<dyn TokenMapStore>,
    secret: String,
    expire_secs: u64,
}

impl TokenSessionManager {
    pub fn new(store: Arc<dyn TokenMapStore>, secret: String, expire_secs: u64) -> Self {
        Self {
            store,
            secret,
            expire_secs,
        }
    }

    /// Mint a signed token for a user and add it to their token map
    pub async fn create_token(&self, user_id: &str, user_type: i64) -> TalonResult<String> {
        let now = Utc::now().timestamp();
        let claims = TokenClaims {
            sub: user_id.to_string(),
            user_type,
            exp: now + self.expire_secs as i64,
            iat: now,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| TalonError::Internal(format!("Token signing failed: {}", e)))?;

        self.issue(user_id, &token, self.expire_secs).await?;
        Ok(token)
    }

    /// Verify a token signature and recover `(user_id, user_type)`.
    ///
    /// Signature or expiry failures surface as `TokenExpired`; this is the
    /// token-parsing step applied before the map lookup.
    pub fn parse_token(&self, token: &str) -> TalonResult<(String, i64)> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 300;

        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!("Token verification failed: {}", e);
            TalonError::TokenExpired
        })?;

        Ok((data.claims.sub, data.claims.user_type))
    }

    /// Add a token to the user's map with the cache-level TTL on the whole
    /// entry. A concurrent writer merges rather than overwriting.
    pub async fn issue(&self, user_id: &str, token: &str, ttl_secs: u64) -> TalonResult<()> {
        self.store
            .add(user_id, token, TOKEN_STATE_NORMAL, ttl_secs)
            .await
    }

    /// Validate a presented token against the user's token map
    pub async fn validate(&self, user_id: &str, token: &str) -> TalonResult<()> {
        let tokens = self.store.get_all(user_id).await?;
        match evaluate_tokens(&tokens, token) {
            TokenStatus::Ok => Ok(()),
            TokenStatus::Expired => Err(TalonError::TokenExpired),
            TokenStatus::Unknown => Err(TalonError::TokenUnknown),
        }
    }

    /// Force logout: transition every tracked token to Kicked, preserving
    /// the entries. Tokens issued after the revoke are unaffected.
    pub async fn revoke(&self, user_id: &str) -> TalonResult<()> {
        let tokens = self.store.get_all(user_id).await?;
        if tokens.is_empty() {
            return Ok(());
        }

        let kicked: HashMap<String, i64> = tokens
            .into_keys()
            .map(|token| (token, TOKEN_STATE_KICKED))
            .collect();

        self.store
            .set_states(user_id, &kicked, self.expire_secs)
            .await
    }

    /// Unconditional deletion of the user's token map (account deletion)
    pub async fn clear(&self, user_id: &str) -> TalonResult<()> {
        self.store.clear(user_id).await
    }
}

/// Map a token against a user's token map.
///
/// Absent or empty map, token absent from a non-empty map, and kicked
/// tokens all report Expired. Only an unrecognized state value reports
/// Unknown, a defensive case for forward-incompatible states.
pub fn evaluate_tokens(tokens: &HashMap<String, i64>, token: &str) -> TokenStatus {
    if tokens.is_empty() {
        return TokenStatus::Expired;
    }
    match tokens.get(token) {
        Some(&TOKEN_STATE_NORMAL) => TokenStatus::Ok,
        Some(&TOKEN_STATE_KICKED) => TokenStatus::Expired,
        Some(_) => TokenStatus::Unknown,
        None => TokenStatus::Expired,
    }
}

#[cfg(test)]
pub mod memory {
    //! In-memory token map store for tests
    use super::*;
    use std::sync::Mutex;

    /// One user's map plus its lifetime, mirroring the cache's
    /// expire-only-if-unset behavior
    #[derive(Default)]
    pub struct MemoryTokenMap {
        pub tokens: HashMap<String, i64>,
        pub ttl_secs: Option<u64>,
    }

    #[derive(Default)]
    pub struct MemoryTokenStore {
        maps: Mutex<HashMap<String, MemoryTokenMap>>,
    }

    impl MemoryTokenStore {
        pub fn ttl_of(&self, user_id: &str) -> Option<u64> {
            self.maps
                .lock()
                .unwrap()
                .get(user_id)
                .and_then(|m| m.ttl_secs)
        }

        /// Simulate the cache dropping an expired entry
        pub fn expire_now(&self, user_id: &str) {
            self.maps.lock().unwrap().remove(user_id);
        }
    }

    #[async_trait]
    impl TokenMapStore for MemoryTokenStore {
        async fn get_all(&self, user_id: &str) -> TalonResult<HashMap<String, i64>> {
            Ok(self
                .maps
                .lock()
                .unwrap()
                .get(user_id)
                .map(|m| m.tokens.clone())
                .unwrap_or_default())
        }

        async fn add(
            &self,
            user_id: &str,
            token: &str,
            state: i64,
            ttl_secs: u64,
        ) -> TalonResult<()> {
            let mut maps = self.maps.lock().unwrap();
            let map = maps.entry(user_id.to_string()).or_default();
            map.tokens.insert(token.to_string(), state);
            map.ttl_secs.get_or_insert(ttl_secs);
            Ok(())
        }

        async fn set_states(
            &self,
            user_id: &str,
            states: &HashMap<String, i64>,
            ttl_secs: u64,
        ) -> TalonResult<()> {
            let mut maps = self.maps.lock().unwrap();
            let map = maps.entry(user_id.to_string()).or_default();
            for (token, state) in states {
                map.tokens.insert(token.clone(), *state);
            }
            map.ttl_secs.get_or_insert(ttl_secs);
            Ok(())
        }

        async fn clear(&self, user_id: &str) -> TalonResult<()> {
            self.maps.lock().unwrap().remove(user_id);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryTokenStore;
    use super::*;

    fn map(entries: &[(&str, i64)]) -> HashMap<String, i64> {
        entries.iter().map(|(t, s)| (t.to_string(), *s)).collect()
    }

    fn manager() -> TokenSessionManager {
        manager_with_store().0
    }

    fn manager_with_store() -> (TokenSessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::default());
        let sessions =
            TokenSessionManager::new(store.clone(), "test-secret".to_string(), 3600);
        (sessions, store)
    }

    #[test]
    fn empty_map_is_expired() {
        assert_eq!(evaluate_tokens(&HashMap::new(), "t1"), TokenStatus::Expired);
    }

    #[test]
    fn normal_token_is_ok() {
        let tokens = map(&[("t1", TOKEN_STATE_NORMAL)]);
        assert_eq!(evaluate_tokens(&tokens, "t1"), TokenStatus::Ok);
    }

    #[test]
    fn kicked_token_is_expired_not_unknown() {
        let tokens = map(&[("t1", TOKEN_STATE_KICKED)]);
        assert_eq!(evaluate_tokens(&tokens, "t1"), TokenStatus::Expired);
    }

    #[test]
    fn absent_token_in_nonempty_map_is_expired() {
        let tokens = map(&[("t1", TOKEN_STATE_NORMAL)]);
        assert_eq!(evaluate_tokens(&tokens, "t2"), TokenStatus::Expired);
    }

    #[test]
    fn unrecognized_state_is_unknown() {
        let tokens = map(&[("t1", 42)]);
        assert_eq!(evaluate_tokens(&tokens, "t1"), TokenStatus::Unknown);
    }

    #[tokio::test]
    async fn concurrent_logins_coexist() {
        let sessions = manager();
        sessions.issue("u1", "t1", 60).await.unwrap();
        sessions.issue("u1", "t2", 60).await.unwrap();

        assert!(sessions.validate("u1", "t1").await.is_ok());
        assert!(sessions.validate("u1", "t2").await.is_ok());
    }

    #[tokio::test]
    async fn revoke_kicks_all_but_not_future_issuance() {
        let sessions = manager();
        sessions.issue("u1", "t1", 60).await.unwrap();
        sessions.issue("u1", "t2", 60).await.unwrap();

        sessions.revoke("u1").await.unwrap();
        assert!(matches!(
            sessions.validate("u1", "t1").await,
            Err(TalonError::TokenExpired)
        ));
        assert!(matches!(
            sessions.validate("u1", "t2").await,
            Err(TalonError::TokenExpired)
        ));

        sessions.issue("u1", "t3", 60).await.unwrap();
        assert!(sessions.validate("u1", "t3").await.is_ok());
        // earlier tokens stay kicked
        assert!(sessions.validate("u1", "t1").await.is_err());
    }

    #[tokio::test]
    async fn first_login_wins_the_map_ttl() {
        let (sessions, store) = manager_with_store();
        sessions.issue("u1", "t1", 60).await.unwrap();
        sessions.issue("u1", "t2", 900).await.unwrap();

        assert_eq!(store.ttl_of("u1"), Some(60));
    }

    #[tokio::test]
    async fn revoke_keeps_the_existing_ttl() {
        let (sessions, store) = manager_with_store();
        sessions.issue("u1", "t1", 60).await.unwrap();
        sessions.revoke("u1").await.unwrap();

        assert_eq!(store.ttl_of("u1"), Some(60));
        assert!(matches!(
            sessions.validate("u1", "t1").await,
            Err(TalonError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn map_recreated_after_expiry_regains_a_ttl() {
        let (sessions, store) = manager_with_store();
        sessions.issue("u1", "t1", 60).await.unwrap();
        store.expire_now("u1");

        // a later login recreates the map; it must not live forever
        sessions.issue("u1", "t2", 60).await.unwrap();
        assert_eq!(store.ttl_of("u1"), Some(60));

        // a state write racing expiry recreates the map too
        store.expire_now("u1");
        let kicked = map(&[("t2", TOKEN_STATE_KICKED)]);
        store.set_states("u1", &kicked, 60).await.unwrap();
        assert_eq!(store.ttl_of("u1"), Some(60));
    }

    #[tokio::test]
    async fn revoke_on_absent_map_is_a_noop() {
        let sessions = manager();
        assert!(sessions.revoke("nobody").await.is_ok());
    }

    #[tokio::test]
    async fn clear_removes_the_map() {
        let sessions = manager();
        sessions.issue("u1", "t1", 60).await.unwrap();
        sessions.clear("u1").await.unwrap();
        assert!(matches!(
            sessions.validate("u1", "t1").await,
            Err(TalonError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn minted_token_parses_back_to_identity() {
        let sessions = manager();
        let token = sessions
            .create_token("1234567890", crate::db::models::USER_TYPE_ADMIN)
            .await
            .unwrap();

        let (user_id, user_type) = sessions.parse_token(&token).unwrap();
        assert_eq!(user_id, "1234567890");
        assert_eq!(user_type, crate::db::models::USER_TYPE_ADMIN);
        assert!(sessions.validate("1234567890", &token).await.is_ok());
    }

    #[test]
    fn garbage_token_fails_parse_as_expired() {
        let sessions = manager();
        assert!(matches!(
            sessions.parse_token("not-a-token"),
            Err(TalonError::TokenExpired)
        ));
    }
}
