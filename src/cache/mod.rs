/// Redis-based cache layer
///
/// Backs the per-user session-token maps and the cached directory admin
/// token. Token maps are stored as hashes (token string -> state) with a
/// TTL on the whole entry.

use crate::config::CacheConfig;
use crate::error::{TalonError, TalonResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Redis cache client
#[derive(Clone)]
pub struct CacheClient {
    connection: ConnectionManager,
    config: CacheConfig,
}

impl CacheClient {
    /// Create a new cache client
    pub async fn new(config: CacheConfig) -> TalonResult<Self> {
        info!("Connecting to Redis at {}", config.redis_url);

        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            TalonError::Cache(format!("Redis client creation failed: {}", e))
        })?;

        let connection = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            TalonError::Cache(format!("Redis connection failed: {}", e))
        })?;

        info!("Redis connection established");

        Ok(Self { connection, config })
    }

    /// Build a cache key with prefix
    fn build_key(&self, category: &str, key: &str) -> String {
        format!("{}{}{}", self.config.key_prefix, category, key)
    }

    /// Read an entire hash entry as field -> integer state
    pub async fn hash_get_all(
        &self,
        category: &str,
        key: &str,
    ) -> TalonResult<HashMap<String, i64>> {
        let cache_key = self.build_key(category, key);
        debug!("Cache HGETALL: {}", cache_key);

        let mut conn = self.connection.clone();
        let raw: HashMap<String, String> = conn.hgetall(&cache_key).await.map_err(|e| {
            warn!("Redis HGETALL failed for {}: {}", cache_key, e);
            TalonError::Cache(format!("Cache hash read failed: {}", e))
        })?;

        let mut map = HashMap::with_capacity(raw.len());
        for (field, value) in raw {
            let state = value
                .parse::<i64>()
                .map_err(|_| TalonError::Cache(format!("Non-numeric token state: {}", value)))?;
            map.insert(field, state);
        }
        Ok(map)
    }

    /// Add a field to a hash entry, guaranteeing the entry carries a TTL.
    ///
    /// First writer wins the TTL; a concurrent second writer merges its field
    /// into the existing entry without disturbing other fields, so one
    /// device's login never evicts another's session. The TTL is applied with
    /// `EXPIRE ... NX` after every write, so a key recreated by a write that
    /// raced its own expiry still regains a lifetime (Redis >= 7.0).
    pub async fn hash_add(
        &self,
        category: &str,
        key: &str,
        field: &str,
        value: i64,
        ttl_secs: u64,
    ) -> TalonResult<()> {
        let cache_key = self.build_key(category, key);
        debug!("Cache HSET: {} {} (TTL: {}s)", cache_key, field, ttl_secs);

        let mut conn = self.connection.clone();
        let _: () = conn
            .hset(&cache_key, field, value.to_string())
            .await
            .map_err(|e| {
                warn!("Redis HSET failed for {}: {}", cache_key, e);
                TalonError::Cache(format!("Cache hash write failed: {}", e))
            })?;

        self.expire_if_unset(&mut conn, &cache_key, ttl_secs).await
    }

    /// Overwrite several fields of a hash entry. The existing TTL is kept;
    /// an entry the write recreated after expiry gets `ttl_secs` instead of
    /// living forever.
    pub async fn hash_set_fields(
        &self,
        category: &str,
        key: &str,
        fields: &HashMap<String, i64>,
        ttl_secs: u64,
    ) -> TalonResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let cache_key = self.build_key(category, key);
        debug!("Cache HSET multi: {} ({} fields)", cache_key, fields.len());

        let pairs: Vec<(String, String)> = fields
            .iter()
            .map(|(field, value)| (field.clone(), value.to_string()))
            .collect();

        let mut conn = self.connection.clone();
        let _: () = conn.hset_multiple(&cache_key, &pairs).await.map_err(|e| {
            warn!("Redis HSET failed for {}: {}", cache_key, e);
            TalonError::Cache(format!("Cache hash write failed: {}", e))
        })?;

        self.expire_if_unset(&mut conn, &cache_key, ttl_secs).await
    }

    /// `EXPIRE key ttl NX`: set a lifetime only when the key has none
    async fn expire_if_unset(
        &self,
        conn: &mut ConnectionManager,
        cache_key: &str,
        ttl_secs: u64,
    ) -> TalonResult<()> {
        let _: i64 = redis::cmd("EXPIRE")
            .arg(cache_key)
            .arg(ttl_secs as i64)
            .arg("NX")
            .query_async(conn)
            .await
            .map_err(|e| {
                warn!("Redis EXPIRE failed for {}: {}", cache_key, e);
                TalonError::Cache(format!("Cache expire failed: {}", e))
            })?;

        Ok(())
    }

    /// Delete a cache entry
    pub async fn delete(&self, category: &str, key: &str) -> TalonResult<()> {
        let cache_key = self.build_key(category, key);
        debug!("Cache DELETE: {}", cache_key);

        let mut conn = self.connection.clone();
        let _: () = conn.del(&cache_key).await.map_err(|e| {
            warn!("Redis DELETE failed for {}: {}", cache_key, e);
            TalonError::Cache(format!("Cache delete failed: {}", e))
        })?;

        Ok(())
    }
}
