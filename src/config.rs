/// Configuration management for the Talon admin backend
use crate::error::{TalonError, TalonResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub directory: DirectoryConfig,
    pub auth: AuthConfig,
    pub sms: SmsConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: PathBuf,
    pub account_db: PathBuf,
}

/// Redis cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Redis connection URL (e.g., "redis://localhost:6379")
    pub redis_url: String,
    /// Key prefix for all cache entries
    pub key_prefix: String,
}

/// Messaging directory service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory API (e.g., "http://localhost:10002")
    pub api_url: String,
    /// Admin identity used for directory-scoped calls
    pub admin_user_id: String,
    /// Directory admin token cache lifetime in seconds
    pub admin_token_ttl: u64,
    /// Per-request timeout in seconds
    pub request_timeout: u64,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub token_secret: String,
    /// Token lifetime in seconds, used for both the signed token expiry
    /// and the cache-level TTL of the per-user token map.
    pub token_expire: u64,
}

/// SMS provider configuration.
///
/// Closed set of providers; at most one may be enabled at a time, checked
/// by `ServerConfig::validate` before anything is persisted or used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum SmsProvider {
    Ali {
        enabled: bool,
        access_key_id: String,
        access_key_secret: String,
        sign_name: String,
        template_code: String,
    },
    Tencent {
        enabled: bool,
        secret_id: String,
        secret_key: String,
        sdk_app_id: String,
        sign_name: String,
        template_id: String,
    },
}

impl SmsProvider {
    pub fn enabled(&self) -> bool {
        match self {
            SmsProvider::Ali { enabled, .. } => *enabled,
            SmsProvider::Tencent { enabled, .. } => *enabled,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmsConfig {
    pub providers: Vec<SmsProvider>,
}

impl SmsConfig {
    /// Reject configurations where more than one provider is enabled.
    pub fn validate(&self) -> TalonResult<()> {
        let enabled = self.providers.iter().filter(|p| p.enabled()).count();
        if enabled > 1 {
            return Err(TalonError::Args(
                "only one SMS provider may be enabled".to_string(),
            ));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Load from environment variables
    pub fn from_env() -> TalonResult<Self> {
        let data_directory: PathBuf = env::var("TALON_DATA_DIR")
            .unwrap_or_else(|_| "./data".to_string())
            .into();

        let sms = match env::var("TALON_SMS_CONFIG") {
            Ok(raw) => serde_json::from_str(&raw)
                .map_err(|e| TalonError::Args(format!("invalid TALON_SMS_CONFIG: {}", e)))?,
            Err(_) => SmsConfig::default(),
        };

        Ok(Self {
            service: ServiceConfig {
                hostname: env::var("TALON_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("TALON_PORT")
                    .unwrap_or_else(|_| "10009".to_string())
                    .parse()
                    .map_err(|_| TalonError::Args("TALON_PORT must be a number".to_string()))?,
            },
            storage: StorageConfig {
                account_db: data_directory.join("accounts.db"),
                data_directory,
            },
            cache: CacheConfig {
                redis_url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                key_prefix: env::var("TALON_CACHE_PREFIX")
                    .unwrap_or_else(|_| "talon:".to_string()),
            },
            directory: DirectoryConfig {
                api_url: env::var("TALON_DIRECTORY_URL")
                    .unwrap_or_else(|_| "http://localhost:10002".to_string()),
                admin_user_id: env::var("TALON_DIRECTORY_ADMIN")
                    .unwrap_or_else(|_| "imAdmin".to_string()),
                admin_token_ttl: env_u64("TALON_DIRECTORY_ADMIN_TOKEN_TTL", 3600),
                request_timeout: env_u64("TALON_DIRECTORY_TIMEOUT", 10),
            },
            auth: AuthConfig {
                token_secret: env::var("TALON_TOKEN_SECRET").unwrap_or_default(),
                token_expire: env_u64("TALON_TOKEN_EXPIRE", 90 * 24 * 3600),
            },
            sms,
        })
    }

    /// Validate configuration before use
    pub fn validate(&self) -> TalonResult<()> {
        if self.auth.token_secret.is_empty() {
            return Err(TalonError::Args(
                "TALON_TOKEN_SECRET must be set".to_string(),
            ));
        }
        if self.auth.token_expire == 0 {
            return Err(TalonError::Args(
                "token expiry must be greater than zero".to_string(),
            ));
        }
        self.sms.validate()?;
        Ok(())
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
