/// Application context and dependency injection
use crate::{
    account::AccountProvisioner,
    admin::MenuPermissionResolver,
    audit::OperationAuditSink,
    cache::CacheClient,
    config::ServerConfig,
    credential::CredentialStore,
    db,
    directory::{DirectoryClient, HttpDirectoryClient},
    error::TalonResult,
    session::TokenSessionManager,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub sessions: TokenSessionManager,
    pub credentials: CredentialStore,
    pub provisioner: AccountProvisioner,
    pub menus: MenuPermissionResolver,
    pub directory: Arc<dyn DirectoryClient>,
    pub audit: OperationAuditSink,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> TalonResult<Self> {
        config.validate()?;

        let pool = db::create_pool(&config.storage.account_db, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        let cache = CacheClient::new(config.cache.clone()).await?;
        let sessions = TokenSessionManager::new(
            Arc::new(cache),
            config.auth.token_secret.clone(),
            config.auth.token_expire,
        );

        let credentials = CredentialStore::new(pool.clone());
        let directory: Arc<dyn DirectoryClient> =
            Arc::new(HttpDirectoryClient::new(config.directory.clone())?);

        let provisioner = AccountProvisioner::new(
            pool.clone(),
            credentials.clone(),
            sessions.clone(),
            directory.clone(),
        );
        let menus = MenuPermissionResolver::new(pool.clone());
        let audit = OperationAuditSink::spawn(pool.clone());

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            sessions,
            credentials,
            provisioner,
            menus,
            directory,
            audit,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> String {
        format!(
            "http://{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
