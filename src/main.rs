/// Talon - administrative account backend for a chat platform
///
/// Owns account provisioning, credential management, multi-device session
/// tokens and admin menu permissions, and keeps the messaging directory
/// service in sync with the local account store.

mod account;
mod admin;
mod api;
mod audit;
mod auth;
mod cache;
mod config;
mod context;
mod credential;
mod db;
mod directory;
mod error;
mod server;
mod session;

use config::ServerConfig;
use context::AppContext;
use error::TalonResult;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> TalonResult<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "talon_admin=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    let ctx = AppContext::new(config).await?;

    server::serve(ctx).await?;

    Ok(())
}
