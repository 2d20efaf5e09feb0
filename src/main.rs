use std::net::SocketAddr;
use std::sync::Arc;

use stacklevest::core::auth::{AuthApiState, AuthService, JwtService, auth_api_router};
use stacklevest::core::config::Config;
use stacklevest::core::db::JsonStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if exists)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load application config from environment variables
    let config = Config::from_env()?;

    // Log config status (without revealing secrets)
    tracing::info!(
        "Config loaded: port={}, db_path={}, bcrypt_cost={}, session_reaper={}",
        config.port,
        config.db_path.display(),
        config.bcrypt_cost,
        config.has_session_reaper()
    );

    // A malformed store file stops startup here
    let store = Arc::new(JsonStore::open(config.db_path.clone()).await?);

    let auth_service = AuthService::from_store(
        Arc::clone(&store),
        JwtService::new(config.jwt.clone()),
        config.bcrypt_cost,
    );

    let _reaper = config
        .session_reaper_interval
        .map(|interval| auth_service.sessions().clone().spawn_reaper(interval));

    let app = auth_api_router(
        AuthApiState::new(auth_service).with_secure_cookies(config.secure_cookies),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
