//! Cofound API Server
//!
//! Main entry point for the Cofound backend service.

use std::sync::Arc;

use anyhow::Context;
use sea_orm_migration::MigratorTrait;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cofound_api::{AppState, create_router};
use cofound_core::events::{LoggingNotifier, spawn_audit_logger, spawn_dispatcher};
use cofound_core::{EventBus, SystemClock};
use cofound_db::{connect_with_pool, migration::Migrator};
use cofound_shared::{AppConfig, JwtConfig, JwtService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cofound=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    let db = connect_with_pool(
        &config.database.url,
        config.database.max_connections,
        config.database.min_connections,
    )
    .await?;
    info!("Connected to database");

    Migrator::up(&db, None).await?;
    info!("Migrations applied");

    let jwt_config = JwtConfig {
        secret: config.jwt.secret.clone(),
        access_token_expires_minutes: i64::try_from(config.jwt.access_token_expiry_secs / 60)
            .context("access token expiry out of range")?,
    };
    let jwt_service = JwtService::new(jwt_config);

    // Subscribers must exist before the first publish.
    let bus = EventBus::new(config.workflow.notification_buffer);
    let audit = spawn_audit_logger(&bus);
    let notifier = spawn_dispatcher(&bus, Arc::new(LoggingNotifier));

    let state = AppState {
        db: Arc::new(db),
        jwt_service: Arc::new(jwt_service),
        clock: Arc::new(SystemClock),
        bus,
        default_nudge_cooldown_hours: config.workflow.default_nudge_cooldown_hours,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    audit.abort();
    notifier.abort();
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
