use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waitlist_core::kernel::{RedisJobBus, RedisPubSubBus, ServerKernel};
use waitlist_core::party::{PartyStore, PgPartyStore};
use waitlist_core::server::{build_app, spawn_workers};
use waitlist_core::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,waitlist_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let redis_url = config.redis_url();
    let job_bus = Arc::new(
        RedisJobBus::connect(&redis_url)
            .await
            .context("failed to connect job bus to redis")?,
    );
    let pubsub = Arc::new(
        RedisPubSubBus::connect(&redis_url)
            .await
            .context("failed to connect pub/sub bus to redis")?,
    );

    let config = Arc::new(config);
    let kernel = Arc::new(ServerKernel::new(pool.clone(), job_bus, pubsub, config));
    let store: Arc<dyn PartyStore> = Arc::new(PgPartyStore::new(pool));

    let shutdown = CancellationToken::new();
    spawn_workers(kernel.clone(), store.clone(), shutdown.clone());

    let app = build_app(kernel.clone(), store);

    let addr = format!("0.0.0.0:{}", kernel.config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    tracing::info!(%addr, "waitlist server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    Ok(())
}
