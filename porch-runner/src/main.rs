use anyhow::Result;
use std::sync::Arc;

use porch_api::ApiState;
use porch_badges::BadgeEngine;
use porch_core::db::run_migrations;
use porch_core::{AppContext, Config};
use porch_notify::{LocalPresence, Notifier, Presence};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Porch social server");

    let config = Config::from_env();
    run_migrations(&config.database)?;

    let ctx = AppContext::new(config).await?;
    tracing::info!("Application context initialized");

    let presence = Arc::new(LocalPresence::new());
    let notifier = Arc::new(Notifier::new(
        ctx.clone(),
        presence.clone() as Arc<dyn Presence>,
    ));
    let badges = Arc::new(BadgeEngine::new(ctx.clone(), notifier.clone()));

    let poller_ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = porch_outbox::run(poller_ctx, badges).await {
            tracing::error!("Outbox poller error: {}", e);
        }
    });

    tracing::info!("Starting API server");
    let state = ApiState::new(ctx, presence, notifier);
    porch_api::run(state).await?;

    Ok(())
}
