use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod application;
mod config;
mod domain;
mod infrastructure;
mod web;

use crate::application::BankService;
use crate::config::AppConfig;
use crate::infrastructure::{AccountRepository, Argon2PasswordScheme, InMemoryEventStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();
    info!("Starting bank ledger service on port {}", config.port);

    let event_store = Arc::new(InMemoryEventStore::new());
    let repository = Arc::new(AccountRepository::with_cache_ttl(
        event_store,
        config.cache_ttl,
    ));
    let service = Arc::new(
        BankService::new(repository, Arc::new(Argon2PasswordScheme))
            .with_retry_policy(config.max_commit_retries, config.retry_backoff),
    );

    let router = web::create_router(service);
    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router).await?;

    Ok(())
}
