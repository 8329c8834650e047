//! Judge master: admits submissions, dispatches them to slaves and serves
//! the scoreboard over HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use gavel::api::{self, AppState};
use gavel::catalog::Catalog;
use gavel::config::MasterConfig;
use gavel::contest_access::ContestGate;
use gavel::core::utils::unix_now;
use gavel::languages::LanguageCatalog;
use gavel::notify::{LogNotifier, Notifier, RedisNotifier};
use gavel::scoreboard::Scoreboard;
use gavel::slave_manager::{RpcProbe, SlaveManager};
use gavel::storage::{MemoryStore, Storage};
use gavel::submission::{Collaborators, SubmissionProcessor};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("gavel=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = MasterConfig::from_env()?;

    let catalog = Catalog::load(&config.catalog_path)?;
    info!("Loaded catalog from {}", config.catalog_path.display());
    let storage: Arc<dyn Storage> = Arc::new(MemoryStore::from_catalog(catalog));

    let notifier: Arc<dyn Notifier> = match &config.redis_url {
        Some(url) => Arc::new(RedisNotifier::connect(url).await?),
        None => {
            warn!("REDIS_URL not set, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let languages = Arc::new(LanguageCatalog::new(storage.clone()));
    languages.refresh().await?;

    let scoreboard = Arc::new(Scoreboard::new(storage.clone()));
    let slaves = Arc::new(SlaveManager::new(storage.clone(), Arc::new(RpcProbe)));
    match slaves.refresh_slaves().await {
        Ok(active) => info!("{} slaves active at startup", active),
        Err(e) => warn!("Initial slave refresh failed: {}", e),
    }

    let processor = Arc::new(SubmissionProcessor::start(
        Collaborators {
            storage: storage.clone(),
            languages,
            access: Arc::new(ContestGate::new(storage.clone(), scoreboard.clone())),
            slaves: slaves.clone(),
            scoreboard: scoreboard.clone(),
            notifier,
        },
        config.grading_workers,
        config.grading_queue_capacity,
    ));

    spawn_slave_refresh(slaves.clone(), config.slave_refresh_interval);
    spawn_unfreeze_check(scoreboard.clone(), config.unfreeze_check_interval);

    let app = api::router(AppState {
        storage,
        processor,
        scoreboard,
        slaves,
    });
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Master listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutting down master");
        })
        .await?;
    Ok(())
}

fn spawn_slave_refresh(slaves: Arc<SlaveManager>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await;
        loop {
            interval.tick().await;
            match slaves.refresh_slaves().await {
                Ok(active) => info!("Slave health check: {} active", active),
                Err(e) => error!("Slave health check failed: {}", e),
            }
        }
    });
}

fn spawn_unfreeze_check(scoreboard: Arc<Scoreboard>, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            match scoreboard.unfreeze_due(unix_now()).await {
                Ok(contests) => {
                    for contest_id in contests {
                        info!("Contest {} reached its unfreeze time", contest_id);
                    }
                }
                Err(e) => error!("Unfreeze check failed: {}", e),
            }
        }
    });
}
