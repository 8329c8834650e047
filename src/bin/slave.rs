//! Judge slave: compiles and runs submissions handed over by the master.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use gavel::config::SlaveConfig;
use gavel::judger::Judger;
use gavel::rpc::RpcServer;
use gavel::runner::ProcessRunner;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("gavel=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = SlaveConfig::from_env()?;
    tokio::fs::create_dir_all(&config.cache_dir)
        .await
        .with_context(|| format!("Failed to create cache dir {}", config.cache_dir.display()))?;
    info!("Using cache directory {}", config.cache_dir.display());

    let judger = Arc::new(Judger::new(
        Arc::new(ProcessRunner::default()),
        config.cache_dir.clone(),
    ));
    let server = RpcServer::bind(&config.listen_addr, judger).await?;

    tokio::select! {
        result = server.serve() => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down slave");
            Ok(())
        }
    }
}
