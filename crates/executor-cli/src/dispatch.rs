use anyhow::Context;
use executor_core::{Config, ExecutorError, Registry};
use executor_manager::{Manager, StaticTopology};
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Every executor kind this binary ships with.
pub fn default_registry() -> Result<Registry, ExecutorError> {
    let mut registry = Registry::new();
    executor_k8s::register(&mut registry)?;
    executor_container::register(&mut registry)?;
    executor_synthetic::register(&mut registry)?;
    Ok(registry)
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::load_default(),
    }
}

/// A running manager over the config's static topology.
pub struct Session {
    pub manager: Arc<Manager>,
    shutdown: CancellationToken,
    sync_loop: JoinHandle<()>,
}

impl Session {
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let topology = Arc::new(StaticTopology::new(config.clusters.clone()));
        let manager = Arc::new(Manager::new(
            default_registry()?,
            topology,
            config.manager.clone(),
        ));
        let shutdown = CancellationToken::new();
        let sync_loop = manager
            .initialize(&config.executors, shutdown.clone())
            .await
            .context("failed to initialize executor manager")?;
        Ok(Self {
            manager,
            shutdown,
            sync_loop,
        })
    }

    pub async fn close(self) {
        self.shutdown.cancel();
        if let Err(e) = self.sync_loop.await {
            tracing::warn!("executor manager sync loop ended abnormally: {}", e);
        }
    }
}
