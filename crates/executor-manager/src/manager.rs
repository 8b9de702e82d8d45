use crate::pool::WorkerPool;
use executor_core::cluster::{Cluster, ClusterAction, ClusterEvent, TopologyProvider};
use executor_core::config::{ExecutorConfig, ManagerConfig};
use executor_core::{Executor, ExecutorError, Kind, Name, Options, Registry, CONNECT_TIMEOUT_OPTION};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Default)]
struct ManagerState {
    executors: HashMap<Name, Arc<dyn Executor>>,
    kinds: HashMap<Name, Kind>,
    /// Bumped on every cluster delete. Builds started under an older epoch
    /// must not be installed.
    epochs: HashMap<String, u64>,
}

impl ManagerState {
    fn install(&mut self, name: Name, kind: Kind, executor: Arc<dyn Executor>) {
        self.kinds.insert(name.clone(), kind);
        self.executors.insert(name, executor);
    }

    fn epoch(&self, cluster_name: &str) -> u64 {
        self.epochs.get(cluster_name).copied().unwrap_or_default()
    }
}

/// One constructor run, finished outside the lock.
struct Built {
    name: Name,
    kind: Kind,
    cluster: String,
    epoch: u64,
    result: Result<Arc<dyn Executor>, ExecutorError>,
}

/// Owns every executor instance. Cluster-kind executors are provisioned per
/// cluster, lazily on lookup and in bulk from topology events.
pub struct Manager {
    registry: Registry,
    topology: Arc<dyn TopologyProvider>,
    config: ManagerConfig,
    pool: WorkerPool,
    state: RwLock<ManagerState>,
}

impl Manager {
    pub fn new(registry: Registry, topology: Arc<dyn TopologyProvider>, config: ManagerConfig) -> Self {
        let pool = WorkerPool::new(config.pool_size);
        Self {
            registry,
            topology,
            config,
            pool,
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Builds the statically configured executors, then starts the topology
    /// sync loop. Cluster kinds are skipped here; the loop provisions them.
    pub async fn initialize(
        self: &Arc<Self>,
        configs: &[ExecutorConfig],
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<()>, ExecutorError> {
        for cfg in configs {
            let kind = Kind::new(cfg.kind.as_str())?;
            let name = Name::new(cfg.name.as_str())?;
            if kind.is_cluster_kind() {
                debug!("executor {} of kind {} deferred until its cluster is known", name, kind);
                continue;
            }
            let create = self
                .registry
                .get(&kind)
                .ok_or_else(|| ExecutorError::NotFound(format!("executor kind ({}) not registered", kind)))?;
            let executor = create(name.clone(), cfg.options.clone()).await?;
            self.state.write().install(name.clone(), kind.clone(), executor);
            info!("executor created, kind: {}, name: {}", kind, name);
        }

        let refresh = self.topology.register_refresh_event();
        let events = self.topology.register_cluster_event();
        let manager = Arc::clone(self);
        Ok(tokio::spawn(async move {
            manager
                .listen_and_patch_k8s_executors(refresh, events, shutdown)
                .await
        }))
    }

    /// Runs one full rebuild, then services both topology channels until
    /// `shutdown` fires or both channels close.
    async fn listen_and_patch_k8s_executors(
        &self,
        mut refresh: mpsc::Receiver<()>,
        mut events: mpsc::Receiver<ClusterEvent>,
        shutdown: CancellationToken,
    ) {
        self.rebuild_all().await;

        let mut refresh_open = true;
        let mut events_open = true;
        while refresh_open || events_open {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("executor manager sync loop stopped");
                    return;
                }
                msg = refresh.recv(), if refresh_open => match msg {
                    Some(()) => {
                        self.rebuild_all().await;
                    }
                    None => refresh_open = false,
                },
                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_cluster_event(event).await,
                    None => events_open = false,
                },
            }
        }
        warn!("topology channels closed, executor manager sync loop exits");
    }

    /// Read-through lookup. A miss on a cluster-kind name provisions that
    /// cluster's executor from the current topology.
    pub async fn get(&self, name: &Name) -> Result<Arc<dyn Executor>, ExecutorError> {
        let cached = self.state.read().executors.get(name).cloned();
        if let Some(executor) = cached {
            return Ok(executor);
        }

        let cluster_kinds = self.registry.cluster_kinds();
        let kind = Kind::infer_from_name(name, &cluster_kinds)
            .ok_or_else(|| ExecutorError::NotFound(name.to_string()))?;
        let cluster_name = kind.cluster_name_of(name)?;
        let epoch = self.state.read().epoch(&cluster_name);
        let cluster = self
            .topology
            .list_all_clusters()
            .await?
            .into_iter()
            .find(|c| c.name == cluster_name && c.cluster_type.is_k8s_family())
            .ok_or_else(|| {
                ExecutorError::NotFound(format!("{} (no such cluster: {})", name, cluster_name))
            })?;
        let create = self
            .registry
            .get(&kind)
            .ok_or_else(|| ExecutorError::NotFound(name.to_string()))?;

        let executor = create(name.clone(), self.cluster_options(&cluster)).await?;
        info!("executor created on demand, kind: {}, name: {}", kind, name);

        let mut state = self.state.write();
        if state.epoch(&cluster_name) != epoch {
            warn!("cluster {} removed while creating executor {}, drop it", cluster_name, name);
            return Err(ExecutorError::NotFound(format!(
                "{} (cluster {} removed)",
                name, cluster_name
            )));
        }
        let executor = Arc::clone(state.executors.entry(name.clone()).or_insert(executor));
        state.kinds.insert(name.clone(), kind);
        Ok(executor)
    }

    pub fn list_executors(&self) -> BTreeMap<Kind, Vec<Name>> {
        let state = self.state.read();
        let mut listing: BTreeMap<Kind, Vec<Name>> = BTreeMap::new();
        for (name, kind) in &state.kinds {
            listing.entry(kind.clone()).or_default().push(name.clone());
        }
        for names in listing.values_mut() {
            names.sort();
        }
        listing
    }

    /// Full rebuild on the caller's task. Returns how many executors were installed.
    pub async fn force_refresh(&self) -> usize {
        self.rebuild_all().await
    }

    async fn rebuild_all(&self) -> usize {
        let clusters = match self.topology.list_all_clusters().await {
            Ok(clusters) => clusters,
            Err(e) => {
                error!("failed to list clusters, err: {}", e);
                return 0;
            }
        };
        let jobs: Vec<_> = clusters
            .iter()
            .filter(|c| c.cluster_type.is_k8s_family())
            .flat_map(|c| self.cluster_builds(c))
            .collect();
        debug!(
            "rebuilding {} cluster executors, pool size: {}",
            jobs.len(),
            self.pool.size()
        );
        let built = self.pool.run_all(jobs).await;
        self.install_built(built)
    }

    async fn handle_cluster_event(&self, event: ClusterEvent) {
        let cluster = &event.cluster;
        match event.action {
            ClusterAction::Create | ClusterAction::Update => {
                if !cluster.cluster_type.is_k8s_family() {
                    debug!("ignore {:?} event of {} cluster {}", event.action, cluster.cluster_type, cluster.name);
                    return;
                }
                let built = self.pool.run_all(self.cluster_builds(cluster)).await;
                let installed = self.install_built(built);
                info!("cluster {} {:?} event handled, {} executors rebuilt", cluster.name, event.action, installed);
            }
            ClusterAction::Delete => {
                let removed = self.remove_cluster(&cluster.name);
                info!("cluster {} deleted, executors removed: {:?}", cluster.name, removed);
            }
        }
    }

    fn cluster_options(&self, cluster: &Cluster) -> Options {
        let mut options = cluster.config.clone();
        options
            .entry(CONNECT_TIMEOUT_OPTION.to_string())
            .or_insert_with(|| self.config.connect_timeout_secs.to_string());
        options
    }

    /// One constructor future per registered cluster kind.
    fn cluster_builds(&self, cluster: &Cluster) -> Vec<BoxFuture<'static, Built>> {
        let options = self.cluster_options(cluster);
        let epoch = self.state.read().epoch(&cluster.name);
        self.registry
            .cluster_kinds()
            .into_iter()
            .filter_map(|kind| {
                let create = self.registry.get(&kind)?;
                let name = match kind.make_executor_name(&cluster.name) {
                    Ok(name) => name,
                    Err(e) => {
                        error!("skip kind {} on cluster {}, err: {}", kind, cluster.name, e);
                        return None;
                    }
                };
                let options = options.clone();
                let cluster = cluster.name.clone();
                Some(
                    async move {
                        let result = create(name.clone(), options).await;
                        Built {
                            name,
                            kind,
                            cluster,
                            epoch,
                            result,
                        }
                    }
                    .boxed(),
                )
            })
            .collect()
    }

    fn install_built(&self, built: Vec<Built>) -> usize {
        let mut installed = 0;
        for Built {
            name,
            kind,
            cluster,
            epoch,
            result,
        } in built
        {
            match result {
                Ok(executor) => {
                    let mut state = self.state.write();
                    if state.epoch(&cluster) != epoch {
                        warn!("cluster {} removed while creating executor {}, drop it", cluster, name);
                        continue;
                    }
                    state.install(name.clone(), kind.clone(), executor);
                    info!("executor created, kind: {}, name: {}", kind, name);
                    installed += 1;
                }
                Err(e) => error!("failed to create executor, kind: {}, name: {}, err: {}", kind, name, e),
            }
        }
        installed
    }

    fn remove_cluster(&self, cluster_name: &str) -> Vec<Name> {
        let mut state = self.state.write();
        *state.epochs.entry(cluster_name.to_string()).or_default() += 1;
        let mut doomed: Vec<Name> = state
            .kinds
            .iter()
            .filter(|(name, kind)| {
                kind.is_cluster_kind() && kind.cluster_name_of(name).is_ok_and(|c| c == cluster_name)
            })
            .map(|(name, _)| name.clone())
            .collect();
        doomed.sort();
        for name in &doomed {
            state.kinds.remove(name);
            state.executors.remove(name);
        }
        doomed
    }
}
