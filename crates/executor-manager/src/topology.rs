use executor_core::cluster::{Cluster, ClusterAction, ClusterEvent, TopologyProvider};
use executor_core::ExecutorError;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// Topology backed by the `clusters` section of the config file. Changes are
/// fed in through [`StaticTopology::publish`].
#[derive(Default)]
pub struct StaticTopology {
    clusters: RwLock<Vec<Cluster>>,
    refresh_subscribers: Mutex<Vec<mpsc::Sender<()>>>,
    event_subscribers: Mutex<Vec<mpsc::Sender<ClusterEvent>>>,
}

impl StaticTopology {
    pub fn new(clusters: Vec<Cluster>) -> Self {
        Self {
            clusters: RwLock::new(clusters),
            ..Default::default()
        }
    }

    pub fn clusters(&self) -> Vec<Cluster> {
        self.clusters.read().clone()
    }

    /// Asks every subscriber for a full rebuild. A subscriber with a rebuild
    /// already queued is skipped.
    pub fn notify_refresh(&self) {
        let mut subscribers = self.refresh_subscribers.lock();
        subscribers.retain(|tx| !tx.is_closed());
        for tx in subscribers.iter() {
            if tx.try_send(()).is_err() {
                debug!("refresh already pending, skip");
            }
        }
    }

    /// Applies the event to the cluster list, then delivers it to every subscriber.
    pub async fn publish(&self, event: ClusterEvent) {
        {
            let mut clusters = self.clusters.write();
            clusters.retain(|c| c.name != event.cluster.name);
            if event.action != ClusterAction::Delete {
                clusters.push(event.cluster.clone());
            }
        }

        let subscribers: Vec<_> = {
            let mut subscribers = self.event_subscribers.lock();
            subscribers.retain(|tx| !tx.is_closed());
            subscribers.clone()
        };
        for tx in subscribers {
            if tx.send(event.clone()).await.is_err() {
                debug!("cluster event subscriber went away");
            }
        }
    }
}

#[async_trait::async_trait]
impl TopologyProvider for StaticTopology {
    async fn list_all_clusters(&self) -> Result<Vec<Cluster>, ExecutorError> {
        Ok(self.clusters())
    }

    fn register_refresh_event(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.refresh_subscribers.lock().push(tx);
        rx
    }

    fn register_cluster_event(&self) -> mpsc::Receiver<ClusterEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.event_subscribers.lock().push(tx);
        rx
    }
}
