use crate::error::ExecutorError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(rename = "type")]
    pub cluster_type: ClusterType,
    /// Used to build the backend client; also copied into constructor options.
    #[serde(default)]
    pub config: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterType {
    K8s,
    Edas,
    Dcos,
    #[serde(untagged)]
    Other(String),
}

impl ClusterType {
    /// Clusters whose executors are provisioned lazily per cluster.
    pub fn is_k8s_family(&self) -> bool {
        matches!(self, ClusterType::K8s | ClusterType::Edas)
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterType::K8s => write!(f, "k8s"),
            ClusterType::Edas => write!(f, "edas"),
            ClusterType::Dcos => write!(f, "dcos"),
            ClusterType::Other(other) => write!(f, "{}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct ClusterEvent {
    pub action: ClusterAction,
    pub cluster: Cluster,
}

/// Source of cluster topology.
#[async_trait::async_trait]
pub trait TopologyProvider: Send + Sync {
    async fn list_all_clusters(&self) -> Result<Vec<Cluster>, ExecutorError>;

    /// Fires whenever a full rebuild of cluster executors is wanted.
    fn register_refresh_event(&self) -> mpsc::Receiver<()>;

    fn register_cluster_event(&self) -> mpsc::Receiver<ClusterEvent>;
}
