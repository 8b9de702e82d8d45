use crate::error::ExecutorError;
use crate::status::CanonicalStatus;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A pipeline task as seen by an executor. Owned by the pipeline engine; the
/// executors only read it, apart from the transient `uuid` rewrite done before
/// cancel and remove.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Task {
    pub pipeline_id: u64,
    pub id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Backend job identifier.
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub cluster_name: String,
    /// The namespace is owned outside the pipeline and is never deleted.
    #[serde(default)]
    pub shared_namespace: bool,
    #[serde(default)]
    pub status: CanonicalStatus,
    #[serde(default)]
    pub spec: ComputeSpec,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComputeSpec {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub cmd: String,
    /// Cores.
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub max_cpu: f64,
    /// MiB.
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub max_memory: f64,
    #[serde(default)]
    pub volumes: Vec<Volume>,
    #[serde(default)]
    pub binds: Vec<Bind>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub network: NetworkMode,
    #[serde(default)]
    pub pre_fetcher: Option<PreFetcher>,
    #[serde(default)]
    pub bigdata: Option<BigDataSpec>,
    #[serde(default)]
    pub backoff_limit: i32,
}

/// A persistent volume claimed for the task and mounted at `container_path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub container_path: String,
    #[serde(default = "default_volume_size")]
    pub size: String,
    #[serde(default)]
    pub storage_class: Option<String>,
}

fn default_volume_size() -> String {
    "10Gi".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bind {
    pub host_path: String,
    pub container_path: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMode {
    #[default]
    Container,
    Host,
}

impl NetworkMode {
    pub fn is_host(&self) -> bool {
        matches!(self, NetworkMode::Host)
    }
}

/// Copies files out of `file_from_image` into `container_path` before the
/// main container runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreFetcher {
    pub file_from_image: String,
    pub container_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BigDataSpec {
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub flink: Option<FlinkConf>,
    #[serde(default)]
    pub spark: Option<SparkConf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlinkConf {
    #[serde(default)]
    pub version: String,
    /// Jar to submit, either a URL or a path in the image.
    pub jar: String,
    #[serde(default = "default_parallelism")]
    pub parallelism: i32,
    #[serde(default)]
    pub job_manager: BigDataResource,
    #[serde(default)]
    pub task_manager: BigDataResource,
}

fn default_parallelism() -> i32 {
    1
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SparkConf {
    /// `Java`, `Scala`, `Python` or `R`.
    #[serde(default = "default_spark_type")]
    pub app_type: String,
    /// `cluster` or `client`.
    #[serde(default = "default_spark_mode")]
    pub mode: String,
    #[serde(default = "default_spark_version")]
    pub version: String,
    pub main_application_file: String,
    #[serde(default)]
    pub python_version: Option<String>,
    #[serde(default)]
    pub driver: BigDataResource,
    #[serde(default)]
    pub executor: BigDataResource,
}

fn default_spark_type() -> String {
    "Scala".to_string()
}

fn default_spark_mode() -> String {
    "cluster".to_string()
}

fn default_spark_version() -> String {
    "3.1.1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigDataResource {
    #[serde(default = "default_bigdata_cpu")]
    pub cpu: String,
    #[serde(default = "default_bigdata_memory")]
    pub memory: String,
    #[serde(default = "default_replica")]
    pub replica: i32,
}

fn default_bigdata_cpu() -> String {
    "1".to_string()
}

fn default_bigdata_memory() -> String {
    "1024m".to_string()
}

fn default_replica() -> i32 {
    1
}

impl Default for BigDataResource {
    fn default() -> Self {
        Self {
            cpu: default_bigdata_cpu(),
            memory: default_bigdata_memory(),
            replica: default_replica(),
        }
    }
}

impl Task {
    /// Rejects tasks that cannot be addressed on any backend.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.namespace.is_empty() {
            return Err(ExecutorError::MissingNamespace);
        }
        if self.uuid.is_empty() {
            return Err(ExecutorError::MissingUuid);
        }
        Ok(())
    }

    /// Human-readable identifiers used in every wrapped error.
    pub fn describe(&self) -> String {
        format!(
            "pipelineID: {}, taskID: {}, taskName: {}, namespace: {}, jobID: {}, cluster: {}",
            self.pipeline_id, self.id, self.name, self.namespace, self.uuid, self.cluster_name
        )
    }

    /// Copy whose `uuid` is rebuilt from the task's stable identifiers.
    pub fn with_recomputed_uuid(&self) -> Task {
        let mut task = self.clone();
        task.uuid = make_job_id(self);
        task
    }

    /// Identity used to deduplicate in-process attempts.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.uuid)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Deterministic backend job identifier of a task.
pub fn make_job_id(task: &Task) -> String {
    format!("pipeline-{}.pipeline-task-{}", task.pipeline_id, task.id)
}
