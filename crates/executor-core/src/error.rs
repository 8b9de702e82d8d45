use crate::kind::Kind;
use crate::status::CanonicalStatus;
use crate::task::Task;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("invalid executor kind: {0}")]
    InvalidKind(String),

    #[error("invalid executor name: {0}")]
    InvalidName(String),

    #[error("executor kind already registered: {0}")]
    DuplicateKind(String),

    #[error("executor not found: {0}")]
    NotFound(String),

    #[error("action missing namespace")]
    MissingNamespace,

    #[error("action missing UUID")]
    MissingUuid,

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("{0}")]
    Unsupported(String),

    #[error("cannot judge existence from status: {0}")]
    UndeterminedExistence(CanonicalStatus),

    #[error("object not found in cluster: {0}")]
    ObjectNotFound(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("kubernetes API error: {0}")]
    Kube(String),

    #[error("container runtime error: {0}")]
    ContainerRuntime(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("timed out after {0}s: {1}")]
    Timeout(u64, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to {op}, kind: {kind}, {task}, err: {source}")]
    Task {
        op: &'static str,
        kind: String,
        task: String,
        #[source]
        source: Box<ExecutorError>,
    },
}

impl ExecutorError {
    /// Attaches operation, kind and task identifiers. An error that already
    /// carries task context is returned unchanged.
    pub fn wrap_task(self, op: &'static str, kind: &Kind, task: &Task) -> Self {
        match self {
            wrapped @ ExecutorError::Task { .. } => wrapped,
            other => ExecutorError::Task {
                op,
                kind: kind.to_string(),
                task: task.describe(),
                source: Box::new(other),
            },
        }
    }

    /// Innermost error, skipping task context.
    pub fn root(&self) -> &ExecutorError {
        match self {
            ExecutorError::Task { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self.root(), ExecutorError::Unsupported(_))
    }

    pub fn is_object_not_found(&self) -> bool {
        matches!(self.root(), ExecutorError::ObjectNotFound(_))
    }

    pub fn unsupported_operation(kind: &Kind, op: &str) -> Self {
        ExecutorError::Unsupported(format!("{} not support {} operation", kind, op))
    }
}

pub type Result<T, E = ExecutorError> = std::result::Result<T, E>;
