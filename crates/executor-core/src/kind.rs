use crate::error::ExecutorError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static KIND_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid kind pattern"));
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").expect("valid name pattern"));

/// Batch jobs on a cluster orchestrator.
pub const K8S_JOB: &str = "k8sjob";
/// Streaming clusters managed by the flink operator.
pub const K8S_FLINK: &str = "k8sflink";
/// Analytics applications managed by the spark operator.
pub const K8S_SPARK: &str = "k8sspark";
/// Raw container engine.
pub const DOCKER: &str = "docker";
/// In-process synthetic executor.
pub const SYNTHETIC: &str = "synthetic";

const CLUSTER_KINDS: [&str; 3] = [K8S_JOB, K8S_FLINK, K8S_SPARK];

/// Identifies an executor implementation class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Kind(String);

impl Kind {
    pub fn new(kind: impl Into<String>) -> Result<Self, ExecutorError> {
        let kind = kind.into();
        if !KIND_PATTERN.is_match(&kind) {
            return Err(ExecutorError::InvalidKind(kind));
        }
        Ok(Self(kind))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether executors of this kind are provisioned per cluster.
    pub fn is_cluster_kind(&self) -> bool {
        CLUSTER_KINDS.contains(&self.0.as_str())
    }

    fn prefix(&self) -> String {
        format!("{}-", self.0)
    }

    /// `<kind>-<cluster>`. Fails with `InvalidName` when the cluster name
    /// carries characters a [`Name`] does not allow.
    pub fn make_executor_name(&self, cluster_name: &str) -> Result<Name, ExecutorError> {
        Name::new(format!("{}{}", self.prefix(), cluster_name))
    }

    /// Recovers the cluster name from a name built by [`Kind::make_executor_name`].
    pub fn cluster_name_of(&self, name: &Name) -> Result<String, ExecutorError> {
        match name.as_str().strip_prefix(&self.prefix()) {
            Some(cluster) if !cluster.is_empty() => Ok(cluster.to_string()),
            _ => Err(ExecutorError::InvalidName(format!(
                "{} is not an executor name of kind {}",
                name, self
            ))),
        }
    }

    /// Picks the cluster kind whose prefix matches `name`. The longest prefix wins
    /// so that kinds sharing a stem cannot shadow each other.
    pub fn infer_from_name<'a, I>(name: &Name, candidates: I) -> Option<Kind>
    where
        I: IntoIterator<Item = &'a Kind>,
    {
        candidates
            .into_iter()
            .filter(|kind| kind.is_cluster_kind())
            .filter(|kind| kind.cluster_name_of(name).is_ok())
            .max_by_key(|kind| kind.0.len())
            .cloned()
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Kind {
    type Error = ExecutorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        kind.0
    }
}

/// Identifies one addressable executor instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Name(String);

impl Name {
    pub fn new(name: impl Into<String>) -> Result<Self, ExecutorError> {
        let name = name.into();
        if !NAME_PATTERN.is_match(&name) {
            return Err(ExecutorError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Name {
    type Error = ExecutorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Name> for String {
    fn from(name: Name) -> Self {
        name.0
    }
}
