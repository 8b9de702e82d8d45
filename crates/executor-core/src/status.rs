use crate::error::ExecutorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The only status vocabulary the rest of the platform understands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    Error,
    Unknown,
    #[default]
    Created,
    Queued,
    Running,
    Success,
    Failed,
    StoppedByUser,
    StartError,
}

impl CanonicalStatus {
    pub const ALL: [CanonicalStatus; 9] = [
        CanonicalStatus::Error,
        CanonicalStatus::Unknown,
        CanonicalStatus::Created,
        CanonicalStatus::Queued,
        CanonicalStatus::Running,
        CanonicalStatus::Success,
        CanonicalStatus::Failed,
        CanonicalStatus::StoppedByUser,
        CanonicalStatus::StartError,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CanonicalStatus::Success
                | CanonicalStatus::Failed
                | CanonicalStatus::StoppedByUser
                | CanonicalStatus::StartError
        )
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CanonicalStatus::Error => "error",
            CanonicalStatus::Unknown => "unknown",
            CanonicalStatus::Created => "created",
            CanonicalStatus::Queued => "queued",
            CanonicalStatus::Running => "running",
            CanonicalStatus::Success => "success",
            CanonicalStatus::Failed => "failed",
            CanonicalStatus::StoppedByUser => "stopped_by_user",
            CanonicalStatus::StartError => "start_error",
        };
        f.write_str(s)
    }
}

/// Platform-internal status tokens. Backend adapters map their own vocabulary
/// onto these, then funnel through [`transfer_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeStatus {
    Error,
    Unknown,
    Created,
    Unschedulable,
    Initial,
    Running,
    Active,
    StoppedOnOk,
    Finished,
    Stopped,
    StoppedOnFailed,
    Failed,
    StoppedByKilled,
    NotFoundInCluster,
}

impl NativeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeStatus::Error => "error",
            NativeStatus::Unknown => "unknown",
            NativeStatus::Created => "created",
            NativeStatus::Unschedulable => "unschedulable",
            NativeStatus::Initial => "initial",
            NativeStatus::Running => "running",
            NativeStatus::Active => "active",
            NativeStatus::StoppedOnOk => "stopped-ok",
            NativeStatus::Finished => "finished",
            NativeStatus::Stopped => "stopped",
            NativeStatus::StoppedOnFailed => "stopped-failed",
            NativeStatus::Failed => "failed",
            NativeStatus::StoppedByKilled => "stopped-by-killed",
            NativeStatus::NotFoundInCluster => "not-found-in-cluster",
        }
    }
}

impl fmt::Display for NativeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalizes a native status token. Total: tokens outside the table
/// become `Unknown`.
pub fn transfer_status(token: &str) -> CanonicalStatus {
    match token.trim().to_ascii_lowercase().as_str() {
        "error" => CanonicalStatus::Error,
        "created" => CanonicalStatus::Created,
        "unschedulable" | "initial" => CanonicalStatus::Queued,
        "running" | "active" => CanonicalStatus::Running,
        "stopped-ok" | "finished" | "stopped" => CanonicalStatus::Success,
        "stopped-failed" | "failed" => CanonicalStatus::Failed,
        "stopped-by-killed" => CanonicalStatus::StoppedByUser,
        "not-found-in-cluster" => CanonicalStatus::StartError,
        _ => CanonicalStatus::Unknown,
    }
}

impl From<NativeStatus> for CanonicalStatus {
    fn from(native: NativeStatus) -> Self {
        transfer_status(native.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Existence {
    pub created: bool,
    pub started: bool,
}

impl Existence {
    pub const ABSENT: Existence = Existence {
        created: false,
        started: false,
    };

    pub fn new(created: bool, started: bool) -> Self {
        Self { created, started }
    }
}

/// Derives created/started from a canonical status.
pub fn judge_existence(status: CanonicalStatus) -> Result<Existence, ExecutorError> {
    match status {
        CanonicalStatus::Error | CanonicalStatus::Unknown => {
            Err(ExecutorError::UndeterminedExistence(status))
        }
        CanonicalStatus::Created | CanonicalStatus::StartError => Ok(Existence::new(true, false)),
        CanonicalStatus::Queued
        | CanonicalStatus::Running
        | CanonicalStatus::Success
        | CanonicalStatus::Failed
        | CanonicalStatus::StoppedByUser => Ok(Existence::new(true, true)),
    }
}

pub const NOT_FOUND_IN_CLUSTER_DESC: &str = "not found in cluster";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDesc {
    pub status: CanonicalStatus,
    #[serde(default)]
    pub desc: String,
    /// Set when the backend has no object for the task at all.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
}

impl StatusDesc {
    pub fn new(status: CanonicalStatus, desc: impl Into<String>) -> Self {
        Self {
            status,
            desc: desc.into(),
            missing: false,
        }
    }

    pub fn from_native(native: NativeStatus, desc: impl Into<String>) -> Self {
        Self::new(native.into(), desc)
    }

    pub fn not_found_in_cluster() -> Self {
        Self {
            status: NativeStatus::NotFoundInCluster.into(),
            desc: NOT_FOUND_IN_CLUSTER_DESC.to_string(),
            missing: true,
        }
    }
}

/// Backend-native diagnostic text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInspect {
    pub desc: String,
}
