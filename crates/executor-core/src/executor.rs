use crate::error::ExecutorError;
use crate::kind::{Kind, Name};
use crate::status::{Existence, StatusDesc, TaskInspect};
use crate::task::Task;
use serde_json::Value;

/// Core executor trait. Every backend adapter implements this.
///
/// Operations that return [`Value`] hand back adapter-specific data the caller
/// treats as opaque; `Value::Null` means nothing to report.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    fn kind(&self) -> &Kind;

    fn name(&self) -> &Name;

    /// Reports whether the backend object exists and has left its
    /// not-yet-running phase. Never mutates the backend.
    async fn exist(&self, task: &Task) -> Result<Existence, ExecutorError>;

    /// Idempotent: an already created task is a no-op.
    async fn create(&self, task: &Task) -> Result<Value, ExecutorError>;

    /// Idempotent: creates the task when missing and never resubmits a started one.
    async fn start(&self, task: &Task) -> Result<Value, ExecutorError>;

    async fn update(&self, task: &Task) -> Result<Value, ExecutorError>;

    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError>;

    async fn inspect(&self, task: &Task) -> Result<TaskInspect, ExecutorError>;

    async fn cancel(&self, task: &Task) -> Result<Value, ExecutorError>;

    async fn remove(&self, task: &Task) -> Result<Value, ExecutorError>;

    /// Deletes sequentially and stops at the first failure.
    async fn batch_delete(&self, tasks: &[Task]) -> Result<Value, ExecutorError>;

    /// Deletes a pipeline namespace once none of this executor's objects are
    /// left alive in it.
    async fn clean_up(&self, _namespace: &str) -> Result<(), ExecutorError> {
        Err(ExecutorError::unsupported_operation(self.kind(), "clean up"))
    }
}

/// The narrow capability a cluster-orchestrator backend supplies to
/// [`ClusterExecutor`](crate::template::ClusterExecutor).
#[async_trait::async_trait]
pub trait ClusterBackend: Send + Sync {
    fn kind(&self) -> &Kind;

    fn name(&self) -> &Name;

    /// A missing backend object is reported as
    /// [`StatusDesc::not_found_in_cluster`], not as an error.
    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError>;

    async fn delete(&self, task: &Task) -> Result<Value, ExecutorError>;
}
