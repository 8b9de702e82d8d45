use crate::error::ExecutorError;
use crate::executor::ClusterBackend;
use crate::kind::{Kind, Name};
use crate::status::{judge_existence, Existence, StatusDesc};
use crate::task::Task;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

/// Lifecycle shared by every executor whose compute is a cluster-orchestrator
/// object. Adapters hand in their [`ClusterBackend`] and delegate to it.
pub struct ClusterExecutor<B> {
    backend: B,
}

impl<B: ClusterBackend> ClusterExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn kind(&self) -> &Kind {
        self.backend.kind()
    }

    pub fn name(&self) -> &Name {
        self.backend.name()
    }

    pub async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        task.validate()
            .map_err(|e| e.wrap_task("status job", self.kind(), task))?;
        self.backend
            .status(task)
            .await
            .map_err(|e| e.wrap_task("status job", self.kind(), task))
    }

    pub async fn exist(&self, task: &Task) -> Result<Existence, ExecutorError> {
        let desc = match self.status(task).await {
            Ok(desc) => desc,
            Err(e) if e.is_object_not_found() => return Ok(Existence::ABSENT),
            Err(e) => return Err(e),
        };
        if desc.missing {
            return Ok(Existence::ABSENT);
        }
        judge_existence(desc.status).map_err(|e| e.wrap_task("judge existence", self.kind(), task))
    }

    /// The orchestrator object is the unit of both creation and starting, so
    /// there is nothing to do beyond checking it.
    pub async fn create(&self, task: &Task) -> Result<Value, ExecutorError> {
        let existence = self.exist(task).await?;
        if existence.created {
            warn!(
                "{}: task already created, taskInfo: {}",
                self.kind(),
                task.describe()
            );
        }
        Ok(Value::Null)
    }

    /// Checks existence, creates when missing and only calls `submit` when the
    /// task has not started yet.
    pub async fn start_with<F, Fut>(&self, task: &Task, submit: F) -> Result<Value, ExecutorError>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<Value, ExecutorError>> + Send,
    {
        task.validate()
            .map_err(|e| e.wrap_task("start job", self.kind(), task))?;
        let existence = self.exist(task).await?;
        if !existence.created {
            warn!(
                "{}: task not created(auto try to create), taskInfo: {}",
                self.kind(),
                task.describe()
            );
            self.create(task).await?;
        }
        if existence.started {
            warn!(
                "{}: task already started, taskInfo: {}",
                self.kind(),
                task.describe()
            );
            return Ok(Value::Null);
        }
        submit()
            .await
            .map_err(|e| e.wrap_task("start job", self.kind(), task))
    }

    pub async fn update(&self, _task: &Task) -> Result<Value, ExecutorError> {
        Err(ExecutorError::unsupported_operation(self.kind(), "update"))
    }

    pub async fn cancel(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.delete_recomputed("cancel job", task).await
    }

    pub async fn remove(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.delete_recomputed("remove job", task).await
    }

    pub async fn batch_delete(&self, tasks: &[Task]) -> Result<Value, ExecutorError> {
        for task in tasks {
            if task.uuid.is_empty() {
                continue;
            }
            self.backend
                .delete(task)
                .await
                .map_err(|e| e.wrap_task("batch delete job", self.kind(), task))?;
        }
        Ok(Value::Null)
    }

    async fn delete_recomputed(
        &self,
        op: &'static str,
        task: &Task,
    ) -> Result<Value, ExecutorError> {
        let task = task.with_recomputed_uuid();
        task.validate().map_err(|e| e.wrap_task(op, self.kind(), &task))?;
        debug!("{}: {} with recomputed jobID {}", self.kind(), op, task.uuid);
        self.backend
            .delete(&task)
            .await
            .map_err(|e| e.wrap_task(op, self.kind(), &task))
    }
}
