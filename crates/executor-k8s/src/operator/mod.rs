pub mod flink;
pub mod spark;

pub use flink::Flink;
pub use spark::Spark;

use crate::client::{is_already_exists, is_not_found, ClusterContext};
use crate::namespace::{clean_up_namespace, delete_namespace, ensure_namespace, live_count};
use executor_core::{
    ClusterBackend, ClusterExecutor, Executor, ExecutorError, Existence, Kind, Name, Options,
    StatusDesc, Task, TaskInspect,
};
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, PostParams};
use kube::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

pub type KubeFlink = OperatorExecutor<Flink>;
pub type KubeSpark = OperatorExecutor<Spark>;

/// What differs between custom-resource operators: the resource type, how a
/// task becomes its spec, and how its status reads.
#[async_trait::async_trait]
pub trait OperatorFlavor: Default + Send + Sync + 'static {
    /// Executor kind served by this flavor.
    fn kind(&self) -> &'static str;

    fn gvk(&self) -> GroupVersionKind;

    fn labels(&self, task: &Task) -> BTreeMap<String, String>;

    /// The resource's `spec`.
    fn build_spec(&self, task: &Task, cluster: &Options) -> Result<Value, ExecutorError>;

    /// Reads the resource's `status`, `Value::Null` when the operator has not
    /// written one yet.
    fn translate(&self, status: &Value) -> StatusDesc;

    /// Namespace-scoped objects the operator needs before the resource exists.
    async fn prepare(&self, _client: &Client, _namespace: &str) -> Result<(), ExecutorError> {
        Ok(())
    }

    /// Whether a delete without a job id tears down the pipeline namespace.
    fn deletes_namespace_without_job_id(&self) -> bool {
        false
    }
}

pub struct OperatorBackend<F> {
    kind: Kind,
    name: Name,
    cluster: ClusterContext,
    resource: ApiResource,
    flavor: F,
}

/// A task submitted as one custom resource named after the task's job id.
pub struct OperatorExecutor<F> {
    inner: ClusterExecutor<OperatorBackend<F>>,
}

impl<F: OperatorFlavor> OperatorExecutor<F> {
    pub async fn connect(name: Name, options: Options) -> Result<Self, ExecutorError> {
        let flavor = F::default();
        let kind = Kind::new(flavor.kind())?;
        let cluster = ClusterContext::connect(&kind, &name, options).await?;
        Ok(Self::assemble(kind, name, cluster, flavor))
    }

    pub fn with_cluster(name: Name, cluster: ClusterContext) -> Result<Self, ExecutorError> {
        let flavor = F::default();
        let kind = Kind::new(flavor.kind())?;
        Ok(Self::assemble(kind, name, cluster, flavor))
    }

    pub fn backend(&self) -> &OperatorBackend<F> {
        self.inner.backend()
    }

    fn assemble(kind: Kind, name: Name, cluster: ClusterContext, flavor: F) -> Self {
        let resource = ApiResource::from_gvk(&flavor.gvk());
        Self {
            inner: ClusterExecutor::new(OperatorBackend {
                kind,
                name,
                cluster,
                resource,
                flavor,
            }),
        }
    }
}

impl<F: OperatorFlavor> OperatorBackend<F> {
    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.cluster.client.clone(), namespace, &self.resource)
    }

    fn manifest(&self, task: &Task) -> Result<DynamicObject, ExecutorError> {
        let spec = self.flavor.build_spec(task, &self.cluster.options)?;
        let mut object = DynamicObject::new(&task.uuid, &self.resource)
            .within(&task.namespace)
            .data(serde_json::json!({ "spec": spec }));
        object.metadata.labels = Some(self.flavor.labels(task));
        Ok(object)
    }

    async fn submit(&self, task: &Task) -> Result<Value, ExecutorError> {
        let object = self.manifest(task)?;
        ensure_namespace(&self.cluster.client, &task.namespace).await?;
        self.flavor
            .prepare(&self.cluster.client, &task.namespace)
            .await?;

        match self.api(&task.namespace).create(&PostParams::default(), &object).await {
            Ok(_) => info!(
                "succeed to create {}, namespace: {}, name: {}",
                self.resource.kind, task.namespace, task.uuid
            ),
            Err(e) if is_already_exists(&e) => warn!(
                "{} already exists, namespace: {}, name: {}",
                self.resource.kind, task.namespace, task.uuid
            ),
            Err(e) => {
                return Err(ExecutorError::Kube(format!(
                    "failed to create {}, namespace: {}, name: {}, err: {}",
                    self.resource.kind, task.namespace, task.uuid, e
                )))
            }
        }
        Ok(Value::String(task.uuid.clone()))
    }

    async fn clean_up(&self, namespace: &str) -> Result<(), ExecutorError> {
        let objects = self
            .api(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| {
                ExecutorError::Kube(format!(
                    "failed to list {}, namespace: {}, err: {}",
                    self.resource.plural, namespace, e
                ))
            })?;
        clean_up_namespace(
            &self.cluster.client,
            namespace,
            live_count(&objects.items),
            &self.resource.plural,
        )
        .await
    }
}

#[async_trait::async_trait]
impl<F: OperatorFlavor> ClusterBackend for OperatorBackend<F> {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn name(&self) -> &Name {
        &self.name
    }

    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        let object = self.api(&task.namespace).get_opt(&task.uuid).await.map_err(|e| {
            ExecutorError::Kube(format!(
                "failed to get the status of {}, name: {}, err: {}",
                self.resource.kind, task.uuid, e
            ))
        })?;
        let Some(object) = object else {
            return Ok(StatusDesc::not_found_in_cluster());
        };
        let status = object.data.get("status").cloned().unwrap_or(Value::Null);
        let desc = self.flavor.translate(&status);
        debug!(
            "{} status, namespace: {}, name: {}, status: {:?}",
            self.resource.kind, task.namespace, task.uuid, desc
        );
        Ok(desc)
    }

    /// A missing resource is a no-op. Without a job id only the pipeline
    /// namespace can go, and only for flavors that own it.
    async fn delete(&self, task: &Task) -> Result<Value, ExecutorError> {
        if task.uuid.is_empty() {
            if self.flavor.deletes_namespace_without_job_id() && !task.shared_namespace {
                delete_namespace(&self.cluster.client, &task.namespace).await?;
            }
            return Ok(Value::Null);
        }
        match self.api(&task.namespace).delete(&task.uuid, &DeleteParams::default()).await {
            Ok(_) => Ok(Value::Null),
            Err(e) if is_not_found(&e) => Ok(Value::Null),
            Err(e) => Err(ExecutorError::Kube(format!(
                "failed to remove {}, namespace: {}, name: {}, err: {}",
                self.resource.kind, task.namespace, task.uuid, e
            ))),
        }
    }
}

#[async_trait::async_trait]
impl<F: OperatorFlavor> Executor for OperatorExecutor<F> {
    fn kind(&self) -> &Kind {
        self.inner.kind()
    }

    fn name(&self) -> &Name {
        self.inner.name()
    }

    async fn exist(&self, task: &Task) -> Result<Existence, ExecutorError> {
        self.inner.exist(task).await
    }

    async fn create(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner.create(task).await
    }

    async fn start(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner
            .start_with(task, || self.inner.backend().submit(task))
            .await
    }

    async fn update(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner.update(task).await
    }

    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        self.inner.status(task).await
    }

    /// The operator's diagnostics are too large to hand back.
    async fn inspect(&self, _task: &Task) -> Result<TaskInspect, ExecutorError> {
        Err(ExecutorError::unsupported_operation(self.kind(), "inspect"))
    }

    async fn cancel(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner.cancel(task).await
    }

    async fn remove(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner.remove(task).await
    }

    async fn batch_delete(&self, tasks: &[Task]) -> Result<Value, ExecutorError> {
        self.inner.batch_delete(tasks).await
    }

    async fn clean_up(&self, namespace: &str) -> Result<(), ExecutorError> {
        self.inner.backend().clean_up(namespace).await
    }
}
