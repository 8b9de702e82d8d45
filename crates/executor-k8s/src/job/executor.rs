use super::build::{build_kube_job, make_job_name, make_pvc_name};
use super::describe::describe_pod;
use super::status::{generate_kube_job_status, last_event_message};
use crate::client::{is_already_exists, is_not_found, kube_error, ClusterContext};
use crate::hit_rate::{HitSampler, RandomSampler};
use crate::namespace::{clean_up_namespace, ensure_namespace, live_count};
use executor_core::kind::K8S_JOB;
use executor_core::{
    ClusterBackend, ClusterExecutor, Executor, ExecutorError, Existence, Kind, Name, Options,
    StatusDesc, Task, TaskInspect,
};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Event, PersistentVolumeClaim, Pod};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Runs a task as a Kubernetes batch Job.
pub struct KubeJob {
    inner: ClusterExecutor<KubeJobBackend>,
}

pub struct KubeJobBackend {
    kind: Kind,
    name: Name,
    cluster: ClusterContext,
    sampler: Arc<dyn HitSampler>,
}

impl KubeJob {
    pub async fn connect(name: Name, options: Options) -> Result<Self, ExecutorError> {
        let kind = Kind::new(K8S_JOB)?;
        let cluster = ClusterContext::connect(&kind, &name, options).await?;
        Ok(Self::assemble(kind, name, cluster, Arc::new(RandomSampler)))
    }

    /// Builds over an existing cluster context, with a caller-chosen sampler
    /// for the buildkit hit rate.
    pub fn with_cluster(
        name: Name,
        cluster: ClusterContext,
        sampler: Arc<dyn HitSampler>,
    ) -> Result<Self, ExecutorError> {
        Ok(Self::assemble(Kind::new(K8S_JOB)?, name, cluster, sampler))
    }

    fn assemble(kind: Kind, name: Name, cluster: ClusterContext, sampler: Arc<dyn HitSampler>) -> Self {
        Self {
            inner: ClusterExecutor::new(KubeJobBackend {
                kind,
                name,
                cluster,
                sampler,
            }),
        }
    }
}

impl KubeJobBackend {
    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.cluster.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.cluster.client.clone(), namespace)
    }

    fn events(&self, namespace: &str) -> Api<Event> {
        Api::namespaced(self.cluster.client.clone(), namespace)
    }

    fn pvcs(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.cluster.client.clone(), namespace)
    }

    async fn job_pods(&self, job: &Job, namespace: &str) -> Result<Vec<Pod>, ExecutorError> {
        let Some(match_labels) = job
            .spec
            .as_ref()
            .and_then(|s| s.selector.as_ref())
            .and_then(|s| s.match_labels.as_ref())
        else {
            return Ok(Vec::new());
        };
        let selector = match_labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        let pods = self
            .pods(namespace)
            .list(&ListParams::default().labels(&selector))
            .await
            .map_err(kube_error)?;
        Ok(pods.items)
    }

    async fn submit(&self, task: &Task) -> Result<Value, ExecutorError> {
        let plan = build_kube_job(task, &self.cluster.options, self.sampler.as_ref())?;
        ensure_namespace(&self.cluster.client, &task.namespace).await?;

        let pvcs = self.pvcs(&task.namespace);
        for pvc in &plan.pvcs {
            match pvcs.create(&PostParams::default(), pvc).await {
                Ok(_) => {}
                Err(e) if is_already_exists(&e) => {}
                Err(e) => return Err(kube_error(e)),
            }
        }

        let job_name = plan.job.metadata.name.clone().unwrap_or_default();
        self.jobs(&task.namespace)
            .create(&PostParams::default(), &plan.job)
            .await
            .map_err(|e| {
                ExecutorError::Kube(format!("failed to create k8s job, name: {}, err: {}", job_name, e))
            })?;
        info!(
            "k8s job {} created, buildkit: {}, taskInfo: {}",
            job_name,
            plan.buildkit,
            task.describe()
        );
        Ok(Value::String(job_name))
    }

    async fn clean_up(&self, namespace: &str) -> Result<(), ExecutorError> {
        let jobs = self
            .jobs(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|e| {
                ExecutorError::Kube(format!("failed to list jobs, namespace: {}, err: {}", namespace, e))
            })?;
        clean_up_namespace(&self.cluster.client, namespace, live_count(&jobs.items), "jobs").await
    }

    async fn inspect(&self, task: &Task) -> Result<TaskInspect, ExecutorError> {
        task.validate()?;
        let job_name = make_job_name(&task.namespace, &task.uuid);
        let job = self
            .jobs(&task.namespace)
            .get_opt(&job_name)
            .await
            .map_err(kube_error)?
            .ok_or_else(|| ExecutorError::ObjectNotFound(job_name.clone()))?;
        let pods = self.job_pods(&job, &task.namespace).await?;
        let Some(pod) = pods.last() else {
            return Err(ExecutorError::Backend(format!("get empty pods in job: {}", job_name)));
        };
        let events = self
            .events(&task.namespace)
            .list(&ListParams::default())
            .await
            .map_err(kube_error)?;
        Ok(TaskInspect {
            desc: describe_pod(pod, &events.items),
        })
    }
}

#[async_trait::async_trait]
impl ClusterBackend for KubeJobBackend {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn name(&self) -> &Name {
        &self.name
    }

    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        let job_name = make_job_name(&task.namespace, &task.uuid);
        let Some(job) = self
            .jobs(&task.namespace)
            .get_opt(&job_name)
            .await
            .map_err(kube_error)?
        else {
            return Ok(StatusDesc::not_found_in_cluster());
        };
        let pods = self.job_pods(&job, &task.namespace).await?;
        let events = self
            .events(&task.namespace)
            .list(&ListParams::default())
            .await
            .map_err(kube_error)?;
        let last_msg = last_event_message(&events.items, &job_name);
        Ok(generate_kube_job_status(&job, &pods, &last_msg))
    }

    /// Background propagation. A job already being deleted is left alone;
    /// missing objects are fine.
    async fn delete(&self, task: &Task) -> Result<Value, ExecutorError> {
        let job_name = make_job_name(&task.namespace, &task.uuid);
        let jobs = self.jobs(&task.namespace);

        let Some(job) = jobs.get_opt(&job_name).await.map_err(kube_error)? else {
            warn!("the job {} in namespace {} is not found", job_name, task.namespace);
            return Ok(Value::String(task.uuid.clone()));
        };
        if job.metadata.deletion_timestamp.is_some() {
            debug!("job {} is already being deleted", job_name);
            return Ok(Value::String(task.uuid.clone()));
        }

        match jobs.delete(&job_name, &DeleteParams::background()).await {
            Ok(_) => debug!("finish to delete job {}", job_name),
            Err(e) if is_not_found(&e) => {
                warn!("delete the job {} in namespace {} is not found", job_name, task.namespace)
            }
            Err(e) => {
                return Err(ExecutorError::Kube(format!(
                    "failed to remove k8s job, name: {}, err: {}",
                    job_name, e
                )))
            }
        }

        let pvcs = self.pvcs(&task.namespace);
        for index in 0..task.spec.volumes.len() {
            let pvc_name = make_pvc_name(&job_name, index);
            match pvcs.delete(&pvc_name, &DeleteParams::default()).await {
                Ok(_) => debug!("finish to delete pvc {}", pvc_name),
                Err(e) if is_not_found(&e) => {
                    warn!("the job {}'s pvc {} is not found", job_name, pvc_name)
                }
                Err(e) => {
                    return Err(ExecutorError::Kube(format!(
                        "failed to remove k8s pvc, name: {}, err: {}",
                        pvc_name, e
                    )))
                }
            }
        }
        Ok(Value::String(task.uuid.clone()))
    }
}

#[async_trait::async_trait]
impl Executor for KubeJob {
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

    async fn inspect(&self, task: &Task) -> Result<TaskInspect, ExecutorError> {
        self.inner
            .backend()
            .inspect(task)
            .await
            .map_err(|e| e.wrap_task("inspect job", self.kind(), task))
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
