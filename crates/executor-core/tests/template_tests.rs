use executor_core::status::NativeStatus;
use executor_core::task::make_job_id;
use executor_core::{
    CanonicalStatus, ClusterBackend, ClusterExecutor, ExecutorError, Existence, Kind, Name,
    StatusDesc, Task,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-memory orchestrator: uuid -> status.
struct FakeBackend {
    kind: Kind,
    name: Name,
    objects: Mutex<HashMap<String, StatusDesc>>,
    submits: AtomicUsize,
    deleted: Mutex<Vec<String>>,
    fail_delete: Option<String>,
    status_error: bool,
    missing_as_error: bool,
}

impl FakeBackend {
    fn new() -> Self {
        Self {
            kind: Kind::new("k8sjob").unwrap(),
            name: Name::new("k8sjob-dev").unwrap(),
            objects: Mutex::new(HashMap::new()),
            submits: AtomicUsize::new(0),
            deleted: Mutex::new(Vec::new()),
            fail_delete: None,
            status_error: false,
            missing_as_error: false,
        }
    }

    fn with_object(self, uuid: &str, status: CanonicalStatus) -> Self {
        self.objects
            .lock()
            .unwrap()
            .insert(uuid.to_string(), StatusDesc::new(status, ""));
        self
    }

    async fn submit(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.submits.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(
            task.uuid.clone(),
            StatusDesc::from_native(NativeStatus::Unschedulable, ""),
        );
        Ok(Value::String(task.uuid.clone()))
    }
}

#[async_trait::async_trait]
impl ClusterBackend for FakeBackend {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn name(&self) -> &Name {
        &self.name
    }

    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        if self.status_error {
            return Err(ExecutorError::Kube("connection refused".into()));
        }
        if self.missing_as_error && !self.objects.lock().unwrap().contains_key(&task.uuid) {
            return Err(ExecutorError::ObjectNotFound(task.uuid.clone()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&task.uuid)
            .cloned()
            .unwrap_or_else(StatusDesc::not_found_in_cluster))
    }

    async fn delete(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.deleted.lock().unwrap().push(task.uuid.clone());
        if self.fail_delete.as_deref() == Some(task.uuid.as_str()) {
            return Err(ExecutorError::Kube(format!("cannot delete {}", task.uuid)));
        }
        self.objects.lock().unwrap().remove(&task.uuid);
        Ok(Value::Null)
    }
}

fn task(uuid: &str) -> Task {
    Task {
        pipeline_id: 1,
        id: 2,
        name: "build".into(),
        namespace: "pipeline-1".into(),
        uuid: uuid.into(),
        cluster_name: "dev".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_exist_on_missing_object_is_absent() {
    let exec = ClusterExecutor::new(FakeBackend::new());
    let existence = exec.exist(&task("never-created")).await.unwrap();
    assert_eq!(existence, Existence::ABSENT);
}

#[tokio::test]
async fn test_exist_folds_object_not_found_error() {
    let mut backend = FakeBackend::new();
    backend.missing_as_error = true;
    let exec = ClusterExecutor::new(backend);
    assert_eq!(exec.exist(&task("gone")).await.unwrap(), Existence::ABSENT);
}

#[tokio::test]
async fn test_exist_derives_from_status() {
    let exec = ClusterExecutor::new(
        FakeBackend::new()
            .with_object("a", CanonicalStatus::Running)
            .with_object("b", CanonicalStatus::Created),
    );
    assert_eq!(exec.exist(&task("a")).await.unwrap(), Existence::new(true, true));
    assert_eq!(exec.exist(&task("b")).await.unwrap(), Existence::new(true, false));
}

#[tokio::test]
async fn test_exist_on_unknown_status_errors() {
    let exec = ClusterExecutor::new(FakeBackend::new().with_object("a", CanonicalStatus::Unknown));
    let err = exec.exist(&task("a")).await.unwrap_err();
    assert!(matches!(err.root(), ExecutorError::UndeterminedExistence(CanonicalStatus::Unknown)));
}

#[tokio::test]
async fn test_backend_errors_are_wrapped_with_task_context() {
    let mut backend = FakeBackend::new();
    backend.status_error = true;
    let exec = ClusterExecutor::new(backend);
    let err = exec.status(&task("a")).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("status job"));
    assert!(msg.contains("k8sjob"));
    assert!(msg.contains("pipelineID: 1"));
    assert!(msg.contains("taskID: 2"));
    assert!(msg.contains("namespace: pipeline-1"));
    assert!(msg.contains("jobID: a"));
    assert!(msg.contains("cluster: dev"));
    assert!(matches!(err.root(), ExecutorError::Kube(_)));
}

#[tokio::test]
async fn test_validation_fails_before_backend_call() {
    let mut backend = FakeBackend::new();
    backend.status_error = true;
    let exec = ClusterExecutor::new(backend);

    let mut no_ns = task("a");
    no_ns.namespace.clear();
    let err = exec.status(&no_ns).await.unwrap_err();
    assert!(matches!(err.root(), ExecutorError::MissingNamespace));

    let err = exec.status(&task("")).await.unwrap_err();
    assert!(matches!(err.root(), ExecutorError::MissingUuid));
}

#[tokio::test]
async fn test_start_twice_submits_once() {
    let exec = ClusterExecutor::new(FakeBackend::new());
    let t = task("job-1");

    let first = exec
        .start_with(&t, || exec.backend().submit(&t))
        .await
        .unwrap();
    assert_eq!(first, Value::String("job-1".into()));

    let second = exec
        .start_with(&t, || exec.backend().submit(&t))
        .await
        .unwrap();
    assert_eq!(second, Value::Null);
    assert_eq!(exec.backend().submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_submits_created_but_unstarted_object() {
    let exec = ClusterExecutor::new(FakeBackend::new().with_object("a", CanonicalStatus::Created));
    let t = task("a");
    exec.start_with(&t, || exec.backend().submit(&t)).await.unwrap();
    assert_eq!(exec.backend().submits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_create_is_noop() {
    let exec = ClusterExecutor::new(FakeBackend::new().with_object("a", CanonicalStatus::Running));
    assert_eq!(exec.create(&task("a")).await.unwrap(), Value::Null);
    assert_eq!(exec.create(&task("b")).await.unwrap(), Value::Null);
    assert_eq!(exec.backend().submits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_update_is_unsupported() {
    let exec = ClusterExecutor::new(FakeBackend::new());
    let err = exec.update(&task("a")).await.unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(err.to_string(), "k8sjob not support update operation");
}

#[tokio::test]
async fn test_cancel_and_remove_recompute_job_id() {
    let exec = ClusterExecutor::new(FakeBackend::new());
    let t = task("stale-id");
    exec.cancel(&t).await.unwrap();
    exec.remove(&t).await.unwrap();
    let deleted = exec.backend().deleted.lock().unwrap().clone();
    assert_eq!(deleted, vec![make_job_id(&t), make_job_id(&t)]);
    assert_eq!(make_job_id(&t), "pipeline-1.pipeline-task-2");
}

#[tokio::test]
async fn test_batch_delete_short_circuits() {
    let mut backend = FakeBackend::new();
    backend.fail_delete = Some("b".into());
    let exec = ClusterExecutor::new(backend);
    let tasks = vec![task("a"), task("b"), task("c")];

    let err = exec.batch_delete(&tasks).await.unwrap_err();
    assert!(err.to_string().contains("cannot delete b"));
    let deleted = exec.backend().deleted.lock().unwrap().clone();
    assert_eq!(deleted, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn test_batch_delete_skips_tasks_without_id() {
    let exec = ClusterExecutor::new(FakeBackend::new());
    exec.batch_delete(&[]).await.unwrap();
    exec.batch_delete(&[task(""), task("a")]).await.unwrap();
    let deleted = exec.backend().deleted.lock().unwrap().clone();
    assert_eq!(deleted, vec!["a".to_string()]);
}
