use executor_core::cluster::{Cluster, ClusterAction, ClusterEvent, ClusterType};
use executor_core::config::{ExecutorConfig, ManagerConfig};
use executor_core::{
    create_fn, CreateFn, Executor, ExecutorError, Existence, Kind, Name, Options, Registry,
    StatusDesc, Task, TaskInspect, CONNECT_TIMEOUT_OPTION,
};
use executor_manager::{Manager, StaticTopology};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

struct FakeExecutor {
    kind: Kind,
    name: Name,
}

#[async_trait::async_trait]
impl Executor for FakeExecutor {
    fn kind(&self) -> &Kind {
        &self.kind
    }
    fn name(&self) -> &Name {
        &self.name
    }
    async fn exist(&self, _task: &Task) -> Result<Existence, ExecutorError> {
        Ok(Existence::ABSENT)
    }
    async fn create(&self, _task: &Task) -> Result<Value, ExecutorError> {
        Ok(Value::Null)
    }
    async fn start(&self, _task: &Task) -> Result<Value, ExecutorError> {
        Ok(Value::Null)
    }
    async fn update(&self, _task: &Task) -> Result<Value, ExecutorError> {
        Ok(Value::Null)
    }
    async fn status(&self, _task: &Task) -> Result<StatusDesc, ExecutorError> {
        Ok(StatusDesc::not_found_in_cluster())
    }
    async fn inspect(&self, _task: &Task) -> Result<TaskInspect, ExecutorError> {
        Ok(TaskInspect::default())
    }
    async fn cancel(&self, _task: &Task) -> Result<Value, ExecutorError> {
        Ok(Value::Null)
    }
    async fn remove(&self, _task: &Task) -> Result<Value, ExecutorError> {
        Ok(Value::Null)
    }
    async fn batch_delete(&self, _tasks: &[Task]) -> Result<Value, ExecutorError> {
        Ok(Value::Null)
    }
}

type Calls = Arc<parking_lot::Mutex<Vec<(Name, Options)>>>;

fn recording_ctor(kind: &str, calls: Calls) -> CreateFn {
    let kind = Kind::new(kind).unwrap();
    create_fn(move |name: Name, options: Options| {
        let kind = kind.clone();
        let calls = Arc::clone(&calls);
        async move {
            calls.lock().push((name.clone(), options));
            Ok(Arc::new(FakeExecutor { kind, name }) as Arc<dyn Executor>)
        }
    })
}

/// The first call blocks until `gate` gets a permit.
fn gated_ctor(kind: &str, gate: Arc<Semaphore>, entered: Arc<AtomicUsize>) -> CreateFn {
    let kind = Kind::new(kind).unwrap();
    create_fn(move |name: Name, _options: Options| {
        let kind = kind.clone();
        let gate = gate.clone();
        let entered = entered.clone();
        async move {
            if entered.fetch_add(1, Ordering::SeqCst) == 0 {
                let _permit = gate.acquire().await.unwrap();
            }
            Ok(Arc::new(FakeExecutor { kind, name }) as Arc<dyn Executor>)
        }
    })
}

fn failing_ctor() -> CreateFn {
    create_fn(|_name: Name, _options: Options| async {
        Err::<Arc<dyn Executor>, _>(ExecutorError::Kube("cluster unreachable".into()))
    })
}

fn k8s(name: &str) -> Cluster {
    Cluster {
        name: name.into(),
        cluster_type: ClusterType::K8s,
        config: HashMap::new(),
    }
}

struct Fixture {
    manager: Arc<Manager>,
    topology: Arc<StaticTopology>,
    calls: Calls,
}

fn fixture(clusters: Vec<Cluster>) -> Fixture {
    let calls: Calls = Default::default();
    let mut registry = Registry::new();
    registry.register("fake", recording_ctor("fake", calls.clone())).unwrap();
    registry.register("k8sjob", recording_ctor("k8sjob", calls.clone())).unwrap();
    registry.register("k8sflink", recording_ctor("k8sflink", calls.clone())).unwrap();
    let topology = Arc::new(StaticTopology::new(clusters));
    let manager = Arc::new(Manager::new(registry, topology.clone(), ManagerConfig::default()));
    Fixture {
        manager,
        topology,
        calls,
    }
}

fn name(s: &str) -> Name {
    Name::new(s).unwrap()
}

fn names_of(manager: &Manager, kind: &str) -> Vec<String> {
    manager
        .list_executors()
        .get(&Kind::new(kind).unwrap())
        .map(|names| names.iter().map(|n| n.to_string()).collect())
        .unwrap_or_default()
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn test_initialize_defers_cluster_kinds() {
    let f = fixture(vec![]);
    let configs = vec![
        ExecutorConfig {
            name: "fake-local".into(),
            kind: "fake".into(),
            options: HashMap::new(),
        },
        ExecutorConfig {
            name: "k8sjob-dev".into(),
            kind: "k8sjob".into(),
            options: HashMap::new(),
        },
    ];
    let shutdown = CancellationToken::new();
    let handle = f.manager.initialize(&configs, shutdown.clone()).await.unwrap();

    assert_eq!(names_of(&f.manager, "fake"), vec!["fake-local"]);
    assert!(names_of(&f.manager, "k8sjob").is_empty());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_initialize_rejects_unregistered_kind() {
    let f = fixture(vec![]);
    let configs = vec![ExecutorConfig {
        name: "nomad-1".into(),
        kind: "nomad".into(),
        options: HashMap::new(),
    }];
    let err = f
        .manager
        .initialize(&configs, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::NotFound(_)));
}

#[tokio::test]
async fn test_initial_rebuild_covers_k8s_family_only() {
    let legacy = Cluster {
        name: "legacy".into(),
        cluster_type: ClusterType::Dcos,
        config: HashMap::new(),
    };
    let edas = Cluster {
        name: "edas".into(),
        cluster_type: ClusterType::Edas,
        config: HashMap::new(),
    };
    let f = fixture(vec![k8s("dev"), legacy, edas]);
    let shutdown = CancellationToken::new();
    f.manager.initialize(&[], shutdown.clone()).await.unwrap();

    let manager = f.manager.clone();
    wait_until(move || {
        names_of(&manager, "k8sflink").len() == 2 && names_of(&manager, "k8sjob").len() == 2
    })
    .await;
    assert_eq!(names_of(&f.manager, "k8sjob"), vec!["k8sjob-dev", "k8sjob-edas"]);
    assert_eq!(names_of(&f.manager, "k8sflink"), vec!["k8sflink-dev", "k8sflink-edas"]);
    shutdown.cancel();
}

#[tokio::test]
async fn test_create_then_update_keeps_single_instance() {
    let f = fixture(vec![k8s("seed")]);
    let shutdown = CancellationToken::new();
    f.manager.initialize(&[], shutdown.clone()).await.unwrap();
    let manager = f.manager.clone();
    wait_until(move || {
        names_of(&manager, "k8sjob") == vec!["k8sjob-seed"]
            && names_of(&manager, "k8sflink") == vec!["k8sflink-seed"]
    })
    .await;

    f.topology
        .publish(ClusterEvent {
            action: ClusterAction::Create,
            cluster: k8s("dev"),
        })
        .await;
    let manager = f.manager.clone();
    wait_until(move || {
        names_of(&manager, "k8sjob").len() == 2 && names_of(&manager, "k8sflink").len() == 2
    })
    .await;
    let before = f.manager.get(&name("k8sjob-dev")).await.unwrap();

    f.topology
        .publish(ClusterEvent {
            action: ClusterAction::Update,
            cluster: k8s("dev"),
        })
        .await;
    let mut replaced = false;
    for _ in 0..200 {
        let now = f.manager.get(&name("k8sjob-dev")).await.unwrap();
        if !Arc::ptr_eq(&now, &before) {
            replaced = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(replaced, "update did not rebuild k8sjob-dev");

    assert_eq!(names_of(&f.manager, "k8sjob"), vec!["k8sjob-dev", "k8sjob-seed"]);
    assert_eq!(names_of(&f.manager, "k8sflink"), vec!["k8sflink-dev", "k8sflink-seed"]);
    shutdown.cancel();
}

#[tokio::test]
async fn test_lookup_racing_cluster_delete_installs_nothing() {
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(AtomicUsize::new(0));
    let mut registry = Registry::new();
    registry
        .register("k8sjob", gated_ctor("k8sjob", gate.clone(), entered.clone()))
        .unwrap();
    let topology = Arc::new(StaticTopology::new(vec![k8s("dev")]));
    let manager = Arc::new(Manager::new(registry, topology.clone(), ManagerConfig::default()));

    let lookup = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.get(&name("k8sjob-dev")).await })
    };
    let seen = entered.clone();
    wait_until(move || seen.load(Ordering::SeqCst) == 1).await;

    let shutdown = CancellationToken::new();
    manager.initialize(&[], shutdown.clone()).await.unwrap();
    let m = manager.clone();
    wait_until(move || names_of(&m, "k8sjob") == vec!["k8sjob-dev"]).await;

    topology
        .publish(ClusterEvent {
            action: ClusterAction::Delete,
            cluster: k8s("dev"),
        })
        .await;
    let m = manager.clone();
    wait_until(move || names_of(&m, "k8sjob").is_empty()).await;

    gate.add_permits(1);
    let err = lookup.await.unwrap().err().unwrap();
    assert!(matches!(err, ExecutorError::NotFound(_)), "{}", err);
    assert!(manager.list_executors().is_empty());
    shutdown.cancel();
}

#[tokio::test]
async fn test_delete_event_removes_only_that_cluster() {
    let f = fixture(vec![k8s("dev"), k8s("prod")]);
    let shutdown = CancellationToken::new();
    f.manager.initialize(&[], shutdown.clone()).await.unwrap();
    let manager = f.manager.clone();
    wait_until(move || names_of(&manager, "k8sjob").len() == 2).await;

    f.topology
        .publish(ClusterEvent {
            action: ClusterAction::Delete,
            cluster: k8s("dev"),
        })
        .await;
    let manager = f.manager.clone();
    wait_until(move || names_of(&manager, "k8sjob").len() == 1).await;

    assert_eq!(names_of(&f.manager, "k8sjob"), vec!["k8sjob-prod"]);
    assert_eq!(names_of(&f.manager, "k8sflink"), vec!["k8sflink-prod"]);
    assert!(f.topology.clusters().iter().all(|c| c.name != "dev"));
    shutdown.cancel();
}

#[tokio::test]
async fn test_refresh_trigger_rebuilds() {
    let f = fixture(vec![k8s("dev")]);
    let shutdown = CancellationToken::new();
    f.manager.initialize(&[], shutdown.clone()).await.unwrap();
    let calls = f.calls.clone();
    wait_until(move || calls.lock().len() == 2).await;

    f.topology.notify_refresh();
    let calls = f.calls.clone();
    wait_until(move || calls.lock().len() == 4).await;
    assert_eq!(names_of(&f.manager, "k8sjob"), vec!["k8sjob-dev"]);
    shutdown.cancel();
}

#[tokio::test]
async fn test_get_provisions_lazily_and_caches() {
    let f = fixture(vec![k8s("dev")]);

    let first = f.manager.get(&name("k8sjob-dev")).await.unwrap();
    let second = f.manager.get(&name("k8sjob-dev")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.kind().as_str(), "k8sjob");

    let calls = f.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.as_str(), "k8sjob-dev");
    assert_eq!(calls[0].1.get(CONNECT_TIMEOUT_OPTION).map(String::as_str), Some("10"));
}

#[tokio::test]
async fn test_cluster_config_overrides_connect_timeout() {
    let mut dev = k8s("dev");
    dev.config.insert(CONNECT_TIMEOUT_OPTION.into(), "3".into());
    dev.config.insert("kubeconfig_path".into(), "/etc/kube/dev.yaml".into());
    let f = fixture(vec![dev]);

    f.manager.get(&name("k8sflink-dev")).await.unwrap();
    let calls = f.calls.lock();
    assert_eq!(calls[0].1.get(CONNECT_TIMEOUT_OPTION).map(String::as_str), Some("3"));
    assert_eq!(
        calls[0].1.get("kubeconfig_path").map(String::as_str),
        Some("/etc/kube/dev.yaml")
    );
}

#[tokio::test]
async fn test_get_unknown_names() {
    let f = fixture(vec![k8s("dev")]);
    for missing in ["fake-local", "nomad-dev", "k8sjob-staging"] {
        let err = f.manager.get(&name(missing)).await.err().unwrap();
        assert!(matches!(err, ExecutorError::NotFound(_)), "{}: {}", missing, err);
    }
    assert!(f.calls.lock().is_empty());
}

#[tokio::test]
async fn test_force_refresh_skips_failing_constructor() {
    let calls: Calls = Default::default();
    let mut registry = Registry::new();
    registry.register("k8sjob", recording_ctor("k8sjob", calls.clone())).unwrap();
    registry.register("k8sspark", failing_ctor()).unwrap();
    let topology = Arc::new(StaticTopology::new(vec![k8s("dev"), k8s("prod")]));
    let manager = Manager::new(registry, topology, ManagerConfig::default());

    assert_eq!(manager.force_refresh().await, 2);
    let listing = manager.list_executors();
    assert_eq!(listing.len(), 1);
    assert_eq!(names_of(&manager, "k8sjob"), vec!["k8sjob-dev", "k8sjob-prod"]);
}

#[tokio::test]
async fn test_loop_exits_when_shutdown() {
    let f = fixture(vec![]);
    let shutdown = CancellationToken::new();
    let handle = f.manager.initialize(&[], shutdown.clone()).await.unwrap();
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
}
