use executor_core::{create_fn, Executor, ExecutorError, Kind, Name, Options, Registry};
use std::sync::Arc;

fn failing_ctor(message: &'static str) -> executor_core::CreateFn {
    create_fn(move |_name: Name, _options: Options| async move {
        Err::<Arc<dyn Executor>, _>(ExecutorError::Config(message.to_string()))
    })
}

#[test]
fn test_register_and_lookup() {
    let mut registry = Registry::new();
    registry.register("docker", failing_ctor("docker")).unwrap();
    let kind = Kind::new("docker").unwrap();
    assert!(registry.contains(&kind));
    assert!(registry.get(&kind).is_some());
    assert!(registry.get(&Kind::new("k8sjob").unwrap()).is_none());
}

#[test]
fn test_register_invalid_kind() {
    let mut registry = Registry::new();
    let err = registry.register("bad kind", failing_ctor("x")).unwrap_err();
    assert!(matches!(err, ExecutorError::InvalidKind(_)));
}

#[tokio::test]
async fn test_duplicate_kind_keeps_first_registration() {
    let mut registry = Registry::new();
    registry.register("docker", failing_ctor("first")).unwrap();
    let err = registry.register("docker", failing_ctor("second")).unwrap_err();
    assert!(matches!(err, ExecutorError::DuplicateKind(ref k) if k == "docker"));

    let create = registry.get(&Kind::new("docker").unwrap()).unwrap();
    let result = create(Name::new("docker-a").unwrap(), Options::new()).await;
    match result {
        Err(ExecutorError::Config(msg)) => assert_eq!(msg, "first"),
        _ => panic!("expected first constructor to be kept"),
    }
}

#[test]
#[should_panic(expected = "failed to register action executor")]
fn test_must_register_panics_on_duplicate() {
    let mut registry = Registry::new();
    registry.must_register("docker", failing_ctor("a"));
    registry.must_register("docker", failing_ctor("b"));
}

#[test]
fn test_cluster_kinds_filtered_and_sorted() {
    let mut registry = Registry::new();
    registry.register("k8sspark", failing_ctor("s")).unwrap();
    registry.register("docker", failing_ctor("d")).unwrap();
    registry.register("k8sjob", failing_ctor("j")).unwrap();
    let kinds: Vec<String> = registry.cluster_kinds().into_iter().map(String::from).collect();
    assert_eq!(kinds, vec!["k8sjob".to_string(), "k8sspark".to_string()]);
}

#[test]
fn test_connect_timeout_option() {
    use executor_core::{connect_timeout, Options, CONNECT_TIMEOUT_OPTION};
    use std::time::Duration;

    let mut options = Options::new();
    assert_eq!(connect_timeout(&options).unwrap(), Duration::from_secs(10));
    options.insert(CONNECT_TIMEOUT_OPTION.into(), "3".into());
    assert_eq!(connect_timeout(&options).unwrap(), Duration::from_secs(3));
    options.insert(CONNECT_TIMEOUT_OPTION.into(), "soon".into());
    assert!(matches!(connect_timeout(&options), Err(ExecutorError::Config(_))));
}
