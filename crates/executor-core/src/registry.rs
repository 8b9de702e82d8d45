use crate::error::ExecutorError;
use crate::executor::Executor;
use crate::kind::{Kind, Name};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Constructor options: static executor options, or a cluster's config map.
pub type Options = HashMap<String, String>;

/// Option key carrying the backend connect timeout, in seconds.
pub const CONNECT_TIMEOUT_OPTION: &str = "connect_timeout_secs";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Reads [`CONNECT_TIMEOUT_OPTION`], falling back to the default.
pub fn connect_timeout(options: &Options) -> Result<Duration, ExecutorError> {
    match options.get(CONNECT_TIMEOUT_OPTION) {
        None => Ok(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS)),
        Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
            ExecutorError::Config(format!("invalid {}: {:?}, err: {}", CONNECT_TIMEOUT_OPTION, raw, e))
        }),
    }
}

/// Builds one executor instance. Must only build a client handle and must not
/// block on the network beyond a bounded connect timeout.
pub type CreateFn = Arc<
    dyn Fn(Name, Options) -> BoxFuture<'static, Result<Arc<dyn Executor>, ExecutorError>>
        + Send
        + Sync,
>;

/// Maps [`Kind`] to its constructor. Built once at startup and shared with the
/// manager.
#[derive(Default, Clone)]
pub struct Registry {
    factories: HashMap<Kind, CreateFn>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: &str, create: CreateFn) -> Result<(), ExecutorError> {
        let kind = Kind::new(kind)?;
        if self.factories.contains_key(&kind) {
            return Err(ExecutorError::DuplicateKind(kind.to_string()));
        }
        self.factories.insert(kind, create);
        Ok(())
    }

    /// Startup-time registration. A broken adapter table cannot be recovered
    /// from at runtime.
    pub fn must_register(&mut self, kind: &str, create: CreateFn) {
        if let Err(e) = self.register(kind, create) {
            panic!("failed to register action executor, kind: {}, err: {}", kind, e);
        }
    }

    pub fn get(&self, kind: &Kind) -> Option<CreateFn> {
        self.factories.get(kind).cloned()
    }

    pub fn contains(&self, kind: &Kind) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &Kind> {
        self.factories.keys()
    }

    pub fn cluster_kinds(&self) -> Vec<Kind> {
        let mut kinds: Vec<Kind> = self
            .factories
            .keys()
            .filter(|kind| kind.is_cluster_kind())
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }
}

/// Wraps an async constructor into a [`CreateFn`].
pub fn create_fn<F, Fut>(f: F) -> CreateFn
where
    F: Fn(Name, Options) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Arc<dyn Executor>, ExecutorError>> + Send + 'static,
{
    Arc::new(move |name: Name, options: Options| f(name, options).boxed())
}
