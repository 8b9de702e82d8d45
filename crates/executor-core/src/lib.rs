pub mod cluster;
pub mod config;
pub mod error;
pub mod executor;
pub mod kind;
pub mod registry;
pub mod status;
pub mod task;
pub mod template;

pub use cluster::{Cluster, ClusterAction, ClusterEvent, ClusterType, TopologyProvider};
pub use config::Config;
pub use error::ExecutorError;
pub use executor::{ClusterBackend, Executor};
pub use kind::{Kind, Name};
pub use registry::{connect_timeout, create_fn, CreateFn, Options, Registry, CONNECT_TIMEOUT_OPTION};
pub use status::{CanonicalStatus, Existence, NativeStatus, StatusDesc, TaskInspect};
pub use task::Task;
pub use template::ClusterExecutor;
