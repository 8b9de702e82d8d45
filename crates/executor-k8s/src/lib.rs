pub mod client;
pub mod env;
pub mod hit_rate;
pub mod job;
pub mod namespace;
pub mod operator;

pub use client::ClusterContext;
pub use hit_rate::{HitSampler, RandomSampler, SeededSampler};
pub use job::KubeJob;
pub use operator::{Flink, KubeFlink, KubeSpark, OperatorExecutor, OperatorFlavor, Spark};

use executor_core::kind::{K8S_FLINK, K8S_JOB, K8S_SPARK};
use executor_core::{create_fn, Executor, ExecutorError, Name, Options, Registry};
use std::sync::Arc;

/// Registers `k8sjob`, `k8sflink` and `k8sspark`.
pub fn register(registry: &mut Registry) -> Result<(), ExecutorError> {
    registry.register(
        K8S_JOB,
        create_fn(|name: Name, options: Options| async move {
            Ok(Arc::new(KubeJob::connect(name, options).await?) as Arc<dyn Executor>)
        }),
    )?;
    registry.register(
        K8S_FLINK,
        create_fn(|name: Name, options: Options| async move {
            Ok(Arc::new(KubeFlink::connect(name, options).await?) as Arc<dyn Executor>)
        }),
    )?;
    registry.register(
        K8S_SPARK,
        create_fn(|name: Name, options: Options| async move {
            Ok(Arc::new(KubeSpark::connect(name, options).await?) as Arc<dyn Executor>)
        }),
    )?;
    Ok(())
}
