pub mod cli;
pub mod container_executor;

pub use cli::{CliOutput, ContainerCli, ProcessCli, Runtime};
pub use container_executor::{container_name, map_container_state, DockerExecutor};

use executor_core::kind::DOCKER;
use executor_core::{create_fn, Executor, ExecutorError, Name, Options, Registry};
use std::sync::Arc;

/// Registers `docker`.
pub fn register(registry: &mut Registry) -> Result<(), ExecutorError> {
    registry.register(
        DOCKER,
        create_fn(|name: Name, options: Options| async move {
            Ok(Arc::new(DockerExecutor::connect(name, options).await?) as Arc<dyn Executor>)
        }),
    )
}
