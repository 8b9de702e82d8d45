pub mod synthetic;

pub use synthetic::{Completion, Outcome, Plan, SyntheticExecutor};

use executor_core::kind::SYNTHETIC;
use executor_core::{create_fn, Executor, ExecutorError, Name, Options, Registry};
use std::sync::Arc;

/// Registers `synthetic`.
pub fn register(registry: &mut Registry) -> Result<(), ExecutorError> {
    registry.register(
        SYNTHETIC,
        create_fn(|name: Name, options: Options| async move {
            Ok(Arc::new(SyntheticExecutor::new(name, &options)?) as Arc<dyn Executor>)
        }),
    )
}
