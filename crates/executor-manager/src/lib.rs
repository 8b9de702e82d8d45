pub mod manager;
pub mod pool;
pub mod topology;

pub use manager::Manager;
pub use pool::WorkerPool;
pub use topology::StaticTopology;
