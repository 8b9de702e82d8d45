pub mod build;
pub mod describe;
pub mod executor;
pub mod status;

pub use build::{build_kube_job, make_job_name, KubeJobPlan};
pub use executor::KubeJob;
pub use status::{generate_kube_job_status, last_event_message, parse_failed_reason};
