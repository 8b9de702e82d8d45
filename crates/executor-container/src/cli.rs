use executor_core::ExecutorError;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Container engine binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runtime {
    Docker,
    Podman,
}

impl Runtime {
    pub fn parse(raw: &str) -> Result<Self, ExecutorError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "docker" => Ok(Runtime::Docker),
            "podman" => Ok(Runtime::Podman),
            other => Err(ExecutorError::Config(format!(
                "unsupported container runtime: {:?}",
                other
            ))),
        }
    }

    pub fn program(&self) -> &'static str {
        match self {
            Runtime::Docker => "docker",
            Runtime::Podman => "podman",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CliOutput {
    /// Both engines word a missing object as "no such ...".
    pub fn is_missing(&self) -> bool {
        !self.success && self.stderr.to_ascii_lowercase().contains("no such")
    }
}

/// One invocation of the container engine CLI. A non-zero exit is reported in
/// the output, not as an error.
#[async_trait::async_trait]
pub trait ContainerCli: Send + Sync {
    async fn run(&self, args: Vec<String>) -> Result<CliOutput, ExecutorError>;
}

/// Runs the engine binary as a child process, killed when it overruns.
pub struct ProcessCli {
    runtime: Runtime,
    timeout: Duration,
}

impl ProcessCli {
    pub fn new(runtime: Runtime, timeout: Duration) -> Self {
        Self { runtime, timeout }
    }
}

#[async_trait::async_trait]
impl ContainerCli for ProcessCli {
    async fn run(&self, args: Vec<String>) -> Result<CliOutput, ExecutorError> {
        let program = self.runtime.program();
        let verb = args.first().cloned().unwrap_or_default();
        debug!("running: {} {}", program, args.join(" "));

        let output = Command::new(program).args(&args).kill_on_drop(true).output();
        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                ExecutorError::Timeout(self.timeout.as_secs(), format!("{} {}", program, verb))
            })?
            .map_err(|e| ExecutorError::ContainerRuntime(format!("failed to run {}: {}", program, e)))?;

        Ok(CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
