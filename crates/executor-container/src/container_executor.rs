use crate::cli::{CliOutput, ContainerCli, ProcessCli, Runtime};
use executor_core::kind::DOCKER;
use executor_core::task::NetworkMode;
use executor_core::{
    ClusterBackend, ClusterExecutor, Executor, ExecutorError, Existence, Kind, Name, NativeStatus,
    Options, StatusDesc, Task, TaskInspect,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const RUNTIME_OPTION: &str = "runtime";
/// Bound on every engine call, in seconds.
pub const COMMAND_TIMEOUT_OPTION: &str = "command_timeout_secs";
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 120;

pub const NAMESPACE_LABEL: &str = "pipeline/namespace";
pub const UUID_LABEL: &str = "pipeline/uuid";

/// Runs a task as a single container on the local engine.
pub struct DockerExecutor {
    inner: ClusterExecutor<DockerBackend>,
}

pub struct DockerBackend {
    kind: Kind,
    name: Name,
    cli: Arc<dyn ContainerCli>,
}

pub fn container_name(task: &Task) -> String {
    format!("pipeline-{}-{}", task.namespace, task.uuid)
}

/// Translates the engine's `State.Status` and `State.ExitCode`.
pub fn map_container_state(state: &str, exit_code: i64) -> StatusDesc {
    let native = match state.trim() {
        "created" => NativeStatus::Created,
        "running" | "restarting" | "paused" => NativeStatus::Running,
        "exited" if exit_code == 0 => NativeStatus::StoppedOnOk,
        "exited" | "dead" => NativeStatus::StoppedOnFailed,
        "removing" | "stopped" => NativeStatus::Stopped,
        other => {
            return StatusDesc::from_native(
                NativeStatus::Unknown,
                format!("unknown container state: {}", other),
            )
        }
    };
    let desc = if native == NativeStatus::StoppedOnFailed {
        format!("exit code {}", exit_code)
    } else {
        String::new()
    };
    StatusDesc::from_native(native, desc)
}

/// Arguments of `create` for `task`, up to and including the command.
pub fn create_args(task: &Task) -> Vec<String> {
    let spec = &task.spec;
    let mut args = vec![
        "create".to_string(),
        "--name".to_string(),
        container_name(task),
        "--label".to_string(),
        format!("{}={}", NAMESPACE_LABEL, task.namespace),
        "--label".to_string(),
        format!("{}={}", UUID_LABEL, task.uuid),
    ];

    let mut envs: Vec<_> = spec.env.iter().collect();
    envs.sort();
    for (key, value) in envs {
        args.push("-e".to_string());
        args.push(format!("{}={}", key, value));
    }
    args.push("-e".to_string());
    args.push(format!("DICE_NAMESPACE={}", task.namespace));

    for bind in &spec.binds {
        if bind.host_path.is_empty() || bind.container_path.is_empty() {
            warn!(
                "skip bind with empty path, hostPath: {}, containerPath: {}",
                bind.host_path, bind.container_path
            );
            continue;
        }
        args.push("-v".to_string());
        let mut volume = format!("{}:{}", bind.host_path, bind.container_path);
        if bind.read_only {
            volume.push_str(":ro");
        }
        args.push(volume);
    }

    let cpus = spec.max_cpu.max(spec.cpu);
    if cpus > 0.0 {
        args.push("--cpus".to_string());
        args.push(cpus.to_string());
    }
    if spec.memory > 0.0 {
        args.push("--memory".to_string());
        args.push(format!("{}m", spec.memory as i64));
    }
    if spec.network == NetworkMode::Host {
        args.push("--network".to_string());
        args.push("host".to_string());
    }

    args.push(spec.image.clone());
    if !spec.cmd.is_empty() {
        args.push("sh".to_string());
        args.push("-c".to_string());
        args.push(spec.cmd.clone());
    }
    args
}

fn failed(verb: &str, name: &str, output: &CliOutput) -> ExecutorError {
    ExecutorError::ContainerRuntime(format!(
        "{} container {} failed: {}",
        verb, name, output.stderr
    ))
}

impl DockerExecutor {
    /// Reads `runtime` (`docker` or `podman`) and [`COMMAND_TIMEOUT_OPTION`].
    pub async fn connect(name: Name, options: Options) -> Result<Self, ExecutorError> {
        let runtime = Runtime::parse(options.get(RUNTIME_OPTION).map(String::as_str).unwrap_or_default())?;
        let timeout = match options.get(COMMAND_TIMEOUT_OPTION) {
            None => Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_secs).map_err(|e| {
                ExecutorError::Config(format!(
                    "invalid {}: {:?}, err: {}",
                    COMMAND_TIMEOUT_OPTION, raw, e
                ))
            })?,
        };
        Self::with_cli(name, Arc::new(ProcessCli::new(runtime, timeout)))
    }

    pub fn with_cli(name: Name, cli: Arc<dyn ContainerCli>) -> Result<Self, ExecutorError> {
        Ok(Self {
            inner: ClusterExecutor::new(DockerBackend {
                kind: Kind::new(DOCKER)?,
                name,
                cli,
            }),
        })
    }
}

impl DockerBackend {
    async fn run(&self, args: &[&str]) -> Result<CliOutput, ExecutorError> {
        self.cli
            .run(args.iter().map(|a| a.to_string()).collect())
            .await
    }

    async fn create_container(&self, task: &Task) -> Result<(), ExecutorError> {
        let name = container_name(task);
        let output = self.cli.run(create_args(task)).await?;
        if !output.success {
            if output.stderr.contains("already in use") {
                debug!("container {} already exists", name);
                return Ok(());
            }
            return Err(failed("create", &name, &output));
        }
        info!("container {} created, taskInfo: {}", name, task.describe());
        Ok(())
    }

    async fn create(&self, task: &Task) -> Result<Value, ExecutorError> {
        let status = self.status(task).await?;
        if status.missing {
            self.create_container(task).await?;
        }
        Ok(Value::String(container_name(task)))
    }

    async fn submit(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.create(task).await?;
        let name = container_name(task);
        let output = self.run(&["start", &name]).await?;
        if !output.success {
            return Err(failed("start", &name, &output));
        }
        info!("container {} started", name);
        Ok(Value::String(name))
    }

    async fn inspect(&self, task: &Task) -> Result<TaskInspect, ExecutorError> {
        task.validate()?;
        let name = container_name(task);
        let output = self.run(&["inspect", &name]).await?;
        if output.is_missing() {
            return Err(ExecutorError::ObjectNotFound(name));
        }
        if !output.success {
            return Err(failed("inspect", &name, &output));
        }
        Ok(TaskInspect {
            desc: output.stdout,
        })
    }
}

#[async_trait::async_trait]
impl ClusterBackend for DockerBackend {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn name(&self) -> &Name {
        &self.name
    }

    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        let name = container_name(task);
        let output = self
            .run(&["inspect", "--format", "{{.State.Status}} {{.State.ExitCode}}", &name])
            .await?;
        if output.is_missing() {
            return Ok(StatusDesc::not_found_in_cluster());
        }
        if !output.success {
            return Err(failed("inspect", &name, &output));
        }
        let (state, code) = output.stdout.split_once(' ').unwrap_or((output.stdout.as_str(), "0"));
        let exit_code = code.trim().parse::<i64>().map_err(|e| {
            ExecutorError::ContainerRuntime(format!(
                "invalid exit code of container {}: {:?}, err: {}",
                name, code, e
            ))
        })?;
        Ok(map_container_state(state, exit_code))
    }

    /// Force-removes the container; a missing one is fine.
    async fn delete(&self, task: &Task) -> Result<Value, ExecutorError> {
        let name = container_name(task);
        let output = self.run(&["rm", "-f", &name]).await?;
        if output.is_missing() {
            warn!("container {} is not found", name);
        } else if !output.success {
            return Err(failed("remove", &name, &output));
        } else {
            debug!("container {} removed", name);
        }
        Ok(Value::String(name))
    }
}

#[async_trait::async_trait]
impl Executor for DockerExecutor {
    fn kind(&self) -> &Kind {
        self.inner.kind()
    }

    fn name(&self) -> &Name {
        self.inner.name()
    }

    async fn exist(&self, task: &Task) -> Result<Existence, ExecutorError> {
        self.inner.exist(task).await
    }

    /// A container can exist without running, so creating is its own step.
    async fn create(&self, task: &Task) -> Result<Value, ExecutorError> {
        task.validate()
            .map_err(|e| e.wrap_task("create container", self.kind(), task))?;
        self.inner
            .backend()
            .create(task)
            .await
            .map_err(|e| e.wrap_task("create container", self.kind(), task))
    }

    async fn start(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner
            .start_with(task, || self.inner.backend().submit(task))
            .await
    }

    async fn update(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner.update(task).await
    }

    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        self.inner.status(task).await
    }

    async fn inspect(&self, task: &Task) -> Result<TaskInspect, ExecutorError> {
        self.inner
            .backend()
            .inspect(task)
            .await
            .map_err(|e| e.wrap_task("inspect container", self.kind(), task))
    }

    async fn cancel(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner.cancel(task).await
    }

    async fn remove(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.inner.remove(task).await
    }

    async fn batch_delete(&self, tasks: &[Task]) -> Result<Value, ExecutorError> {
        self.inner.batch_delete(tasks).await
    }
}
