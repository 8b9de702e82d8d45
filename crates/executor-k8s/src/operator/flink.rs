use super::OperatorFlavor;
use crate::env::{cluster_envs, env_var};
use executor_core::kind::K8S_FLINK;
use executor_core::task::{BigDataResource, FlinkConf};
use executor_core::{ExecutorError, NativeStatus, Options, StatusDesc, Task};
use k8s_openapi::api::core::v1::EnvVar;
use kube::api::GroupVersionKind;
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const FLINK_GROUP: &str = "flinkoperator.k8s.io";
pub const FLINK_VERSION: &str = "v1beta1";
pub const FLINK_KIND: &str = "FlinkCluster";

/// Flink jobs on a session cluster per task, through the Flink operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Flink;

/// Reads a `FlinkCluster` status. The job component decides when present;
/// otherwise the cluster's own state does.
pub fn flink_status(status: &Value) -> StatusDesc {
    if let Some(job_state) = status.pointer("/components/job/state").and_then(Value::as_str) {
        let native = match job_state {
            "" | "Pending" => NativeStatus::Unschedulable,
            "Running" | "Updating" => NativeStatus::Running,
            "Succeeded" => NativeStatus::StoppedOnOk,
            "Failed" => NativeStatus::StoppedOnFailed,
            "Cancelled" => NativeStatus::StoppedByKilled,
            other => {
                return StatusDesc::from_native(
                    NativeStatus::Unknown,
                    format!("unknown status, flink job state: {}", other),
                )
            }
        };
        return StatusDesc::from_native(native, "");
    }

    let native = match status.get("state").and_then(Value::as_str).unwrap_or_default() {
        "" | "Creating" | "Reconciling" => NativeStatus::Unschedulable,
        "Running" | "Updating" => NativeStatus::Running,
        "Stopping" | "PartiallyStopped" | "Stopped" => NativeStatus::Stopped,
        other => {
            return StatusDesc::from_native(
                NativeStatus::Unknown,
                format!("unknown status, flink cluster state: {}", other),
            )
        }
    };
    StatusDesc::from_native(native, "")
}

/// JVM-style sizes (`1024m`, `2g`) as Kubernetes quantities (`1024Mi`, `2Gi`).
/// Anything else passes through.
pub fn jvm_memory_to_quantity(memory: &str) -> String {
    let memory = memory.trim();
    let Some(last) = memory.chars().last() else {
        return String::new();
    };
    let unit = match last.to_ascii_lowercase() {
        'k' => "Ki",
        'm' => "Mi",
        'g' => "Gi",
        't' => "Ti",
        _ => return memory.to_string(),
    };
    let digits = &memory[..memory.len() - 1];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return memory.to_string();
    }
    format!("{}{}", digits, unit)
}

fn resources(resource: &BigDataResource) -> Value {
    let limits = json!({
        "cpu": resource.cpu,
        "memory": jvm_memory_to_quantity(&resource.memory),
    });
    json!({ "requests": limits.clone(), "limits": limits })
}

fn flink_envs(task: &Task, cluster: &Options) -> Vec<EnvVar> {
    let mut task_envs: Vec<_> = task.spec.env.iter().collect();
    task_envs.sort();
    let mut envs: Vec<EnvVar> = task_envs
        .into_iter()
        .map(|(k, v)| env_var(k.as_str(), v.as_str()))
        .collect();
    envs.push(env_var("IS_K8S", "true"));
    envs.push(env_var("DICE_NAMESPACE", task.namespace.as_str()));
    envs.extend(cluster_envs(cluster).into_iter().map(|(k, v)| env_var(k, v)));
    envs
}

fn flink_conf(task: &Task) -> Result<&FlinkConf, ExecutorError> {
    task.spec
        .bigdata
        .as_ref()
        .and_then(|b| b.flink.as_ref())
        .ok_or_else(|| {
            ExecutorError::InvalidTask(format!(
                "task {} has no flink config, namespace: {}",
                task.uuid, task.namespace
            ))
        })
}

#[async_trait::async_trait]
impl OperatorFlavor for Flink {
    fn kind(&self) -> &'static str {
        K8S_FLINK
    }

    fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(FLINK_GROUP, FLINK_VERSION, FLINK_KIND)
    }

    fn labels(&self, _task: &Task) -> BTreeMap<String, String> {
        BTreeMap::from([("job-type".to_string(), "k8s-flink".to_string())])
    }

    fn build_spec(&self, task: &Task, cluster: &Options) -> Result<Value, ExecutorError> {
        task.validate()?;
        let conf = flink_conf(task)?;
        let bigdata = task.spec.bigdata.as_ref();
        let class_name = bigdata.map(|b| b.class.as_str()).filter(|c| !c.is_empty());
        let args = bigdata.map(|b| b.args.clone()).unwrap_or_default();
        let properties: BTreeMap<_, _> = bigdata
            .map(|b| b.properties.iter().collect())
            .unwrap_or_default();

        let mut job = json!({
            "jarFile": conf.jar,
            "args": args,
            "parallelism": conf.parallelism,
            "restartPolicy": "Never",
        });
        if let Some(class_name) = class_name {
            job["className"] = json!(class_name);
        }

        let envs = serde_json::to_value(flink_envs(task, cluster))
            .map_err(|e| ExecutorError::Backend(format!("failed to encode flink envs: {}", e)))?;

        let mut spec = json!({
            "image": { "name": task.spec.image, "pullPolicy": "Always" },
            "jobManager": {
                "accessScope": "Cluster",
                "replicas": conf.job_manager.replica,
                "resources": resources(&conf.job_manager),
            },
            "taskManager": {
                "replicas": conf.task_manager.replica,
                "resources": resources(&conf.task_manager),
            },
            "job": job,
            "envVars": envs,
            "flinkProperties": properties,
        });
        if !conf.version.is_empty() {
            spec["flinkVersion"] = json!(conf.version);
        }
        Ok(spec)
    }

    fn translate(&self, status: &Value) -> StatusDesc {
        flink_status(status)
    }
}
